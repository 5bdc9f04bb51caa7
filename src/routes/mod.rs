/**
 * Routes Module
 * API route handlers
 */
use axum::{http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;

pub mod admin_courses;
pub mod admin_users;
pub mod announcements;
pub mod auth;
pub mod categories;
pub mod companies;
pub mod contact;
pub mod courses;
pub mod dashboard;
pub mod health;
pub mod payments;
pub mod profile;
pub mod projects;
pub mod reviews;
pub mod videos;

/// Shared error body. Failures across all handlers use this single dialect;
/// success bodies are typed per-route structs.
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

/// Shared success body for operations with nothing else to return.
#[derive(Debug, Serialize, serde::Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

pub(crate) type HandlerError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn error(status: StatusCode, error: impl Into<String>) -> HandlerError {
    (status, Json(ErrorResponse::new(error)))
}

/// Fetch the shared pool or fail the request with 503.
pub(crate) fn db_pool() -> Result<Arc<PgPool>, HandlerError> {
    crate::db::get_pool()
        .ok_or_else(|| error(StatusCode::SERVICE_UNAVAILABLE, "Database not available"))
}

/// Unique-constraint violations surface as conflicts, everything else as 500.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    let text = e.to_string();
    text.contains("duplicate key") || text.contains("unique constraint")
}

/// Generate a URL slug from a title: lowercase, alphanumerics kept,
/// everything else collapsed into single hyphens.
pub(crate) fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Sniff image content. Extension checks alone are spoofable.
pub(crate) fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

pub(crate) fn extension_from_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Advanced JavaScript"), "advanced-javascript");
        assert_eq!(slugify("3D Design & Modeling"), "3d-design-modeling");
        assert_eq!(slugify("  Web   Dev!  "), "web-dev");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn test_magic_bytes_detection() {
        assert_eq!(
            validate_image_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some("image/jpeg")
        );
        assert_eq!(
            validate_image_magic_bytes(&[0x89, 0x50, 0x4E, 0x47, 0x0D]),
            Some("image/png")
        );
        assert_eq!(validate_image_magic_bytes(b"not an image"), None);
        assert_eq!(validate_image_magic_bytes(&[0xFF]), None);
    }

    #[test]
    fn test_error_response_serializes_without_empty_message() {
        let body = ErrorResponse::new("Not found");
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("message").is_none());

        let body = ErrorResponse::with_message("Invalid slug", "lowercase only");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["message"], "lowercase only");
    }
}
