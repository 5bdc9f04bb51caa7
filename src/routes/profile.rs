/**
 * Profile Routes
 * Authenticated account self-service: profile/avatar update, email change
 * with verification code, password change.
 */
use axum::{
    extract::Multipart,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mail;
use crate::routes::auth::{
    generate_verification_code, hash_password, require_user, verify_password, UserPublic,
    CODE_EXPIRY_MINUTES,
};
use crate::routes::{db_pool, error, MessageResponse};
use crate::storage;

const MAX_AVATAR_SIZE: usize = 5 * 1024 * 1024; // 5MB

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub success: bool,
    pub message: String,
    pub data: UserPublic,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailChangeRequest {
    pub new_email: String,
    pub current_password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmEmailChangeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
}

/// POST /api/user/profile/update - multipart name/surname/avatar
pub async fn update_profile(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    let mut user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let mut name: Option<String> = None;
    let mut surname: Option<String> = None;
    let mut avatar_bytes: Option<Vec<u8>> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                return error(StatusCode::BAD_REQUEST, "Invalid multipart data").into_response();
            }
        };

        match field.name().unwrap_or("") {
            "name" => name = field.text().await.ok(),
            "surname" => surname = field.text().await.ok(),
            "avatar" => match field.bytes().await {
                Ok(b) => avatar_bytes = Some(b.to_vec()),
                Err(e) => {
                    tracing::error!("Failed to read avatar bytes: {}", e);
                    return error(StatusCode::BAD_REQUEST, "Failed to read file data")
                        .into_response();
                }
            },
            _ => {}
        }
    }

    if let Some(name) = name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        user.name = name.to_string();
    }
    if let Some(surname) = surname.as_deref().map(str::trim) {
        user.surname = surname.to_string();
    }

    if let Some(bytes) = avatar_bytes {
        if bytes.is_empty() {
            return error(StatusCode::BAD_REQUEST, "Empty file").into_response();
        }
        if bytes.len() > MAX_AVATAR_SIZE {
            return error(StatusCode::BAD_REQUEST, "File too large. Maximum size is 5MB.")
                .into_response();
        }
        let mime = match crate::routes::validate_image_magic_bytes(&bytes) {
            Some(m) => m,
            None => {
                return error(
                    StatusCode::BAD_REQUEST,
                    "File content does not match an allowed image type.",
                )
                .into_response();
            }
        };

        // Replace the previous avatar file, keeping orphans off disk.
        if let Some(old) = user.image.as_deref() {
            if old.starts_with("/uploads/avatars/") {
                storage::delete_local(old).await;
            }
        }

        let filename = format!(
            "avatar-{}.{}",
            Uuid::new_v4(),
            crate::routes::extension_from_mime(mime)
        );
        match storage::save_local("avatars", &filename, &bytes).await {
            Ok(url) => user.image = Some(url),
            Err(e) => {
                tracing::error!("Failed to save avatar: {}", e);
                return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file")
                    .into_response();
            }
        }
    }

    match sqlx::query(
        "UPDATE users SET name = $1, surname = $2, image = $3, updated_at = now() WHERE id = $4",
    )
    .bind(&user.name)
    .bind(&user.surname)
    .bind(&user.image)
    .bind(user.id)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(ProfileResponse {
                success: true,
                message: "Profile updated successfully".to_string(),
                data: UserPublic::from(&user),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to update profile: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile").into_response()
        }
    }
}

/// POST /api/user/email/request-change
pub async fn request_email_change(
    headers: HeaderMap,
    Json(payload): Json<EmailChangeRequest>,
) -> impl IntoResponse {
    let user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let new_email = payload.new_email.trim().to_lowercase();
    if new_email.is_empty() || payload.current_password.is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            "New email and current password are required",
        )
        .into_response();
    }
    if !new_email.contains('@') {
        return error(StatusCode::BAD_REQUEST, "Invalid email format").into_response();
    }

    if !verify_password(payload.current_password, user.password_hash.clone()).await {
        return error(StatusCode::UNAUTHORIZED, "Current password is incorrect").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, (Uuid,)>("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(&new_email)
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(_)) => {
            return error(StatusCode::CONFLICT, "Email already in use").into_response();
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Database error checking email: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    }

    let code = generate_verification_code();
    let expires_at = Utc::now() + Duration::minutes(CODE_EXPIRY_MINUTES);

    if let Err(e) = sqlx::query(
        r#"
        UPDATE users
        SET email_change_new_email = $1, email_change_code = $2,
            email_change_expires_at = $3, updated_at = now()
        WHERE id = $4
        "#,
    )
    .bind(&new_email)
    .bind(&code)
    .bind(expires_at)
    .bind(user.id)
    .execute(pool.as_ref())
    .await
    {
        tracing::error!("Failed to store email change request: {}", e);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
    }

    let text = format!(
        "Hello!\n\nYour email change verification code is: {}\n\nThe code expires in {} minutes.",
        code, CODE_EXPIRY_MINUTES
    );
    if let Err(e) = mail::send_email(&new_email, Some(&user.name), "Email change code", &text).await
    {
        tracing::error!("Failed to send email change code: {}", e);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send email").into_response();
    }

    (
        StatusCode::OK,
        Json(MessageResponse::new(format!(
            "Verification code sent to {}. Check your email.",
            new_email
        ))),
    )
        .into_response()
}

/// POST /api/user/email/confirm-change
pub async fn confirm_email_change(
    headers: HeaderMap,
    Json(payload): Json<ConfirmEmailChangeRequest>,
) -> impl IntoResponse {
    let mut user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    if payload.code.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Verification code is required").into_response();
    }

    let (Some(new_email), Some(stored_code), Some(expires_at)) = (
        user.email_change_new_email.clone(),
        user.email_change_code.clone(),
        user.email_change_expires_at,
    ) else {
        return error(StatusCode::BAD_REQUEST, "No email change request found").into_response();
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    if expires_at < Utc::now() {
        let _ = sqlx::query(
            r#"
            UPDATE users
            SET email_change_new_email = NULL, email_change_code = NULL,
                email_change_expires_at = NULL, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .execute(pool.as_ref())
        .await;
        return error(
            StatusCode::BAD_REQUEST,
            "Verification code expired. Please request a new one.",
        )
        .into_response();
    }

    if stored_code != payload.code {
        return error(StatusCode::BAD_REQUEST, "Invalid verification code").into_response();
    }

    match sqlx::query(
        r#"
        UPDATE users
        SET email = $1, email_change_new_email = NULL, email_change_code = NULL,
            email_change_expires_at = NULL, updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(&new_email)
    .bind(user.id)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => {
            user.email = new_email;
            (
                StatusCode::OK,
                Json(ProfileResponse {
                    success: true,
                    message: "Email updated successfully".to_string(),
                    data: UserPublic::from(&user),
                }),
            )
                .into_response()
        }
        Err(e) if crate::routes::is_unique_violation(&e) => {
            error(StatusCode::CONFLICT, "Email already in use").into_response()
        }
        Err(e) => {
            tracing::error!("Failed to confirm email change: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// POST /api/user/password/change
pub async fn change_password(
    headers: HeaderMap,
    Json(payload): Json<PasswordChangeRequest>,
) -> impl IntoResponse {
    let user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            "Current password and new password are required",
        )
        .into_response();
    }

    if payload.new_password.len() < 8 {
        return error(
            StatusCode::BAD_REQUEST,
            "New password must be at least 8 characters long",
        )
        .into_response();
    }

    if !verify_password(payload.current_password, user.password_hash.clone()).await {
        return error(StatusCode::UNAUTHORIZED, "Current password is incorrect").into_response();
    }

    let password_hash = match hash_password(payload.new_password).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
        .bind(&password_hash)
        .bind(user.id)
        .execute(pool.as_ref())
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(MessageResponse::new("Password changed successfully")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to change password: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn profile_router() -> Router {
        Router::new()
            .route("/api/user/email/request-change", post(request_email_change))
            .route("/api/user/email/confirm-change", post(confirm_email_change))
            .route("/api/user/password/change", post(change_password))
    }

    async fn post_json_no_auth(app: Router, uri: &str, json: &impl serde::Serialize) -> StatusCode {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_email_change_requires_auth() {
        let status = post_json_no_auth(
            profile_router(),
            "/api/user/email/request-change",
            &EmailChangeRequest {
                new_email: "new@example.com".to_string(),
                current_password: "password123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_password_change_requires_auth() {
        let status = post_json_no_auth(
            profile_router(),
            "/api/user/password/change",
            &PasswordChangeRequest {
                current_password: "old-password".to_string(),
                new_password: "new-password".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_confirm_email_change_requires_auth() {
        let status = post_json_no_auth(
            profile_router(),
            "/api/user/email/confirm-change",
            &ConfirmEmailChangeRequest {
                code: "123456".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
