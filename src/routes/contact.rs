/**
 * Contact Routes
 * Contact-form submissions forwarded to the configured recipient.
 */
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::mail;
use crate::routes::{error, MessageResponse};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
}

/// POST /api/contact
pub async fn submit_contact(Json(payload): Json<ContactRequest>) -> impl IntoResponse {
    if payload.name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.message.trim().is_empty()
    {
        return error(StatusCode::BAD_REQUEST, "All fields required").into_response();
    }

    let Some(recipient) = std::env::var("CONTACT_RECIPIENT")
        .ok()
        .filter(|v| !v.trim().is_empty())
    else {
        tracing::error!("CONTACT_RECIPIENT is not configured");
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send message")
            .into_response();
    };

    let subject = format!("New message from {}", payload.name.trim());
    let text = format!(
        "Name: {}\nEmail: {}\n\nMessage:\n{}",
        payload.name.trim(),
        payload.email.trim(),
        payload.message.trim()
    );

    match mail::send_email(&recipient, None, &subject, &text).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse::new("Message sent successfully")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to send contact email: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send message").into_response()
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

    async fn submit(payload: &ContactRequest) -> StatusCode {
        let app = Router::new().route("/api/contact", post(submit_contact));
        let req = Request::post("/api/contact")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(payload).unwrap()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_contact_requires_all_fields() {
        let status = submit(&ContactRequest {
            name: "Jo".to_string(),
            email: "".to_string(),
            message: "Hello".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_contact_whitespace_only_fields_rejected() {
        let status = submit(&ContactRequest {
            name: "   ".to_string(),
            email: "a@b.c".to_string(),
            message: "Hello".to_string(),
        })
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
