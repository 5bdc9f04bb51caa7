/**
 * Announcement Routes
 * Audience-filtered listings with per-user read flags, admin management,
 * and the live SSE feed backed by the process-wide broadcast channel.
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use uuid::Uuid;

use crate::db::models::Announcement;
use crate::notify;
use crate::routes::auth::{require_admin, require_user};
use crate::routes::{db_pool, error, MessageResponse};

const AUDIENCES: &[&str] = &["all", "premium", "free", "notLoggedIn"];

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementWithRead {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub audience: String,
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementListResponse {
    pub success: bool,
    pub data: Vec<AnnouncementWithRead>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementResponse {
    pub success: bool,
    pub data: Announcement,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnouncementRequest {
    pub title: String,
    pub content: String,
    pub audience: String,
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/announcements - active, unexpired announcements matching
/// the caller's tier, newest first, with their read flag
pub async fn list_announcements(headers: HeaderMap) -> impl IntoResponse {
    let user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    // Premium = at least one active entitlement.
    let is_premium = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM course_entitlements WHERE user_id = $1 AND expires_at > now())",
    )
    .bind(user.id)
    .fetch_one(pool.as_ref())
    .await
    .unwrap_or(false);
    let tier = if is_premium { "premium" } else { "free" };

    match sqlx::query_as::<_, AnnouncementWithRead>(
        r#"
        SELECT a.id, a.title, a.content, a.audience, a.status,
               a.expires_at, a.created_at,
               COALESCE(r.is_read, false) AS read
        FROM announcements a
        LEFT JOIN announcement_reads r
            ON r.announcement_id = a.id AND r.user_id = $1
        WHERE a.status = 'active'
          AND (a.expires_at IS NULL OR a.expires_at > now())
          AND a.audience IN ('all', $2)
        ORDER BY a.created_at DESC
        "#,
    )
    .bind(user.id)
    .bind(tier)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(data) => (
            StatusCode::OK,
            Json(AnnouncementListResponse {
                success: true,
                data,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing announcements: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch announcements",
            )
            .into_response()
        }
    }
}

/// POST /api/admin/announcements - create and broadcast
pub async fn create_announcement(
    headers: HeaderMap,
    Json(payload): Json<CreateAnnouncementRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "Missing required fields").into_response();
    }
    if !AUDIENCES.contains(&payload.audience.as_str()) {
        return error(StatusCode::BAD_REQUEST, "Invalid audience").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    // Announcement bodies may carry markup; strip anything unsafe.
    let content = ammonia::clean(&payload.content);

    match sqlx::query_as::<_, Announcement>(
        r#"
        INSERT INTO announcements (title, content, audience, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.title.trim())
    .bind(&content)
    .bind(&payload.audience)
    .bind(payload.expires_at)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(announcement) => {
            // Fire-and-forget: no delivery guarantee to connected clients.
            notify::publish(&announcement);
            (
                StatusCode::CREATED,
                Json(AnnouncementResponse {
                    success: true,
                    data: announcement,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Database error creating announcement: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create announcement",
            )
            .into_response()
        }
    }
}

/// PATCH /api/admin/announcements/toggle/{id}
pub async fn toggle_announcement(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Announcement>(
        r#"
        UPDATE announcements
        SET status = CASE WHEN status = 'active' THEN 'inactive' ELSE 'active' END
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(announcement)) => (
            StatusCode::OK,
            Json(AnnouncementResponse {
                success: true,
                data: announcement,
            }),
        )
            .into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "Announcement not found").into_response(),
        Err(e) => {
            tracing::error!("Database error toggling announcement: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to toggle announcement",
            )
            .into_response()
        }
    }
}

/// DELETE /api/admin/announcements/{id}
pub async fn delete_announcement(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query("DELETE FROM announcements WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            error(StatusCode::NOT_FOUND, "Announcement not found").into_response()
        }
        Ok(_) => (
            StatusCode::OK,
            Json(MessageResponse::new("Announcement deleted")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error deleting announcement: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete announcement",
            )
            .into_response()
        }
    }
}

/// PUT /api/admin/announcements/mark-all-read
pub async fn mark_all_read(headers: HeaderMap) -> impl IntoResponse {
    let user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query(
        r#"
        INSERT INTO announcement_reads (user_id, announcement_id, is_read)
        SELECT $1, id, true FROM announcements WHERE status = 'active'
        ON CONFLICT (user_id, announcement_id) DO UPDATE SET is_read = true
        "#,
    )
    .bind(user.id)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(MessageResponse::new("All notifications marked as read")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error marking announcements read: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to mark notifications as read",
            )
            .into_response()
        }
    }
}

/// GET /api/admin/announcements/stream - SSE feed of newly created
/// announcements
pub async fn stream_announcements() -> impl IntoResponse {
    let Some(rx) = notify::subscribe() else {
        return error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Announcement stream not available",
        )
        .into_response();
    };

    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(announcement) => Event::default()
            .event("announcement")
            .json_data(&announcement)
            .ok()
            .map(Ok::<_, std::convert::Infallible>),
        // Lagged receivers skip missed messages rather than erroring out.
        Err(_) => None,
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::db::models::User;
    use crate::routes::auth::create_admin_token;

    fn admin_token() -> String {
        let admin = User {
            id: Uuid::new_v4(),
            name: "Admin".to_string(),
            surname: "".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: "x".to_string(),
            is_admin: true,
            admin_role: Some("main".to_string()),
            company_id: None,
            status: "active".to_string(),
            image: None,
            reset_code: None,
            reset_code_expires_at: None,
            email_change_new_email: None,
            email_change_code: None,
            email_change_expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        create_admin_token(&admin).unwrap()
    }

    async fn create(payload: &CreateAnnouncementRequest, token: Option<String>) -> StatusCode {
        let app = Router::new().route("/api/admin/announcements", post(create_announcement));
        let mut builder = Request::post("/api/admin/announcements")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = builder
            .body(Body::from(serde_json::to_vec(payload).unwrap()))
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_create_announcement_requires_admin() {
        let status = create(
            &CreateAnnouncementRequest {
                title: "Hello".to_string(),
                content: "World".to_string(),
                audience: "all".to_string(),
                expires_at: None,
            },
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_announcement_rejects_missing_fields() {
        let status = create(
            &CreateAnnouncementRequest {
                title: "".to_string(),
                content: "World".to_string(),
                audience: "all".to_string(),
                expires_at: None,
            },
            Some(admin_token()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_announcement_rejects_unknown_audience() {
        let status = create(
            &CreateAnnouncementRequest {
                title: "Hello".to_string(),
                content: "World".to_string(),
                audience: "everyone".to_string(),
                expires_at: None,
            },
            Some(admin_token()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
