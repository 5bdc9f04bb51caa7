/**
 * Admin User Routes
 * Listing with search/status/plan filters, manual account creation, status
 * toggling, and deletion. Admin accounts are never returned or touched here.
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::models::User;
use crate::routes::auth::{hash_password, require_admin};
use crate::routes::{db_pool, error, MessageResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSummary {
    #[serde(skip)]
    #[allow(dead_code)]
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub course_slug: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub purchased_courses: Vec<EntitlementSummary>,
    pub status: String,
    pub join_date: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<UserRow>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

fn format_user(user: &User, entitlements: Vec<EntitlementSummary>) -> UserRow {
    UserRow {
        id: user.id,
        name: format!("{} {}", user.name, user.surname).trim().to_string(),
        email: user.email.clone(),
        purchased_courses: entitlements,
        status: user.status.clone(),
        join_date: user.created_at,
    }
}

/// Active entitlement summaries for a set of users, keyed by user id.
async fn fetch_entitlements(
    pool: &PgPool,
    user_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<EntitlementSummary>>, sqlx::Error> {
    let rows = sqlx::query_as::<_, EntitlementSummary>(
        r#"
        SELECT e.user_id, e.course_id, c.title AS course_title,
               c.slug AS course_slug, e.expires_at
        FROM course_entitlements e
        JOIN courses c ON c.id = e.course_id
        WHERE e.user_id = ANY($1) AND e.expires_at > now()
        ORDER BY e.expires_at
        "#,
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<EntitlementSummary>> = HashMap::new();
    for row in rows {
        grouped.entry(row.user_id).or_default().push(row);
    }
    Ok(grouped)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/users
pub async fn list_users(headers: HeaderMap, Query(query): Query<UserListQuery>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    if let Some(plan) = query.plan.as_deref() {
        if plan != "premium" && plan != "free" {
            return error(StatusCode::BAD_REQUEST, "Plan must be 'premium' or 'free'")
                .into_response();
        }
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let search_pattern = query.search.as_deref().map(|s| format!("%{}%", s));

    let users = match sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE is_admin = false
          AND ($1::text IS NULL OR name ILIKE $1 OR surname ILIKE $1 OR email ILIKE $1)
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL
               OR ($3 = 'premium' AND EXISTS(
                       SELECT 1 FROM course_entitlements e
                       WHERE e.user_id = users.id AND e.expires_at > now()))
               OR ($3 = 'free' AND NOT EXISTS(
                       SELECT 1 FROM course_entitlements e
                       WHERE e.user_id = users.id AND e.expires_at > now())))
        ORDER BY created_at DESC
        "#,
    )
    .bind(&search_pattern)
    .bind(&query.status)
    .bind(&query.plan)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(users) => users,
        Err(e) => {
            tracing::error!("Database error listing users: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch users")
                .into_response();
        }
    };

    let user_ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
    let mut entitlements = match fetch_entitlements(pool.as_ref(), &user_ids).await {
        Ok(map) => map,
        Err(e) => {
            tracing::error!("Database error fetching entitlements: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch users")
                .into_response();
        }
    };

    let data: Vec<UserRow> = users
        .iter()
        .map(|u| format_user(u, entitlements.remove(&u.id).unwrap_or_default()))
        .collect();

    (
        StatusCode::OK,
        Json(UserListResponse {
            success: true,
            count: data.len(),
            data,
        }),
    )
        .into_response()
}

/// POST /api/admin/users
pub async fn create_user(
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let email = payload.email.trim().to_lowercase();
    if payload.name.trim().is_empty()
        || payload.surname.trim().is_empty()
        || email.is_empty()
        || payload.password.is_empty()
    {
        return error(StatusCode::BAD_REQUEST, "All fields are required").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let password_hash = match hash_password(payload.password).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, surname, email, password_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.surname.trim())
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(user) => (StatusCode::CREATED, Json(format_user(&user, vec![]))).into_response(),
        Err(e) if crate::routes::is_unique_violation(&e) => {
            error(StatusCode::CONFLICT, "Email already exists").into_response()
        }
        Err(e) => {
            tracing::error!("Database error creating user: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to add user").into_response()
        }
    }
}

/// PUT /api/admin/users/{id}/status - flip active/suspended
pub async fn toggle_user_status(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET status = CASE WHEN status = 'active' THEN 'suspended' ELSE 'active' END,
            updated_at = now()
        WHERE id = $1 AND is_admin = false
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await;

    match updated {
        Ok(Some(user)) => {
            let entitlements = fetch_entitlements(pool.as_ref(), &[user.id])
                .await
                .unwrap_or_default()
                .remove(&user.id)
                .unwrap_or_default();
            (StatusCode::OK, Json(format_user(&user, entitlements))).into_response()
        }
        Ok(None) => error(StatusCode::NOT_FOUND, "User not found").into_response(),
        Err(e) => {
            tracing::error!("Database error toggling user status: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to toggle status").into_response()
        }
    }
}

/// DELETE /api/admin/users/{id}
pub async fn delete_user(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query("DELETE FROM users WHERE id = $1 AND is_admin = false")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            error(StatusCode::NOT_FOUND, "User not found").into_response()
        }
        Ok(_) => (StatusCode::OK, Json(MessageResponse::new("User deleted"))).into_response(),
        Err(e) => {
            tracing::error!("Database error deleting user: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete user").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_format_user_joins_name() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "x".to_string(),
            is_admin: false,
            admin_role: None,
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
        let row = format_user(&user, vec![]);
        assert_eq!(row.name, "Ada Lovelace");
        assert!(row.purchased_courses.is_empty());
    }

    #[tokio::test]
    async fn test_list_users_requires_admin_token() {
        let app = Router::new().route("/api/admin/users", get(list_users));
        let req = Request::get("/api/admin/users").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_users_rejects_unknown_plan() {
        use crate::routes::auth::create_admin_token;

        let mut admin = User {
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
        admin.is_admin = true;
        let token = create_admin_token(&admin).unwrap();

        let app = Router::new().route("/api/admin/users", get(list_users));
        let req = Request::get("/api/admin/users?plan=gold")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
