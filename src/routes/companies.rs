/**
 * Company Routes (admin)
 * Companies own courses for revenue sharing. Main admins only.
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Company;
use crate::routes::auth::require_main_admin;
use crate::routes::{db_pool, error, MessageResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyRequest {
    pub name: String,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyResponse {
    pub success: bool,
    pub message: String,
    pub company: Company,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStats {
    pub admin_count: i64,
    pub course_count: i64,
    pub total_payments: i64,
    pub total_revenue: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyStatsResponse {
    pub success: bool,
    pub company_id: Uuid,
    pub stats: CompanyStats,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/companies
pub async fn list_companies(
    headers: HeaderMap,
    Query(query): Query<CompanyListQuery>,
) -> impl IntoResponse {
    if let Err(e) = require_main_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let search_pattern = query.search.as_deref().map(|s| format!("%{}%", s));
    let is_active = query.status.as_deref().map(|s| s == "active");

    match sqlx::query_as::<_, Company>(
        r#"
        SELECT * FROM companies
        WHERE ($1::text IS NULL OR name ILIKE $1 OR description ILIKE $1)
          AND ($2::bool IS NULL OR is_active = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(&search_pattern)
    .bind(is_active)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(companies) => (StatusCode::OK, Json(companies)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing companies: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch companies").into_response()
        }
    }
}

/// POST /api/admin/companies
pub async fn create_company(
    headers: HeaderMap,
    Json(payload): Json<CreateCompanyRequest>,
) -> impl IntoResponse {
    let admin = match require_main_admin(&headers) {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Company name is required").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Company>(
        r#"
        INSERT INTO companies (name, description, contact_email, contact_phone, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(payload.description.as_deref().unwrap_or(""))
    .bind(&payload.contact_email)
    .bind(&payload.contact_phone)
    .bind(admin.id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(company) => (
            StatusCode::CREATED,
            Json(CompanyResponse {
                success: true,
                message: "Company created successfully".to_string(),
                company,
            }),
        )
            .into_response(),
        Err(e) if crate::routes::is_unique_violation(&e) => {
            error(StatusCode::CONFLICT, "Company already exists").into_response()
        }
        Err(e) => {
            tracing::error!("Database error creating company: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error creating company").into_response()
        }
    }
}

/// PUT /api/admin/companies/{id}
pub async fn update_company(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_main_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Company>(
        r#"
        UPDATE companies
        SET name = COALESCE($1, name),
            description = COALESCE($2, description),
            contact_email = COALESCE($3, contact_email),
            contact_phone = COALESCE($4, contact_phone),
            is_active = COALESCE($5, is_active),
            updated_at = now()
        WHERE id = $6
        RETURNING *
        "#,
    )
    .bind(payload.name.as_deref().map(str::trim))
    .bind(&payload.description)
    .bind(&payload.contact_email)
    .bind(&payload.contact_phone)
    .bind(payload.is_active)
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(company)) => (
            StatusCode::OK,
            Json(CompanyResponse {
                success: true,
                message: "Company updated successfully".to_string(),
                company,
            }),
        )
            .into_response(),
        Ok(None) => error(StatusCode::NOT_FOUND, "Company not found").into_response(),
        Err(e) if crate::routes::is_unique_violation(&e) => {
            error(StatusCode::CONFLICT, "Company already exists").into_response()
        }
        Err(e) => {
            tracing::error!("Database error updating company: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error updating company").into_response()
        }
    }
}

/// PUT /api/admin/companies/{id}/toggle-status
pub async fn toggle_company_status(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_main_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Company>(
        "UPDATE companies SET is_active = NOT is_active, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(company)) => {
            let message = if company.is_active {
                "Company activated successfully"
            } else {
                "Company deactivated successfully"
            };
            (
                StatusCode::OK,
                Json(CompanyResponse {
                    success: true,
                    message: message.to_string(),
                    company,
                }),
            )
                .into_response()
        }
        Ok(None) => error(StatusCode::NOT_FOUND, "Company not found").into_response(),
        Err(e) => {
            tracing::error!("Database error toggling company status: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error toggling company status")
                .into_response()
        }
    }
}

/// GET /api/admin/companies/{id}/stats
pub async fn company_stats(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_main_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM companies WHERE id = $1)")
        .bind(id)
        .fetch_one(pool.as_ref())
        .await
        .unwrap_or(false);
    if !exists {
        return error(StatusCode::NOT_FOUND, "Company not found").into_response();
    }

    let stats = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users
             WHERE company_id = $1 AND is_admin = true AND admin_role = 'company'),
            (SELECT COUNT(*) FROM courses WHERE company_id = $1),
            (SELECT COUNT(*) FROM payments WHERE company_id = $1 AND status = 'completed'),
            (SELECT COALESCE(SUM(company_share), 0) FROM payments
             WHERE company_id = $1 AND status = 'completed')
        "#,
    )
    .bind(id)
    .fetch_one(pool.as_ref())
    .await;

    match stats {
        Ok((admin_count, course_count, total_payments, total_revenue)) => (
            StatusCode::OK,
            Json(CompanyStatsResponse {
                success: true,
                company_id: id,
                stats: CompanyStats {
                    admin_count,
                    course_count,
                    total_payments,
                    total_revenue,
                },
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error computing company stats: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error getting company stats")
                .into_response()
        }
    }
}

/// DELETE /api/admin/companies/{id} - refused while courses or admins
/// still reference the company
pub async fn delete_company(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_main_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let references = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM courses WHERE company_id = $1),
            (SELECT COUNT(*) FROM users WHERE company_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(pool.as_ref())
    .await;

    match references {
        Ok((courses, admins)) if courses > 0 || admins > 0 => {
            return error(
                StatusCode::BAD_REQUEST,
                "Cannot delete company with associated courses or admins. \
                 Please reassign or remove them first.",
            )
            .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Database error checking company references: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Error deleting company")
                .into_response();
        }
    }

    match sqlx::query("DELETE FROM companies WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            error(StatusCode::NOT_FOUND, "Company not found").into_response()
        }
        Ok(_) => (
            StatusCode::OK,
            Json(MessageResponse::new("Company deleted successfully")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error deleting company: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error deleting company").into_response()
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
    use chrono::Utc;
    use tower::ServiceExt;

    use crate::db::models::User;
    use crate::routes::auth::create_admin_token;

    fn company_admin_token() -> String {
        let admin = User {
            id: Uuid::new_v4(),
            name: "Co".to_string(),
            surname: "Admin".to_string(),
            email: "co@example.com".to_string(),
            password_hash: "x".to_string(),
            is_admin: true,
            admin_role: Some("company".to_string()),
            company_id: Some(Uuid::new_v4()),
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

    #[tokio::test]
    async fn test_company_listing_is_main_admin_only() {
        let app = Router::new().route("/api/admin/companies", get(list_companies));
        let req = Request::get("/api/admin/companies")
            .header("authorization", format!("Bearer {}", company_admin_token()))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_company_listing_requires_token() {
        let app = Router::new().route("/api/admin/companies", get(list_companies));
        let req = Request::get("/api/admin/companies")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
