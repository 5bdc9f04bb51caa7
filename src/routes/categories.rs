/**
 * Video Category Routes (admin)
 * Category CRUD; category images live in the CDN zone.
 */
use axum::{
    extract::{Multipart, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Category;
use crate::routes::auth::require_admin;
use crate::routes::{db_pool, error, MessageResponse};
use crate::storage;

const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024; // 5MB

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    pub success: bool,
    pub category: Category,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListResponse {
    pub success: bool,
    pub categories: Vec<Category>,
}

/// POST /api/admin/video-categories - multipart title/description/price/image
pub async fn create_category(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let mut title = String::new();
    let mut description = String::new();
    let mut price: Option<i64> = None;
    let mut image: Option<(String, Vec<u8>)> = None;

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
            "title" => title = field.text().await.unwrap_or_default(),
            "description" => description = field.text().await.unwrap_or_default(),
            "price" => {
                price = field.text().await.ok().and_then(|s| s.trim().parse().ok());
            }
            "image" => {
                let original_name = field.file_name().unwrap_or("image.bin").to_string();
                match field.bytes().await {
                    Ok(b) => image = Some((original_name, b.to_vec())),
                    Err(e) => {
                        tracing::error!("Failed to read image bytes: {}", e);
                        return error(StatusCode::BAD_REQUEST, "Failed to read file data")
                            .into_response();
                    }
                }
            }
            _ => {}
        }
    }

    let title = title.trim().to_string();
    let (Some(price), Some((image_name, image_bytes))) = (price, image) else {
        return error(StatusCode::BAD_REQUEST, "All fields are required").into_response();
    };
    if title.is_empty() || description.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "All fields are required").into_response();
    }
    if image_bytes.len() > MAX_IMAGE_SIZE {
        return error(StatusCode::BAD_REQUEST, "File too large. Maximum size is 5MB.")
            .into_response();
    }
    if crate::routes::validate_image_magic_bytes(&image_bytes).is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            "File content does not match an allowed image type.",
        )
        .into_response();
    }

    let image_path = format!(
        "categories/{}-{}",
        Uuid::new_v4(),
        image_name.replace('/', "_")
    );
    let image_url = match storage::upload_to_cdn(&image_path, image_bytes).await {
        Ok(url) => url,
        Err(e) => {
            tracing::error!("CDN category image upload failed: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create category")
                .into_response();
        }
    };

    match sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (title, slug, description, price, thumbnail_url)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&title)
    .bind(crate::routes::slugify(&title))
    .bind(description.trim())
    .bind(price)
    .bind(&image_url)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(category) => (
            StatusCode::CREATED,
            Json(CategoryResponse {
                success: true,
                category,
            }),
        )
            .into_response(),
        Err(e) if crate::routes::is_unique_violation(&e) => {
            error(StatusCode::CONFLICT, "Category already exists").into_response()
        }
        Err(e) => {
            tracing::error!("Database error creating category: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create category").into_response()
        }
    }
}

/// GET /api/admin/video-categories
pub async fn list_categories(headers: HeaderMap) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY created_at DESC")
        .fetch_all(pool.as_ref())
        .await
    {
        Ok(categories) => (
            StatusCode::OK,
            Json(CategoryListResponse {
                success: true,
                categories,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing categories: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch categories").into_response()
        }
    }
}

/// DELETE /api/admin/video-categories/{id}
pub async fn delete_category(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            error(StatusCode::NOT_FOUND, "Category not found").into_response()
        }
        Ok(_) => (
            StatusCode::OK,
            Json(MessageResponse::new("Category deleted successfully")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error deleting category: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete category").into_response()
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

    #[tokio::test]
    async fn test_list_categories_requires_admin_token() {
        let app = Router::new().route("/api/admin/video-categories", get(list_categories));
        let req = Request::get("/api/admin/video-categories")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
