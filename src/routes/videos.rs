/**
 * Catalog Video Routes
 * Public video listing with preview gating for non-entitled viewers, and
 * the admin upload path that stores streaming assets in the CDN zone.
 */
use axum::{
    extract::{Multipart, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{Category, Video};
use crate::routes::auth::require_admin;
use crate::routes::{db_pool, error};
use crate::storage;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListQuery {
    pub category: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryVideosQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoListResponse {
    pub success: bool,
    pub videos: Vec<Video>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUploadResponse {
    pub success: bool,
    pub video: Video,
}

/// True when the email belongs to a user holding an active entitlement to a
/// course whose slug matches the category slug. Anonymous viewers and
/// unknown emails get previews only.
async fn has_category_access(
    pool: &PgPool,
    email: Option<&str>,
    category_slug: &str,
) -> Result<bool, sqlx::Error> {
    let Some(email) = email.filter(|e| !e.is_empty()) else {
        return Ok(false);
    };

    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1
            FROM users u
            JOIN course_entitlements e ON e.user_id = u.id AND e.expires_at > now()
            JOIN courses c ON c.id = e.course_id
            WHERE LOWER(u.email) = LOWER($1) AND c.slug = $2
        )
        "#,
    )
    .bind(email)
    .bind(category_slug)
    .fetch_one(pool)
    .await
}

async fn fetch_videos(
    pool: &PgPool,
    category_id: Option<Uuid>,
    previews_only: bool,
) -> Result<Vec<Video>, sqlx::Error> {
    sqlx::query_as::<_, Video>(
        r#"
        SELECT * FROM videos
        WHERE ($1::uuid IS NULL OR category_id = $1)
          AND ($2::bool = false OR is_preview = true)
        ORDER BY created_at DESC
        "#,
    )
    .bind(category_id)
    .bind(previews_only)
    .fetch_all(pool)
    .await
}

/// GET /api/videos - public listing; entitled viewers see the full category
pub async fn list_videos(Query(query): Query<VideoListQuery>) -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let (category_id, has_access) = match query.category.as_deref() {
        Some(slug) => {
            let category =
                match sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1")
                    .bind(slug)
                    .fetch_optional(pool.as_ref())
                    .await
                {
                    Ok(Some(c)) => c,
                    Ok(None) => {
                        return error(StatusCode::NOT_FOUND, "Category not found").into_response();
                    }
                    Err(e) => {
                        tracing::error!("Database error fetching category: {}", e);
                        return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
                            .into_response();
                    }
                };

            let access = has_category_access(pool.as_ref(), query.email.as_deref(), slug)
                .await
                .unwrap_or(false);
            (Some(category.id), access)
        }
        None => (None, false),
    };

    match fetch_videos(pool.as_ref(), category_id, !has_access).await {
        Ok(videos) => (
            StatusCode::OK,
            Json(VideoListResponse {
                success: true,
                videos,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing videos: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching videos").into_response()
        }
    }
}

/// GET /api/videos/category/{slug}
pub async fn list_videos_by_category(
    Path(slug): Path<String>,
    Query(query): Query<CategoryVideosQuery>,
) -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let category = match sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1")
        .bind(&slug)
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => return error(StatusCode::NOT_FOUND, "Category not found").into_response(),
        Err(e) => {
            tracing::error!("Database error fetching category: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let has_access = has_category_access(pool.as_ref(), query.email.as_deref(), &category.slug)
        .await
        .unwrap_or(false);

    match fetch_videos(pool.as_ref(), Some(category.id), !has_access).await {
        Ok(videos) => (
            StatusCode::OK,
            Json(VideoListResponse {
                success: true,
                videos,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing category videos: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching videos").into_response()
        }
    }
}

/// POST /api/admin/videos/upload - multipart video (+ optional new-category
/// image) pushed to the CDN storage zone
pub async fn upload_video(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let mut title = String::new();
    let mut description = String::new();
    let mut access = "free".to_string();
    let mut duration = String::new();
    let mut instructor = "Unknown".to_string();
    let mut thumbnail = String::new();
    let mut price: i64 = 0;
    let mut is_preview = false;
    let mut category_name = String::new();
    let mut video_file: Option<(String, Vec<u8>)> = None;
    let mut category_image: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                return error(StatusCode::BAD_REQUEST, "Invalid multipart data").into_response();
            }
        };

        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "video" | "categoryImage" => {
                let original_name = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes = match field.bytes().await {
                    Ok(b) => b.to_vec(),
                    Err(e) => {
                        tracing::error!("Failed to read upload bytes: {}", e);
                        return error(StatusCode::BAD_REQUEST, "Failed to read file data")
                            .into_response();
                    }
                };
                if field_name == "video" {
                    video_file = Some((original_name, bytes));
                } else {
                    category_image = Some((original_name, bytes));
                }
            }
            "title" => title = field.text().await.unwrap_or_default(),
            "description" => description = field.text().await.unwrap_or_default(),
            "access" => access = field.text().await.unwrap_or_default(),
            "duration" => duration = field.text().await.unwrap_or_default(),
            "instructor" => instructor = field.text().await.unwrap_or_default(),
            "thumbnail" => thumbnail = field.text().await.unwrap_or_default(),
            "price" => {
                price = field
                    .text()
                    .await
                    .ok()
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0)
            }
            "isPreview" => {
                is_preview = field.text().await.map(|s| s == "true").unwrap_or(false)
            }
            "categoryName" => category_name = field.text().await.unwrap_or_default(),
            _ => {}
        }
    }

    let Some((video_name, video_bytes)) = video_file else {
        return error(StatusCode::BAD_REQUEST, "No video uploaded").into_response();
    };
    if title.trim().is_empty() || category_name.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "Title and category name are required")
            .into_response();
    }
    if access != "free" && access != "premium" {
        return error(StatusCode::BAD_REQUEST, "Access must be 'free' or 'premium'")
            .into_response();
    }

    // 1. Push the video to the CDN storage zone.
    let video_path = format!("videos/{}-{}", Uuid::new_v4(), video_name.replace('/', "_"));
    let video_url = match storage::upload_to_cdn(&video_path, video_bytes).await {
        Ok(url) => url,
        Err(e) => {
            tracing::error!("CDN video upload failed: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Video upload failed")
                .into_response();
        }
    };

    // 2. Resolve the category, creating it (with its image) when new.
    let category = match sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE title = $1")
        .bind(category_name.trim())
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => {
            let Some((image_name, image_bytes)) = category_image else {
                return error(
                    StatusCode::BAD_REQUEST,
                    "Category image required for new category",
                )
                .into_response();
            };

            let image_path = format!(
                "categories/{}-{}",
                Uuid::new_v4(),
                image_name.replace('/', "_")
            );
            let image_url = match storage::upload_to_cdn(&image_path, image_bytes).await {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!("CDN category image upload failed: {}", e);
                    return error(StatusCode::INTERNAL_SERVER_ERROR, "Video upload failed")
                        .into_response();
                }
            };

            match sqlx::query_as::<_, Category>(
                r#"
                INSERT INTO categories (title, slug, thumbnail_url)
                VALUES ($1, $2, $3)
                RETURNING *
                "#,
            )
            .bind(category_name.trim())
            .bind(crate::routes::slugify(category_name.trim()))
            .bind(&image_url)
            .fetch_one(pool.as_ref())
            .await
            {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to create category: {}", e);
                    return error(StatusCode::INTERNAL_SERVER_ERROR, "Video upload failed")
                        .into_response();
                }
            }
        }
        Err(e) => {
            tracing::error!("Database error fetching category: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    // 3. Persist the video row.
    match sqlx::query_as::<_, Video>(
        r#"
        INSERT INTO videos
            (title, description, instructor, thumbnail, duration, price,
             category_id, access, video_url, is_preview)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(title.trim())
    .bind(description.trim())
    .bind(instructor.trim())
    .bind(thumbnail.trim())
    .bind(duration.trim())
    .bind(price)
    .bind(category.id)
    .bind(&access)
    .bind(&video_url)
    .bind(is_preview)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(video) => (
            StatusCode::CREATED,
            Json(VideoUploadResponse {
                success: true,
                video,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error saving video: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Video upload failed").into_response()
        }
    }
}

/// GET /api/admin/videos
pub async fn admin_list_videos(headers: HeaderMap) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_as::<_, Video>("SELECT * FROM videos ORDER BY created_at DESC")
        .fetch_all(pool.as_ref())
        .await
    {
        Ok(videos) => (
            StatusCode::OK,
            Json(VideoListResponse {
                success: true,
                videos,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing videos: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Fetching videos failed").into_response()
        }
    }
}

/// DELETE /api/admin/videos/{id}
pub async fn delete_video(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query("DELETE FROM videos WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            error(StatusCode::NOT_FOUND, "Video not found").into_response()
        }
        Ok(_) => (
            StatusCode::OK,
            Json(crate::routes::MessageResponse::new("Deleted successfully")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error deleting video: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Delete failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{delete, get};
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_admin_video_list_requires_admin_token() {
        let app = Router::new().route("/api/admin/videos", get(admin_list_videos));
        let req = Request::get("/api/admin/videos").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_video_requires_admin_token() {
        let app = Router::new().route("/api/admin/videos/{id}", delete(delete_video));
        let req = Request::delete(format!("/api/admin/videos/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
