/**
 * Admin Course Routes
 * Course CRUD with slug generation and thumbnail uploads, pack-video
 * management, the delete cascade, and grant/remove course access. Granting
 * and removing access run inside a single database transaction so either
 * every effect lands or none do.
 */
use axum::{
    extract::{Multipart, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{Course, CourseVideo};
use crate::routes::auth::require_admin;
use crate::routes::{db_pool, error, slugify, HandlerError};
use crate::storage;

const MAX_THUMBNAIL_SIZE: usize = 5 * 1024 * 1024; // 5MB
const MAX_VIDEO_SIZE: usize = 200 * 1024 * 1024; // 200MB

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCourseQuery {
    #[serde(rename = "type")]
    pub course_type: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCourseListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Course>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseWithVideos {
    #[serde(flatten)]
    pub course: Course,
    pub videos: Vec<CourseVideo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseResponse {
    pub success: bool,
    pub message: String,
    pub data: CourseWithVideos,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesDeleted {
    pub thumbnail: bool,
    pub videos: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCourseData {
    pub course_title: String,
    pub users_affected: i64,
    pub files_deleted: FilesDeleted,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteCourseResponse {
    pub success: bool,
    pub message: String,
    pub data: DeleteCourseData,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackVideoRequest {
    pub title: Option<String>,
    pub url: Option<String>,
    pub duration: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoOrderEntry {
    pub video_id: Uuid,
    pub order: i32,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderVideosRequest {
    pub video_orders: Vec<VideoOrderEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAccessRequest {
    pub course_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessData {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub course_title: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessResponse {
    pub success: bool,
    pub message: String,
    pub data: GrantAccessData,
}

/// Parsed multipart form for create/update.
#[derive(Debug, Default)]
struct CourseForm {
    title: Option<String>,
    description: Option<String>,
    course_type: Option<String>,
    price: Option<i64>,
    category: Option<String>,
    instructor: Option<String>,
    level: Option<String>,
    total_duration: Option<String>,
    access_months: Option<i32>,
    company_id: Option<Uuid>,
    video_url: Option<String>,
    video_title: Option<String>,
    video_duration: Option<String>,
    thumbnail: Option<Vec<u8>>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Company percentage of a course sale; the platform keeps the remainder.
fn company_share_percent() -> i64 {
    std::env::var("REVENUE_COMPANY_SHARE_PERCENT")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|p| (0..=100).contains(p))
        .unwrap_or(70)
}

pub(crate) fn revenue_split(amount: i64) -> (i64, i64) {
    let company = amount * company_share_percent() / 100;
    (company, amount - company)
}

fn internal(e: sqlx::Error) -> HandlerError {
    tracing::error!("Database error: {}", e);
    error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
}

async fn parse_course_form(multipart: &mut Multipart) -> Result<CourseForm, HandlerError> {
    let mut form = CourseForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Multipart error: {}", e);
                return Err(error(StatusCode::BAD_REQUEST, "Invalid multipart data"));
            }
        };

        match field.name().unwrap_or("") {
            "title" => form.title = field.text().await.ok(),
            "description" => form.description = field.text().await.ok(),
            "type" => form.course_type = field.text().await.ok(),
            "price" => {
                form.price = field.text().await.ok().and_then(|s| s.trim().parse().ok());
            }
            "category" => form.category = field.text().await.ok(),
            "instructor" => form.instructor = field.text().await.ok(),
            "level" => form.level = field.text().await.ok(),
            "totalDuration" => form.total_duration = field.text().await.ok(),
            "accessMonths" => {
                form.access_months = field.text().await.ok().and_then(|s| s.trim().parse().ok());
            }
            "companyId" => {
                form.company_id = field
                    .text()
                    .await
                    .ok()
                    .and_then(|s| Uuid::parse_str(s.trim()).ok());
            }
            "videoUrl" => form.video_url = field.text().await.ok(),
            "videoTitle" => form.video_title = field.text().await.ok(),
            "videoDuration" => form.video_duration = field.text().await.ok(),
            "thumbnail" => {
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::error!("Failed to read thumbnail bytes: {}", e);
                    error(StatusCode::BAD_REQUEST, "Failed to read file data")
                })?;
                if !bytes.is_empty() {
                    form.thumbnail = Some(bytes.to_vec());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn save_thumbnail(bytes: &[u8]) -> Result<String, HandlerError> {
    if bytes.len() > MAX_THUMBNAIL_SIZE {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "File too large. Maximum size is 5MB.",
        ));
    }
    let mime = crate::routes::validate_image_magic_bytes(bytes).ok_or_else(|| {
        error(
            StatusCode::BAD_REQUEST,
            "File content does not match an allowed image type.",
        )
    })?;
    let filename = format!(
        "{}.{}",
        Uuid::new_v4(),
        crate::routes::extension_from_mime(mime)
    );
    storage::save_local("thumbnails", &filename, bytes)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save thumbnail: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file")
        })
}

async fn fetch_course(pool: &sqlx::PgPool, id: Uuid) -> Result<Course, HandlerError> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(internal)?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Course not found"))
}

async fn fetch_course_videos(
    pool: &sqlx::PgPool,
    course_id: Uuid,
) -> Result<Vec<CourseVideo>, HandlerError> {
    sqlx::query_as::<_, CourseVideo>(
        "SELECT * FROM course_videos WHERE course_id = $1 ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .map_err(internal)
}

/// Compact positions to 0..n in the current order.
async fn resequence_videos<'e, E>(executor: E, course_id: Uuid) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        WITH ranked AS (
            SELECT id, ROW_NUMBER() OVER (ORDER BY position, id) - 1 AS new_pos
            FROM course_videos WHERE course_id = $1
        )
        UPDATE course_videos cv
        SET position = r.new_pos
        FROM ranked r
        WHERE cv.id = r.id
        "#,
    )
    .bind(course_id)
    .execute(executor)
    .await?;
    Ok(())
}

// ============================================================================
// Handlers — course CRUD
// ============================================================================

/// GET /api/admin/courses
pub async fn list_courses(
    headers: HeaderMap,
    Query(query): Query<AdminCourseQuery>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let search_pattern = query.search.as_deref().map(|s| format!("%{}%", s));

    match sqlx::query_as::<_, Course>(
        r#"
        SELECT * FROM courses
        WHERE ($1::text IS NULL OR course_type = $1)
          AND ($2::text IS NULL OR title ILIKE $2 OR description ILIKE $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(&query.course_type)
    .bind(&search_pattern)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(data) => (
            StatusCode::OK,
            Json(AdminCourseListResponse {
                success: true,
                count: data.len(),
                data,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing courses: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch courses").into_response()
        }
    }
}

/// GET /api/admin/courses/{id}
pub async fn get_course(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_course(pool.as_ref(), id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    let videos = match fetch_course_videos(pool.as_ref(), id).await {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    (
        StatusCode::OK,
        Json(CourseResponse {
            success: true,
            message: "Course fetched successfully".to_string(),
            data: CourseWithVideos { course, videos },
        }),
    )
        .into_response()
}

/// POST /api/admin/courses - multipart; slug generated from the title
pub async fn create_course(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let form = match parse_course_form(&mut multipart).await {
        Ok(f) => f,
        Err(e) => return e.into_response(),
    };

    let Some(title) = form.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return error(StatusCode::BAD_REQUEST, "Title is required").into_response();
    };
    let Some(description) = form
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    else {
        return error(StatusCode::BAD_REQUEST, "Description is required").into_response();
    };
    let course_type = form.course_type.as_deref().unwrap_or("single");
    if course_type != "single" && course_type != "pack" {
        return error(StatusCode::BAD_REQUEST, "Type must be 'single' or 'pack'").into_response();
    }

    let slug = slugify(title);
    if slug.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Title must contain letters or digits")
            .into_response();
    }

    let thumbnail = match form.thumbnail.as_deref() {
        Some(bytes) => match save_thumbnail(bytes).await {
            Ok(url) => url,
            Err(e) => return e.into_response(),
        },
        None => String::new(),
    };

    let course = match sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses
            (title, slug, description, course_type, thumbnail, price, category,
             instructor, level, total_duration, access_months, company_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(title)
    .bind(&slug)
    .bind(description)
    .bind(course_type)
    .bind(&thumbnail)
    .bind(form.price.unwrap_or(0))
    .bind(&form.category)
    .bind(&form.instructor)
    .bind(form.level.as_deref().unwrap_or("beginner"))
    .bind(form.total_duration.as_deref().unwrap_or("0 hours"))
    .bind(form.access_months.unwrap_or(12))
    .bind(form.company_id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(course) => course,
        Err(e) if crate::routes::is_unique_violation(&e) => {
            return error(StatusCode::CONFLICT, "Course with this title already exists")
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error creating course: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create course")
                .into_response();
        }
    };

    // Single-video courses carry their one video inline in the form.
    if course.course_type == "single" {
        if let Some(url) = form.video_url.as_deref().filter(|u| !u.is_empty()) {
            let result = sqlx::query(
                r#"
                INSERT INTO course_videos (course_id, title, url, duration, position)
                VALUES ($1, $2, $3, $4, 0)
                "#,
            )
            .bind(course.id)
            .bind(form.video_title.as_deref().unwrap_or(&course.title))
            .bind(url)
            .bind(form.video_duration.as_deref().unwrap_or("0:00"))
            .execute(pool.as_ref())
            .await;
            if let Err(e) = result {
                tracing::error!("Failed to insert course video: {}", e);
            }
        }
    }

    let videos = fetch_course_videos(pool.as_ref(), course.id)
        .await
        .unwrap_or_default();

    (
        StatusCode::CREATED,
        Json(CourseResponse {
            success: true,
            message: "Course created successfully".to_string(),
            data: CourseWithVideos { course, videos },
        }),
    )
        .into_response()
}

/// PUT /api/admin/courses/{id} - multipart; re-slugs on title change
pub async fn update_course(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let existing = match fetch_course(pool.as_ref(), id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let form = match parse_course_form(&mut multipart).await {
        Ok(f) => f,
        Err(e) => return e.into_response(),
    };

    if let Some(t) = form.course_type.as_deref() {
        if t != "single" && t != "pack" {
            return error(StatusCode::BAD_REQUEST, "Type must be 'single' or 'pack'")
                .into_response();
        }
    }

    let title = form
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(&existing.title)
        .to_string();

    let slug = if title != existing.title {
        let new_slug = slugify(&title);
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM courses WHERE slug = $1 AND id <> $2)",
        )
        .bind(&new_slug)
        .bind(id)
        .fetch_one(pool.as_ref())
        .await
        .unwrap_or(false);
        if taken {
            return error(StatusCode::CONFLICT, "Course with this title already exists")
                .into_response();
        }
        new_slug
    } else {
        existing.slug.clone()
    };

    let thumbnail = match form.thumbnail.as_deref() {
        Some(bytes) => {
            let url = match save_thumbnail(bytes).await {
                Ok(url) => url,
                Err(e) => return e.into_response(),
            };
            if existing.thumbnail.starts_with("/uploads/") {
                storage::delete_local(&existing.thumbnail).await;
            }
            url
        }
        None => existing.thumbnail.clone(),
    };

    let course = match sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses
        SET title = $1, slug = $2,
            description = COALESCE($3, description),
            course_type = COALESCE($4, course_type),
            thumbnail = $5,
            price = COALESCE($6, price),
            category = COALESCE($7, category),
            instructor = COALESCE($8, instructor),
            level = COALESCE($9, level),
            total_duration = COALESCE($10, total_duration),
            access_months = COALESCE($11, access_months),
            company_id = COALESCE($12, company_id),
            updated_at = now()
        WHERE id = $13
        RETURNING *
        "#,
    )
    .bind(&title)
    .bind(&slug)
    .bind(&form.description)
    .bind(&form.course_type)
    .bind(&thumbnail)
    .bind(form.price)
    .bind(&form.category)
    .bind(&form.instructor)
    .bind(&form.level)
    .bind(&form.total_duration)
    .bind(form.access_months)
    .bind(form.company_id)
    .bind(id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(course) => course,
        Err(e) => {
            tracing::error!("Database error updating course: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update course")
                .into_response();
        }
    };

    let videos = fetch_course_videos(pool.as_ref(), course.id)
        .await
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(CourseResponse {
            success: true,
            message: "Course updated successfully".to_string(),
            data: CourseWithVideos { course, videos },
        }),
    )
        .into_response()
}

/// DELETE /api/admin/courses/{id} - cascades to every user's entitlement
/// and progress; reports how many users held the course and which files
/// were removed
pub async fn delete_course(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_course(pool.as_ref(), id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let users_affected: i64 = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(DISTINCT user_id) FROM course_entitlements WHERE course_id = $1",
    )
    .bind(id)
    .fetch_one(pool.as_ref())
    .await
    .unwrap_or(0);

    let video_urls: Vec<String> =
        sqlx::query_scalar::<_, String>("SELECT url FROM course_videos WHERE course_id = $1")
            .bind(id)
            .fetch_all(pool.as_ref())
            .await
            .unwrap_or_default();

    // Entitlements, progress, and video rows go with the course via FK
    // cascade; counting and file cleanup happen first.
    match sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(_) => {}
        Err(e) => {
            tracing::error!("Database error deleting course: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete course")
                .into_response();
        }
    }

    let thumbnail_deleted = if course.thumbnail.starts_with("/uploads/") {
        storage::delete_local(&course.thumbnail).await
    } else {
        false
    };

    let mut videos_deleted = 0usize;
    for url in &video_urls {
        if url.starts_with("/uploads/videos/") && storage::delete_local(url).await {
            videos_deleted += 1;
        }
    }

    tracing::info!(
        course = %course.title,
        users_affected,
        "course deleted"
    );

    (
        StatusCode::OK,
        Json(DeleteCourseResponse {
            success: true,
            message: "Course deleted successfully".to_string(),
            data: DeleteCourseData {
                course_title: course.title,
                users_affected,
                files_deleted: FilesDeleted {
                    thumbnail: thumbnail_deleted,
                    videos: videos_deleted,
                },
            },
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers — pack videos
// ============================================================================

/// POST /api/admin/courses/{id}/videos - add a video to a pack, either as a
/// URL or an uploaded file
pub async fn add_pack_video(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_course(pool.as_ref(), id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };
    if course.course_type != "pack" {
        return error(StatusCode::BAD_REQUEST, "Can only add videos to pack courses")
            .into_response();
    }

    let mut title: Option<String> = None;
    let mut url: Option<String> = None;
    let mut duration: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

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
            "title" => title = field.text().await.ok(),
            "url" => url = field.text().await.ok(),
            "duration" => duration = field.text().await.ok(),
            "video" => {
                let original_name = field.file_name().unwrap_or("video.bin").to_string();
                match field.bytes().await {
                    Ok(b) if !b.is_empty() => file = Some((original_name, b.to_vec())),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Failed to read video bytes: {}", e);
                        return error(StatusCode::BAD_REQUEST, "Failed to read file data")
                            .into_response();
                    }
                }
            }
            _ => {}
        }
    }

    let video_url = if let Some((original_name, bytes)) = file {
        if bytes.len() > MAX_VIDEO_SIZE {
            return error(StatusCode::BAD_REQUEST, "File too large. Maximum size is 200MB.")
                .into_response();
        }
        let ext = original_name
            .rsplit('.')
            .next()
            .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("mp4")
            .to_lowercase();
        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        match storage::save_local("videos", &filename, &bytes).await {
            Ok(path) => path,
            Err(e) => {
                tracing::error!("Failed to save video file: {}", e);
                return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file")
                    .into_response();
            }
        }
    } else {
        match url.filter(|u| !u.trim().is_empty()) {
            Some(u) => u,
            None => {
                return error(StatusCode::BAD_REQUEST, "Video URL or file is required")
                    .into_response();
            }
        }
    };

    let position: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM course_videos WHERE course_id = $1")
            .bind(id)
            .fetch_one(pool.as_ref())
            .await
            .unwrap_or(0);

    let default_title = format!("Video {}", position + 1);
    match sqlx::query(
        r#"
        INSERT INTO course_videos (course_id, title, url, duration, position)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(
        title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&default_title),
    )
    .bind(&video_url)
    .bind(duration.as_deref().unwrap_or("0:00"))
    .bind(position as i32)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => {
            let videos = fetch_course_videos(pool.as_ref(), id)
                .await
                .unwrap_or_default();
            (
                StatusCode::CREATED,
                Json(CourseResponse {
                    success: true,
                    message: "Video added successfully".to_string(),
                    data: CourseWithVideos { course, videos },
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Database error adding video: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to add video").into_response()
        }
    }
}

/// PUT /api/admin/courses/{id}/videos/{video_id}
pub async fn update_pack_video(
    headers: HeaderMap,
    Path((id, video_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdatePackVideoRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_course(pool.as_ref(), id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    match sqlx::query(
        r#"
        UPDATE course_videos
        SET title = COALESCE($1, title),
            url = COALESCE($2, url),
            duration = COALESCE($3, duration),
            position = COALESCE($4, position)
        WHERE id = $5 AND course_id = $6
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.url)
    .bind(&payload.duration)
    .bind(payload.order)
    .bind(video_id)
    .bind(id)
    .execute(pool.as_ref())
    .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            error(StatusCode::NOT_FOUND, "Video not found").into_response()
        }
        Ok(_) => {
            let videos = fetch_course_videos(pool.as_ref(), id)
                .await
                .unwrap_or_default();
            (
                StatusCode::OK,
                Json(CourseResponse {
                    success: true,
                    message: "Video updated successfully".to_string(),
                    data: CourseWithVideos { course, videos },
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Database error updating video: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update video").into_response()
        }
    }
}

/// DELETE /api/admin/courses/{id}/videos/{video_id} - removes the video and
/// compacts the remaining order
pub async fn delete_pack_video(
    headers: HeaderMap,
    Path((id, video_id)): Path<(Uuid, Uuid)>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_course(pool.as_ref(), id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let url = match sqlx::query_scalar::<_, String>(
        "SELECT url FROM course_videos WHERE id = $1 AND course_id = $2",
    )
    .bind(video_id)
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(url)) => url,
        Ok(None) => return error(StatusCode::NOT_FOUND, "Video not found").into_response(),
        Err(e) => {
            tracing::error!("Database error fetching video: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    if let Err(e) = sqlx::query("DELETE FROM course_videos WHERE id = $1")
        .bind(video_id)
        .execute(pool.as_ref())
        .await
    {
        tracing::error!("Database error deleting video: {}", e);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete video")
            .into_response();
    }

    if url.starts_with("/uploads/videos/") {
        storage::delete_local(&url).await;
    }

    if let Err(e) = resequence_videos(pool.as_ref(), id).await {
        tracing::error!("Failed to resequence videos: {}", e);
    }

    let videos = fetch_course_videos(pool.as_ref(), id)
        .await
        .unwrap_or_default();
    (
        StatusCode::OK,
        Json(CourseResponse {
            success: true,
            message: "Video deleted successfully".to_string(),
            data: CourseWithVideos { course, videos },
        }),
    )
        .into_response()
}

/// PUT /api/admin/courses/{id}/videos-order - bulk position update
pub async fn reorder_pack_videos(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReorderVideosRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_course(pool.as_ref(), id).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start transaction: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    for entry in &payload.video_orders {
        if let Err(e) =
            sqlx::query("UPDATE course_videos SET position = $1 WHERE id = $2 AND course_id = $3")
                .bind(entry.order)
                .bind(entry.video_id)
                .bind(id)
                .execute(&mut *tx)
                .await
        {
            tracing::error!("Database error reordering videos: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to reorder videos")
                .into_response();
        }
    }

    if let Err(e) = resequence_videos(&mut *tx, id).await {
        tracing::error!("Failed to resequence videos: {}", e);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to reorder videos")
            .into_response();
    }

    if let Err(e) = tx.commit().await {
        tracing::error!("Failed to commit reorder: {}", e);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to reorder videos")
            .into_response();
    }

    let videos = fetch_course_videos(pool.as_ref(), id)
        .await
        .unwrap_or_default();
    (
        StatusCode::OK,
        Json(CourseResponse {
            success: true,
            message: "Videos reordered successfully".to_string(),
            data: CourseWithVideos { course, videos },
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers — course access
// ============================================================================

/// The four grant effects in one transaction: entitlement, zeroed progress,
/// enrollment increment, completed payment.
async fn grant_course_tx(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<GrantAccessData, HandlerError> {
    let mut tx = pool.begin().await.map_err(internal)?;

    let user = sqlx::query_as::<_, (String, String, String)>(
        "SELECT name, surname, email FROM users WHERE id = $1 AND is_admin = false",
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(internal)?
    .ok_or_else(|| error(StatusCode::NOT_FOUND, "User not found"))?;

    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Course not found"))?;

    // Re-granting is only a conflict while the entitlement is still live;
    // an expired row is purged and replaced.
    let existing = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT expires_at FROM course_entitlements WHERE user_id = $1 AND course_id = $2 FOR UPDATE",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(internal)?;

    if let Some(expires_at) = existing {
        if expires_at > Utc::now() {
            return Err(error(
                StatusCode::CONFLICT,
                "User already has access to this course",
            ));
        }
        sqlx::query("DELETE FROM course_entitlements WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;
    }

    let now = Utc::now();
    let access_months = course.access_months.max(1) as u32;
    let expires_at = now
        .checked_add_months(Months::new(access_months))
        .ok_or_else(|| error(StatusCode::INTERNAL_SERVER_ERROR, "Invalid access duration"))?;

    sqlx::query(
        r#"
        INSERT INTO course_entitlements (user_id, course_id, assigned_at, access_months, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(now)
    .bind(course.access_months)
    .bind(expires_at)
    .execute(&mut *tx)
    .await
    .map_err(internal)?;

    sqlx::query(
        r#"
        INSERT INTO course_progress (user_id, course_id, completed_videos, progress_percentage, last_accessed)
        VALUES ($1, $2, '{}', 0, now())
        ON CONFLICT (user_id, course_id) DO UPDATE
        SET completed_videos = '{}', progress_percentage = 0,
            last_watched_video = NULL, last_accessed = now()
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .execute(&mut *tx)
    .await
    .map_err(internal)?;

    sqlx::query("UPDATE courses SET students_enrolled = students_enrolled + 1, updated_at = now() WHERE id = $1")
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

    let (name, surname, email) = user;
    let payer_name = format!("{} {}", name, surname).trim().to_string();
    let (company_share, platform_share) = match course.company_id {
        Some(_) => {
            let (c, p) = revenue_split(course.price);
            (Some(c), Some(p))
        }
        None => (None, None),
    };

    sqlx::query(
        r#"
        INSERT INTO payments
            (user_id, user_name, user_email, course_slug, course_title, amount,
             company_id, company_share, platform_share, method, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'Admin Grant', 'completed')
        "#,
    )
    .bind(user_id)
    .bind(&payer_name)
    .bind(&email)
    .bind(&course.slug)
    .bind(&course.title)
    .bind(course.price)
    .bind(course.company_id)
    .bind(company_share)
    .bind(platform_share)
    .execute(&mut *tx)
    .await
    .map_err(internal)?;

    tx.commit().await.map_err(internal)?;

    Ok(GrantAccessData {
        user_id,
        course_id,
        course_title: course.title,
        expires_at,
    })
}

/// POST /api/admin/users/{id}/grant-course
pub async fn grant_course_access(
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<CourseAccessRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match grant_course_tx(pool.as_ref(), user_id, payload.course_id).await {
        Ok(data) => {
            tracing::info!(
                user_id = %data.user_id,
                course = %data.course_title,
                expires_at = %data.expires_at,
                "course access granted"
            );
            (
                StatusCode::OK,
                Json(GrantAccessResponse {
                    success: true,
                    message: "Course assigned to user successfully".to_string(),
                    data,
                }),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Entitlement, progress, and the enrollment decrement reversed together.
async fn remove_course_tx(
    pool: &sqlx::PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<(), HandlerError> {
    let mut tx = pool.begin().await.map_err(internal)?;

    let removed =
        sqlx::query("DELETE FROM course_entitlements WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

    if removed.rows_affected() == 0 {
        return Err(error(
            StatusCode::NOT_FOUND,
            "User does not have access to this course",
        ));
    }

    sqlx::query("DELETE FROM course_progress WHERE user_id = $1 AND course_id = $2")
        .bind(user_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

    // Counter floors at zero.
    sqlx::query(
        "UPDATE courses SET students_enrolled = GREATEST(students_enrolled - 1, 0), updated_at = now() WHERE id = $1",
    )
    .bind(course_id)
    .execute(&mut *tx)
    .await
    .map_err(internal)?;

    tx.commit().await.map_err(internal)?;
    Ok(())
}

/// POST /api/admin/users/{id}/remove-course
pub async fn remove_course_access(
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<CourseAccessRequest>,
) -> impl IntoResponse {
    if let Err(e) = require_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match remove_course_tx(pool.as_ref(), user_id, payload.course_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(crate::routes::MessageResponse::new("Course access removed")),
        )
            .into_response(),
        Err(e) => e.into_response(),
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

    #[test]
    fn test_revenue_split_default_seventy_thirty() {
        // REVENUE_COMPANY_SHARE_PERCENT is unset in the test environment
        if std::env::var("REVENUE_COMPANY_SHARE_PERCENT").is_err() {
            assert_eq!(revenue_split(1000), (700, 300));
            assert_eq!(revenue_split(0), (0, 0));
            let (company, platform) = revenue_split(999);
            assert_eq!(company + platform, 999);
        }
    }

    #[tokio::test]
    async fn test_admin_course_list_requires_admin_token() {
        let app = Router::new().route("/api/admin/courses", get(list_courses));
        let req = Request::get("/api/admin/courses")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_course_requires_admin_token() {
        let app = Router::new().route("/api/admin/courses/{id}", delete(delete_course));
        let req = Request::delete(format!("/api/admin/courses/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
