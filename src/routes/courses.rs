/**
 * Course Routes (site)
 * Public catalog plus the authenticated my-courses, course detail, and
 * progress endpoints. Video URLs are only exposed to entitled users.
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
use uuid::Uuid;

use regex::Regex;

use crate::db::models::{CourseProgress, CourseVideo};
use crate::routes::auth::require_user;
use crate::routes::{db_pool, error, HandlerError};

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogQuery {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub course_type: Option<String>,
    pub search: Option<String>,
}

/// Catalog row. Deliberately carries no video URLs.
#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "course_type")]
    pub course_type: String,
    pub thumbnail: String,
    pub price: i64,
    pub category: Option<String>,
    pub instructor: Option<String>,
    pub level: String,
    pub total_duration: String,
    pub students_enrolled: i32,
    pub video_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseListResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<CourseSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryListResponse {
    pub success: bool,
    pub data: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MyCourseRow {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "course_type")]
    pub course_type: String,
    pub thumbnail: String,
    pub description: String,
    pub category: Option<String>,
    #[serde(rename = "duration")]
    #[sqlx(rename = "total_duration")]
    pub total_duration: String,
    pub video_count: i64,
    pub progress: i32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyCoursesResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<MyCourseRow>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseVideoDetail {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub duration: String,
    pub order: i32,
    pub is_completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDetail {
    pub percentage: i32,
    pub completed_videos: Vec<Uuid>,
    pub last_watched_video: Option<Uuid>,
    pub last_accessed: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetailResponse {
    pub success: bool,
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    #[serde(rename = "type")]
    pub course_type: String,
    pub thumbnail: String,
    pub category: Option<String>,
    pub instructor: Option<String>,
    pub level: String,
    pub total_duration: String,
    pub videos: Vec<CourseVideoDetail>,
    pub progress: ProgressDetail,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressRequest {
    pub video_id: Uuid,
    pub is_completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressResponse {
    pub success: bool,
    pub message: String,
    pub progress_percentage: i32,
    pub completed_videos: usize,
    pub total_videos: usize,
}

// ============================================================================
// Helpers
// ============================================================================

/// True when the user holds a non-expired entitlement for the course.
pub(crate) async fn has_course_access(
    pool: &PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM course_entitlements
            WHERE user_id = $1 AND course_id = $2 AND expires_at > now()
        )
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(pool)
    .await
}

/// Progress percentage, rounded to the nearest whole percent.
pub(crate) fn progress_percentage(completed: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i32
}

async fn fetch_active_course_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<crate::db::models::Course, HandlerError> {
    sqlx::query_as::<_, crate::db::models::Course>(
        "SELECT * FROM courses WHERE slug = $1 AND is_active = true",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Database error fetching course: {}", e);
        error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?
    .ok_or_else(|| error(StatusCode::NOT_FOUND, "Course not found"))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/courses - public catalog of active courses
pub async fn list_courses(Query(query): Query<CatalogQuery>) -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let search_pattern = query.search.as_deref().map(|s| format!("%{}%", s));

    let courses = sqlx::query_as::<_, CourseSummary>(
        r#"
        SELECT c.id, c.title, c.slug, c.description, c.course_type, c.thumbnail,
               c.price, c.category, c.instructor, c.level, c.total_duration,
               c.students_enrolled, c.created_at,
               (SELECT COUNT(*) FROM course_videos cv WHERE cv.course_id = c.id) AS video_count
        FROM courses c
        WHERE c.is_active = true
          AND ($1::text IS NULL OR c.category = $1)
          AND ($2::text IS NULL OR c.course_type = $2)
          AND ($3::text IS NULL OR c.title ILIKE $3 OR c.description ILIKE $3)
        ORDER BY c.created_at DESC
        "#,
    )
    .bind(&query.category)
    .bind(&query.course_type)
    .bind(&search_pattern)
    .fetch_all(pool.as_ref())
    .await;

    match courses {
        Ok(data) => (
            StatusCode::OK,
            Json(CourseListResponse {
                success: true,
                count: data.len(),
                data,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing courses: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// GET /api/courses/categories - distinct categories of active courses
pub async fn list_course_categories() -> impl IntoResponse {
    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT category FROM courses
        WHERE is_active = true AND category IS NOT NULL AND category <> ''
        ORDER BY category
        "#,
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(data) => (
            StatusCode::OK,
            Json(CategoryListResponse {
                success: true,
                data,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing categories: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// GET /api/courses/my-courses - the caller's active entitlements with
/// progress, most recently accessed first
pub async fn my_courses(headers: HeaderMap) -> impl IntoResponse {
    let user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let rows = sqlx::query_as::<_, MyCourseRow>(
        r#"
        SELECT c.id, c.title, c.slug, c.course_type, c.thumbnail, c.description,
               c.category, c.total_duration,
               (SELECT COUNT(*) FROM course_videos cv WHERE cv.course_id = c.id) AS video_count,
               COALESCE(p.progress_percentage, 0) AS progress,
               p.last_accessed,
               e.expires_at
        FROM course_entitlements e
        JOIN courses c ON c.id = e.course_id AND c.is_active = true
        LEFT JOIN course_progress p ON p.user_id = e.user_id AND p.course_id = e.course_id
        WHERE e.user_id = $1 AND e.expires_at > now()
        ORDER BY p.last_accessed DESC NULLS LAST
        "#,
    )
    .bind(user.id)
    .fetch_all(pool.as_ref())
    .await;

    match rows {
        Ok(data) => (
            StatusCode::OK,
            Json(MyCoursesResponse {
                success: true,
                count: data.len(),
                data,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error fetching my courses: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// GET /api/courses/{slug} - full course content for entitled users
pub async fn get_course_by_slug(headers: HeaderMap, Path(slug): Path<String>) -> impl IntoResponse {
    if !is_valid_slug(&slug) {
        return error(StatusCode::BAD_REQUEST, "Invalid slug").into_response();
    }

    let user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_active_course_by_slug(pool.as_ref(), &slug).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    match has_course_access(pool.as_ref(), user.id, course.id).await {
        Ok(true) => {}
        Ok(false) => {
            return error(
                StatusCode::FORBIDDEN,
                "You do not have access to this course",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!("Database error checking access: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    }

    let videos = match sqlx::query_as::<_, CourseVideo>(
        "SELECT * FROM course_videos WHERE course_id = $1 ORDER BY position",
    )
    .bind(course.id)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Database error fetching videos: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let progress = sqlx::query_as::<_, CourseProgress>(
        "SELECT * FROM course_progress WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user.id)
    .bind(course.id)
    .fetch_optional(pool.as_ref())
    .await
    .unwrap_or(None);

    let completed: Vec<Uuid> = progress
        .as_ref()
        .map(|p| p.completed_videos.clone())
        .unwrap_or_default();

    let video_details: Vec<CourseVideoDetail> = videos
        .into_iter()
        .map(|v| CourseVideoDetail {
            is_completed: completed.contains(&v.id),
            id: v.id,
            title: v.title,
            url: v.url,
            duration: v.duration,
            order: v.position,
        })
        .collect();

    // Opening the course counts as accessing it.
    let _ = sqlx::query(
        "UPDATE course_progress SET last_accessed = now() WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user.id)
    .bind(course.id)
    .execute(pool.as_ref())
    .await;

    (
        StatusCode::OK,
        Json(CourseDetailResponse {
            success: true,
            id: course.id,
            title: course.title,
            slug: course.slug,
            description: course.description,
            course_type: course.course_type,
            thumbnail: course.thumbnail,
            category: course.category,
            instructor: course.instructor,
            level: course.level,
            total_duration: course.total_duration,
            videos: video_details,
            progress: ProgressDetail {
                percentage: progress.as_ref().map(|p| p.progress_percentage).unwrap_or(0),
                completed_videos: completed,
                last_watched_video: progress.as_ref().and_then(|p| p.last_watched_video),
                last_accessed: progress.as_ref().map(|p| p.last_accessed),
            },
        }),
    )
        .into_response()
}

/// PUT /api/courses/{slug}/progress - mark/unmark a video as completed
pub async fn update_progress(
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(payload): Json<UpdateProgressRequest>,
) -> impl IntoResponse {
    if !is_valid_slug(&slug) {
        return error(StatusCode::BAD_REQUEST, "Invalid slug").into_response();
    }

    let user = match require_user(&headers).await {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let course = match fetch_active_course_by_slug(pool.as_ref(), &slug).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    match has_course_access(pool.as_ref(), user.id, course.id).await {
        Ok(true) => {}
        Ok(false) => {
            return error(
                StatusCode::FORBIDDEN,
                "You do not have access to this course",
            )
            .into_response();
        }
        Err(e) => {
            tracing::error!("Database error checking access: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    }

    let video_ids = match sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM course_videos WHERE course_id = $1",
    )
    .bind(course.id)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("Database error fetching videos: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    if !video_ids.contains(&payload.video_id) {
        return error(StatusCode::NOT_FOUND, "Video not found").into_response();
    }

    let mut completed: Vec<Uuid> = sqlx::query_scalar::<_, Vec<Uuid>>(
        "SELECT completed_videos FROM course_progress WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user.id)
    .bind(course.id)
    .fetch_optional(pool.as_ref())
    .await
    .unwrap_or(None)
    .unwrap_or_default();

    if payload.is_completed {
        if !completed.contains(&payload.video_id) {
            completed.push(payload.video_id);
        }
    } else {
        completed.retain(|id| *id != payload.video_id);
    }

    let percentage = progress_percentage(completed.len(), video_ids.len());

    match sqlx::query(
        r#"
        INSERT INTO course_progress
            (user_id, course_id, completed_videos, progress_percentage, last_watched_video, last_accessed)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (user_id, course_id) DO UPDATE
        SET completed_videos = $3, progress_percentage = $4,
            last_watched_video = $5, last_accessed = now()
        "#,
    )
    .bind(user.id)
    .bind(course.id)
    .bind(&completed)
    .bind(percentage)
    .bind(payload.video_id)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(UpdateProgressResponse {
                success: true,
                message: "Progress updated successfully".to_string(),
                progress_percentage: percentage,
                completed_videos: completed.len(),
                total_videos: video_ids.len(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error updating progress: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
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
    fn test_slug_validation() {
        assert!(is_valid_slug("web-dev"));
        assert!(is_valid_slug("3d-design"));
        assert!(!is_valid_slug("Web Dev"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_progress_percentage_rounds() {
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(0, 4), 0);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
        assert_eq!(progress_percentage(3, 3), 100);
    }

    #[tokio::test]
    async fn test_my_courses_requires_auth() {
        let app = Router::new().route("/api/courses/my-courses", get(my_courses));
        let req = Request::get("/api/courses/my-courses")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_course_detail_requires_auth() {
        let app = Router::new().route("/api/courses/{slug}", get(get_course_by_slug));
        let req = Request::get("/api/courses/web-dev")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_catalog_without_database_is_unavailable() {
        let app = Router::new().route("/api/courses", get(list_courses));
        let req = Request::get("/api/courses").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
