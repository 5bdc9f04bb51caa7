//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User account. Covers both end users and admins; admins additionally
/// carry an `admin_role` ("main" or "company") and, for company admins,
/// the owning `company_id`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub admin_role: Option<String>,
    pub company_id: Option<Uuid>,
    pub status: String,
    pub image: Option<String>,
    #[serde(skip_serializing)]
    pub reset_code: Option<String>,
    #[serde(skip_serializing)]
    pub reset_code_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub email_change_new_email: Option<String>,
    #[serde(skip_serializing)]
    pub email_change_code: Option<String>,
    #[serde(skip_serializing)]
    pub email_change_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Time-bounded course access. Active iff `expires_at` is in the future;
/// expired rows are filtered at read time and purged by the cleanup binary.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEntitlement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub access_months: i32,
    pub expires_at: DateTime<Utc>,
}

/// Per-user per-course progress.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub completed_videos: Vec<Uuid>,
    pub progress_percentage: i32,
    pub last_watched_video: Option<Uuid>,
    pub last_accessed: DateTime<Utc>,
}

/// Course model. `course_type` is "single" or "pack"; prices are stored in
/// minor currency units.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub course_type: String,
    pub thumbnail: String,
    pub price: i64,
    pub is_active: bool,
    pub category: Option<String>,
    pub instructor: Option<String>,
    pub level: String,
    pub total_duration: String,
    pub students_enrolled: i32,
    pub access_months: i32,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A video embedded in a course, ordered by `position`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseVideo {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub url: String,
    pub duration: String,
    pub position: i32,
}

/// Payment record. Denormalized snapshot of the payer and course at grant
/// time; never mutated by this service after insertion.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub course_slug: String,
    pub course_title: String,
    pub amount: i64,
    pub company_id: Option<Uuid>,
    pub company_share: Option<i64>,
    pub platform_share: Option<i64>,
    pub method: String,
    pub status: String,
    pub paid_at: DateTime<Utc>,
}

/// Company owning courses for revenue sharing.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog video category.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: i64,
    pub thumbnail_url: String,
    pub created_at: DateTime<Utc>,
}

/// Standalone catalog video. `access` is "free" or "premium"; preview
/// videos are viewable without purchase.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub thumbnail: String,
    pub duration: String,
    pub price: i64,
    pub category_id: Uuid,
    pub access: String,
    pub video_url: String,
    pub is_preview: bool,
    pub created_at: DateTime<Utc>,
}

/// Announcement broadcast to site users.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub audience: String,
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Site review.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub name: String,
    pub rating: i32,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

/// Uploaded client project file.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
}
