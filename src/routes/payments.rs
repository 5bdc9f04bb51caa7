/**
 * Payment Routes (admin)
 * Paginated listing, revenue statistics with period-over-period change, and
 * the month picker feed. Company admins are hard-scoped to their own
 * company's rows and see their share as the amount; main admins see gross
 * figures plus both sides of the split.
 */
use axum::{
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::models::Payment;
use crate::routes::auth::{require_admin, AdminContext};
use crate::routes::{db_pool, error, HandlerError};

pub(crate) const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentListQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

/// A payment row shaped for the admin panel. The split fields are only
/// present for main admins.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRow {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub date: DateTime<Utc>,
    pub course_slug: String,
    pub course_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_share: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_share: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_payments: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
    pub limit: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentListResponse {
    pub success: bool,
    pub payments: Vec<PaymentRow>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_revenue: i64,
    pub total_payments: i64,
    pub completed_payments: i64,
    pub unique_users: i64,
    pub revenue_change: String,
    pub trend: String,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TopCourse {
    pub slug: String,
    pub title: String,
    pub sales: i64,
    pub revenue: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub success: bool,
    pub summary: StatsSummary,
    pub top_courses: Vec<TopCourse>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableMonth {
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub display_name: String,
    pub count: i64,
}

// ============================================================================
// Period arithmetic
// ============================================================================

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}

/// Half-open [start, end) range for the requested filter. Month is
/// 1-indexed in the query; a month without a year means the current year.
pub(crate) fn period_range(
    month: Option<u32>,
    year: Option<i32>,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, HandlerError> {
    if let Some(m) = month {
        if !(1..=12).contains(&m) {
            return Err(error(
                StatusCode::BAD_REQUEST,
                "Month must be between 1 and 12",
            ));
        }
    }

    Ok(match (month, year) {
        (Some(m), Some(y)) => {
            let start = month_start(y, m);
            let end = if m == 12 {
                month_start(y + 1, 1)
            } else {
                month_start(y, m + 1)
            };
            Some((start, end))
        }
        (None, Some(y)) => Some((month_start(y, 1), month_start(y + 1, 1))),
        (Some(m), None) => {
            let y = Utc::now().year();
            let end = if m == 12 {
                month_start(y + 1, 1)
            } else {
                month_start(y, m + 1)
            };
            Some((month_start(y, m), end))
        }
        (None, None) => None,
    })
}

/// The comparison period for month+year stats: the previous month, with
/// January rolling back to December of the prior year.
pub(crate) fn previous_period(month: u32, year: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    if month == 1 {
        (month_start(year - 1, 12), month_start(year, 1))
    } else {
        (month_start(year, month - 1), month_start(year, month))
    }
}

/// Percentage change vs the previous period; 0 whenever the previous
/// period had no revenue, regardless of the current figure.
pub(crate) fn revenue_change(current: i64, previous: i64) -> i64 {
    if previous > 0 {
        (((current - previous) as f64 / previous as f64) * 100.0).round() as i64
    } else {
        0
    }
}

pub(crate) fn format_change(change: i64) -> String {
    if change > 0 {
        format!("+{}%", change)
    } else {
        format!("{}%", change)
    }
}

fn format_row(payment: Payment, admin: &AdminContext) -> PaymentRow {
    let is_company = !admin.is_main();
    PaymentRow {
        id: payment.id,
        user_name: payment.user_name,
        email: payment.user_email,
        // Company admins see their share as the amount
        amount: if is_company {
            payment.company_share.unwrap_or(0)
        } else {
            payment.amount
        },
        currency: "UZS".to_string(),
        method: payment.method,
        status: payment.status,
        date: payment.paid_at,
        course_slug: payment.course_slug,
        course_title: payment.course_title,
        company_share: if is_company { None } else { payment.company_share },
        platform_share: if is_company { None } else { payment.platform_share },
        total_amount: if is_company { None } else { Some(payment.amount) },
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/payments
pub async fn list_payments(
    headers: HeaderMap,
    Query(query): Query<PaymentListQuery>,
) -> impl IntoResponse {
    let admin = match require_admin(&headers) {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let range = match period_range(query.month, query.year) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    let (range_start, range_end) = match range {
        Some((s, e)) => (Some(s), Some(e)),
        None => (None, None),
    };

    // Company admins only ever see their own company's rows.
    let company_scope = match admin.company_scope() {
        Ok(scope) => scope,
        Err(e) => return e.into_response(),
    };

    let status_filter = query.status.as_deref().filter(|s| *s != "all");
    let search_pattern = query.search.as_deref().map(|s| format!("%{}%", s));

    let limit = query.limit.clamp(1, 100);
    let page = query.page.max(1);
    let offset = (page - 1) * limit;

    let total: i64 = match sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM payments
        WHERE ($1::uuid IS NULL OR company_id = $1)
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL OR user_name ILIKE $3 OR user_email ILIKE $3 OR course_slug ILIKE $3)
          AND ($4::timestamptz IS NULL OR paid_at >= $4)
          AND ($5::timestamptz IS NULL OR paid_at < $5)
        "#,
    )
    .bind(company_scope)
    .bind(status_filter)
    .bind(&search_pattern)
    .bind(range_start)
    .bind(range_end)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Database error counting payments: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch payments")
                .into_response();
        }
    };

    let payments = match sqlx::query_as::<_, Payment>(
        r#"
        SELECT * FROM payments
        WHERE ($1::uuid IS NULL OR company_id = $1)
          AND ($2::text IS NULL OR status = $2)
          AND ($3::text IS NULL OR user_name ILIKE $3 OR user_email ILIKE $3 OR course_slug ILIKE $3)
          AND ($4::timestamptz IS NULL OR paid_at >= $4)
          AND ($5::timestamptz IS NULL OR paid_at < $5)
        ORDER BY paid_at DESC
        LIMIT $6 OFFSET $7
        "#,
    )
    .bind(company_scope)
    .bind(status_filter)
    .bind(&search_pattern)
    .bind(range_start)
    .bind(range_end)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("Database error listing payments: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch payments")
                .into_response();
        }
    };

    let total_pages = (total + limit - 1) / limit;

    (
        StatusCode::OK,
        Json(PaymentListResponse {
            success: true,
            payments: payments.into_iter().map(|p| format_row(p, &admin)).collect(),
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_payments: total,
                has_next_page: page < total_pages,
                has_prev_page: page > 1,
                limit,
            },
        }),
    )
        .into_response()
}

/// GET /api/admin/payments/stats
pub async fn payment_stats(headers: HeaderMap, Query(query): Query<StatsQuery>) -> impl IntoResponse {
    let admin = match require_admin(&headers) {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let range = match period_range(query.month, query.year) {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };
    let (range_start, range_end) = match range {
        Some((s, e)) => (Some(s), Some(e)),
        None => (None, None),
    };

    let is_company = !admin.is_main();
    let company_scope = match admin.company_scope() {
        Ok(scope) => scope,
        Err(e) => return e.into_response(),
    };

    let totals = sqlx::query_as::<_, (i64, i64, i64, i64)>(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN status = 'completed'
                              THEN (CASE WHEN $1 THEN COALESCE(company_share, 0) ELSE amount END)
                              ELSE 0 END), 0),
            COUNT(*),
            COUNT(*) FILTER (WHERE status = 'completed'),
            COUNT(DISTINCT user_email) FILTER (WHERE status = 'completed')
        FROM payments
        WHERE ($2::uuid IS NULL OR company_id = $2)
          AND ($3::timestamptz IS NULL OR paid_at >= $3)
          AND ($4::timestamptz IS NULL OR paid_at < $4)
        "#,
    )
    .bind(is_company)
    .bind(company_scope)
    .bind(range_start)
    .bind(range_end)
    .fetch_one(pool.as_ref())
    .await;

    let (total_revenue, total_payments, completed_payments, unique_users) = match totals {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Database error computing payment stats: {}", e);
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch payment statistics",
            )
            .into_response();
        }
    };

    let top_courses = sqlx::query_as::<_, TopCourse>(
        r#"
        SELECT course_slug AS slug, MIN(course_title) AS title,
               COUNT(*) AS sales,
               COALESCE(SUM(CASE WHEN $1 THEN COALESCE(company_share, 0) ELSE amount END), 0) AS revenue
        FROM payments
        WHERE status = 'completed'
          AND ($2::uuid IS NULL OR company_id = $2)
          AND ($3::timestamptz IS NULL OR paid_at >= $3)
          AND ($4::timestamptz IS NULL OR paid_at < $4)
        GROUP BY course_slug
        ORDER BY revenue DESC
        LIMIT 10
        "#,
    )
    .bind(is_company)
    .bind(company_scope)
    .bind(range_start)
    .bind(range_end)
    .fetch_all(pool.as_ref())
    .await
    .unwrap_or_default();

    // Period-over-period change only applies to a month+year filter.
    let change = match (query.month, query.year) {
        (Some(m), Some(y)) => {
            let (prev_start, prev_end) = previous_period(m, y);
            let previous: i64 = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT COALESCE(SUM(CASE WHEN $1 THEN COALESCE(company_share, 0) ELSE amount END), 0)
                FROM payments
                WHERE status = 'completed'
                  AND ($2::uuid IS NULL OR company_id = $2)
                  AND paid_at >= $3 AND paid_at < $4
                "#,
            )
            .bind(is_company)
            .bind(company_scope)
            .bind(prev_start)
            .bind(prev_end)
            .fetch_one(pool.as_ref())
            .await
            .unwrap_or(0);
            revenue_change(total_revenue, previous)
        }
        _ => 0,
    };

    (
        StatusCode::OK,
        Json(StatsResponse {
            success: true,
            summary: StatsSummary {
                total_revenue,
                total_payments,
                completed_payments,
                unique_users,
                revenue_change: format_change(change),
                trend: if change >= 0 { "up" } else { "down" }.to_string(),
            },
            top_courses,
        }),
    )
        .into_response()
}

/// GET /api/admin/payments/months - months with payment data over the
/// trailing year, for the filter dropdown
pub async fn available_months(headers: HeaderMap) -> impl IntoResponse {
    let admin = match require_admin(&headers) {
        Ok(a) => a,
        Err(e) => return e.into_response(),
    };

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let company_scope = match admin.company_scope() {
        Ok(scope) => scope,
        Err(e) => return e.into_response(),
    };

    let rows = sqlx::query_as::<_, (i32, i32, i64)>(
        r#"
        SELECT EXTRACT(YEAR FROM paid_at)::int,
               EXTRACT(MONTH FROM paid_at)::int,
               COUNT(*)
        FROM payments
        WHERE paid_at >= now() - interval '1 year'
          AND ($1::uuid IS NULL OR company_id = $1)
        GROUP BY 1, 2
        ORDER BY 1, 2
        "#,
    )
    .bind(company_scope)
    .fetch_all(pool.as_ref())
    .await;

    match rows {
        Ok(rows) => {
            let months: Vec<AvailableMonth> = rows
                .into_iter()
                .map(|(year, month, count)| {
                    let name = MONTH_NAMES[(month as usize).saturating_sub(1).min(11)];
                    AvailableMonth {
                        year,
                        month: month as u32,
                        month_name: name.to_string(),
                        display_name: format!("{} {}", name, year),
                        count,
                    }
                })
                .collect();
            (StatusCode::OK, Json(months)).into_response()
        }
        Err(e) => {
            tracing::error!("Database error listing payment months: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch available months",
            )
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revenue_change_zero_previous() {
        assert_eq!(revenue_change(5000, 0), 0);
        assert_eq!(revenue_change(0, 0), 0);
    }

    #[test]
    fn test_revenue_change_rounds() {
        assert_eq!(revenue_change(150, 100), 50);
        assert_eq!(revenue_change(100, 150), -33);
        assert_eq!(revenue_change(100, 100), 0);
        assert_eq!(revenue_change(0, 100), -100);
    }

    #[test]
    fn test_format_change_sign() {
        assert_eq!(format_change(12), "+12%");
        assert_eq!(format_change(-7), "-7%");
        assert_eq!(format_change(0), "0%");
    }

    #[test]
    fn test_period_range_month_and_year() {
        let (start, end) = period_range(Some(1), Some(2024)).unwrap().unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());

        // December rolls into January of the next year
        let (start, end) = period_range(Some(12), Some(2024)).unwrap().unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_period_range_year_only() {
        let (start, end) = period_range(None, Some(2023)).unwrap().unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_period_range_rejects_bad_month() {
        assert!(period_range(Some(0), Some(2024)).is_err());
        assert!(period_range(Some(13), Some(2024)).is_err());
    }

    #[test]
    fn test_period_range_empty() {
        assert!(period_range(None, None).unwrap().is_none());
    }

    #[test]
    fn test_previous_period_january_wraps_to_december() {
        let (start, end) = previous_period(1, 2024);
        assert_eq!(start, Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_previous_period_mid_year() {
        let (start, end) = previous_period(6, 2024);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_company_admin_row_hides_split_and_shows_share() {
        let admin = AdminContext {
            id: Uuid::new_v4(),
            email: "co@example.com".to_string(),
            role: "company".to_string(),
            company_id: Some(Uuid::new_v4()),
        };
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "John Doe".to_string(),
            user_email: "john@example.com".to_string(),
            course_slug: "react-basics".to_string(),
            course_title: "React Basics".to_string(),
            amount: 1000,
            company_id: admin.company_id,
            company_share: Some(700),
            platform_share: Some(300),
            method: "Admin Grant".to_string(),
            status: "completed".to_string(),
            paid_at: Utc::now(),
        };

        let row = format_row(payment, &admin);
        assert_eq!(row.amount, 700);
        assert!(row.company_share.is_none());
        assert!(row.platform_share.is_none());
        assert!(row.total_amount.is_none());
    }

    #[test]
    fn test_main_admin_row_shows_gross_and_split() {
        let admin = AdminContext {
            id: Uuid::new_v4(),
            email: "main@example.com".to_string(),
            role: "main".to_string(),
            company_id: None,
        };
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "Jane Smith".to_string(),
            user_email: "jane@example.com".to_string(),
            course_slug: "advanced-js".to_string(),
            course_title: "Advanced JavaScript".to_string(),
            amount: 2000,
            company_id: Some(Uuid::new_v4()),
            company_share: Some(1400),
            platform_share: Some(600),
            method: "Telegram".to_string(),
            status: "completed".to_string(),
            paid_at: Utc::now(),
        };

        let row = format_row(payment, &admin);
        assert_eq!(row.amount, 2000);
        assert_eq!(row.company_share, Some(1400));
        assert_eq!(row.platform_share, Some(600));
        assert_eq!(row.total_amount, Some(2000));
    }
}
