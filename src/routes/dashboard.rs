/**
 * Dashboard Routes (admin)
 * Aggregate counters and the 12-month registration/revenue series for the
 * admin panel landing page.
 */
use axum::{
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::routes::auth::require_main_admin;
use crate::routes::payments::{format_change, previous_period, revenue_change, MONTH_NAMES};
use crate::routes::{db_pool, error};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatTile {
    pub value: i64,
    pub change: String,
    pub trend: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: StatTile,
    pub premium_users: StatTile,
    pub total_courses: StatTile,
    pub monthly_revenue: StatTile,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPoint {
    pub month: String,
    pub users: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint {
    pub month: String,
    pub revenue: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    pub user_registrations: Vec<RegistrationPoint>,
    pub revenue: Vec<RevenuePoint>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub stats: DashboardStats,
    pub charts: DashboardCharts,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub success: bool,
    pub data: DashboardData,
}

fn tile(value: i64, change: i64) -> StatTile {
    StatTile {
        value,
        change: format!("{} from last month", format_change(change)),
        trend: if change >= 0 { "up" } else { "down" }.to_string(),
    }
}

/// Jan..Dec series keyed by month number, zero-filled.
fn fill_series(rows: Vec<(i32, i64)>) -> Vec<(String, i64)> {
    let by_month: HashMap<i32, i64> = rows.into_iter().collect();
    MONTH_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            (
                name.to_string(),
                by_month.get(&(i as i32 + 1)).copied().unwrap_or(0),
            )
        })
        .collect()
}

async fn monthly_series(
    pool: &PgPool,
    sql: &str,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (i32, i64)>(sql).fetch_all(pool).await?;
    Ok(fill_series(rows))
}

/// GET /api/admin/dashboard/stats - platform-wide figures, main admins only
pub async fn dashboard_stats(headers: HeaderMap) -> impl IntoResponse {
    if let Err(e) = require_main_admin(&headers) {
        return e.into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let now = Utc::now();
    let month_start = Utc::now()
        .date_naive()
        .with_day(1)
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
        .unwrap_or(now);
    let (prev_month_start, prev_month_end) = previous_period(now.month(), now.year());
    let one_week_ago = now - Duration::days(7);

    let totals = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users),
            (SELECT COUNT(DISTINCT user_id) FROM course_entitlements WHERE expires_at > now()),
            (SELECT COUNT(*) FROM courses)
        "#,
    )
    .fetch_one(pool.as_ref())
    .await;

    let (total_users, premium_users, total_courses) = match totals {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Database error computing dashboard totals: {}", e);
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch dashboard statistics",
            )
            .into_response();
        }
    };

    let growth = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64)>(
        r#"
        SELECT
            (SELECT COALESCE(SUM(amount), 0) FROM payments
             WHERE status = 'completed' AND paid_at >= $1),
            (SELECT COALESCE(SUM(amount), 0) FROM payments
             WHERE status = 'completed' AND paid_at >= $2 AND paid_at < $3),
            (SELECT COUNT(*) FROM users WHERE created_at >= $1),
            (SELECT COUNT(*) FROM users WHERE created_at >= $2 AND created_at < $3),
            (SELECT COUNT(DISTINCT user_id) FROM course_entitlements WHERE assigned_at >= $1),
            (SELECT COUNT(DISTINCT user_id) FROM course_entitlements
             WHERE assigned_at >= $2 AND assigned_at < $3),
            (SELECT COUNT(*) FROM courses WHERE created_at >= $4)
        "#,
    )
    .bind(month_start)
    .bind(prev_month_start)
    .bind(prev_month_end)
    .bind(one_week_ago)
    .fetch_one(pool.as_ref())
    .await;

    let (
        current_revenue,
        previous_revenue,
        users_this_month,
        users_prev_month,
        premium_this_month,
        premium_prev_month,
        courses_this_week,
    ) = match growth {
        Ok(g) => g,
        Err(e) => {
            tracing::error!("Database error computing dashboard growth: {}", e);
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch dashboard statistics",
            )
            .into_response();
        }
    };

    let registrations = monthly_series(
        pool.as_ref(),
        r#"
        SELECT EXTRACT(MONTH FROM created_at)::int, COUNT(*)
        FROM users
        WHERE created_at >= now() - interval '1 year'
        GROUP BY 1
        "#,
    )
    .await
    .unwrap_or_default();

    let revenue = monthly_series(
        pool.as_ref(),
        r#"
        SELECT EXTRACT(MONTH FROM paid_at)::int, COALESCE(SUM(amount), 0)
        FROM payments
        WHERE status = 'completed' AND paid_at >= now() - interval '1 year'
        GROUP BY 1
        "#,
    )
    .await
    .unwrap_or_default();

    (
        StatusCode::OK,
        Json(DashboardResponse {
            success: true,
            data: DashboardData {
                stats: DashboardStats {
                    total_users: tile(
                        total_users,
                        revenue_change(users_this_month, users_prev_month),
                    ),
                    premium_users: tile(
                        premium_users,
                        revenue_change(premium_this_month, premium_prev_month),
                    ),
                    total_courses: StatTile {
                        value: total_courses,
                        change: format!("+{} new this week", courses_this_week),
                        trend: "up".to_string(),
                    },
                    monthly_revenue: tile(
                        current_revenue,
                        revenue_change(current_revenue, previous_revenue),
                    ),
                },
                charts: DashboardCharts {
                    user_registrations: registrations
                        .into_iter()
                        .map(|(month, users)| RegistrationPoint { month, users })
                        .collect(),
                    revenue: revenue
                        .into_iter()
                        .map(|(month, revenue)| RevenuePoint { month, revenue })
                        .collect(),
                },
            },
        }),
    )
        .into_response()
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
    fn test_fill_series_zero_fills_all_months() {
        let series = fill_series(vec![(1, 5), (3, 7)]);
        assert_eq!(series.len(), 12);
        assert_eq!(series[0], ("Jan".to_string(), 5));
        assert_eq!(series[1], ("Feb".to_string(), 0));
        assert_eq!(series[2], ("Mar".to_string(), 7));
        assert_eq!(series[11], ("Dec".to_string(), 0));
    }

    #[test]
    fn test_tile_trend_direction() {
        assert_eq!(tile(10, 5).trend, "up");
        assert_eq!(tile(10, 0).trend, "up");
        assert_eq!(tile(10, -5).trend, "down");
    }

    #[tokio::test]
    async fn test_dashboard_requires_admin_token() {
        let app = Router::new().route("/api/admin/dashboard/stats", get(dashboard_stats));
        let req = Request::get("/api/admin/dashboard/stats")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
