//! Academy Backend - library for app logic and testing

pub mod db;
pub mod logging;
pub mod mail;
pub mod notify;
pub mod routes;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

/// Uploaded course videos are the largest accepted bodies.
const MAX_BODY_BYTES: usize = 210 * 1024 * 1024;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to localhost development origins.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".parse().unwrap(),
                "http://127.0.0.1:3000".parse().unwrap(),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    Router::new()
        // Site auth
        .route("/api/auth/signup", post(routes::auth::signup))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/send-reset-code", post(routes::auth::send_reset_code))
        .route("/api/auth/verify-reset-code", post(routes::auth::verify_reset_code))
        .route("/api/auth/reset-password", post(routes::auth::reset_password))
        .route("/api/admin/auth/login", post(routes::auth::admin_login))
        // Profile
        .route("/api/user/profile/update", post(routes::profile::update_profile))
        .route(
            "/api/user/email/request-change",
            post(routes::profile::request_email_change),
        )
        .route(
            "/api/user/email/confirm-change",
            post(routes::profile::confirm_email_change),
        )
        .route("/api/user/password/change", post(routes::profile::change_password))
        // Courses — site
        .route("/api/courses", get(routes::courses::list_courses))
        .route("/api/courses/categories", get(routes::courses::list_course_categories))
        .route("/api/courses/my-courses", get(routes::courses::my_courses))
        .route("/api/courses/{slug}", get(routes::courses::get_course_by_slug))
        .route("/api/courses/{slug}/progress", put(routes::courses::update_progress))
        // Courses — admin
        .route(
            "/api/admin/courses",
            get(routes::admin_courses::list_courses).post(routes::admin_courses::create_course),
        )
        .route(
            "/api/admin/courses/{id}",
            get(routes::admin_courses::get_course)
                .put(routes::admin_courses::update_course)
                .delete(routes::admin_courses::delete_course),
        )
        .route(
            "/api/admin/courses/{id}/videos",
            post(routes::admin_courses::add_pack_video),
        )
        .route(
            "/api/admin/courses/{id}/videos/{video_id}",
            put(routes::admin_courses::update_pack_video)
                .delete(routes::admin_courses::delete_pack_video),
        )
        .route(
            "/api/admin/courses/{id}/videos-order",
            put(routes::admin_courses::reorder_pack_videos),
        )
        // Users — admin
        .route(
            "/api/admin/users",
            get(routes::admin_users::list_users).post(routes::admin_users::create_user),
        )
        .route("/api/admin/users/{id}", delete(routes::admin_users::delete_user))
        .route(
            "/api/admin/users/{id}/status",
            put(routes::admin_users::toggle_user_status),
        )
        .route(
            "/api/admin/users/{id}/grant-course",
            post(routes::admin_courses::grant_course_access),
        )
        .route(
            "/api/admin/users/{id}/remove-course",
            post(routes::admin_courses::remove_course_access),
        )
        // Payments — admin
        .route("/api/admin/payments", get(routes::payments::list_payments))
        .route("/api/admin/payments/stats", get(routes::payments::payment_stats))
        .route("/api/admin/payments/months", get(routes::payments::available_months))
        // Companies — admin (main only)
        .route(
            "/api/admin/companies",
            get(routes::companies::list_companies).post(routes::companies::create_company),
        )
        .route(
            "/api/admin/companies/{id}",
            put(routes::companies::update_company).delete(routes::companies::delete_company),
        )
        .route(
            "/api/admin/companies/{id}/toggle-status",
            put(routes::companies::toggle_company_status),
        )
        .route(
            "/api/admin/companies/{id}/stats",
            get(routes::companies::company_stats),
        )
        // Dashboard
        .route("/api/admin/dashboard/stats", get(routes::dashboard::dashboard_stats))
        // Announcements
        .route(
            "/api/admin/announcements",
            get(routes::announcements::list_announcements)
                .post(routes::announcements::create_announcement),
        )
        .route(
            "/api/admin/announcements/toggle/{id}",
            patch(routes::announcements::toggle_announcement),
        )
        .route(
            "/api/admin/announcements/mark-all-read",
            put(routes::announcements::mark_all_read),
        )
        .route(
            "/api/admin/announcements/stream",
            get(routes::announcements::stream_announcements),
        )
        .route(
            "/api/admin/announcements/{id}",
            delete(routes::announcements::delete_announcement),
        )
        // Catalog videos
        .route("/api/videos", get(routes::videos::list_videos))
        .route(
            "/api/videos/category/{slug}",
            get(routes::videos::list_videos_by_category),
        )
        .route("/api/admin/videos/upload", post(routes::videos::upload_video))
        .route("/api/admin/videos", get(routes::videos::admin_list_videos))
        .route("/api/admin/videos/{id}", delete(routes::videos::delete_video))
        // Video categories
        .route(
            "/api/admin/video-categories",
            get(routes::categories::list_categories).post(routes::categories::create_category),
        )
        .route(
            "/api/admin/video-categories/{id}",
            delete(routes::categories::delete_category),
        )
        // Reviews
        .route(
            "/api/reviews",
            get(routes::reviews::list_reviews).post(routes::reviews::create_review),
        )
        .route("/api/reviews/average", get(routes::reviews::average_rating))
        .route(
            "/api/reviews/{id}",
            get(routes::reviews::get_review)
                .put(routes::reviews::update_review)
                .delete(routes::reviews::delete_review),
        )
        // Contact & projects
        .route("/api/contact", post(routes::contact::submit_contact))
        .route("/api/projects/upload", post(routes::projects::upload_project))
        // Health
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/ready", get(routes::health::health_ready))
        // Locally stored media (thumbnails, avatars, pack videos, projects)
        .nest_service("/uploads", ServeDir::new("uploads"))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        // Body cap sized for course video uploads
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    // Refuse to start in production with the insecure default JWT secret.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment == "production" {
        let secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if secret.is_empty() || secret == "default-jwt-secret-change-in-production" {
            panic!(
                "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
                 Refusing to start with the default secret."
            );
        }

        // Warn (don't panic) about missing admin bootstrap credentials.
        let admin_email = std::env::var("ADMIN_EMAIL").unwrap_or_default();
        let admin_password_set =
            std::env::var("ADMIN_HASH_PASSWORD").is_ok() || std::env::var("ADMIN_PASSWORD").is_ok();

        if admin_email.is_empty() {
            tracing::warn!(
                "SECURITY: ADMIN_EMAIL is not set. The main admin account will not be \
                 bootstrapped and the admin panel will be unreachable."
            );
        }
        if !admin_password_set {
            tracing::warn!(
                "SECURITY: Neither ADMIN_HASH_PASSWORD nor ADMIN_PASSWORD is set. \
                 Set ADMIN_HASH_PASSWORD to a bcrypt hash of a strong password."
            );
        }
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
                routes::auth::ensure_main_admin(&pool).await;
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    // Set once before serving traffic, read-only thereafter.
    notify::init();

    let app = create_app();

    // Bind address is configurable via HOST / PORT env vars.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5050);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_create_app_returns_router() {
        let _app = create_app();
        // Just test that it compiles and doesn't panic
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = create_app();
        let req = Request::get("/api/nope").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_routes_reject_anonymous_callers() {
        for uri in [
            "/api/admin/payments",
            "/api/admin/payments/stats",
            "/api/admin/dashboard/stats",
            "/api/admin/companies",
        ] {
            let app = create_app();
            let req = Request::get(uri).body(Body::empty()).unwrap();
            let res = app.oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "uri: {}", uri);
        }
    }
}
