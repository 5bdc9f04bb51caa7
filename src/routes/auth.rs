/**
 * Authentication Routes
 * Site signup/login, password-reset code flow, admin login, and the token
 * helpers used by every other route module.
 */
use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::User;
use crate::mail;
use crate::routes::{db_pool, error, HandlerError, MessageResponse};

// ============================================================================
// Configuration
// ============================================================================

lazy_static::lazy_static! {
    /// Signing secret for end-user tokens
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "default-jwt-secret-change-in-production".to_string());

    /// Signing secret for admin-panel tokens (may equal JWT_SECRET)
    pub static ref ADMIN_JWT_SECRET: String = std::env::var("ADMIN_JWT_SECRET")
        .unwrap_or_else(|_| JWT_SECRET.clone());

    /// Rate limit storage (IP -> last request timestamp)
    pub static ref RATE_LIMIT: Arc<RwLock<HashMap<String, i64>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// End-user token lifetime
const USER_TOKEN_EXPIRY_DAYS: i64 = 7;

/// Admin token lifetime
const ADMIN_TOKEN_EXPIRY_HOURS: i64 = 24;

/// Rate limit window for code-sending endpoints (1 request per IP per window)
#[allow(dead_code)]
const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Verification / reset codes stay valid this long
pub const CODE_EXPIRY_MINUTES: i64 = 15;

// ============================================================================
// Types
// ============================================================================

/// Claims carried by end-user tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserClaims {
    pub sub: String,   // User ID
    pub email: String, // User email
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub exp: i64, // Expiry timestamp
    pub iat: i64, // Issued at timestamp
}

/// Claims carried by admin tokens; company admins additionally carry the
/// company they are scoped to.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    pub email: String,
    #[serde(rename = "adminRole")]
    pub admin_role: String,
    #[serde(rename = "companyId")]
    pub company_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Acting admin identity, decoded from a verified admin token.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub company_id: Option<Uuid>,
}

impl AdminContext {
    pub fn is_main(&self) -> bool {
        self.role == "main"
    }

    /// Payment/course rows visible to this admin: `None` means unscoped
    /// (main admin); company admins are pinned to their own company and a
    /// company admin with no linked company sees nothing.
    pub fn company_scope(&self) -> Result<Option<Uuid>, HandlerError> {
        if self.is_main() {
            Ok(None)
        } else {
            self.company_id.map(Some).ok_or_else(|| {
                error(
                    StatusCode::FORBIDDEN,
                    "Admin account is not linked to a company",
                )
            })
        }
    }
}

/// User fields safe to return to the frontend
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub is_admin: bool,
    pub image: Option<String>,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            surname: user.surname.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            image: user.image.clone(),
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: UserPublic,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResetCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResetCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

// ============================================================================
// Token helpers
// ============================================================================

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Create an end-user token.
pub fn create_user_token(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = UserClaims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        is_admin: user.is_admin,
        exp: (now + Duration::days(USER_TOKEN_EXPIRY_DAYS)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

pub fn verify_user_token(token: &str) -> Result<UserClaims, jsonwebtoken::errors::Error> {
    let data = decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Create an admin token carrying role and company scope.
pub fn create_admin_token(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = AdminClaims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        admin_role: user
            .admin_role
            .clone()
            .unwrap_or_else(|| "main".to_string()),
        company_id: user.company_id.map(|id| id.to_string()),
        exp: (now + Duration::hours(ADMIN_TOKEN_EXPIRY_HOURS)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(ADMIN_JWT_SECRET.as_bytes()),
    )
}

pub fn verify_admin_token(token: &str) -> Result<AdminClaims, jsonwebtoken::errors::Error> {
    let data = decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(ADMIN_JWT_SECRET.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

// ============================================================================
// Auth extraction helpers (used by all other route modules)
// ============================================================================

/// Resolve the acting end user from the bearer token. Loads the account and
/// rejects suspended or deleted users.
pub async fn require_user(headers: &HeaderMap) -> Result<User, HandlerError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Authorization required"))?;

    let claims = verify_user_token(&token)
        .map_err(|_| error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    let pool = db_pool()?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool.as_ref())
        .await
        .map_err(|e| {
            tracing::error!("Database error loading user: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "User not found"))?;

    if user.status == "suspended" {
        return Err(error(StatusCode::UNAUTHORIZED, "User account is suspended"));
    }

    Ok(user)
}

/// Resolve the acting admin from the bearer token. Token-only, no DB lookup.
pub fn require_admin(headers: &HeaderMap) -> Result<AdminContext, HandlerError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Authorization required"))?;

    let claims = verify_admin_token(&token)
        .map_err(|_| error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    let id = Uuid::parse_str(&claims.sub)
        .map_err(|_| error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    let company_id = match claims.company_id.as_deref() {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?,
        ),
        None => None,
    };

    Ok(AdminContext {
        id,
        email: claims.email,
        role: claims.admin_role,
        company_id,
    })
}

/// Like `require_admin`, but restricted to platform-wide admins.
pub fn require_main_admin(headers: &HeaderMap) -> Result<AdminContext, HandlerError> {
    let admin = require_admin(headers)?;
    if !admin.is_main() {
        return Err(error(
            StatusCode::FORBIDDEN,
            "Insufficient permissions for this operation",
        ));
    }
    Ok(admin)
}

// ============================================================================
// Password helpers
// ============================================================================

/// bcrypt is intentionally CPU-intensive; run it outside the async executor
/// so it doesn't block other in-flight tasks.
pub(crate) async fn hash_password(password: String) -> Result<String, HandlerError> {
    match tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST)).await {
        Ok(Ok(h)) => Ok(h),
        Ok(Err(e)) => {
            tracing::error!("Failed to hash password: {}", e);
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process password",
            ))
        }
        Err(e) => {
            tracing::error!("spawn_blocking panic during hash: {}", e);
            Err(error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process password",
            ))
        }
    }
}

pub(crate) async fn verify_password(password: String, password_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify(&password, &password_hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// 6-digit verification code for reset and email-change flows.
pub(crate) fn generate_verification_code() -> String {
    rand::rng().random_range(100_000..1_000_000).to_string()
}

/// Check rate limit for an IP.
///
/// Also removes stale entries from the map on every write so the HashMap
/// does not grow without bound as unique IPs accumulate over time.
async fn check_rate_limit(ip: &str) -> bool {
    #[cfg(test)]
    {
        let _ = ip;
        return true; // Bypass in tests so validation and credentials are exercised
    }

    #[cfg(not(test))]
    {
        let now = Utc::now().timestamp();
        let mut limits = RATE_LIMIT.write().await;

        limits.retain(|_, last| now - *last < RATE_LIMIT_WINDOW_SECS);

        if let Some(last_request) = limits.get(ip) {
            if now - last_request < RATE_LIMIT_WINDOW_SECS {
                return false; // Rate limited
            }
        }

        limits.insert(ip.to_string(), now);
        true // Allowed
    }
}

// ============================================================================
// Handlers — site auth
// ============================================================================

/// POST /api/auth/signup
pub async fn signup(Json(payload): Json<SignupRequest>) -> impl IntoResponse {
    let email = payload.email.trim().to_lowercase();

    if payload.name.trim().is_empty()
        || payload.surname.trim().is_empty()
        || email.is_empty()
        || payload.password.is_empty()
    {
        return error(StatusCode::BAD_REQUEST, "All fields are required").into_response();
    }

    if !email.contains('@') {
        return error(StatusCode::BAD_REQUEST, "Invalid email format").into_response();
    }

    if payload.password.len() < 8 {
        return error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters long",
        )
        .into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let password_hash = match hash_password(payload.password).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    match sqlx::query(
        r#"
        INSERT INTO users (name, surname, email, password_hash)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.surname.trim())
    .bind(&email)
    .bind(&password_hash)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => {
            tracing::info!("User registered: {}", email);
            (
                StatusCode::CREATED,
                Json(MessageResponse::new("Account created successfully")),
            )
                .into_response()
        }
        Err(e) if crate::routes::is_unique_violation(&e) => {
            error(StatusCode::CONFLICT, "Email already registered").into_response()
        }
        Err(e) => {
            tracing::error!("Database error during signup: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create account").into_response()
        }
    }
}

/// POST /api/auth/login
pub async fn login(Json(payload): Json<LoginRequest>) -> impl IntoResponse {
    if payload.email.is_empty() || payload.password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Email and password are required").into_response();
    }

    if !payload.email.contains('@') {
        return error(StatusCode::BAD_REQUEST, "Invalid email format").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let user = match sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(&payload.email)
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!("Login attempt for unknown user: {}", payload.email);
            return error(StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
        }
        Err(e) => {
            tracing::error!("Database error during login: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    if !verify_password(payload.password, user.password_hash.clone()).await {
        tracing::warn!("Failed login attempt for: {}", user.email);
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    if user.status == "suspended" {
        return error(StatusCode::UNAUTHORIZED, "User account is suspended").into_response();
    }

    let token = match create_user_token(&user) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to create token: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
                .into_response();
        }
    };

    tracing::info!("Successful login for user: {}", user.email);

    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            token,
            user: UserPublic::from(&user),
        }),
    )
        .into_response()
}

/// POST /api/auth/send-reset-code
pub async fn send_reset_code(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<SendResetCodeRequest>,
) -> impl IntoResponse {
    let ip = addr.ip().to_string();
    if !check_rate_limit(&ip).await {
        return error(
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        )
        .into_response();
    }

    if payload.email.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Email is required").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let user = match sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(&payload.email)
        .fetch_optional(pool.as_ref())
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return error(StatusCode::NOT_FOUND, "User not found").into_response(),
        Err(e) => {
            tracing::error!("Database error sending reset code: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let code = generate_verification_code();
    let expires_at = Utc::now() + Duration::minutes(CODE_EXPIRY_MINUTES);

    if let Err(e) = sqlx::query(
        "UPDATE users SET reset_code = $1, reset_code_expires_at = $2, updated_at = now() WHERE id = $3",
    )
    .bind(&code)
    .bind(expires_at)
    .bind(user.id)
    .execute(pool.as_ref())
    .await
    {
        tracing::error!("Failed to store reset code: {}", e);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
    }

    let text = format!(
        "Hello!\n\nYour password reset code is: {}\n\nThe code expires in {} minutes. \
         If you did not request this, please ignore this message.",
        code, CODE_EXPIRY_MINUTES
    );
    if let Err(e) =
        mail::send_email(&user.email, Some(&user.name), "Password reset code", &text).await
    {
        tracing::error!("Failed to send reset code email: {}", e);
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send email").into_response();
    }

    (
        StatusCode::OK,
        Json(MessageResponse::new(format!(
            "Reset code sent to {}",
            user.email
        ))),
    )
        .into_response()
}

/// POST /api/auth/verify-reset-code
pub async fn verify_reset_code(Json(payload): Json<VerifyResetCodeRequest>) -> impl IntoResponse {
    if payload.email.is_empty() || payload.code.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Email and code are required").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    match lookup_reset_user(pool.as_ref(), &payload.email, &payload.code).await {
        Ok(_) => (StatusCode::OK, Json(MessageResponse::new("Code verified"))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/auth/reset-password
pub async fn reset_password(Json(payload): Json<ResetPasswordRequest>) -> impl IntoResponse {
    if payload.email.is_empty() || payload.code.is_empty() || payload.new_password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "All fields are required").into_response();
    }

    if payload.new_password.len() < 8 {
        return error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters long",
        )
        .into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let user = match lookup_reset_user(pool.as_ref(), &payload.email, &payload.code).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    let password_hash = match hash_password(payload.new_password).await {
        Ok(h) => h,
        Err(e) => return e.into_response(),
    };

    match sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $1, reset_code = NULL, reset_code_expires_at = NULL, updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(&password_hash)
    .bind(user.id)
    .execute(pool.as_ref())
    .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(MessageResponse::new("Password reset successfully")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to reset password: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
        }
    }
}

/// Resolve a user by email and validate their stored reset code.
async fn lookup_reset_user(pool: &PgPool, email: &str, code: &str) -> Result<User, HandlerError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!("Database error verifying reset code: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Invalid code. Please try again."))?;

    match (&user.reset_code, &user.reset_code_expires_at) {
        (Some(stored), Some(expires)) if stored == code => {
            if *expires < Utc::now() {
                Err(error(
                    StatusCode::BAD_REQUEST,
                    "Code expired. Please request a new one.",
                ))
            } else {
                Ok(user)
            }
        }
        _ => Err(error(
            StatusCode::BAD_REQUEST,
            "Invalid code. Please try again.",
        )),
    }
}

// ============================================================================
// Handlers — admin auth
// ============================================================================

/// POST /api/admin/auth/login
pub async fn admin_login(Json(payload): Json<LoginRequest>) -> impl IntoResponse {
    if payload.email.is_empty() || payload.password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Email and password are required").into_response();
    }

    let pool = match db_pool() {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };

    let admin = match sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND is_admin = true",
    )
    .bind(&payload.email)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(admin)) => admin,
        Ok(None) => {
            tracing::warn!("Admin login attempt for unknown account: {}", payload.email);
            return error(StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
        }
        Err(e) => {
            tracing::error!("Database error during admin login: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    if !verify_password(payload.password, admin.password_hash.clone()).await {
        tracing::warn!("Failed admin login attempt for: {}", admin.email);
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials").into_response();
    }

    if admin.status == "suspended" {
        return error(StatusCode::UNAUTHORIZED, "User account is suspended").into_response();
    }

    let token = match create_admin_token(&admin) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to create admin token: {}", e);
            return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
                .into_response();
        }
    };

    tracing::info!("Admin login: {}", admin.email);

    (
        StatusCode::OK,
        Json(LoginResponse {
            success: true,
            token,
            user: UserPublic::from(&admin),
        }),
    )
        .into_response()
}

/// Ensure the configured main-admin account exists. Called once at startup
/// after migrations; missing env configuration only logs a warning.
pub async fn ensure_main_admin(pool: &PgPool) {
    let Ok(email) = std::env::var("ADMIN_EMAIL") else {
        tracing::warn!("ADMIN_EMAIL not set; skipping main-admin bootstrap");
        return;
    };
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return;
    }

    let existing: Result<Option<(Uuid,)>, _> =
        sqlx::query_as("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(&email)
            .fetch_optional(pool)
            .await;

    match existing {
        Ok(Some(_)) => {
            tracing::info!("Main admin account already exists");
            return;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Failed to check for main admin: {}", e);
            return;
        }
    }

    let password_hash = if let Ok(h) = std::env::var("ADMIN_HASH_PASSWORD") {
        h
    } else if let Ok(plain) = std::env::var("ADMIN_PASSWORD") {
        match hash(&plain, DEFAULT_COST) {
            Ok(h) => h,
            Err(e) => {
                tracing::error!("Failed to hash ADMIN_PASSWORD: {}", e);
                return;
            }
        }
    } else {
        tracing::warn!(
            "Neither ADMIN_HASH_PASSWORD nor ADMIN_PASSWORD is set; skipping main-admin bootstrap"
        );
        return;
    };

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, surname, email, password_hash, is_admin, admin_role)
        VALUES ('Admin', '', $1, $2, true, 'main')
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .execute(pool)
    .await;

    match result {
        Ok(_) => tracing::info!("Main admin account created: {}", email),
        Err(e) => tracing::error!("Failed to create main admin account: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn auth_router() -> Router {
        use axum::extract::connect_info::MockConnectInfo;
        Router::new()
            .route("/api/auth/signup", post(signup))
            .route("/api/auth/login", post(login))
            .route("/api/auth/send-reset-code", post(send_reset_code))
            .route("/api/auth/verify-reset-code", post(verify_reset_code))
            .route("/api/auth/reset-password", post(reset_password))
            .route("/api/admin/auth/login", post(admin_login))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 12345))))
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            surname: "User".to_string(),
            email: "test@example.com".to_string(),
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
        }
    }

    #[test]
    fn test_user_token_roundtrip() {
        let user = sample_user();
        let token = create_user_token(&user).unwrap();
        let claims = verify_user_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert!(!claims.is_admin);
    }

    #[test]
    fn test_admin_token_carries_role_and_company() {
        let mut admin = sample_user();
        admin.is_admin = true;
        admin.admin_role = Some("company".to_string());
        admin.company_id = Some(Uuid::new_v4());

        let token = create_admin_token(&admin).unwrap();
        let claims = verify_admin_token(&token).unwrap();
        assert_eq!(claims.admin_role, "company");
        assert_eq!(
            claims.company_id.as_deref(),
            Some(admin.company_id.unwrap().to_string().as_str())
        );
    }

    #[test]
    fn test_user_token_is_not_a_valid_admin_token() {
        // User tokens lack the adminRole claim, so the admin decode path
        // must reject them even when both secrets are the default.
        let token = create_user_token(&sample_user()).unwrap();
        assert!(verify_admin_token(&token).is_err());
    }

    #[test]
    fn test_verify_user_token_invalid_returns_err() {
        assert!(verify_user_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_verification_code_is_six_digits() {
        for _ in 0..20 {
            let code = generate_verification_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_require_main_admin_rejects_company_role() {
        let mut admin = sample_user();
        admin.is_admin = true;
        admin.admin_role = Some("company".to_string());
        admin.company_id = Some(Uuid::new_v4());

        let token = create_admin_token(&admin).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {}", token).parse().unwrap());

        let result = require_main_admin(&headers);
        assert!(result.is_err());
        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_require_admin_without_header_is_unauthorized() {
        let headers = HeaderMap::new();
        let result = require_admin(&headers);
        assert!(result.is_err());
        let (status, _) = result.err().unwrap();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signup_missing_fields_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/signup",
            &SignupRequest {
                name: "".to_string(),
                surname: "User".to_string(),
                email: "test@example.com".to_string(),
                password: "password123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signup_short_password_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/signup",
            &SignupRequest {
                name: "Test".to_string(),
                surname: "User".to_string(),
                email: "test@example.com".to_string(),
                password: "short".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_empty_email_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/login",
            &LoginRequest {
                email: "".to_string(),
                password: "password123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_invalid_email_format_returns_bad_request() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/login",
            &LoginRequest {
                email: "no-at-sign".to_string(),
                password: "password123".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reset_password_requires_min_length() {
        let (status, _) = post_json(
            auth_router(),
            "/api/auth/reset-password",
            &ResetPasswordRequest {
                email: "test@example.com".to_string(),
                code: "123456".to_string(),
                new_password: "short".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
