//! Authentication: signup, login, bearer-token sessions.
//!
//! Session tokens are random 32-byte hex strings; only their SHA-256 hash is
//! stored. The configured service token is accepted everywhere a session
//! token is, compared in constant time.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{AuthSession, LoginRequest, LoginResponse, SignupRequest, User, UserResponse};
use crate::util::now_rfc3339;
use crate::AppState;

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

async fn create_session(state: &AppState, user_id: &str) -> Result<String, ApiError> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let expires_at = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(state.config.auth.session_ttl_days))
        .ok_or_else(|| ApiError::internal("Session expiry overflow"))?
        .to_rfc3339();

    sqlx::query(
        "INSERT INTO auth_sessions (id, user_id, token_hash, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&token_hash)
    .bind(&expires_at)
    .execute(&state.db)
    .await?;

    Ok(token)
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_email(&request.email) {
        errors.add("email", e);
    }
    if let Err(e) = validation::validate_password(&request.password) {
        errors.add("password", e);
    }
    if let Err(e) = validation::validate_name(&request.name) {
        errors.add("name", e);
    }
    if let Some(rate) = request.hourly_rate {
        if let Err(e) = validation::validate_amount(rate, "hourly_rate") {
            errors.add("hourly_rate", e);
        }
    }
    errors.finish()?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {e}")))?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, role, hourly_rate) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&request.email)
    .bind(&password_hash)
    .bind(request.name.trim())
    .bind(request.role.to_string())
    .bind(request.hourly_rate)
    .execute(&state.db)
    .await?;

    tracing::info!(user = %id, role = %request.role, "Account created");

    let token = create_session(&state, &id).await?;
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = create_session(&state, &user.id).await?;

    Ok(Json(LoginResponse {
        token,
        user: UserResponse::from(user),
    }))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
) -> Result<StatusCode, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;

    sqlx::query("DELETE FROM auth_sessions WHERE token_hash = ?")
        .bind(hash_token(&token))
        .execute(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Returns the authenticated account, or 401 when the token is invalid.
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Middleware gating the protected API surface.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    if is_service_token(&state, &token) {
        return Ok(next.run(request).await);
    }

    let session: Option<AuthSession> = sqlx::query_as(
        "SELECT * FROM auth_sessions WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(hash_token(&token))
    .fetch_optional(&state.db)
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    match session {
        Some(_) => Ok(next.run(request).await),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

fn is_service_token(state: &AppState, token: &str) -> bool {
    let expected = state.config.auth.service_token.as_bytes();
    let provided = token.as_bytes();
    expected.len() == provided.len() && bool::from(expected.ct_eq(provided))
}

fn extract_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization")?.to_str().ok()?;
    auth_header.strip_prefix("Bearer ").map(str::to_string)
}

pub async fn get_current_user(
    pool: &sqlx::SqlitePool,
    token: &str,
) -> Result<User, StatusCode> {
    let session: Option<AuthSession> = sqlx::query_as(
        "SELECT * FROM auth_sessions WHERE token_hash = ? AND expires_at > datetime('now')",
    )
    .bind(hash_token(token))
    .fetch_optional(pool)
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let session = session.ok_or(StatusCode::UNAUTHORIZED)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    user.ok_or(StatusCode::UNAUTHORIZED)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;

        // The service token authenticates automation, not a person
        if is_service_token(state, &token) {
            let now = now_rfc3339();
            return Ok(User {
                id: "service".to_string(),
                email: "service@tutordesk.local".to_string(),
                password_hash: String::new(),
                name: "Service".to_string(),
                role: "teacher".to_string(),
                hourly_rate: None,
                created_at: now.clone(),
                updated_at: now,
            });
        }

        get_current_user(&state.db, &token).await
    }
}
