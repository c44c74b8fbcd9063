//! Registration, login and the per-request bearer-token check.
//!
//! Handlers validate the token explicitly at the top of each protected
//! endpoint; there is no auth middleware layer to reason about.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use segmint_core::auth::{hash_password, issue_token, verify_password, verify_token};
use segmint_core::domain::user::{Role, User, UserId};
use segmint_db::repositories::UserRepository;

use crate::respond::{error, ApiError};

#[derive(Clone)]
pub struct AuthContext {
    pub token_secret: Vec<u8>,
    pub token_ttl_secs: u64,
    pub bootstrap_admin: bool,
    pub users: Arc<dyn UserRepository>,
}

pub fn router(context: AuthContext) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .with_state(context)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: ProfileResponse,
}

impl From<&User> for ProfileResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.0.to_string(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            is_active: user.is_active,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared request authentication
// ---------------------------------------------------------------------------

/// Resolves the bearer token to an active user or rejects with 401.
pub async fn authenticate(context: &AuthContext, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Access denied. No token provided."))?;

    let claims = verify_token(&context.token_secret, token, Utc::now())
        .map_err(|_| error(StatusCode::UNAUTHORIZED, "Invalid or expired token."))?;

    let user = context
        .users
        .find_by_id(&claims.user_id)
        .await
        .map_err(|source| {
            warn!(
                event_name = "auth.lookup.failed",
                error = %source,
                "user lookup failed during authentication"
            );
            error(StatusCode::SERVICE_UNAVAILABLE, "Authentication is temporarily unavailable.")
        })?
        .ok_or_else(|| {
            error(StatusCode::UNAUTHORIZED, "Token is valid but user no longer exists.")
        })?;

    if !user.is_active {
        return Err(error(StatusCode::UNAUTHORIZED, "User account has been deactivated."));
    }

    Ok(user)
}

/// authenticate + admin role check.
pub async fn require_admin(context: &AuthContext, headers: &HeaderMap) -> Result<User, ApiError> {
    let user = authenticate(context, headers).await?;
    if !user.is_admin() {
        return Err(error(StatusCode::FORBIDDEN, "Access denied. Admin privileges required."));
    }
    Ok(user)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn register(
    State(context): State<AuthContext>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let email = request.email.trim().to_ascii_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(error(StatusCode::BAD_REQUEST, "A valid email address is required."));
    }
    if request.password.len() < 8 {
        return Err(error(StatusCode::BAD_REQUEST, "Password must be at least 8 characters."));
    }
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "First and last name are required."));
    }

    let existing_users = context
        .users
        .count()
        .await
        .map_err(|_| error(StatusCode::SERVICE_UNAVAILABLE, "Registration is unavailable."))?;
    let role = if existing_users == 0 && context.bootstrap_admin {
        Role::Admin
    } else {
        Role::Member
    };

    let now = Utc::now();
    let user = User {
        id: UserId(Uuid::new_v4()),
        email,
        first_name: request.first_name.trim().to_string(),
        last_name: request.last_name.trim().to_string(),
        role,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let password = hash_password(&request.password);

    if let Err(source) = context.users.create(&user, &password).await {
        if source.is_unique_violation() {
            return Err(error(StatusCode::CONFLICT, "An account with this email already exists."));
        }
        warn!(event_name = "auth.register.failed", error = %source, "user insert failed");
        return Err(error(StatusCode::SERVICE_UNAVAILABLE, "Registration is unavailable."));
    }

    info!(
        event_name = "auth.register.succeeded",
        user_id = %user.id.0,
        role = user.role.as_str(),
        "account registered"
    );

    let token = session_token(&context, &user);
    Ok((StatusCode::CREATED, Json(SessionResponse { token, user: (&user).into() })))
}

pub async fn login(
    State(context): State<AuthContext>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let email = request.email.trim().to_ascii_lowercase();

    let credentials = context
        .users
        .credentials(&email)
        .await
        .map_err(|_| error(StatusCode::SERVICE_UNAVAILABLE, "Login is unavailable."))?;

    let Some((user, record)) = credentials else {
        return Err(error(StatusCode::UNAUTHORIZED, "Invalid email or password."));
    };

    if !verify_password(&request.password, &record.salt, &record.digest) {
        warn!(
            event_name = "auth.login.rejected",
            user_id = %user.id.0,
            "password mismatch"
        );
        return Err(error(StatusCode::UNAUTHORIZED, "Invalid email or password."));
    }

    if !user.is_active {
        return Err(error(StatusCode::UNAUTHORIZED, "User account has been deactivated."));
    }

    let token = session_token(&context, &user);
    Ok(Json(SessionResponse { token, user: (&user).into() }))
}

pub async fn me(
    State(context): State<AuthContext>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = authenticate(&context, &headers).await?;
    Ok(Json((&user).into()))
}

fn session_token(context: &AuthContext, user: &User) -> String {
    issue_token(
        &context.token_secret,
        &user.id,
        Duration::seconds(context.token_ttl_secs as i64),
        Utc::now(),
    )
}
