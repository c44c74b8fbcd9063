use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use segmint_core::domain::user::{Role, UserId};
use segmint_db::repositories::UserProfileUpdate;

use crate::auth::{authenticate, require_admin, AuthContext, ProfileResponse};
use crate::respond::{error, ApiError};

pub fn router(context: AuthContext) -> Router {
    Router::new()
        .route("/api/users", get(list_users))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(deactivate_user),
        )
        .with_state(context)
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

pub async fn list_users(
    State(context): State<AuthContext>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProfileResponse>>, ApiError> {
    require_admin(&context, &headers).await?;

    let users = context
        .users
        .list()
        .await
        .map_err(|_| error(StatusCode::SERVICE_UNAVAILABLE, "User listing is unavailable."))?;

    Ok(Json(users.iter().map(ProfileResponse::from).collect()))
}

pub async fn get_user(
    State(context): State<AuthContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, ApiError> {
    let caller = authenticate(&context, &headers).await?;
    let target = parse_user_id(&id)?;

    if caller.id != target && !caller.is_admin() {
        return Err(error(StatusCode::FORBIDDEN, "Access denied."));
    }

    let user = context
        .users
        .find_by_id(&target)
        .await
        .map_err(|_| error(StatusCode::SERVICE_UNAVAILABLE, "User lookup is unavailable."))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "User not found."))?;

    Ok(Json((&user).into()))
}

pub async fn update_user(
    State(context): State<AuthContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let caller = authenticate(&context, &headers).await?;
    let target = parse_user_id(&id)?;

    if caller.id != target && !caller.is_admin() {
        return Err(error(StatusCode::FORBIDDEN, "Access denied."));
    }
    // role and activation changes stay admin-only even on your own account
    if (request.role.is_some() || request.is_active.is_some()) && !caller.is_admin() {
        return Err(error(StatusCode::FORBIDDEN, "Access denied. Admin privileges required."));
    }

    let updated = context
        .users
        .update_profile(
            &target,
            UserProfileUpdate {
                first_name: request.first_name,
                last_name: request.last_name,
                role: request.role,
                is_active: request.is_active,
            },
        )
        .await
        .map_err(|_| error(StatusCode::SERVICE_UNAVAILABLE, "User update is unavailable."))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "User not found."))?;

    Ok(Json((&updated).into()))
}

pub async fn deactivate_user(
    State(context): State<AuthContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    require_admin(&context, &headers).await?;
    let target = parse_user_id(&id)?;

    let removed = context
        .users
        .deactivate(&target)
        .await
        .map_err(|_| error(StatusCode::SERVICE_UNAVAILABLE, "User update is unavailable."))?;

    if !removed {
        return Err(error(StatusCode::NOT_FOUND, "User not found."));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    Uuid::parse_str(raw)
        .map(UserId)
        .map_err(|_| error(StatusCode::BAD_REQUEST, "Invalid user id."))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::Json;

    use segmint_core::domain::user::Role;
    use segmint_db::repositories::InMemoryUserRepository;

    use crate::auth::{register, AuthContext, RegisterRequest};

    use super::{deactivate_user, get_user, list_users, update_user, UpdateUserRequest};

    fn context() -> AuthContext {
        AuthContext {
            token_secret: b"users-test-secret".to_vec(),
            token_ttl_secs: 3600,
            bootstrap_admin: true,
            users: Arc::new(InMemoryUserRepository::default()),
        }
    }

    async fn account(context: &AuthContext, email: &str) -> (String, String) {
        let (_, Json(session)) = register(
            State(context.clone()),
            Json(RegisterRequest {
                email: email.to_string(),
                password: "long-enough-password".to_string(),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
            }),
        )
        .await
        .expect("registration");
        (session.user.id, session.token)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
        );
        headers
    }

    #[tokio::test]
    async fn admin_lists_users_but_member_cannot() {
        let context = context();
        let (_, admin_token) = account(&context, "admin@example.com").await;
        let (_, member_token) = account(&context, "member@example.com").await;

        let Json(listed) = list_users(State(context.clone()), bearer(&admin_token))
            .await
            .expect("admin listing");
        assert_eq!(listed.len(), 2);

        let (status, _) = list_users(State(context), bearer(&member_token))
            .await
            .expect_err("member listing must fail");
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn member_reads_own_profile_but_not_others() {
        let context = context();
        let (admin_id, _) = account(&context, "admin@example.com").await;
        let (member_id, member_token) = account(&context, "member@example.com").await;

        let Json(own) = get_user(
            State(context.clone()),
            Path(member_id.clone()),
            bearer(&member_token),
        )
        .await
        .expect("own profile");
        assert_eq!(own.id, member_id);

        let (status, _) = get_user(State(context), Path(admin_id), bearer(&member_token))
            .await
            .expect_err("foreign profile must fail");
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn member_cannot_grant_roles() {
        let context = context();
        let (_, _) = account(&context, "admin@example.com").await;
        let (member_id, member_token) = account(&context, "member@example.com").await;

        let (status, _) = update_user(
            State(context),
            Path(member_id),
            bearer(&member_token),
            Json(UpdateUserRequest {
                first_name: None,
                last_name: None,
                role: Some(Role::Admin),
                is_active: None,
            }),
        )
        .await
        .expect_err("self-promotion must fail");

        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_deactivates_an_account() {
        let context = context();
        let (_, admin_token) = account(&context, "admin@example.com").await;
        let (member_id, member_token) = account(&context, "member@example.com").await;

        let status =
            deactivate_user(State(context.clone()), Path(member_id.clone()), bearer(&admin_token))
                .await
                .expect("deactivation");
        assert_eq!(status, StatusCode::NO_CONTENT);

        // the deactivated member's token no longer authenticates
        let (status, _) = get_user(State(context), Path(member_id), bearer(&member_token))
            .await
            .expect_err("deactivated account must be rejected");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_user_id_is_a_bad_request() {
        let context = context();
        let (_, admin_token) = account(&context, "admin@example.com").await;

        let (status, _) = get_user(
            State(context),
            Path("not-a-uuid".to_string()),
            bearer(&admin_token),
        )
        .await
        .expect_err("invalid id must fail");

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
