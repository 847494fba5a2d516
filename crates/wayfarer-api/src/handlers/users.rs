//! User self-service and admin handlers
//!
//! Author: hephaex@gmail.com

use super::auth::set_cookie;
use super::{detached, AppJson, AppPath, AppQuery};
use crate::audit::AuditContext;
use crate::auth::cookie::cleared_cookie;
use crate::auth::models::{ListUsersQuery, UpdateMeRequest, UserResponse, UsersData, UsersResponse};
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Get the current user
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not logged in", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(CurrentUser(auth): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::new(&auth.user))
}

/// Update name or email of the current user
///
/// Password fields are rejected; use `updateMyPassword`.
#[utoipa::path(
    patch,
    path = "/api/v1/users/updateMe",
    tag = "users",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input or password fields present", body = crate::error::ApiError),
        (status = 401, description = "Not logged in", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    CurrentUser(auth): CurrentUser,
    AppJson(request): AppJson<UpdateMeRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let service = state.auth.clone();
    let user = detached(async move { service.update_me(&auth.user, request).await }).await?;

    Ok(Json(UserResponse::new(&user)))
}

/// Deactivate the current account
///
/// The account can no longer log in and its refresh session is dropped.
#[utoipa::path(
    delete,
    path = "/api/v1/users/deleteMe",
    tag = "users",
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 401, description = "Not logged in", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    CurrentUser(auth): CurrentUser,
) -> Result<Response, AppError> {
    let context = AuditContext::from_headers(&headers);
    let service = state.auth.clone();
    detached(async move { service.deactivate(&auth.user, &context).await }).await?;

    let cookie = set_cookie(cleared_cookie(&state.config.cookie))?;
    Ok((StatusCode::NO_CONTENT, cookie).into_response())
}

/// List active users (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Active users", body = UsersResponse),
        (status = 401, description = "Not logged in", body = crate::error::ApiError),
        (status = 403, description = "Not an admin", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<ListUsersQuery>,
) -> Result<Json<UsersResponse>, AppError> {
    let users = state.auth.list_users(&query).await?;
    let users: Vec<_> = users.iter().map(|u| u.to_public()).collect();

    Ok(Json(UsersResponse {
        status: "success".to_string(),
        results: users.len(),
        data: UsersData { users },
    }))
}

/// Get a user by id (admin only)
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 400, description = "Malformed id", body = crate::error::ApiError),
        (status = 403, description = "Not an admin", body = crate::error::ApiError),
        (status = 404, description = "No user with that id", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.auth.get_user(id).await?;
    Ok(Json(UserResponse::new(&user)))
}
