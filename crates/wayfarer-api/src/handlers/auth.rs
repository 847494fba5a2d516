//! Authentication API handlers
//!
//! Signup, login, logout, token refresh and password management under
//! `/api/v1/users`. Token-issuing endpoints return the tokens in the body
//! and set the access token cookie.
//!
//! Author: hephaex@gmail.com

use super::{detached, AppJson};
use crate::audit::AuditContext;
use crate::auth::cookie::{cleared_cookie, token_cookie};
use crate::auth::models::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, RefreshRequest,
    RefreshResponse, ResetPasswordRequest, SignupRequest, TokenPair, UpdatePasswordRequest, User,
};
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

type SetCookie = [(header::HeaderName, HeaderValue); 1];

pub(crate) fn set_cookie(
    value: Result<HeaderValue, header::InvalidHeaderValue>,
) -> Result<SetCookie, AppError> {
    let value = value.map_err(|e| AppError::Internal(format!("invalid cookie value: {e}")))?;
    Ok([(header::SET_COOKIE, value)])
}

/// Token pair response with the access token cookie set
fn token_response(
    state: &AppState,
    status: StatusCode,
    user: &User,
    tokens: TokenPair,
) -> Result<Response, AppError> {
    let cookie = set_cookie(token_cookie(&state.config.cookie, &tokens.access_token))?;
    Ok((status, cookie, Json(AuthResponse::new(user, tokens))).into_response())
}

/// Create a new account
///
/// Creates the user and logs them in. The role defaults to `user`.
///
/// # Responses
///
/// * `201 Created` - Account created, tokens issued
/// * `400 Bad Request` - Invalid input or email already in use
#[utoipa::path(
    post,
    path = "/api/v1/users/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created and logged in", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 500, description = "Internal server error", body = crate::error::ApiError),
    )
)]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(request): AppJson<SignupRequest>,
) -> Result<Response, AppError> {
    let context = AuditContext::from_headers(&headers);
    let service = state.auth.clone();
    let (user, tokens) = detached(async move { service.signup(request, &context).await }).await?;

    token_response(&state, StatusCode::CREATED, &user, tokens)
}

/// Login with email and password
///
/// # Responses
///
/// * `200 OK` - Authentication successful, returns tokens
/// * `400 Bad Request` - Email or password missing
/// * `401 Unauthorized` - Incorrect email or password
#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing credentials", body = crate::error::ApiError),
        (status = 401, description = "Incorrect email or password", body = crate::error::ApiError),
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Response, AppError> {
    let context = AuditContext::from_headers(&headers);
    let service = state.auth.clone();
    let (user, tokens) = detached(async move { service.login(request, &context).await }).await?;

    token_response(&state, StatusCode::OK, &user, tokens)
}

/// Logout
///
/// Ends the caller's refresh session when a valid token is presented and
/// always overwrites the token cookie.
#[utoipa::path(
    get,
    path = "/api/v1/users/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    current: Option<CurrentUser>,
) -> Result<Response, AppError> {
    let context = AuditContext::from_headers(&headers);
    let service = state.auth.clone();
    let user = current.map(|c| c.0.user);
    detached(async move { service.logout(user.as_ref(), &context).await }).await?;

    let cookie = set_cookie(cleared_cookie(&state.config.cookie))?;
    Ok((cookie, Json(MessageResponse::success("Logged out"))).into_response())
}

/// Request a password reset email
///
/// # Responses
///
/// * `200 OK` - Reset link sent
/// * `404 Not Found` - No user with this email
/// * `500 Internal Server Error` - Email could not be sent
#[utoipa::path(
    post,
    path = "/api/v1/users/forgotPassword",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset token sent to email", body = MessageResponse),
        (status = 400, description = "Invalid email", body = crate::error::ApiError),
        (status = 404, description = "Unknown email", body = crate::error::ApiError),
        (status = 500, description = "Email delivery failed", body = crate::error::ApiError),
    )
)]
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(request): AppJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let context = AuditContext::from_headers(&headers);
    let service = state.auth.clone();
    detached(async move { service.forgot_password(request, &context).await }).await?;

    Ok(Json(MessageResponse::success("Token sent to email!")))
}

/// Set a new password with a reset token
#[utoipa::path(
    patch,
    path = "/api/v1/users/resetPassword/{token}",
    tag = "auth",
    params(("token" = String, Path, description = "Reset token from the email")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset, tokens issued", body = AuthResponse),
        (status = 400, description = "Token invalid or expired", body = crate::error::ApiError),
    )
)]
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(token): Path<String>,
    AppJson(request): AppJson<ResetPasswordRequest>,
) -> Result<Response, AppError> {
    let context = AuditContext::from_headers(&headers);
    let service = state.auth.clone();
    let (user, tokens) = detached(async move {
        service.reset_password(&token, request, &context).await
    })
    .await?;

    token_response(&state, StatusCode::OK, &user, tokens)
}

/// Exchange a refresh token for a new access token
///
/// Only the access token is renewed; the refresh token stays valid until
/// the next login.
#[utoipa::path(
    post,
    path = "/api/v1/users/refreshToken",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Invalid refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(request): AppJson<RefreshRequest>,
) -> Result<Response, AppError> {
    let context = AuditContext::from_headers(&headers);
    let (_, access_token) = state
        .auth
        .refresh(&request.refresh_token, &context)
        .await?;

    let cookie = set_cookie(token_cookie(&state.config.cookie, &access_token))?;
    let body = RefreshResponse {
        status: "success".to_string(),
        token: access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.auth.access_ttl_secs(),
    };

    Ok((cookie, Json(body)).into_response())
}

/// Change the current user's password
///
/// Tokens issued before the change stop working; a fresh pair is returned.
#[utoipa::path(
    patch,
    path = "/api/v1/users/updateMyPassword",
    tag = "auth",
    request_body = UpdatePasswordRequest,
    responses(
        (status = 200, description = "Password changed, tokens issued", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 401, description = "Not logged in or current password wrong", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_my_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    CurrentUser(auth): CurrentUser,
    AppJson(request): AppJson<UpdatePasswordRequest>,
) -> Result<Response, AppError> {
    let context = AuditContext::from_headers(&headers);
    let service = state.auth.clone();
    let (user, tokens) = detached(async move {
        service.change_password(&auth.user, request, &context).await
    })
    .await?;

    token_response(&state, StatusCode::OK, &user, tokens)
}
