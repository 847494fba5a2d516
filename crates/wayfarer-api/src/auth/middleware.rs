//! Authentication middleware for protecting routes
//!
//! The pipeline runs five steps, each a standalone function so it can be
//! tested on its own:
//!
//! 1. [`extract_token`]: `Authorization: Bearer <token>`, else the token cookie
//! 2. [`verify_token`]: signature and expiry against the access secret
//! 3. [`resolve_user`]: load the (active) user named by the token subject
//! 4. [`check_freshness`]: reject tokens issued before the last password change
//! 5. attach an [`AuthContext`] to the request extensions
//!
//! [`require_auth`] fails the request on any step; [`optional_auth`] carries
//! on without a context. [`restrict_to`] then checks the role.

use super::cookie::{read_cookie, LOGGED_OUT};
use super::jwt::{JwtError, TokenIssuer, TokenKind, VerifiedToken};
use super::models::User;
use super::repository::{RepositoryError, UserRepository};
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use wayfarer_core::Role;

/// Identity resolved for the current request
///
/// Placed in the request extensions by [`require_auth`] or [`optional_auth`]
/// and never modified afterwards.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub token_issued_at: DateTime<Utc>,
}

/// Authentication middleware errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token presented")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    #[error("Token subject no longer exists")]
    UserNotFound,

    #[error("Password changed after token was issued")]
    PasswordChanged,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Role check ran without an authenticated user")]
    MissingContext,

    #[error("User lookup failed: {0}")]
    Lookup(#[from] RepositoryError),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => AppError::Unauthenticated(
                "You are not logged in! Please log in to get access.".to_string(),
            ),
            AuthError::InvalidToken(_) => AppError::Unauthenticated(
                "Invalid or expired token. Please log in again.".to_string(),
            ),
            AuthError::UserNotFound => AppError::Unauthenticated(
                "The user belonging to this token no longer exists.".to_string(),
            ),
            AuthError::PasswordChanged => AppError::Unauthenticated(
                "User recently changed password! Please log in again.".to_string(),
            ),
            AuthError::InsufficientPermissions => AppError::Forbidden(
                "You do not have permission to perform this action".to_string(),
            ),
            AuthError::MissingContext => AppError::Internal(err.to_string()),
            AuthError::Lookup(e) => AppError::Database(e.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// Step 1: find the presented access token
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Result<String, AuthError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Ok(token.to_string());
    }

    read_cookie(headers, cookie_name)
        .filter(|token| token != LOGGED_OUT)
        .ok_or(AuthError::MissingToken)
}

/// Step 2: check signature and expiry
pub fn verify_token(tokens: &TokenIssuer, token: &str) -> Result<VerifiedToken, AuthError> {
    Ok(tokens.verify(token, TokenKind::Access)?)
}

/// Step 3: load the user the token was issued to
pub async fn resolve_user(
    users: &dyn UserRepository,
    token: &VerifiedToken,
) -> Result<User, AuthError> {
    users
        .find_by_id(token.subject)
        .await?
        .ok_or(AuthError::UserNotFound)
}

/// Step 4: reject tokens older than the last password change
pub fn check_freshness(user: &User, token: &VerifiedToken) -> Result<(), AuthError> {
    if user.changed_password_after(token.issued_at) {
        return Err(AuthError::PasswordChanged);
    }
    Ok(())
}

/// Run steps 1 to 4 against the request headers
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
    let token = extract_token(headers, &state.config.cookie.name)?;
    let verified = verify_token(state.auth.tokens(), &token)?;
    let user = resolve_user(state.auth.users(), &verified).await?;
    check_freshness(&user, &verified)?;

    Ok(AuthContext {
        user,
        token_issued_at: verified.issued_at,
    })
}

/// Authentication middleware that requires a valid access token
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
///
/// let app = Router::new()
///     .route("/me", get(get_me))
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));
/// ```
///
/// Handlers read the identity through the [`CurrentUser`] extractor.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let outcome = authenticate(&state, request.headers()).await;
    match outcome {
        Ok(context) => {
            request.extensions_mut().insert(context);
            Ok(next.run(request).await)
        }
        Err(err) => {
            if !matches!(err, AuthError::MissingToken | AuthError::Lookup(_)) {
                audit_log(
                    &AuditEvent::InvalidToken {
                        reason: err.to_string(),
                    },
                    &AuditContext::from_headers(request.headers()),
                );
            }
            Err(err)
        }
    }
}

/// Optional authentication middleware
///
/// Attaches an [`AuthContext`] when a valid token is present and carries on
/// without one otherwise.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let outcome = authenticate(&state, request.headers()).await;
    match outcome {
        Ok(context) => {
            request.extensions_mut().insert(context);
        }
        Err(AuthError::Lookup(e)) => {
            tracing::warn!(error = %e, "optional authentication lookup failed");
        }
        Err(_) => {}
    }

    next.run(request).await
}

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>;

/// Middleware factory for role-based access control
///
/// Must be layered inside [`require_auth`]. There is no implicit admin
/// bypass: admins pass only when `Role::Admin` is listed.
///
/// # Example
///
/// ```ignore
/// let admin = Router::new()
///     .route("/", get(list_users))
///     .route_layer(middleware::from_fn(restrict_to(&[Role::Admin])))
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));
/// ```
pub fn restrict_to(
    roles: &'static [Role],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let Some(context) = request.extensions().get::<AuthContext>() else {
                tracing::error!(
                    path = %request.uri().path(),
                    "restrict_to used on a route without require_auth"
                );
                return Err(AuthError::MissingContext);
            };

            if !roles.contains(&context.user.role) {
                audit_log(
                    &AuditEvent::AccessDenied {
                        user_id: context.user.id,
                        role: context.user.role.to_string(),
                        path: Some(request.uri().path().to_string()),
                    },
                    &AuditContext::from_headers(request.headers()),
                );
                return Err(AuthError::InsufficientPermissions);
            }

            Ok(next.run(request).await)
        })
    }
}

/// Extractor for the authenticated user
///
/// Rejects with a 500 when the route is not behind an auth middleware;
/// use `Option<CurrentUser>` on routes behind [`optional_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthContext);

impl CurrentUser {
    pub fn user(&self) -> &User {
        &self.0.user
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Internal("no auth context on request".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), value.parse().unwrap());
        }
        map
    }

    fn user(changed_at: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "a@x.com".to_string(),
            role: Role::User,
            password_hash: "hash".to_string(),
            password_changed_at: changed_at,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn token_at(issued_at: DateTime<Utc>) -> VerifiedToken {
        VerifiedToken {
            subject: Uuid::new_v4(),
            issued_at,
            expires_at: issued_at + Duration::hours(1),
            jti: "jti".to_string(),
        }
    }

    #[test]
    fn test_extract_bearer_token() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer abc.def.ghi")]);
        assert_eq!(extract_token(&map, "jwt").unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_bearer_takes_precedence_over_cookie() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "jwt=from-cookie"),
        ]);
        assert_eq!(extract_token(&map, "jwt").unwrap(), "from-header");
    }

    #[test]
    fn test_extract_cookie_token() {
        let map = headers(&[(header::COOKIE, "jwt=from-cookie")]);
        assert_eq!(extract_token(&map, "jwt").unwrap(), "from-cookie");

        let map = headers(&[(header::COOKIE, "session=from-cookie")]);
        assert_eq!(extract_token(&map, "session").unwrap(), "from-cookie");
    }

    #[test]
    fn test_missing_token() {
        assert!(matches!(
            extract_token(&HeaderMap::new(), "jwt"),
            Err(AuthError::MissingToken)
        ));

        let basic = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert!(matches!(
            extract_token(&basic, "jwt"),
            Err(AuthError::MissingToken)
        ));

        let logged_out = headers(&[(header::COOKIE, "jwt=loggedout")]);
        assert!(matches!(
            extract_token(&logged_out, "jwt"),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_freshness() {
        let issued_at = Utc::now();

        assert!(check_freshness(&user(None), &token_at(issued_at)).is_ok());
        assert!(check_freshness(
            &user(Some(issued_at - Duration::milliseconds(5))),
            &token_at(issued_at)
        )
        .is_ok());
        assert!(matches!(
            check_freshness(
                &user(Some(issued_at + Duration::milliseconds(5))),
                &token_at(issued_at)
            ),
            Err(AuthError::PasswordChanged)
        ));
    }

    #[tokio::test]
    async fn test_restrict_to_without_require_auth_is_a_server_error() {
        use axum::{http::StatusCode, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn(restrict_to(&[Role::Admin])));

        let request = axum::http::Request::builder()
            .uri("/admin")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "error",
                "code": "INTERNAL_ERROR",
                "message": "Something went wrong!"
            })
        );
    }

    #[test]
    fn test_error_messages() {
        let cases = [
            (
                AuthError::MissingToken,
                "You are not logged in! Please log in to get access.",
            ),
            (
                AuthError::InvalidToken(JwtError::ExpiredToken),
                "Invalid or expired token. Please log in again.",
            ),
            (
                AuthError::InvalidToken(JwtError::InvalidToken),
                "Invalid or expired token. Please log in again.",
            ),
            (
                AuthError::UserNotFound,
                "The user belonging to this token no longer exists.",
            ),
            (
                AuthError::PasswordChanged,
                "User recently changed password! Please log in again.",
            ),
        ];

        for (err, message) in cases {
            assert_eq!(AppError::from(err), AppError::Unauthenticated(message.to_string()));
        }

        assert!(matches!(
            AppError::from(AuthError::InsufficientPermissions),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            AppError::from(AuthError::MissingContext),
            AppError::Internal(_)
        ));
    }
}
