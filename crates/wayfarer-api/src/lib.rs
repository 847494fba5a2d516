//! Wayfarer API - authentication and session lifecycle server
//!
//! Provides signup, login, token refresh, password reset and user
//! self-service endpoints under `/api/v1/users`.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod email;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Wayfarer API",
        description = "Authentication and session lifecycle API",
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::auth::signup,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::refresh_token,
        handlers::auth::update_my_password,
        handlers::users::get_me,
        handlers::users::update_me,
        handlers::users::delete_me,
        handlers::users::list_users,
        handlers::users::get_user,
    ),
    components(
        schemas(
            auth::models::SignupRequest,
            auth::models::LoginRequest,
            auth::models::ForgotPasswordRequest,
            auth::models::ResetPasswordRequest,
            auth::models::UpdatePasswordRequest,
            auth::models::RefreshRequest,
            auth::models::UpdateMeRequest,
            auth::models::AuthResponse,
            auth::models::RefreshResponse,
            auth::models::MessageResponse,
            auth::models::UserResponse,
            auth::models::UsersResponse,
            auth::models::UserData,
            auth::models::UsersData,
            auth::models::UserPublic,
            wayfarer_core::Role,
            error::ApiError,
            handlers::health::HealthResponse,
            handlers::health::ReadinessResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and readiness checks"),
        (name = "auth", description = "Signup, login, tokens and passwords"),
        (name = "users", description = "Self-service and admin user endpoints"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the CORS layer from the configured origins
///
/// Without configured origins any origin is allowed, but credentials are not.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    if origins.is_empty() {
        tracing::warn!("CORS_ORIGINS not configured, allowing all origins without credentials");
        return base.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(origins).allow_credentials(true)
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let cors = cors_layer(&server.cors_origins);
    let body_limit = RequestBodyLimitLayer::new(server.max_body_size);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .nest("/api/v1/users", routes::user_routes(state.clone()))
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
