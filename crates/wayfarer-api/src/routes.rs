//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::middleware::{optional_auth, require_auth, restrict_to};
use crate::handlers::{auth, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use wayfarer_core::Role;

/// Create the `/api/v1/users` routes
pub fn user_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/forgotPassword", post(auth::forgot_password))
        .route("/resetPassword/:token", patch(auth::reset_password))
        .route("/refreshToken", post(auth::refresh_token));

    // Works with or without a valid token
    let optional_routes = Router::new()
        .route("/logout", get(auth::logout))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/updateMyPassword", patch(auth::update_my_password))
        .route("/me", get(users::get_me))
        .route("/updateMe", patch(users::update_me))
        .route("/deleteMe", delete(users::delete_me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Admin routes; the role check runs after authentication
    let admin_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id", get(users::get_user))
        .route_layer(middleware::from_fn(restrict_to(&[Role::Admin])))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .merge(public_routes)
        .merge(optional_routes)
        .merge(protected_routes)
        .merge(admin_routes)
}
