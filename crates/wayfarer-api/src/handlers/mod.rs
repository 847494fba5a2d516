//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod health;
pub mod users;

use crate::error::AppError;
use axum::{
    extract::{FromRequest, FromRequestParts},
    http::Uri,
};
use std::future::Future;

/// JSON body extractor that rejects with an [`AppError`]
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Query string extractor that rejects with an [`AppError`]
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

/// Path extractor that rejects with an [`AppError`]
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Run a state-changing flow on its own task
///
/// The flow finishes even if the client disconnects and the handler future
/// is dropped.
pub(crate) async fn detached<F, T>(flow: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(flow).await?
}

/// JSON 404 for unknown routes
pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Can't find {} on this server!", uri.path()))
}
