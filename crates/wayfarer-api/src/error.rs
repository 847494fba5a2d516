//! API error handling
//!
//! Every failure that reaches the HTTP boundary is an [`AppError`]. Client
//! errors carry a user-facing message; server errors log their detail and
//! answer with a generic message.
//!
//! Author: hephaex@gmail.com

use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use crate::auth::repository::RepositoryError;
use crate::auth::reset::ResetError;
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// `fail` for client errors, `error` for server errors
    pub status: String,
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = if status.is_server_error() {
            "error"
        } else {
            "fail"
        };
        Self {
            status: kind.to_string(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Application error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Missing, invalid, expired or stale credentials (401)
    Unauthenticated(String),
    /// Authenticated but not permitted (403)
    Forbidden(String),
    /// Unknown resource (404)
    NotFound(String),
    /// Malformed or rejected input (400)
    Validation(String),
    /// Outgoing email could not be delivered (500)
    DeliveryFailure(String),
    /// Unexpected fault; the detail is logged, never returned (500)
    Internal(String),
    /// Store fault; the detail is logged, never returned (500)
    Database(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DeliveryFailure(_) | AppError::Internal(_) | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::Unauthenticated(msg) => write!(f, "unauthenticated: {msg}"),
            AppError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::Validation(msg) => write!(f, "validation failed: {msg}"),
            AppError::DeliveryFailure(msg) => write!(f, "delivery failed: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
            AppError::Database(msg) => write!(f, "database error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = match self {
            AppError::Unauthenticated(msg) => ApiError::new(status, "UNAUTHENTICATED", msg),
            AppError::Forbidden(msg) => ApiError::new(status, "FORBIDDEN", msg),
            AppError::NotFound(msg) => ApiError::new(status, "NOT_FOUND", msg),
            AppError::Validation(msg) => ApiError::new(status, "VALIDATION_FAILED", msg),
            AppError::DeliveryFailure(msg) => ApiError::new(status, "DELIVERY_FAILED", msg),
            AppError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                ApiError::new(status, "INTERNAL_ERROR", "Something went wrong!")
            }
            AppError::Database(detail) => {
                tracing::error!(detail = %detail, "database error");
                ApiError::new(status, "DATABASE_ERROR", "Something went wrong!")
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("Invalid value for {field}"),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(format!("Invalid input data. {}", messages.join(". ")))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task failed: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(format!("Invalid path parameter: {}", rejection.body_text()))
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::EmailAlreadyExists => AppError::Validation(
                "This email is already in use. Please use another one!".to_string(),
            ),
            RepositoryError::DatabaseError(detail) => AppError::Database(detail),
            RepositoryError::CorruptRecord(detail) => AppError::Internal(detail),
        }
    }
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError(detail) => AppError::Internal(detail),
            JwtError::InvalidToken | JwtError::ExpiredToken => AppError::Unauthenticated(
                "Invalid or expired token. Please log in again.".to_string(),
            ),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ResetError> for AppError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::InvalidOrExpired => {
                AppError::Validation("Token is invalid or has expired".to_string())
            }
            ResetError::UnknownUser => {
                AppError::NotFound("There is no user with this email address.".to_string())
            }
            ResetError::Delivery(_) => AppError::DeliveryFailure(
                "There was an error sending the email. Try again later!".to_string(),
            ),
            ResetError::Repository(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::DeliveryFailure("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_client_error_body() {
        let response = AppError::Forbidden("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let json = body_json(response).await;
        assert_eq!(json["status"], "fail");
        assert_eq!(json["code"], "FORBIDDEN");
        assert_eq!(json["message"], "nope");
    }

    #[test]
    fn test_domain_error_mapping() {
        assert_eq!(
            AppError::from(ResetError::InvalidOrExpired),
            AppError::Validation("Token is invalid or has expired".to_string())
        );
        assert_eq!(
            AppError::from(JwtError::ExpiredToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(RepositoryError::EmailAlreadyExists).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert!(matches!(
            AppError::from(RepositoryError::DatabaseError("down".into())),
            AppError::Database(_)
        ));
    }

    #[tokio::test]
    async fn test_internal_error_hides_detail() {
        let response =
            AppError::Database("relation \"users\" does not exist".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["status"], "error");
        assert!(!json.to_string().contains("relation"));
    }
}
