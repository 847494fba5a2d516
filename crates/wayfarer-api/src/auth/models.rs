//! Data models for authentication and session management
//!
//! This module defines the core data structures for the auth system:
//! - User: account record including credential and reset-ticket fields
//! - RefreshSession: the single stored refresh token of a user
//! - Request and response bodies of the auth endpoints
//!
//! These models map to the `users` and `refresh_sessions` tables.

use super::password::validate_password_strength;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;
use wayfarer_core::Role;

/// User account record
///
/// Credential fields never leave the service: responses use [`UserPublic`]
/// and the `Debug` output redacts them.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Trimmed, lowercase, unique
    pub email: String,
    pub role: Role,
    /// Argon2id PHC string
    pub password_hash: String,
    /// Set whenever the password changes; tokens issued earlier are stale
    pub password_changed_at: Option<DateTime<Utc>>,
    /// SHA-256 hex of the outstanding reset token
    pub password_reset_token: Option<String>,
    pub password_reset_expires: Option<DateTime<Utc>>,
    /// Soft-delete marker
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("password_hash", &"<redacted>")
            .field("password_changed_at", &self.password_changed_at)
            .field(
                "password_reset_token",
                &self.password_reset_token.as_ref().map(|_| "<redacted>"),
            )
            .field("password_reset_expires", &self.password_reset_expires)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl User {
    /// Whether the password changed after a token was issued
    pub fn changed_password_after(&self, issued_at: DateTime<Utc>) -> bool {
        self.password_changed_at
            .map(|changed| changed > issued_at)
            .unwrap_or(false)
    }

    /// Whether an unexpired reset ticket is outstanding
    pub fn has_live_reset_ticket(&self, now: DateTime<Utc>) -> bool {
        self.password_reset_token.is_some()
            && self.password_reset_expires.map(|exp| exp > now).unwrap_or(false)
    }

    /// Convert user to public representation (without sensitive fields)
    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields of a user about to be created
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

/// A new password hash and the moment it took effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordChange {
    pub password_hash: String,
    pub changed_at: DateTime<Utc>,
}

/// Stored half of a password reset ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetTicket {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Partial update of a user record; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<PasswordChange>,
    /// `Some(None)` clears the ticket
    pub reset_ticket: Option<Option<ResetTicket>>,
    pub active: Option<bool>,
}

impl UserUpdate {
    pub fn set_reset_ticket(ticket: ResetTicket) -> Self {
        Self {
            reset_ticket: Some(Some(ticket)),
            ..Default::default()
        }
    }

    pub fn clear_reset_ticket() -> Self {
        Self {
            reset_ticket: Some(None),
            ..Default::default()
        }
    }

    pub fn password(change: PasswordChange) -> Self {
        Self {
            password: Some(change),
            ..Default::default()
        }
    }

    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.reset_ticket.is_none()
            && self.active.is_none()
    }
}

/// Refresh session model
///
/// At most one per user; `token_hash` is the SHA-256 hex of the refresh
/// token handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Requests
// ============================================================================

/// Signup request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100, message = "Please tell us your name!"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords are not the same!"))]
    pub password_confirm: String,
    pub role: Option<Role>,
}

/// Login request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Please provide email and password!"))]
    pub email: String,
    #[validate(length(min = 1, message = "Please provide email and password!"))]
    pub password: String,
}

/// Forgot password request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
}

/// Reset password request (the token travels in the path)
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordRequest {
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords are not the same!"))]
    pub password_confirm: String,
}

/// Change password request for the current user
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePasswordRequest {
    #[validate(length(min = 1, message = "Please provide your current password"))]
    pub current_password: String,
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords are not the same!"))]
    pub password_confirm: String,
}

/// Token refresh request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Please provide a refresh token"))]
    pub refresh_token: String,
}

/// Profile update request for the current user
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateMeRequest {
    #[validate(length(min = 1, max = 100, message = "A name must have 1 to 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    /// Rejected when present; passwords change through /updateMyPassword
    pub password: Option<String>,
    /// Rejected when present
    pub password_confirm: Option<String>,
}

/// Pagination for the admin user listing
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(default)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// Page size (default 50, at most 100)
    pub limit: i64,
    /// Number of users to skip
    pub offset: i64,
}

impl Default for ListUsersQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl ListUsersQuery {
    pub const MAX_LIMIT: i64 = 100;

    /// Limit and offset clamped to sane bounds
    pub fn bounds(&self) -> (i64, i64) {
        (self.limit.clamp(1, Self::MAX_LIMIT), self.offset.max(0))
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Access and refresh token issued together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Wrapper for a single user payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserData {
    pub user: UserPublic,
}

/// Authentication response with tokens
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub status: String,
    pub token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub data: UserData,
}

impl AuthResponse {
    pub fn new(user: &User, tokens: TokenPair) -> Self {
        Self {
            status: "success".to_string(),
            token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            data: UserData {
                user: user.to_public(),
            },
        }
    }
}

/// Response of a token refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub status: String,
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Plain status/message response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

impl MessageResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

/// Single user response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub status: String,
    pub data: UserData,
}

impl UserResponse {
    pub fn new(user: &User) -> Self {
        Self {
            status: "success".to_string(),
            data: UserData {
                user: user.to_public(),
            },
        }
    }
}

/// Wrapper for a user list payload
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsersData {
    pub users: Vec<UserPublic>,
}

/// User list response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsersResponse {
    pub status: String,
    pub results: usize,
    pub data: UsersData,
}
