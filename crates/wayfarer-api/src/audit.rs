//! Security audit logging for authentication events
//!
//! Signups, logins, logouts, token refreshes, password changes and access
//! control failures are logged at INFO level with the "audit" target, so
//! they can be filtered and routed separately from application logs.
//!
//! Events never carry passwords or tokens.
//!
//! # Example
//!
//! ```ignore
//! use wayfarer_api::audit::{audit_log, AuditContext, AuditEvent};
//!
//! audit_log(
//!     &AuditEvent::LoginSuccess { user_id: user.id, email: user.email.clone() },
//!     &AuditContext::from_headers(&headers),
//! );
//! ```
//!
//! Author: hephaex@gmail.com

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Security audit events for authentication and authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// New account created
    Signup { user_id: Uuid, email: String },

    /// Successful login
    LoginSuccess { user_id: Uuid, email: String },

    /// Failed login; the reason is internal and never sent to the client
    LoginFailure { email: String, reason: String },

    /// Session ended
    Logout { user_id: Uuid },

    /// Access token minted from a refresh token
    TokenRefresh { user_id: Uuid },

    /// Refresh token rejected
    RefreshRejected { reason: String },

    /// Password changed by its owner
    PasswordChange { user_id: Uuid },

    /// Reset ticket issued and mailed
    PasswordResetRequested { user_id: Uuid },

    /// Reset email could not be delivered; ticket rolled back
    PasswordResetEmailFailed { user_id: Uuid },

    /// Password set through a reset ticket
    PasswordReset { user_id: Uuid },

    /// Account deactivated by its owner
    AccountDeactivated { user_id: Uuid },

    /// Access token rejected by the auth pipeline
    InvalidToken { reason: String },

    /// Authenticated user lacks the required role
    AccessDenied {
        user_id: Uuid,
        role: String,
        path: Option<String>,
    },
}

impl AuditEvent {
    fn description(&self) -> &'static str {
        match self {
            AuditEvent::Signup { .. } => "User signed up",
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::TokenRefresh { .. } => "Access token refreshed",
            AuditEvent::RefreshRejected { .. } => "Refresh token rejected",
            AuditEvent::PasswordChange { .. } => "Password changed",
            AuditEvent::PasswordResetRequested { .. } => "Password reset requested",
            AuditEvent::PasswordResetEmailFailed { .. } => "Password reset email failed",
            AuditEvent::PasswordReset { .. } => "Password reset completed",
            AuditEvent::AccountDeactivated { .. } => "Account deactivated",
            AuditEvent::InvalidToken { .. } => "Invalid token presented",
            AuditEvent::AccessDenied { .. } => "Access denied",
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            AuditEvent::Signup { user_id, .. }
            | AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::Logout { user_id }
            | AuditEvent::TokenRefresh { user_id }
            | AuditEvent::PasswordChange { user_id }
            | AuditEvent::PasswordResetRequested { user_id }
            | AuditEvent::PasswordResetEmailFailed { user_id }
            | AuditEvent::PasswordReset { user_id }
            | AuditEvent::AccountDeactivated { user_id }
            | AuditEvent::AccessDenied { user_id, .. } => Some(*user_id),
            AuditEvent::LoginFailure { .. }
            | AuditEvent::RefreshRejected { .. }
            | AuditEvent::InvalidToken { .. } => None,
        }
    }
}

/// Request metadata attached to audit records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditContext {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Client IP address (from proxy headers)
    pub ip_address: Option<String>,
    /// User agent string
    pub user_agent: Option<String>,
}

impl Default for AuditContext {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            ip_address: None,
            user_agent: None,
        }
    }
}

impl AuditContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            timestamp: Utc::now(),
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Log a security audit event with structured fields
///
/// The event is also serialized to JSON in the `event` field for log
/// aggregators. Example:
///
/// ```json
/// {"event_type":"login_success","user_id":"550e8400-e29b-41d4-a716-446655440000","email":"user@example.com"}
/// ```
pub fn audit_log(event: &AuditEvent, context: &AuditContext) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %context.timestamp,
        event = %event_json,
        user_id = ?event.user_id(),
        ip_address = ?context.ip_address,
        user_agent = ?context.user_agent,
        "{}",
        event.description()
    );
}

/// Extract client IP address from request headers
///
/// Checks `X-Forwarded-For` (first entry) and then `X-Real-IP`.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    // Check X-Forwarded-For (proxy/load balancer)
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            // Take the first IP in the chain (client IP)
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    // Check X-Real-IP (nginx proxy)
    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::LoginSuccess {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"login_success\""));
        assert!(json.contains("test@example.com"));
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        let context = AuditContext {
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: Some("Test Agent".to_string()),
            ..Default::default()
        };

        audit_log(
            &AuditEvent::LoginFailure {
                email: "test@example.com".to_string(),
                reason: "wrong password".to_string(),
            },
            &context,
        );
        audit_log(
            &AuditEvent::AccessDenied {
                user_id: Uuid::new_v4(),
                role: "user".to_string(),
                path: Some("/api/v1/users".to_string()),
            },
            &context,
        );
    }

    #[test]
    fn test_user_id_is_reported() {
        let id = Uuid::new_v4();
        assert_eq!(AuditEvent::Logout { user_id: id }.user_id(), Some(id));
        assert_eq!(
            AuditEvent::InvalidToken {
                reason: "expired".to_string()
            }
            .user_id(),
            None
        );
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.7".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::USER_AGENT, "curl/8.0".parse().unwrap());

        let context = AuditContext::from_headers(&headers);
        assert_eq!(context.user_agent.as_deref(), Some("curl/8.0"));
        assert!(context.ip_address.is_none());
    }
}
