//! Wayfarer Core - Domain vocabulary and configuration
//!
//! This crate defines the pieces shared by every Wayfarer binary:
//! - User roles used for authorization decisions
//! - Configuration management (environment variables and TOML files)

pub mod config;

pub use config::{
    AppConfig, AuthConfig, ConfigError, CookieConfig, DatabaseConfig, EmailConfig, Environment,
    LoggingConfig, PasswordHashConfig, ServerConfig,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

// ============================================================================
// Roles
// ============================================================================

/// Access level of an account
///
/// - `User`: regular customer account (default on signup)
/// - `Guide`: tour guide
/// - `LeadGuide`: lead tour guide
/// - `Admin`: administrator with user management rights
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    /// Every role, in ascending order of privilege
    pub const ALL: [Role; 4] = [Role::User, Role::Guide, Role::LeadGuide, Role::Admin];

    /// Wire and storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known role
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("LEAD-GUIDE".parse::<Role>().unwrap(), Role::LeadGuide);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Role::LeadGuide).unwrap();
        assert_eq!(json, "\"lead-guide\"");

        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_default_role_is_user() {
        assert_eq!(Role::default(), Role::User);
    }
}
