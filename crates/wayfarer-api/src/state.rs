//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::repository::{SessionRepository, UserRepository};
use crate::auth::service::AuthService;
use crate::email::EmailSender;
use std::sync::Arc;
use std::time::Instant;
use wayfarer_core::AppConfig;

/// Application state shared across handlers
///
/// Built once at startup and read-only afterwards.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Auth flows over the configured stores and mailer
    pub auth: AuthService,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state from configuration and adapters
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let auth = AuthService::new(
            &config.auth,
            &config.server.public_url,
            users,
            sessions,
            mailer,
        );

        Self {
            config,
            auth,
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
