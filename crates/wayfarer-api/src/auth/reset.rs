//! Password reset tickets
//!
//! A ticket is 32 random bytes, hex-encoded and mailed to the user once.
//! Only its SHA-256 digest and an expiry are stored on the user record.
//! Redeeming sets the new password and clears the ticket in a single
//! conditional write, so a ticket works at most once.

use super::models::{PasswordChange, ResetTicket, User, UserUpdate};
use super::repository::{RepositoryError, UserRepository};
use super::session::hash_token;
use crate::email::{EmailError, EmailSender, OutgoingEmail};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::sync::Arc;
use thiserror::Error;

/// Password reset errors
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("Token is invalid or has expired")]
    InvalidOrExpired,

    #[error("User no longer exists")]
    UnknownUser,

    #[error("Failed to deliver reset email: {0}")]
    Delivery(#[from] EmailError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Creates, mails and redeems reset tickets
#[derive(Clone)]
pub struct PasswordResetFlow {
    users: Arc<dyn UserRepository>,
    mailer: Arc<dyn EmailSender>,
    ttl: Duration,
    public_url: String,
}

impl PasswordResetFlow {
    pub fn new(
        users: Arc<dyn UserRepository>,
        mailer: Arc<dyn EmailSender>,
        ttl_secs: u64,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            mailer,
            ttl: Duration::seconds(ttl_secs.min(u64::from(u32::MAX)) as i64),
            public_url: public_url.into(),
        }
    }

    /// Link the user follows to redeem `raw_token`
    pub fn reset_url(&self, raw_token: &str) -> String {
        format!(
            "{}/api/v1/users/resetPassword/{raw_token}",
            self.public_url.trim_end_matches('/')
        )
    }

    /// Store a fresh ticket for `user` and return the raw token
    ///
    /// Any earlier ticket of the user is overwritten.
    pub async fn create_ticket(&self, user: &User) -> Result<String, ResetError> {
        self.create_ticket_at(user, Utc::now()).await
    }

    /// [`create_ticket`](Self::create_ticket) with an explicit clock
    pub async fn create_ticket_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<String, ResetError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw = hex::encode(bytes);

        let ticket = ResetTicket {
            token_hash: hash_token(&raw),
            expires_at: now + self.ttl,
        };

        self.users
            .update(user.id, UserUpdate::set_reset_ticket(ticket))
            .await?
            .ok_or(ResetError::UnknownUser)?;

        Ok(raw)
    }

    /// Mail the reset link for `raw_token` to the user
    ///
    /// On delivery failure the stored ticket is cleared before the error is
    /// returned, so no redeemable ticket outlives a failed send.
    pub async fn send_ticket(&self, user: &User, raw_token: &str) -> Result<(), ResetError> {
        let reset_url = self.reset_url(raw_token);
        let email = OutgoingEmail::password_reset(
            &user.email,
            &user.name,
            &reset_url,
            self.ttl.num_seconds().max(0) as u64,
        );
        if let Err(send_err) = self.mailer.send(email).await {
            if let Err(cleanup_err) = self
                .users
                .update(user.id, UserUpdate::clear_reset_ticket())
                .await
            {
                tracing::warn!(
                    user_id = %user.id,
                    error = %cleanup_err,
                    "failed to clear reset ticket after email failure"
                );
            }
            return Err(ResetError::Delivery(send_err));
        }

        Ok(())
    }

    /// Consume `raw_token` and apply the password change
    pub async fn redeem(&self, raw_token: &str, change: PasswordChange) -> Result<User, ResetError> {
        self.redeem_at(raw_token, change, Utc::now()).await
    }

    /// [`redeem`](Self::redeem) with an explicit clock
    pub async fn redeem_at(
        &self,
        raw_token: &str,
        change: PasswordChange,
        now: DateTime<Utc>,
    ) -> Result<User, ResetError> {
        if raw_token.is_empty() {
            return Err(ResetError::InvalidOrExpired);
        }

        self.users
            .redeem_reset_ticket(&hash_token(raw_token), now, change)
            .await?
            .ok_or(ResetError::InvalidOrExpired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::NewUser;
    use crate::testing::{FailingMailer, MemoryUserRepository, RecordingMailer};
    use wayfarer_core::Role;

    async fn setup(
        mailer: Arc<dyn EmailSender>,
    ) -> (PasswordResetFlow, Arc<MemoryUserRepository>, User) {
        let users = Arc::new(MemoryUserRepository::default());
        let user = users
            .create(NewUser {
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                role: Role::User,
                password_hash: "old-hash".to_string(),
            })
            .await
            .unwrap();
        let flow = PasswordResetFlow::new(users.clone(), mailer, 600, "http://localhost:8080/");
        (flow, users, user)
    }

    fn change(hash: &str) -> PasswordChange {
        PasswordChange {
            password_hash: hash.to_string(),
            changed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ticket_stores_only_hash() {
        let (flow, users, user) = setup(Arc::new(RecordingMailer::default())).await;

        let raw = flow.create_ticket(&user).await.unwrap();
        assert_eq!(raw.len(), 64);

        let stored = users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_reset_token, Some(hash_token(&raw)));
        assert_ne!(stored.password_reset_token.as_deref(), Some(raw.as_str()));
        assert!(stored.has_live_reset_ticket(Utc::now()));
    }

    #[tokio::test]
    async fn test_redeem_once() {
        let (flow, users, user) = setup(Arc::new(RecordingMailer::default())).await;
        let raw = flow.create_ticket(&user).await.unwrap();

        let updated = flow.redeem(&raw, change("new-hash")).await.unwrap();
        assert_eq!(updated.password_hash, "new-hash");
        assert!(updated.password_reset_token.is_none());
        assert!(updated.password_reset_expires.is_none());
        assert!(updated.password_changed_at.is_some());

        let again = flow.redeem(&raw, change("newer-hash")).await;
        assert!(matches!(again, Err(ResetError::InvalidOrExpired)));

        let stored = users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn test_expired_ticket_is_rejected() {
        let (flow, users, user) = setup(Arc::new(RecordingMailer::default())).await;
        let raw = flow.create_ticket(&user).await.unwrap();

        let later = Utc::now() + Duration::minutes(11);
        let result = flow.redeem_at(&raw, change("new-hash"), later).await;
        assert!(matches!(result, Err(ResetError::InvalidOrExpired)));

        let stored = users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "old-hash");
    }

    #[tokio::test]
    async fn test_new_ticket_replaces_old_one() {
        let (flow, _, user) = setup(Arc::new(RecordingMailer::default())).await;
        let first = flow.create_ticket(&user).await.unwrap();
        let second = flow.create_ticket(&user).await.unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            flow.redeem(&first, change("x")).await,
            Err(ResetError::InvalidOrExpired)
        ));
        assert!(flow.redeem(&second, change("y")).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_ticket_delivers_url() {
        let mailer = Arc::new(RecordingMailer::default());
        let (flow, _, user) = setup(mailer.clone()).await;
        let raw = flow.create_ticket(&user).await.unwrap();
        let url = flow.reset_url(&raw);
        assert_eq!(
            url,
            format!("http://localhost:8080/api/v1/users/resetPassword/{raw}")
        );

        flow.send_ticket(&user, &raw).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert!(sent[0].body.contains(&url));
    }

    #[tokio::test]
    async fn test_subject_reflects_configured_ttl() {
        let mailer = Arc::new(RecordingMailer::default());
        let (_, users, user) = setup(mailer.clone()).await;
        let flow = PasswordResetFlow::new(users, mailer.clone(), 1800, "http://localhost:8080");

        let raw = flow.create_ticket(&user).await.unwrap();
        flow.send_ticket(&user, &raw).await.unwrap();

        assert_eq!(
            mailer.sent()[0].subject,
            "Your password reset token (valid for 30 minutes)"
        );
    }

    #[tokio::test]
    async fn test_send_failure_clears_ticket() {
        let (flow, users, user) = setup(Arc::new(FailingMailer)).await;
        let raw = flow.create_ticket(&user).await.unwrap();

        let result = flow.send_ticket(&user, &raw).await;
        assert!(matches!(result, Err(ResetError::Delivery(_))));

        let stored = users.find_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.password_reset_token.is_none());
        assert!(stored.password_reset_expires.is_none());
    }
}
