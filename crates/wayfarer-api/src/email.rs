//! Outgoing email
//!
//! The auth flows send mail through the [`EmailSender`] trait. [`SmtpMailer`]
//! delivers over SMTP with lettre; [`DisabledMailer`] stands in when no SMTP
//! host is configured and fails every send.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use wayfarer_core::EmailConfig;

/// Email errors
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    BuildError(String),

    #[error("SMTP transport error: {0}")]
    TransportError(String),

    #[error("Email delivery is not configured")]
    Disabled,
}

/// A plain-text message ready to send
#[derive(Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

// Bodies may carry one-time tokens
impl std::fmt::Debug for OutgoingEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingEmail")
            .field("to", &self.to)
            .field("subject", &self.subject)
            .field("body", &"<redacted>")
            .finish()
    }
}

impl OutgoingEmail {
    /// Password reset message pointing at `reset_url`
    ///
    /// The subject states how long the link stays valid.
    pub fn password_reset(to: &str, name: &str, reset_url: &str, valid_for_secs: u64) -> Self {
        let first_name = name.split_whitespace().next().unwrap_or(name);
        let body = format!(
            "Hi {first_name},\n\n\
             Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {reset_url}\n\n\
             If you didn't forget your password, please ignore this email!\n"
        );

        Self {
            to: to.to_string(),
            subject: format!(
                "Your password reset token (valid for {})",
                describe_duration(valid_for_secs)
            ),
            body,
        }
    }
}

fn describe_duration(secs: u64) -> String {
    let (count, unit) = if secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Sends email
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}

/// SMTP delivery through a pooled async lettre transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build a mailer for `host`
    ///
    /// Port 465 uses implicit TLS; any other port uses STARTTLS.
    pub fn new(host: &str, config: &EmailConfig) -> Result<Self, EmailError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("from address: {e}")))?;

        let builder = if config.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| EmailError::TransportError(e.to_string()))?;

        let mut builder = builder
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailSender for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| EmailError::InvalidAddress(format!("recipient: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body)
            .map_err(|e| EmailError::BuildError(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::TransportError(e.to_string()))?;

        tracing::debug!(subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Stand-in used when SMTP is not configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMailer;

#[async_trait]
impl EmailSender for DisabledMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        tracing::warn!(subject = %email.subject, "email delivery is disabled; message dropped");
        Err(EmailError::Disabled)
    }
}

/// Pick the mailer for the given configuration
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn EmailSender>, EmailError> {
    match config.smtp_host.as_deref() {
        Some(host) if !host.trim().is_empty() => Ok(Arc::new(SmtpMailer::new(host.trim(), config)?)),
        _ => {
            tracing::warn!("EMAIL_HOST not set; password reset emails cannot be delivered");
            Ok(Arc::new(DisabledMailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_reset_email() {
        let email = OutgoingEmail::password_reset(
            "ada@example.com",
            "Ada Lovelace",
            "http://localhost:8080/api/v1/users/resetPassword/abc",
            600,
        );

        assert_eq!(email.to, "ada@example.com");
        assert_eq!(email.subject, "Your password reset token (valid for 10 minutes)");
        assert!(email.body.starts_with("Hi Ada,"));
        assert!(email
            .body
            .contains("http://localhost:8080/api/v1/users/resetPassword/abc"));
    }

    #[test]
    fn test_reset_subject_follows_ttl() {
        let subject =
            |secs| OutgoingEmail::password_reset("a@x.com", "A", "http://x", secs).subject;

        assert_eq!(subject(1800), "Your password reset token (valid for 30 minutes)");
        assert_eq!(subject(60), "Your password reset token (valid for 1 minute)");
        assert_eq!(subject(90), "Your password reset token (valid for 90 seconds)");
    }

    #[test]
    fn test_debug_hides_body() {
        let email =
            OutgoingEmail::password_reset("a@x.com", "A", "http://x/secret-token", 600);
        assert!(!format!("{email:?}").contains("secret-token"));
    }

    #[tokio::test]
    async fn test_disabled_mailer_fails() {
        let result = DisabledMailer
            .send(OutgoingEmail::password_reset("a@x.com", "A", "http://x", 600))
            .await;
        assert!(matches!(result, Err(EmailError::Disabled)));
    }

    #[tokio::test]
    async fn test_smtp_mailer_from_config() {
        let config = EmailConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_username: Some("user".to_string()),
            smtp_password: Some("pass".to_string()),
            ..Default::default()
        };
        assert!(mailer_from_config(&config).is_ok());

        let bad_from = EmailConfig {
            from_address: "not a mailbox".to_string(),
            ..config
        };
        assert!(matches!(
            SmtpMailer::new("smtp.example.com", &bad_from),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_no_host_means_disabled() {
        assert!(mailer_from_config(&EmailConfig::default()).is_ok());
    }
}
