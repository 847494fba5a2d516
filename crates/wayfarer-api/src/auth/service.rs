//! Authentication service layer
//!
//! Business logic for signup, login, token refresh, logout, password reset,
//! password change and self-service profile updates. Every token pair is
//! minted through [`AuthService::issue_session`], which persists the refresh
//! session before returning, so a caller never holds an unstored refresh
//! token.

use super::jwt::{TokenIssuer, TokenKind};
use super::models::{
    ForgotPasswordRequest, ListUsersQuery, LoginRequest, NewUser, PasswordChange,
    ResetPasswordRequest, SignupRequest, TokenPair, UpdateMeRequest, UpdatePasswordRequest, User,
    UserUpdate,
};
use super::password::{dummy_verify, hash_password, verify_password, MAX_PASSWORD_LEN};
use super::repository::{SessionRepository, UserRepository};
use super::reset::{PasswordResetFlow, ResetError};
use super::session::RefreshSessionStore;
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::email::EmailSender;
use crate::error::AppError;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;
use wayfarer_core::{AuthConfig, PasswordHashConfig, Role};

const INCORRECT_CREDENTIALS: &str = "Incorrect email or password";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Trimmed, lowercase form under which emails are stored and looked up
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Password change timestamp at token precision (milliseconds)
fn changed_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    tokens: Arc<TokenIssuer>,
    users: Arc<dyn UserRepository>,
    sessions: RefreshSessionStore,
    reset: PasswordResetFlow,
    hash_config: PasswordHashConfig,
    allow_signup_role: bool,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        config: &AuthConfig,
        public_url: &str,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            tokens: Arc::new(TokenIssuer::new(config)),
            sessions: RefreshSessionStore::new(sessions, config.session_ttl_secs),
            reset: PasswordResetFlow::new(
                users.clone(),
                mailer,
                config.reset_token_ttl_secs,
                public_url,
            ),
            users,
            hash_config: config.password_hash.clone(),
            allow_signup_role: config.allow_signup_role,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn users(&self) -> &dyn UserRepository {
        self.users.as_ref()
    }

    pub fn sessions(&self) -> &RefreshSessionStore {
        &self.sessions
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> u64 {
        self.tokens.ttl_secs(TokenKind::Access)
    }

    async fn hash(&self, password: String) -> Result<String, AppError> {
        let config = self.hash_config.clone();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password, &config)).await??;
        Ok(hash)
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AppError> {
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await??;
        Ok(valid)
    }

    /// Sign an access and refresh token for `user` and store the refresh session
    ///
    /// Replaces any previous session of the user.
    pub async fn issue_session(&self, user: &User) -> Result<TokenPair, AppError> {
        let access_token = self.tokens.issue_access_token(user.id)?;
        let refresh_token = self.tokens.issue_refresh_token(user.id)?;

        self.sessions.rotate(user.id, &refresh_token).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_secs(),
        })
    }

    /// Register a new user and log them in
    ///
    /// # Returns
    ///
    /// * `Ok((User, TokenPair))` - Created user and its first session
    /// * `Err(AppError::Validation)` - Invalid input or email already registered
    pub async fn signup(
        &self,
        mut request: SignupRequest,
        context: &AuditContext,
    ) -> Result<(User, TokenPair), AppError> {
        request.email = normalize_email(&request.email);
        request.name = request.name.trim().to_string();
        request.validate()?;

        let role = match request.role {
            Some(role) if self.allow_signup_role => role,
            Some(role) => {
                if role != Role::default() {
                    tracing::warn!(
                        email = %request.email,
                        requested = %role,
                        "ignoring role requested at signup"
                    );
                }
                Role::default()
            }
            None => Role::default(),
        };

        let password_hash = self.hash(request.password).await?;

        let user = self
            .users
            .create(NewUser {
                name: request.name,
                email: request.email,
                role,
                password_hash,
            })
            .await?;

        let tokens = self.issue_session(&user).await?;

        audit_log(
            &AuditEvent::Signup {
                user_id: user.id,
                email: user.email.clone(),
            },
            context,
        );

        Ok((user, tokens))
    }

    /// Login with email and password
    ///
    /// Unknown emails and wrong passwords fail identically; a dummy hash
    /// verification runs for unknown emails so timing does not tell them
    /// apart.
    pub async fn login(
        &self,
        request: LoginRequest,
        context: &AuditContext,
    ) -> Result<(User, TokenPair), AppError> {
        let email = normalize_email(&request.email);
        if email.is_empty() || request.password.is_empty() {
            return Err(AppError::Validation(
                "Please provide email and password!".to_string(),
            ));
        }

        // No stored hash can match, so skip the hashing cost entirely
        if request.password.chars().count() > MAX_PASSWORD_LEN {
            audit_log(
                &AuditEvent::LoginFailure {
                    email,
                    reason: "password too long".to_string(),
                },
                context,
            );
            return Err(AppError::Unauthenticated(INCORRECT_CREDENTIALS.to_string()));
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            let config = self.hash_config.clone();
            let password = request.password;
            tokio::task::spawn_blocking(move || dummy_verify(&password, &config)).await?;

            audit_log(
                &AuditEvent::LoginFailure {
                    email,
                    reason: "unknown email".to_string(),
                },
                context,
            );
            return Err(AppError::Unauthenticated(INCORRECT_CREDENTIALS.to_string()));
        };

        if !self
            .verify(request.password, user.password_hash.clone())
            .await?
        {
            audit_log(
                &AuditEvent::LoginFailure {
                    email,
                    reason: "wrong password".to_string(),
                },
                context,
            );
            return Err(AppError::Unauthenticated(INCORRECT_CREDENTIALS.to_string()));
        }

        let tokens = self.issue_session(&user).await?;

        audit_log(
            &AuditEvent::LoginSuccess {
                user_id: user.id,
                email: user.email.clone(),
            },
            context,
        );

        Ok((user, tokens))
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The refresh token must verify against the refresh secret and match
    /// the owner's current session. The session itself is left unchanged.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        context: &AuditContext,
    ) -> Result<(User, String), AppError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AppError::Validation(
                "Please provide a refresh token".to_string(),
            ));
        }

        let reject = |reason: &str| {
            audit_log(
                &AuditEvent::RefreshRejected {
                    reason: reason.to_string(),
                },
                context,
            );
            AppError::Unauthenticated(INVALID_REFRESH_TOKEN.to_string())
        };

        let verified = match self.tokens.verify(refresh_token, TokenKind::Refresh) {
            Ok(verified) => verified,
            Err(e) => return Err(reject(&e.to_string())),
        };

        let Some(session) = self.sessions.find_by_token(refresh_token).await? else {
            return Err(reject("no live session"));
        };
        if session.user_id != verified.subject {
            return Err(reject("session owner mismatch"));
        }

        let user = self
            .users
            .find_by_id(verified.subject)
            .await?
            .ok_or_else(|| {
                AppError::Unauthenticated(
                    "The user belonging to this token no longer exists.".to_string(),
                )
            })?;

        if user.changed_password_after(verified.issued_at) {
            return Err(AppError::Unauthenticated(
                "User recently changed password! Please log in again.".to_string(),
            ));
        }

        let access_token = self.tokens.issue_access_token(user.id)?;

        audit_log(&AuditEvent::TokenRefresh { user_id: user.id }, context);

        Ok((user, access_token))
    }

    /// End the session of `user`, if a user is known
    pub async fn logout(&self, user: Option<&User>, context: &AuditContext) -> Result<(), AppError> {
        if let Some(user) = user {
            self.sessions.revoke(user.id).await?;
            audit_log(&AuditEvent::Logout { user_id: user.id }, context);
        }
        Ok(())
    }

    /// Create a reset ticket and mail it
    ///
    /// If the email cannot be sent, the ticket is rolled back and the call
    /// fails with a delivery error.
    pub async fn forgot_password(
        &self,
        mut request: ForgotPasswordRequest,
        context: &AuditContext,
    ) -> Result<(), AppError> {
        request.email = normalize_email(&request.email);
        request.validate()?;

        let user = self
            .users
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("There is no user with this email address.".to_string())
            })?;

        let raw_token = self.reset.create_ticket(&user).await?;

        match self.reset.send_ticket(&user, &raw_token).await {
            Ok(()) => {
                audit_log(
                    &AuditEvent::PasswordResetRequested { user_id: user.id },
                    context,
                );
                Ok(())
            }
            Err(ResetError::Delivery(e)) => {
                tracing::error!(user_id = %user.id, error = %e, "password reset email failed");
                audit_log(
                    &AuditEvent::PasswordResetEmailFailed { user_id: user.id },
                    context,
                );
                Err(ResetError::Delivery(e).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Redeem a reset ticket, set the new password and log the user in
    pub async fn reset_password(
        &self,
        raw_token: &str,
        request: ResetPasswordRequest,
        context: &AuditContext,
    ) -> Result<(User, TokenPair), AppError> {
        request.validate()?;

        let change = PasswordChange {
            password_hash: self.hash(request.password).await?,
            changed_at: changed_now(),
        };
        let user = self.reset.redeem(raw_token, change).await?;

        let tokens = self.issue_session(&user).await?;

        audit_log(&AuditEvent::PasswordReset { user_id: user.id }, context);

        Ok((user, tokens))
    }

    /// Change the password of an authenticated user
    ///
    /// Tokens issued before the change stop working; the returned pair is
    /// issued after it.
    pub async fn change_password(
        &self,
        user: &User,
        request: UpdatePasswordRequest,
        context: &AuditContext,
    ) -> Result<(User, TokenPair), AppError> {
        request.validate()?;

        if !self
            .verify(request.current_password, user.password_hash.clone())
            .await?
        {
            return Err(AppError::Unauthenticated(
                "Your current password is wrong.".to_string(),
            ));
        }

        let change = PasswordChange {
            password_hash: self.hash(request.password).await?,
            changed_at: changed_now(),
        };
        let user = self
            .users
            .update(user.id, UserUpdate::password(change))
            .await?
            .ok_or_else(|| {
                AppError::Unauthenticated(
                    "The user belonging to this token no longer exists.".to_string(),
                )
            })?;

        let tokens = self.issue_session(&user).await?;

        audit_log(&AuditEvent::PasswordChange { user_id: user.id }, context);

        Ok((user, tokens))
    }

    /// Update name and/or email of the current user
    pub async fn update_me(&self, user: &User, mut request: UpdateMeRequest) -> Result<User, AppError> {
        if request.password.is_some() || request.password_confirm.is_some() {
            return Err(AppError::Validation(
                "This route is not for password updates. Please use /updateMyPassword."
                    .to_string(),
            ));
        }

        request.email = request.email.as_deref().map(normalize_email);
        request.name = request.name.map(|name| name.trim().to_string());
        request.validate()?;

        let update = UserUpdate {
            name: request.name,
            email: request.email,
            ..Default::default()
        };
        if update.is_empty() {
            return Ok(user.clone());
        }

        self.users
            .update(user.id, update)
            .await?
            .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))
    }

    /// Soft-delete the current user and end their session
    pub async fn deactivate(&self, user: &User, context: &AuditContext) -> Result<(), AppError> {
        self.users
            .update(user.id, UserUpdate::deactivate())
            .await?
            .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))?;
        self.sessions.revoke(user.id).await?;

        audit_log(&AuditEvent::AccountDeactivated { user_id: user.id }, context);
        Ok(())
    }

    /// Get an active user by ID
    pub async fn get_user(&self, id: Uuid) -> Result<User, AppError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("No user found with that ID".to_string()))
    }

    /// List active users
    pub async fn list_users(&self, query: &ListUsersQuery) -> Result<Vec<User>, AppError> {
        let (limit, offset) = query.bounds();
        Ok(self.users.list(limit, offset).await?)
    }
}
