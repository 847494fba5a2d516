//! In-memory adapters for tests
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration tests under `tests/`.

use crate::auth::models::{NewUser, PasswordChange, RefreshSession, User, UserUpdate};
use crate::auth::repository::{RepositoryError, SessionRepository, UserRepository};
use crate::email::{EmailError, EmailSender, OutgoingEmail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// User repository backed by a map
///
/// Keeps inactive users so tests can inspect soft deletes through
/// [`MemoryUserRepository::get_any`].
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    /// Fetch a user regardless of the active flag
    pub fn get_any(&self, id: Uuid) -> Option<User> {
        read(&self.users).get(&id).cloned()
    }

    /// Overwrite a stored user
    pub fn put(&self, user: User) {
        write(&self.users).insert(user.id, user);
    }

    pub fn len(&self) -> usize {
        read(&self.users).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users = write(&self.users);
        if users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::EmailAlreadyExists);
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            role: user.role,
            password_hash: user.password_hash,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(read(&self.users)
            .values()
            .find(|u| u.active && u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(read(&self.users).get(&id).filter(|u| u.active).cloned())
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>, RepositoryError> {
        let mut users = write(&self.users);

        if let Some(email) = &update.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(RepositoryError::EmailAlreadyExists);
            }
        }

        let Some(user) = users.get_mut(&id).filter(|u| u.active) else {
            return Ok(None);
        };

        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(change) = update.password {
            user.password_hash = change.password_hash;
            user.password_changed_at = Some(change.changed_at);
        }
        if let Some(ticket) = update.reset_ticket {
            user.password_reset_token = ticket.as_ref().map(|t| t.token_hash.clone());
            user.password_reset_expires = ticket.map(|t| t.expires_at);
        }
        if let Some(active) = update.active {
            user.active = active;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn redeem_reset_ticket(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        change: PasswordChange,
    ) -> Result<Option<User>, RepositoryError> {
        let mut users = write(&self.users);

        let Some(user) = users.values_mut().find(|u| {
            u.active
                && u.password_reset_token.as_deref() == Some(token_hash)
                && u.password_reset_expires.map(|exp| exp > now).unwrap_or(false)
        }) else {
            return Ok(None);
        };

        user.password_hash = change.password_hash;
        user.password_changed_at = Some(change.changed_at);
        user.password_reset_token = None;
        user.password_reset_expires = None;
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = read(&self.users)
            .values()
            .filter(|u| u.active)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);

        Ok(users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Session repository backed by a map keyed on user ID
#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<Uuid, RefreshSession>>,
}

impl MemorySessionRepository {
    pub fn get(&self, user_id: Uuid) -> Option<RefreshSession> {
        read(&self.sessions).get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn upsert(&self, session: RefreshSession) -> Result<(), RepositoryError> {
        write(&self.sessions).insert(session.user_id, session);
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, RepositoryError> {
        Ok(read(&self.sessions)
            .values()
            .find(|s| s.token_hash == token_hash && s.created_at > not_before)
            .cloned())
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<bool, RepositoryError> {
        Ok(write(&self.sessions).remove(&user_id).is_some())
    }
}

/// Mailer that keeps every message
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        guard(&self.sent).clone()
    }

    /// Raw reset token from the most recent reset email
    pub fn last_reset_token(&self) -> Option<String> {
        let sent = guard(&self.sent);
        let body = &sent.last()?.body;
        let start = body.find("/resetPassword/")? + "/resetPassword/".len();
        let token: String = body[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        guard(&self.sent).push(email);
        Ok(())
    }
}

/// Mailer whose transport always fails
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingMailer;

#[async_trait]
impl EmailSender for FailingMailer {
    async fn send(&self, _email: OutgoingEmail) -> Result<(), EmailError> {
        Err(EmailError::TransportError("connection refused".to_string()))
    }
}
