//! Storage access for users and refresh sessions
//!
//! The auth core talks to storage only through the [`UserRepository`] and
//! [`SessionRepository`] traits. Production uses the Postgres adapters in
//! this module; tests use the in-memory adapters from `crate::testing`.
//!
//! Inactive users are filtered out of every user lookup.

use super::models::{NewUser, PasswordChange, RefreshSession, User, UserUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;
use wayfarer_core::Role;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepositoryError::EmailAlreadyExists;
            }
        }
        RepositoryError::DatabaseError(err.to_string())
    }
}

/// User record storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new active user
    ///
    /// Fails with [`RepositoryError::EmailAlreadyExists`] on a duplicate email.
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    /// Find an active user by normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Find an active user by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Apply a partial update to an active user, returning the new record
    ///
    /// Returns `Ok(None)` if no active user has this ID.
    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>, RepositoryError>;

    /// Consume a reset ticket and set a new password in one step
    ///
    /// Matches only an active user whose stored ticket hash equals
    /// `token_hash` and whose expiry is after `now`. The ticket fields are
    /// cleared in the same write.
    async fn redeem_reset_ticket(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        change: PasswordChange,
    ) -> Result<Option<User>, RepositoryError>;

    /// Active users ordered by creation time
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, RepositoryError>;

    /// Check storage connectivity
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Refresh session storage; at most one row per user
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert or replace the session of `session.user_id`
    async fn upsert(&self, session: RefreshSession) -> Result<(), RepositoryError>;

    /// Find the session holding `token_hash`, ignoring rows created before
    /// `not_before`
    async fn find_by_hash(
        &self,
        token_hash: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, RepositoryError>;

    /// Delete the session of a user; returns whether one existed
    async fn delete_for_user(&self, user_id: Uuid) -> Result<bool, RepositoryError>;
}

// ============================================================================
// Postgres
// ============================================================================

const USER_COLUMNS: &str = "id, name, email, role, password_hash, password_changed_at, \
     password_reset_token, password_reset_expires, active, created_at, updated_at";

/// Row shape of the `users` table
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    password_hash: String,
    password_changed_at: Option<DateTime<Utc>>,
    password_reset_token: Option<String>,
    password_reset_expires: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|_| RepositoryError::CorruptRecord(format!("unknown role for user {}", row.id)))?;

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            password_hash: row.password_hash,
            password_changed_at: row.password_changed_at,
            password_reset_token: row.password_reset_token,
            password_reset_expires: row.password_reset_expires,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, RepositoryError> {
    row.map(User::try_from).transpose()
}

/// Postgres-backed user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users (id, name, email, role, password_hash, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, TRUE, NOW(), NOW()) \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.role.as_str())
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active = TRUE");

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        into_user(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active = TRUE");

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        into_user(row)
    }

    async fn update(&self, id: Uuid, update: UserUpdate) -> Result<Option<User>, RepositoryError> {
        let (password_hash, changed_at) = match update.password {
            Some(change) => (Some(change.password_hash), Some(change.changed_at)),
            None => (None, None),
        };
        let touch_ticket = update.reset_ticket.is_some();
        let (ticket_hash, ticket_expires) = match update.reset_ticket.flatten() {
            Some(ticket) => (Some(ticket.token_hash), Some(ticket.expires_at)),
            None => (None, None),
        };

        let sql = format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                password_hash = COALESCE($4, password_hash), \
                password_changed_at = COALESCE($5, password_changed_at), \
                password_reset_token = CASE WHEN $6 THEN $7 ELSE password_reset_token END, \
                password_reset_expires = CASE WHEN $6 THEN $8 ELSE password_reset_expires END, \
                active = COALESCE($9, active), \
                updated_at = NOW() \
             WHERE id = $1 AND active = TRUE \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(update.name)
            .bind(update.email)
            .bind(password_hash)
            .bind(changed_at)
            .bind(touch_ticket)
            .bind(ticket_hash)
            .bind(ticket_expires)
            .bind(update.active)
            .fetch_optional(&self.pool)
            .await?;

        into_user(row)
    }

    async fn redeem_reset_ticket(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        change: PasswordChange,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "UPDATE users SET \
                password_hash = $3, \
                password_changed_at = $4, \
                password_reset_token = NULL, \
                password_reset_expires = NULL, \
                updated_at = NOW() \
             WHERE password_reset_token = $1 \
               AND password_reset_expires > $2 \
               AND active = TRUE \
             RETURNING {USER_COLUMNS}"
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(token_hash)
            .bind(now)
            .bind(&change.password_hash)
            .bind(change.changed_at)
            .fetch_optional(&self.pool)
            .await?;

        into_user(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE active = TRUE \
             ORDER BY created_at ASC LIMIT $1 OFFSET $2"
        );

        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Row shape of the `refresh_sessions` table
#[derive(Debug, Clone, sqlx::FromRow)]
struct SessionRow {
    user_id: Uuid,
    token_hash: String,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for RefreshSession {
    fn from(row: SessionRow) -> Self {
        Self {
            user_id: row.user_id,
            token_hash: row.token_hash,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed refresh session repository
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn upsert(&self, session: RefreshSession) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO refresh_sessions (user_id, token_hash, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE \
             SET token_hash = EXCLUDED.token_hash, created_at = EXCLUDED.created_at",
        )
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(format!("Failed to store session: {e}")))?;

        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<RefreshSession>, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT user_id, token_hash, created_at FROM refresh_sessions \
             WHERE token_hash = $1 AND created_at > $2",
        )
        .bind(token_hash)
        .bind(not_before)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshSession::from))
    }

    async fn delete_for_user(&self, user_id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM refresh_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> UserRow {
        let now = Utc::now();
        UserRow {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "a@x.com".to_string(),
            role: role.to_string(),
            password_hash: "$argon2id$v=19$...".to_string(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let user = User::try_from(row("lead-guide")).unwrap();
        assert_eq!(user.role, Role::LeadGuide);
        assert_eq!(user.email, "a@x.com");
    }

    #[test]
    fn test_unknown_role_is_corrupt() {
        let result = User::try_from(row("superuser"));
        assert!(matches!(result, Err(RepositoryError::CorruptRecord(_))));
    }

    #[test]
    fn test_sqlx_error_mapping() {
        let err: RepositoryError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, RepositoryError::DatabaseError(_)));
    }

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore] // Requires a Postgres instance at DATABASE_URL
    async fn test_pg_session_upsert_keeps_one_row() {
        let pool = pool().await;
        let users = PgUserRepository::new(pool.clone());
        let sessions = PgSessionRepository::new(pool.clone());

        let user = users
            .create(NewUser {
                name: "Session".to_string(),
                email: format!("{}@x.com", Uuid::new_v4()),
                role: Role::User,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();

        for hash in ["first", "second"] {
            sessions
                .upsert(RefreshSession {
                    user_id: user.id,
                    token_hash: format!("{hash}-{}", user.id),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM refresh_sessions WHERE user_id = $1")
                .bind(user.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);

        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let first = sessions
            .find_by_hash(&format!("first-{}", user.id), epoch)
            .await
            .unwrap();
        assert!(first.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires a Postgres instance at DATABASE_URL
    async fn test_pg_duplicate_email() {
        let pool = pool().await;
        let users = PgUserRepository::new(pool);
        let email = format!("{}@x.com", Uuid::new_v4());

        let new_user = || NewUser {
            name: "Dup".to_string(),
            email: email.clone(),
            role: Role::User,
            password_hash: "hash".to_string(),
        };

        users.create(new_user()).await.unwrap();
        let result = users.create(new_user()).await;
        assert!(matches!(result, Err(RepositoryError::EmailAlreadyExists)));
    }
}
