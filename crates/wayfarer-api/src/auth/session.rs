//! Refresh session store
//!
//! Each user has at most one live refresh session. Issuing a new refresh
//! token replaces the previous session, so only the most recently issued
//! refresh token can be exchanged. Sessions expire after a fixed window
//! counted from creation; expired rows read as absent.

use super::models::RefreshSession;
use super::repository::{RepositoryError, SessionRepository};
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// SHA-256 hex digest of a token, used wherever a token is stored
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Single-session-per-user store over a [`SessionRepository`]
#[derive(Clone)]
pub struct RefreshSessionStore {
    repo: Arc<dyn SessionRepository>,
    ttl: Duration,
}

impl RefreshSessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, ttl_secs: u64) -> Self {
        Self {
            repo,
            ttl: Duration::seconds(ttl_secs.min(u64::from(u32::MAX)) as i64),
        }
    }

    /// Replace the session of `user_id` with one holding `refresh_token`
    pub async fn rotate(&self, user_id: Uuid, refresh_token: &str) -> Result<(), RepositoryError> {
        self.rotate_at(user_id, refresh_token, Utc::now()).await
    }

    /// [`rotate`](Self::rotate) with an explicit creation time
    pub async fn rotate_at(
        &self,
        user_id: Uuid,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.repo
            .upsert(RefreshSession {
                user_id,
                token_hash: hash_token(refresh_token),
                created_at: now,
            })
            .await?;

        tracing::debug!(user_id = %user_id, "refresh session rotated");
        Ok(())
    }

    /// Look up the live session holding `refresh_token`
    ///
    /// Absent, replaced and expired sessions all return `Ok(None)`.
    pub async fn find_by_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<RefreshSession>, RepositoryError> {
        let not_before = Utc::now() - self.ttl;
        self.repo
            .find_by_hash(&hash_token(refresh_token), not_before)
            .await
    }

    /// Drop the session of `user_id`, if any
    pub async fn revoke(&self, user_id: Uuid) -> Result<bool, RepositoryError> {
        let removed = self.repo.delete_for_user(user_id).await?;
        if removed {
            tracing::debug!(user_id = %user_id, "refresh session revoked");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySessionRepository;

    fn store(ttl_secs: u64) -> (RefreshSessionStore, Arc<MemorySessionRepository>) {
        let repo = Arc::new(MemorySessionRepository::default());
        (RefreshSessionStore::new(repo.clone(), ttl_secs), repo)
    }

    #[test]
    fn test_hash_token() {
        let hash = hash_token("abc");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_token("abd"), hash);
    }

    #[tokio::test]
    async fn test_rotate_replaces_previous_session() {
        let (store, repo) = store(3600);
        let user_id = Uuid::new_v4();

        store.rotate(user_id, "first").await.unwrap();
        store.rotate(user_id, "second").await.unwrap();

        assert_eq!(repo.len(), 1);
        assert!(store.find_by_token("first").await.unwrap().is_none());

        let session = store.find_by_token("second").await.unwrap().unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.token_hash, hash_token("second"));
    }

    #[tokio::test]
    async fn test_sessions_of_different_users_are_independent() {
        let (store, repo) = store(3600);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.rotate(alice, "alice-token").await.unwrap();
        store.rotate(bob, "bob-token").await.unwrap();

        assert_eq!(repo.len(), 2);
        assert!(store.find_by_token("alice-token").await.unwrap().is_some());
        assert!(store.find_by_token("bob-token").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_found() {
        let (store, _) = store(60);
        let user_id = Uuid::new_v4();

        store
            .rotate_at(user_id, "old", Utc::now() - Duration::seconds(61))
            .await
            .unwrap();

        assert!(store.find_by_token("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke() {
        let (store, repo) = store(3600);
        let user_id = Uuid::new_v4();

        store.rotate(user_id, "token").await.unwrap();
        assert!(store.revoke(user_id).await.unwrap());
        assert!(!store.revoke(user_id).await.unwrap());

        assert_eq!(repo.len(), 0);
        assert!(store.find_by_token("token").await.unwrap().is_none());
    }

    proptest::proptest! {
        #[test]
        fn prop_hash_token_is_fixed_width_hex(token in ".{0,200}") {
            let hash = hash_token(&token);
            proptest::prop_assert_eq!(hash.len(), 64);
            proptest::prop_assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            proptest::prop_assert_eq!(hash_token(&token), hash);
        }
    }
}
