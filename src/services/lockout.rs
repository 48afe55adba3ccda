//! Consecutive-failure lockout.
//!
//! Every check reads the persisted row; nothing is cached across requests so
//! concurrent failures against one account are all counted.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::LockoutConfig;
use crate::db::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lock_duration: Duration,
}

impl LockoutPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, lock_duration: Duration) -> Self {
        Self {
            max_attempts,
            lock_duration,
        }
    }

    #[must_use]
    pub fn from_config(config: &LockoutConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::seconds(config.lockout_seconds),
        )
    }

    /// Returns the active lock expiry, or `None` if the account may log in.
    ///
    /// An expired lock is cleared as a side effect, together with the failure
    /// counter.
    pub async fn active_lock(
        &self,
        store: &Store,
        account_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(user) = store.user_repo().get_by_id(account_id).await? else {
            return Ok(None);
        };

        match user.lock_until {
            Some(until) if now < until => Ok(Some(until)),
            Some(expired) => {
                if store
                    .user_repo()
                    .clear_expired_lock(account_id, expired)
                    .await?
                {
                    info!(user_id = account_id, "Expired account lock cleared");
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn is_locked(
        &self,
        store: &Store,
        account_id: i32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.active_lock(store, account_id, now).await?.is_some())
    }

    /// Counts one failure. Returns the lock expiry when this failure (or a
    /// concurrent one) left the account locked.
    pub async fn register_failure(
        &self,
        store: &Store,
        account_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(user) = store
            .user_repo()
            .record_failed_attempt(account_id, self.max_attempts, self.lock_duration, now)
            .await?
        else {
            return Ok(None);
        };

        let lock = user.lock_until.filter(|until| now < *until);
        if let Some(until) = lock {
            warn!(user_id = account_id, lock_until = %until, "Account locked after repeated failures");
        } else {
            info!(
                user_id = account_id,
                attempts = user.failed_attempts,
                max_attempts = self.max_attempts,
                "Failed login attempt"
            );
        }
        Ok(lock)
    }

    pub async fn register_success(&self, store: &Store, account_id: i32) -> Result<()> {
        store.user_repo().clear_failures(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::domain::Role;

    async fn store_with_account() -> (Store, i32, std::path::PathBuf) {
        let path =
            std::env::temp_dir().join(format!("incidentry-lockout-{}.db", uuid::Uuid::new_v4()));
        let store = Store::new(&format!("sqlite:{}", path.display()))
            .await
            .unwrap();
        let user = store
            .user_repo()
            .create(NewUser {
                username: "carol".to_string(),
                email: "carol@example.com".to_string(),
                password_hash: "unused".to_string(),
                role: Role::Regular,
            })
            .await
            .unwrap();
        (store, user.id, path)
    }

    fn policy() -> LockoutPolicy {
        LockoutPolicy::new(5, Duration::seconds(60))
    }

    #[tokio::test]
    async fn test_locks_after_max_attempts() {
        let (store, id, path) = store_with_account().await;
        let policy = policy();
        let now = Utc::now();

        for _ in 0..4 {
            assert_eq!(policy.register_failure(&store, id, now).await.unwrap(), None);
            assert!(!policy.is_locked(&store, id, now).await.unwrap());
        }

        let lock = policy.register_failure(&store, id, now).await.unwrap();
        assert_eq!(lock, Some(now + Duration::seconds(60)));
        assert!(policy.is_locked(&store, id, now).await.unwrap());
        assert!(
            policy
                .is_locked(&store, id, now + Duration::seconds(59))
                .await
                .unwrap()
        );

        let user = store.user_repo().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.failed_attempts, 0);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_failure_inside_lock_window_does_not_extend_it() {
        let (store, id, path) = store_with_account().await;
        let policy = policy();
        let start = Utc::now();

        for _ in 0..5 {
            policy.register_failure(&store, id, start).await.unwrap();
        }
        let original = start + Duration::seconds(60);

        let later = start + Duration::seconds(30);
        let lock = policy.register_failure(&store, id, later).await.unwrap();
        assert_eq!(lock, Some(original));

        let user = store.user_repo().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.lock_until, Some(original));
        assert_eq!(user.failed_attempts, 0);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_expired_lock_self_heals() {
        let (store, id, path) = store_with_account().await;
        let policy = policy();
        let start = Utc::now();

        for _ in 0..5 {
            policy.register_failure(&store, id, start).await.unwrap();
        }

        let after = start + Duration::seconds(60);
        assert!(!policy.is_locked(&store, id, after).await.unwrap());

        let user = store.user_repo().get_by_id(id).await.unwrap().unwrap();
        assert!(user.lock_until.is_none());
        assert_eq!(user.failed_attempts, 0);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let (store, id, path) = store_with_account().await;
        let policy = policy();
        let now = Utc::now();

        for _ in 0..3 {
            policy.register_failure(&store, id, now).await.unwrap();
        }
        policy.register_success(&store, id).await.unwrap();

        let user = store.user_repo().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.failed_attempts, 0);

        // Four more failures are needed after the reset before a lock
        for _ in 0..4 {
            policy.register_failure(&store, id, now).await.unwrap();
        }
        assert!(!policy.is_locked(&store, id, now).await.unwrap());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_both_counted() {
        let (store, id, path) = store_with_account().await;
        let policy = policy();
        let now = Utc::now();

        let (a, b) = tokio::join!(
            policy.register_failure(&store, id, now),
            policy.register_failure(&store, id, now)
        );
        a.unwrap();
        b.unwrap();

        let user = store.user_repo().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.failed_attempts, 2);
        let _ = std::fs::remove_file(path);
    }
}
