//! Per-user quota bucket.

use std::sync::Arc;
use std::time::Duration;

use lingoclaw_core::error::QuotaError;
use lingoclaw_core::record::UserId;
use tracing::{debug, warn};

use crate::store::{QuotaStore, parse_balance};

/// One user's token balance in a [`QuotaStore`].
///
/// The balance lives under `quota:{user_id}`. When the key is absent the user
/// has their full `limit`; the key is written with a `window` TTL on first
/// use and disappears when the window ends.
///
/// `check` is advisory: concurrent calls that all pass `check` can together
/// overdraw the balance, which may go negative. The next `check` then fails.
#[derive(Clone)]
pub struct QuotaBucket {
    store: Arc<dyn QuotaStore>,
    user_id: UserId,
    limit: i64,
    window: Duration,
    key: String,
}

impl std::fmt::Debug for QuotaBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaBucket")
            .field("key", &self.key)
            .field("limit", &self.limit)
            .field("window", &self.window)
            .finish()
    }
}

impl QuotaBucket {
    pub fn new(store: Arc<dyn QuotaStore>, user_id: UserId, limit: i64, window: Duration) -> Self {
        Self {
            store,
            user_id,
            limit,
            window,
            key: Self::key_for(user_id),
        }
    }

    pub fn key_for(user_id: UserId) -> String {
        format!("quota:{user_id}")
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Fail with [`QuotaError::Exceeded`] unless at least `need` units remain.
    ///
    /// Materializes the balance if it does not exist yet.
    pub async fn check(&self, need: i64) -> Result<(), QuotaError> {
        let remaining = self.get_remaining(true).await?;
        if remaining < need {
            debug!(user_id = self.user_id, remaining, need, "Quota check failed");
            return Err(QuotaError::Exceeded {
                remaining,
                required: need,
            });
        }
        Ok(())
    }

    /// Charge `used * multiplier` units. No-op for non-positive inputs.
    pub async fn consume(&self, used: i64, multiplier: i64) -> Result<(), QuotaError> {
        if used <= 0 || multiplier <= 0 {
            return Ok(());
        }
        let cost = used.saturating_mul(multiplier);
        let balance = self
            .store
            .init_or_decrement(&self.key, self.limit.saturating_sub(cost), cost, self.window)
            .await?;
        debug!(user_id = self.user_id, used, multiplier, cost, balance, "Quota consumed");
        Ok(())
    }

    /// Current balance. An absent key reads as `limit` and is only written
    /// when `create_if_missing` is set; an unreadable value is reset to `limit`.
    pub async fn get_remaining(&self, create_if_missing: bool) -> Result<i64, QuotaError> {
        let value = match self.store.get(&self.key).await? {
            Some(v) => v,
            None if !create_if_missing => return Ok(self.limit),
            None => {
                if self
                    .store
                    .set_if_absent_with_ttl(&self.key, self.limit, self.window)
                    .await?
                {
                    return Ok(self.limit);
                }
                // Someone else created it in between; read theirs.
                match self.store.get(&self.key).await? {
                    Some(v) => v,
                    None => return Ok(self.limit),
                }
            }
        };

        match parse_balance(&value) {
            Some(remaining) => Ok(remaining),
            None => {
                warn!(user_id = self.user_id, value = %value, "Corrupted quota balance, resetting");
                self.store
                    .set_with_ttl(&self.key, self.limit, self.window)
                    .await?;
                Ok(self.limit)
            }
        }
    }

    /// Time until the balance resets, if it is materialized.
    pub async fn resets_in(&self) -> Result<Option<Duration>, QuotaError> {
        self.store.ttl(&self.key).await
    }
}

/// Hands out buckets over one shared store.
#[derive(Clone)]
pub struct QuotaManager {
    store: Arc<dyn QuotaStore>,
    window: Duration,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn QuotaStore>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn bucket(&self, user_id: UserId, limit: i64) -> QuotaBucket {
        QuotaBucket::new(self.store.clone(), user_id, limit, self.window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryQuotaStore;

    const HOUR: Duration = Duration::from_secs(3600);

    fn bucket(limit: i64) -> (Arc<InMemoryQuotaStore>, QuotaBucket) {
        let store = Arc::new(InMemoryQuotaStore::new());
        let bucket = QuotaBucket::new(store.clone(), 1, limit, HOUR);
        (store, bucket)
    }

    #[tokio::test(start_paused = true)]
    async fn consume_then_check_fails_when_short() {
        let (_, b) = bucket(1000);
        b.consume(100, 2).await.unwrap();
        assert_eq!(b.get_remaining(false).await.unwrap(), 800);

        let err = b.check(900).await.unwrap_err();
        assert_eq!(
            err,
            QuotaError::Exceeded {
                remaining: 800,
                required: 900
            }
        );
        b.check(800).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn balance_is_limit_minus_all_costs() {
        let (_, b) = bucket(10_000);
        let calls = [(10, 15), (3, 110), (250, 2), (1, 200), (0, 200), (-5, 3), (7, 0)];
        for (used, mult) in calls {
            b.consume(used, mult).await.unwrap();
        }
        let spent: i64 = calls
            .iter()
            .filter(|(u, m)| *u > 0 && *m > 0)
            .map(|(u, m)| u * m)
            .sum();
        assert_eq!(b.get_remaining(false).await.unwrap(), 10_000 - spent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_consumes_do_not_lose_updates() {
        for _ in 0..50 {
            let (_, b) = bucket(100);
            let (b1, b2) = (b.clone(), b.clone());
            let t1 = tokio::spawn(async move { b1.consume(50, 1).await });
            let t2 = tokio::spawn(async move { b2.consume(50, 1).await });
            t1.await.unwrap().unwrap();
            t2.await.unwrap().unwrap();
            assert_eq!(b.get_remaining(false).await.unwrap(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_value_resets_on_check() {
        let (store, b) = bucket(1000);
        store.insert_raw(b.key(), "abc", HOUR);
        b.check(10).await.unwrap();
        assert_eq!(store.get(b.key()).await.unwrap().as_deref(), Some("1000"));
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_value_resets_on_consume() {
        let (store, b) = bucket(1000);
        store.insert_raw(b.key(), "{not a number}", HOUR);
        b.consume(10, 1).await.unwrap();
        assert_eq!(b.get_remaining(false).await.unwrap(), 990);
    }

    #[tokio::test(start_paused = true)]
    async fn padded_value_is_corrupt_for_check_and_consume_alike() {
        let (store, b) = bucket(1000);
        store.insert_raw(b.key(), " 500", HOUR);
        b.check(0).await.unwrap();
        assert_eq!(b.get_remaining(false).await.unwrap(), 1000);
        b.consume(10, 1).await.unwrap();
        assert_eq!(b.get_remaining(false).await.unwrap(), 990);
    }

    #[tokio::test(start_paused = true)]
    async fn padded_value_reset_by_consume_alone() {
        let (store, b) = bucket(1000);
        store.insert_raw(b.key(), "500 ", HOUR);
        b.consume(10, 1).await.unwrap();
        assert_eq!(b.get_remaining(false).await.unwrap(), 990);
    }

    #[tokio::test(start_paused = true)]
    async fn check_initializes_once() {
        let (store, b) = bucket(500);
        assert!(store.is_empty());
        b.check(0).await.unwrap();
        assert_eq!(store.get(b.key()).await.unwrap().as_deref(), Some("500"));
        assert_eq!(b.resets_in().await.unwrap(), Some(HOUR));

        b.consume(100, 1).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        b.check(0).await.unwrap();
        assert_eq!(b.get_remaining(true).await.unwrap(), 400);
        assert_eq!(b.resets_in().await.unwrap(), Some(HOUR - Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn get_remaining_without_create_does_not_write() {
        let (store, b) = bucket(500);
        assert_eq!(b.get_remaining(false).await.unwrap(), 500);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn window_expiry_restores_full_limit() {
        let (_, b) = bucket(1000);
        b.consume(900, 1).await.unwrap();
        assert!(b.check(200).await.is_err());

        tokio::time::advance(HOUR).await;
        b.check(1000).await.unwrap();
        assert_eq!(b.get_remaining(false).await.unwrap(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn overdraft_goes_negative_and_blocks() {
        let (_, b) = bucket(100);
        b.check(0).await.unwrap();
        b.consume(80, 2).await.unwrap();
        assert_eq!(b.get_remaining(false).await.unwrap(), -60);
        assert!(matches!(
            b.check(0).await,
            Err(QuotaError::Exceeded { remaining: -60, required: 0 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn manager_buckets_share_store() {
        let store: Arc<dyn QuotaStore> = Arc::new(InMemoryQuotaStore::new());
        let manager = QuotaManager::new(store, HOUR);
        manager.bucket(7, 100).consume(30, 1).await.unwrap();
        assert_eq!(manager.bucket(7, 100).get_remaining(false).await.unwrap(), 70);
        assert_eq!(manager.bucket(8, 100).get_remaining(false).await.unwrap(), 100);
    }
}
