//! Storage primitives for quota balances.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lingoclaw_core::error::QuotaError;
use tokio::time::Instant;

/// Expiring integer balances keyed by string.
///
/// Every method is a single atomic operation on the backing store. Balances
/// are stored as text so a corrupted value can be detected and repaired
/// instead of failing every request.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Raw stored value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, QuotaError>;

    /// Overwrite `key` with `value` and a fresh TTL.
    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), QuotaError>;

    /// Write `value` with a TTL only if `key` is absent or expired.
    /// Returns whether the write happened.
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, QuotaError>;

    /// If `key` is absent, expired or not an integer, set it to `initial` with
    /// a fresh TTL. Otherwise subtract `delta` and keep the current TTL.
    /// Returns the new balance.
    async fn init_or_decrement(
        &self,
        key: &str,
        initial: i64,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64, QuotaError>;

    /// Time left before `key` expires.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, QuotaError>;
}

/// Parse a stored balance. Only the canonical decimal form of an `i64`
/// counts; padding, a leading `+` or leading zeros mark the value corrupt,
/// matching the SQLite store's `CAST` round-trip test.
pub fn parse_balance(value: &str) -> Option<i64> {
    value
        .parse::<i64>()
        .ok()
        .filter(|n| n.to_string() == value)
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local [`QuotaStore`].
///
/// A single mutex serializes all operations. Expiry uses `tokio::time`, so
/// tests can drive it with a paused clock.
#[derive(Debug, Default)]
pub struct InMemoryQuotaStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary string, bypassing integer formatting.
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get(&self, key: &str) -> Result<Option<String>, QuotaError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(e) if e.live(now) => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), QuotaError> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<bool, QuotaError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        if entries.get(key).is_some_and(|e| e.live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn init_or_decrement(
        &self,
        key: &str,
        initial: i64,
        delta: i64,
        ttl: Duration,
    ) -> Result<i64, QuotaError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        let current = entries
            .get(key)
            .filter(|e| e.live(now))
            .map(|e| (parse_balance(&e.value), e.expires_at));

        let (balance, expires_at) = match current {
            Some((Some(v), expires_at)) => (v.saturating_sub(delta), expires_at),
            _ => (initial, now + ttl),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: balance.to_string(),
                expires_at,
            },
        );
        Ok(balance)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, QuotaError> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| e.live(now))
            .map(|e| e.expires_at - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn set_and_get() {
        let store = InMemoryQuotaStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.set_with_ttl("k", 42, HOUR).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("42"));
        assert_eq!(store.ttl("k").await.unwrap(), Some(HOUR));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let store = InMemoryQuotaStore::new();
        store.set_with_ttl("k", 1, HOUR).await.unwrap();
        tokio::time::advance(HOUR).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_only_once() {
        let store = InMemoryQuotaStore::new();
        assert!(store.set_if_absent_with_ttl("k", 10, HOUR).await.unwrap());
        assert!(!store.set_if_absent_with_ttl("k", 99, HOUR).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("10"));

        tokio::time::advance(HOUR).await;
        assert!(store.set_if_absent_with_ttl("k", 99, HOUR).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn init_or_decrement_keeps_ttl() {
        let store = InMemoryQuotaStore::new();
        assert_eq!(store.init_or_decrement("k", 90, 10, HOUR).await.unwrap(), 90);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(store.init_or_decrement("k", 90, 10, HOUR).await.unwrap(), 80);
        assert_eq!(
            store.ttl("k").await.unwrap(),
            Some(HOUR - Duration::from_secs(600))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn init_or_decrement_repairs_garbage() {
        let store = InMemoryQuotaStore::new();
        store.insert_raw("k", "abc", HOUR);
        assert_eq!(store.init_or_decrement("k", 70, 30, HOUR).await.unwrap(), 70);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("70"));
    }

    #[test]
    fn only_canonical_integers_parse() {
        assert_eq!(parse_balance("500"), Some(500));
        assert_eq!(parse_balance("-60"), Some(-60));
        for bad in [" 500", "500 ", "+5", "007", "12.5", "abc", ""] {
            assert_eq!(parse_balance(bad), None, "{bad:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn balance_may_go_negative() {
        let store = InMemoryQuotaStore::new();
        store.set_with_ttl("k", 5, HOUR).await.unwrap();
        assert_eq!(store.init_or_decrement("k", 0, 20, HOUR).await.unwrap(), -15);
    }
}
