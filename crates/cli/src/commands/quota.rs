//! `lingoclaw quota` — Inspect a user's balance.

use std::time::Duration;

use anyhow::Context;
use lingoclaw_config::AppConfig;
use lingoclaw_quota::QuotaManager;

#[derive(Debug, PartialEq)]
pub struct QuotaReport {
    pub remaining: i64,
    pub limit: i64,
    /// `None` while the balance is not materialized.
    pub resets_in: Option<Duration>,
}

/// The limit a user gets: `--limit`, else their `[[users]]` entry, else the
/// default.
pub fn limit_for(config: &AppConfig, user_id: i64, explicit: Option<i64>) -> i64 {
    explicit
        .or_else(|| {
            config
                .users
                .iter()
                .find(|u| u.id == user_id)
                .and_then(|u| u.token_quota)
        })
        .unwrap_or(config.quota.default_limit)
}

pub async fn report(config: &AppConfig, user_id: i64, limit: Option<i64>) -> anyhow::Result<QuotaReport> {
    let store = lingoclaw_gateway::quota_store(config).await?;
    let manager = QuotaManager::new(store, Duration::from_secs(config.quota.window_secs));
    let bucket = manager.bucket(user_id, limit_for(config, user_id, limit));
    Ok(QuotaReport {
        remaining: bucket.get_remaining(false).await?,
        limit: bucket.limit(),
        resets_in: bucket.resets_in().await?,
    })
}

pub async fn run(user_id: i64, limit: Option<i64>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let report = report(&config, user_id, limit).await?;

    println!("📊 Quota for user {user_id}");
    println!("   Backend:   {:?}", config.quota.backend);
    println!("   Remaining: {} / {}", report.remaining, report.limit);
    match report.resets_in {
        Some(d) => println!("   Resets in: {}s", d.as_secs()),
        None => println!("   Resets in: (window not started)"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingoclaw_config::UserEntry;

    #[test]
    fn limit_precedence() {
        let mut config = AppConfig::default();
        config.users.push(UserEntry {
            id: 1,
            name: "ana".into(),
            token_quota: Some(500),
        });
        assert_eq!(limit_for(&config, 1, Some(9)), 9);
        assert_eq!(limit_for(&config, 1, None), 500);
        assert_eq!(limit_for(&config, 2, None), config.quota.default_limit);
    }

    #[tokio::test]
    async fn fresh_memory_store_reports_full_limit() {
        let config = AppConfig::default();
        let report = report(&config, 1, Some(1000)).await.unwrap();
        assert_eq!(
            report,
            QuotaReport {
                remaining: 1000,
                limit: 1000,
                resets_in: None
            }
        );
    }
}
