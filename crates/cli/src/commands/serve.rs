//! `lingoclaw serve` — Start the HTTP gateway.

use anyhow::Context;
use lingoclaw_config::AppConfig;
use tracing::info;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    config.jwt_secret()?;

    println!("🦀 LingoClaw Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Quota:     {:?} ({}s window)", config.quota.backend, config.quota.window_secs);
    println!("   Users:     {}", config.users.len());
    info!(
        endpoint = %config.llm.base_url,
        standard_model = %config.models.standard.name,
        "Loaded configuration"
    );

    lingoclaw_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!("Gateway failed: {e}"))
}
