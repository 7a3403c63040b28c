//! `lingoclaw token` — Issue a bearer token.

use std::time::Duration;

use anyhow::Context;
use lingoclaw_config::AppConfig;
use lingoclaw_security::TokenSigner;

pub fn issue(config: &AppConfig, user_id: i64) -> anyhow::Result<String> {
    let secret = config.jwt_secret()?;
    let signer = TokenSigner::new(secret, Duration::from_secs(config.auth.token_ttl_secs));
    Ok(signer.issue(user_id))
}

pub fn run(user_id: i64) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    if !config.users.iter().any(|u| u.id == user_id) {
        eprintln!("⚠️  User {user_id} is not listed under [[users]]; the gateway will reject this token");
    }
    println!("{}", issue(&config, user_id)?);
    Ok(())
}
