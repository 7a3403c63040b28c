//! `lingoclaw config` — Configuration management commands.

use anyhow::Context;
use lingoclaw_config::AppConfig;

/// Problems that do not stop loading but will stop serving.
pub fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.llm.api_key.is_none() {
        warnings.push("No API key set (set LINGOCLAW_API_KEY or OPENAI_API_KEY)");
    }
    if config.jwt_secret().is_err() {
        warnings.push("No JWT secret set (set auth.jwt_secret or LINGOCLAW_JWT_SECRET); serve will refuse to start");
    }
    if config.users.is_empty() {
        warnings.push("No [[users]] configured; every request will be rejected");
    }
    warnings
}

pub fn validate() -> anyhow::Result<()> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Endpoint:  {}", config.llm.base_url);
    println!(
        "   Models:    {} / {} / {} (embed {})",
        config.models.low.name,
        config.models.standard.name,
        config.models.high.name,
        config.models.embedding.name
    );
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Quota:     {:?}, {}s window", config.quota.backend, config.quota.window_secs);
    println!("   Users:     {}", config.users.len());
    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    config.llm.api_key = config.llm.api_key.map(|_| "[REDACTED]".into());
    config.auth.jwt_secret = config.auth.jwt_secret.map(|_| "[REDACTED]".into());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn defaults_warn_about_secrets_and_users() {
        let w = warnings(&AppConfig::default());
        assert_eq!(w.len(), 3);

        let mut config = AppConfig::default();
        config.llm.api_key = Some("k".into());
        config.auth.jwt_secret = Some("s".into());
        config.users.push(lingoclaw_config::UserEntry {
            id: 1,
            name: "ana".into(),
            token_quota: None,
        });
        assert!(warnings(&config).is_empty());
    }
}
