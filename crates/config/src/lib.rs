//! Configuration loading, validation, and management for LingoClaw.
//!
//! Loads configuration from `~/.lingoclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use lingoclaw_core::model::{ModelSet, ModelSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.lingoclaw/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream LLM endpoint
    #[serde(default)]
    pub llm: LlmConfig,

    /// Model per tier and its quota multiplier
    #[serde(default)]
    pub models: ModelsConfig,

    /// Token quota accounting
    #[serde(default)]
    pub quota: QuotaConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bearer token signing
    #[serde(default)]
    pub auth: AuthConfig,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Users registered at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserEntry>,
}

/// A user known to the in-process user repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: i64,
    pub name: String,
    /// Quota limit; `quota.default_limit` when absent.
    #[serde(default)]
    pub token_quota: Option<i64>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// One `[models.<tier>]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    /// Quota units charged per token.
    pub multiplier: i64,
}

impl From<&ModelSpec> for ModelEntry {
    fn from(spec: &ModelSpec) -> Self {
        Self {
            name: spec.name.clone(),
            multiplier: spec.multiplier,
        }
    }
}

impl From<&ModelEntry> for ModelSpec {
    fn from(entry: &ModelEntry) -> Self {
        ModelSpec::new(entry.name.clone(), entry.multiplier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_low")]
    pub low: ModelEntry,
    #[serde(default = "default_standard")]
    pub standard: ModelEntry,
    #[serde(default = "default_high")]
    pub high: ModelEntry,
    #[serde(default = "default_embedding")]
    pub embedding: ModelEntry,
}

fn default_low() -> ModelEntry {
    (&ModelSet::default().low).into()
}
fn default_standard() -> ModelEntry {
    (&ModelSet::default().standard).into()
}
fn default_high() -> ModelEntry {
    (&ModelSet::default().high).into()
}
fn default_embedding() -> ModelEntry {
    (&ModelSet::default().embedding).into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            low: default_low(),
            standard: default_standard(),
            high: default_high(),
            embedding: default_embedding(),
        }
    }
}

impl ModelsConfig {
    pub fn to_model_set(&self) -> ModelSet {
        ModelSet {
            low: (&self.low).into(),
            standard: (&self.standard).into(),
            high: (&self.high).into(),
            embedding: (&self.embedding).into(),
        }
    }

    fn entries(&self) -> [(&'static str, &ModelEntry); 4] {
        [
            ("low", &self.low),
            ("standard", &self.standard),
            ("high", &self.high),
            ("embedding", &self.embedding),
        ]
    }
}

/// Where quota balances live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Lifetime of a materialized balance.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Limit for users without their own `token_quota`.
    #[serde(default = "default_limit")]
    pub default_limit: i64,

    #[serde(default = "default_quota_backend")]
    pub backend: QuotaBackend,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_window_secs() -> u64 {
    14_400
}
fn default_limit() -> i64 {
    1_000_000
}
fn default_quota_backend() -> QuotaBackend {
    QuotaBackend::Memory
}
fn default_sqlite_path() -> String {
    AppConfig::config_dir()
        .join("quota.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            default_limit: default_limit(),
            backend: default_quota_backend(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens. Required by `serve`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_token_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model turns per reasoning loop.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Extra rounds the question agent gets when it produced nothing.
    #[serde(default = "default_max_review_rounds")]
    pub max_review_rounds: u32,

    /// Used when a request names no target language.
    #[serde(default = "default_language")]
    pub default_language: String,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_max_review_rounds() -> u32 {
    2
}
fn default_language() -> String {
    "en".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_review_rounds: default_max_review_rounds(),
            default_language: default_language(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.lingoclaw/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// - `LINGOCLAW_API_KEY`, then `OPENAI_API_KEY`: API key (if unset in file)
    /// - `OPENAI_BASE_URL`
    /// - `OPENAI_MODEL_{LOW,STANDARD,HIGH}`, `OPENAI_EMBED_MODEL` and their `_PRICE` variants
    /// - `TOKEN_QUOTA_WINDOW`
    /// - `LINGOCLAW_JWT_SECRET`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.llm.api_key.is_none() {
            self.llm.api_key = lookup("LINGOCLAW_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = url;
        }

        let tiers = [
            ("OPENAI_MODEL_LOW", &mut self.models.low),
            ("OPENAI_MODEL_STANDARD", &mut self.models.standard),
            ("OPENAI_MODEL_HIGH", &mut self.models.high),
            ("OPENAI_EMBED_MODEL", &mut self.models.embedding),
        ];
        for (var, entry) in tiers {
            if let Some(name) = lookup(var) {
                entry.name = name;
            }
            let price_var = format!("{var}_PRICE");
            if let Some(price) = lookup(&price_var) {
                entry.multiplier = parse_env(&price_var, &price)?;
            }
        }

        if let Some(window) = lookup("TOKEN_QUOTA_WINDOW") {
            self.quota.window_secs = parse_env("TOKEN_QUOTA_WINDOW", &window)?;
        }
        if let Some(secret) = lookup("LINGOCLAW_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".lingoclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        for (tier, entry) in self.models.entries() {
            if entry.multiplier <= 0 {
                return Err(ConfigError::ValidationError(format!(
                    "models.{tier}.multiplier must be > 0"
                )));
            }
            if entry.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "models.{tier}.name must not be empty"
                )));
            }
        }

        if self.quota.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "quota.window_secs must be > 0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        let mut ids: Vec<i64> = self.users.iter().map(|u| u.id).collect();
        ids.sort_unstable();
        if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::ValidationError(format!(
                "users: duplicate id {}",
                w[0]
            )));
        }

        Ok(())
    }

    /// The signing secret, required before serving or issuing tokens.
    pub fn jwt_secret(&self) -> Result<&str, ConfigError> {
        match self.auth.jwt_secret.as_deref() {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ConfigError::ValidationError(
                "auth.jwt_secret (or LINGOCLAW_JWT_SECRET) must be set".into(),
            )),
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{var} has invalid value '{value}'")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
