//! HTTP gateway for LingoClaw.
//!
//! Exposes the health check, the caller's quota and the two agents as SSE
//! and WebSocket streams under `/v1`.
//!
//! Built on Axum. Every dependency the handlers need is built once into
//! [`Services`] and shared through router state.

pub mod api_v1;
pub mod error;
pub mod scope;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method, header};
use axum::{Router, response::Json, routing::get};
use lingoclaw_agent::AgentSettings;
use lingoclaw_config::{AppConfig, ConfigError, QuotaBackend};
use lingoclaw_core::record::{Repositories, VectorIndex};
use lingoclaw_core::{AuthResolver, ModelSet, Provider};
use lingoclaw_memory::{InMemoryStores, InMemoryVectorIndex};
use lingoclaw_providers::OpenAiProvider;
use lingoclaw_quota::{InMemoryQuotaStore, QuotaManager, QuotaStore, SqliteQuotaStore};
use lingoclaw_security::TokenSigner;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::ApiError;
pub use scope::Caller;

/// Everything a request handler works against, built once at startup.
pub struct Services {
    pub config: AppConfig,
    /// The raw upstream provider. Requests wrap it in a metered provider.
    pub provider: Arc<dyn Provider>,
    pub models: ModelSet,
    pub quota: QuotaManager,
    pub repos: Repositories,
    pub vectors: Arc<dyn VectorIndex>,
    pub auth: Arc<dyn AuthResolver>,
    pub settings: AgentSettings,
}

pub type SharedServices = Arc<Services>;

impl Services {
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn Provider>,
        quota_store: Arc<dyn QuotaStore>,
        repos: Repositories,
        vectors: Arc<dyn VectorIndex>,
    ) -> Result<Self, ConfigError> {
        let signer = TokenSigner::new(
            config.jwt_secret()?,
            Duration::from_secs(config.auth.token_ttl_secs),
        );
        Ok(Self {
            models: config.models.to_model_set(),
            quota: QuotaManager::new(quota_store, Duration::from_secs(config.quota.window_secs)),
            settings: AgentSettings::from_config(&config),
            auth: Arc::new(signer),
            provider,
            repos,
            vectors,
            config,
        })
    }

    /// Production wiring: the OpenAI-compatible provider, the configured
    /// quota backend and in-memory stores seeded with `config.users`.
    pub async fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::from_config(&config.llm)?);
        let quota_store = quota_store(&config).await?;

        let stores = InMemoryStores::new();
        for user in &config.users {
            let limit = user.token_quota.unwrap_or(config.quota.default_limit);
            stores.seed_user(user.id, &user.name, limit).await;
        }
        info!(users = config.users.len(), "User repository seeded");

        Ok(Self::new(
            config,
            provider,
            quota_store,
            stores.repos,
            Arc::new(InMemoryVectorIndex::new()),
        )?)
    }
}

/// The quota store selected by `quota.backend`.
pub async fn quota_store(config: &AppConfig) -> Result<Arc<dyn QuotaStore>, lingoclaw_quota::QuotaError> {
    Ok(match config.quota.backend {
        QuotaBackend::Memory => Arc::new(InMemoryQuotaStore::new()),
        QuotaBackend::Sqlite => {
            let path = &config.quota.sqlite_path;
            let url = if path.starts_with("sqlite:") {
                path.clone()
            } else {
                format!("sqlite://{path}")
            };
            let store = SqliteQuotaStore::new(&url).await?;
            let purged = store.purge_expired().await?;
            if purged > 0 {
                info!(purged, "Purged expired quota balances");
            }
            Arc::new(store)
        }
    })
}

/// Build the full router.
///
/// Layers applied:
/// - CORS for browser clients, including the `Target-Language` header
/// - Request body size limit (`gateway.body_limit_bytes`)
/// - HTTP trace logging
pub fn build_router(services: SharedServices) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(scope::TARGET_LANGUAGE_HEADER),
        ])
        .max_age(Duration::from_secs(3600));
    let body_limit = services.config.gateway.body_limit_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router())
        .with_state(services)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let services = Arc::new(Services::from_config(config).await?);
    let app = build_router(services);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::response::Response;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use lingoclaw_core::provider::ProviderResponse;
    use lingoclaw_core::testing::ScriptedProvider;
    use lingoclaw_quota::QuotaBucket;
    use lingoclaw_security::Claims;

    pub const SECRET: &str = "test-secret";

    /// A router over scripted upstream replies and in-memory stores with
    /// user 1 registered.
    pub struct Harness {
        pub services: SharedServices,
        pub provider: Arc<ScriptedProvider>,
        pub stores: InMemoryStores,
        signer: TokenSigner,
    }

    impl Harness {
        pub async fn new(script: Vec<ProviderResponse>) -> Self {
            let mut config = AppConfig::default();
            config.auth.jwt_secret = Some(SECRET.into());
            let provider = Arc::new(ScriptedProvider::new(script));
            let stores = InMemoryStores::new();
            stores.seed_user(1, "ana", 1_000_000).await;
            let services = Services::new(
                config,
                provider.clone(),
                Arc::new(InMemoryQuotaStore::new()),
                stores.repos.clone(),
                Arc::new(InMemoryVectorIndex::new()),
            )
            .unwrap();
            Self {
                services: Arc::new(services),
                provider,
                stores,
                signer: TokenSigner::new(SECRET, Duration::from_secs(60)),
            }
        }

        pub fn router(&self) -> Router {
            build_router(self.services.clone())
        }

        pub fn token(&self, user_id: i64) -> String {
            self.signer.issue(user_id)
        }

        pub fn expired_token(&self, user_id: i64) -> String {
            self.signer.sign(&Claims {
                sub: user_id.to_string(),
                exp: Utc::now().timestamp() - 1,
            })
        }

        pub fn bucket(&self, user_id: i64) -> QuotaBucket {
            self.services.quota.bucket(user_id, 1_000_000)
        }

        pub async fn exhaust(&self, user_id: i64) {
            self.bucket(user_id).consume(1_000_001, 1).await.unwrap();
        }
    }

    pub async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Harness, body_json};
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let h = Harness::new(vec![]).await;
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = h.router().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn services_require_a_jwt_secret() {
        let result = Services::new(
            AppConfig::default(),
            Arc::new(lingoclaw_core::testing::ScriptedProvider::default()),
            Arc::new(InMemoryQuotaStore::new()),
            InMemoryStores::new().repos,
            Arc::new(InMemoryVectorIndex::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sqlite_backend_is_selectable() {
        let mut config = AppConfig::default();
        config.quota.backend = QuotaBackend::Sqlite;
        config.quota.sqlite_path = "sqlite::memory:".into();
        let store = quota_store(&config).await.unwrap();
        store.set_with_ttl("quota:1", 5, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("quota:1").await.unwrap().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn opening_sqlite_store_purges_expired_balances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.db").display().to_string();
        {
            let seed = SqliteQuotaStore::new(&format!("sqlite://{path}")).await.unwrap();
            seed.set_with_ttl("quota:1", 5, Duration::ZERO).await.unwrap();
            seed.set_with_ttl("quota:2", 7, Duration::from_secs(60)).await.unwrap();
        }

        let mut config = AppConfig::default();
        config.quota.backend = QuotaBackend::Sqlite;
        config.quota.sqlite_path = path.clone();
        let store = quota_store(&config).await.unwrap();
        assert_eq!(store.get("quota:2").await.unwrap().as_deref(), Some("7"));

        let reopened = SqliteQuotaStore::new(&format!("sqlite://{path}")).await.unwrap();
        assert_eq!(reopened.purge_expired().await.unwrap(), 0);
    }
}
