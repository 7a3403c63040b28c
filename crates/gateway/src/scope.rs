//! Per-request scoping: who is calling, in which language, against which
//! quota.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Query};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use lingoclaw_core::error::AuthError;
use lingoclaw_core::record::UserRecord;
use lingoclaw_core::{Principal, Session};
use lingoclaw_providers::MeteredProvider;
use lingoclaw_quota::QuotaBucket;
use serde::Deserialize;
use tracing::debug;

use crate::SharedServices;
use crate::error::ApiError;

pub const TARGET_LANGUAGE_HEADER: &str = "target-language";

#[derive(Debug, Default, Deserialize)]
struct ScopeQuery {
    token: Option<String>,
    target_language: Option<String>,
}

/// An authenticated caller.
///
/// The bearer token comes from the `Authorization` header, or from the
/// `token` query parameter for clients (browsers opening a WebSocket) that
/// cannot set headers.
#[derive(Debug, Clone)]
pub struct Caller {
    pub principal: Principal,
    pub user: UserRecord,
    pub language: String,
    pub bucket: QuotaBucket,
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl FromRequestParts<SharedServices> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        services: &SharedServices,
    ) -> Result<Self, Self::Rejection> {
        let query = Query::<ScopeQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        let token = non_empty(bearer(&parts.headers))
            .or_else(|| non_empty(query.token.as_deref()))
            .ok_or(AuthError::MissingToken)?;
        let principal = services.auth.authenticate(&token)?;
        let user = services
            .repos
            .users
            .get_by_id(principal.user_id)
            .await?
            .ok_or(AuthError::UserNotFound(principal.user_id))?;

        let language = non_empty(
            parts
                .headers
                .get(TARGET_LANGUAGE_HEADER)
                .and_then(|v| v.to_str().ok()),
        )
        .or_else(|| non_empty(query.target_language.as_deref()))
        .unwrap_or_else(|| services.config.agent.default_language.clone());

        let bucket = services.quota.bucket(user.id, user.token_quota);
        debug!(user_id = user.id, language = %language, "Request scoped");
        Ok(Self {
            principal,
            user,
            language,
            bucket,
        })
    }
}

impl Caller {
    /// Pre-flight quota check, then a session whose provider is metered
    /// against this caller's bucket.
    pub async fn session(&self, services: &SharedServices) -> Result<Session, ApiError> {
        self.bucket.check(0).await?;
        let provider = MeteredProvider::new(
            services.provider.clone(),
            self.bucket.clone(),
            services.models.clone(),
        );
        Ok(Session::new(
            &self.principal,
            self.language.clone(),
            Arc::new(provider),
            services.models.clone(),
            services.repos.clone(),
            services.vectors.clone(),
        ))
    }
}
