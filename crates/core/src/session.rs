//! Per-request unit of work.

use std::sync::Arc;

use crate::auth::Principal;
use crate::error::ProviderError;
use crate::model::{ModelSet, ModelTier};
use crate::provider::{EmbeddingRequest, Provider};
use crate::record::{Repositories, UserId, VectorIndex};

/// Everything one request works against.
///
/// Built once per request by the transport layer and shared by the agent and
/// every tool it invokes. `provider` is already quota-metered for `user_id`.
#[derive(Clone)]
pub struct Session {
    pub user_id: UserId,
    pub target_language: String,
    pub provider: Arc<dyn Provider>,
    pub models: ModelSet,
    pub repos: Repositories,
    pub vectors: Arc<dyn VectorIndex>,
}

impl Session {
    pub fn new(
        principal: &Principal,
        target_language: impl Into<String>,
        provider: Arc<dyn Provider>,
        models: ModelSet,
        repos: Repositories,
        vectors: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            user_id: principal.user_id,
            target_language: target_language.into(),
            provider,
            models,
            repos,
            vectors,
        }
    }

    pub fn model(&self, tier: ModelTier) -> &str {
        &self.models.get(tier).name
    }

    /// Embed one text with the embedding tier.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model(ModelTier::Embedding).to_string(),
                inputs: vec![text.to_string()],
            })
            .await?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::StreamInterrupted("empty embedding response".into()))
    }
}
