//! Quota metering around any provider.
//!
//! [`MeteredProvider`] checks the caller's [`QuotaBucket`] before every model
//! call and charges `total_tokens * multiplier` after it succeeds. The
//! multiplier comes from the tier of the *requested* model. Failed calls are
//! never charged.

use std::sync::Arc;

use async_trait::async_trait;
use lingoclaw_core::error::ProviderError;
use lingoclaw_core::model::ModelSet;
use lingoclaw_core::provider::*;
use lingoclaw_quota::QuotaBucket;
use tokio::sync::mpsc;
use tracing::debug;

/// A provider whose calls are gated and charged against one user's quota.
pub struct MeteredProvider {
    inner: Arc<dyn Provider>,
    bucket: QuotaBucket,
    models: ModelSet,
    estimate: i64,
}

impl MeteredProvider {
    pub fn new(inner: Arc<dyn Provider>, bucket: QuotaBucket, models: ModelSet) -> Self {
        Self {
            inner,
            bucket,
            models,
            estimate: 0,
        }
    }

    /// Units that must remain before a call is allowed. Defaults to 0.
    pub fn with_estimate(mut self, estimate: i64) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn bucket(&self) -> &QuotaBucket {
        &self.bucket
    }

    async fn charge(&self, model: &str, usage: Option<Usage>) -> Result<(), ProviderError> {
        charge(&self.bucket, &self.models, model, usage).await
    }
}

async fn charge(
    bucket: &QuotaBucket,
    models: &ModelSet,
    model: &str,
    usage: Option<Usage>,
) -> Result<(), ProviderError> {
    let Some(usage) = usage else {
        debug!(model, "Provider reported no usage, nothing charged");
        return Ok(());
    };
    bucket
        .consume(i64::from(usage.total_tokens), models.multiplier_for(model))
        .await?;
    Ok(())
}

#[async_trait]
impl Provider for MeteredProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.bucket.check(self.estimate).await?;
        let model = request.model.clone();
        let response = self.inner.complete(request).await?;
        self.charge(&model, response.usage).await?;
        Ok(response)
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        self.bucket.check(self.estimate).await?;
        let model = request.model.clone();
        let mut upstream = self.inner.stream(request).await?;

        let (tx, rx) = mpsc::channel(64);
        let bucket = self.bucket.clone();
        let models = self.models.clone();

        tokio::spawn(async move {
            let mut charged = false;
            while let Some(item) = upstream.recv().await {
                let item = match item {
                    Ok(chunk) if chunk.usage.is_some() && !charged => {
                        // Charge before the consumer sees the end of the stream.
                        charged = true;
                        match charge(&bucket, &models, &model, chunk.usage).await {
                            Ok(()) => Ok(chunk),
                            Err(e) => Err(e),
                        }
                    }
                    other => other,
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.bucket.check(self.estimate).await?;
        let model = request.model.clone();
        let response = self.inner.embed(request).await?;
        self.charge(&model, response.usage).await?;
        Ok(response)
    }
}
