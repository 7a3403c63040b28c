//! Vector similarity search.

use std::collections::HashMap;

use async_trait::async_trait;
use lingoclaw_core::error::RepositoryError;
use lingoclaw_core::record::{Resource, ScoredId, UserId, VectorFilter, VectorIndex};
use tokio::sync::RwLock;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    (dot / denom) as f32
}

struct Point {
    user_id: UserId,
    vector: Vec<f32>,
}

/// Brute-force [`VectorIndex`] held in memory.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    points: RwLock<HashMap<(Resource, i64), Point>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        collection: Resource,
        id: i64,
        user_id: UserId,
        vector: Vec<f32>,
    ) -> Result<(), RepositoryError> {
        self.points
            .write()
            .await
            .insert((collection, id), Point { user_id, vector });
        Ok(())
    }

    async fn remove(&self, collection: Resource, id: i64) -> Result<(), RepositoryError> {
        self.points.write().await.remove(&(collection, id));
        Ok(())
    }

    async fn search(
        &self,
        collection: Resource,
        vector: &[f32],
        filter: VectorFilter,
        limit: usize,
    ) -> Result<Vec<ScoredId>, RepositoryError> {
        let points = self.points.read().await;
        let mut scored: Vec<ScoredId> = points
            .iter()
            .filter(|((c, _), p)| *c == collection && p.user_id == filter.user_id)
            .map(|((_, id), p)| ScoredId {
                id: *id,
                score: cosine_similarity(&p.vector, vector),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}
