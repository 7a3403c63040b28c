//! In-process persistence for LingoClaw: repositories for every record type
//! and a brute-force vector index.

pub mod repository;
pub mod vector;

use std::sync::Arc;

use lingoclaw_core::record::{Repositories, Resource, UserRecord};

pub use repository::InMemoryRepository;
pub use vector::{InMemoryVectorIndex, cosine_similarity};

/// Handles to the concrete stores behind a [`Repositories`] bundle.
pub struct InMemoryStores {
    pub users: Arc<InMemoryRepository<UserRecord>>,
    pub repos: Repositories,
}

impl InMemoryStores {
    pub fn new() -> Self {
        let users = Arc::new(InMemoryRepository::new(Resource::User));
        let repos = Repositories {
            users: users.clone(),
            memories: Arc::new(InMemoryRepository::new(Resource::Memory)),
            vocab: Arc::new(InMemoryRepository::new(Resource::Vocab)),
            grammar: Arc::new(InMemoryRepository::new(Resource::Grammar)),
            mistakes: Arc::new(InMemoryRepository::new(Resource::Mistake)),
            stories: Arc::new(InMemoryRepository::new(Resource::Story)),
            question_sets: Arc::new(InMemoryRepository::new(Resource::QuestionSet)),
        };
        Self { users, repos }
    }

    /// Register a user with a fixed id.
    pub async fn seed_user(&self, id: i64, name: &str, token_quota: i64) {
        self.users
            .insert_with_id(UserRecord {
                id,
                name: name.into(),
                token_quota,
            })
            .await;
    }
}

impl Default for InMemoryStores {
    fn default() -> Self {
        Self::new()
    }
}

/// A session over fresh in-memory stores, for tests in downstream crates.
#[cfg(any(test, feature = "testing"))]
pub struct TestBed {
    pub session: lingoclaw_core::Session,
    pub stores: InMemoryStores,
    pub vectors: Arc<InMemoryVectorIndex>,
}

#[cfg(any(test, feature = "testing"))]
impl TestBed {
    /// User 1 speaking Spanish, with an unmetered `provider`.
    pub fn new(provider: Arc<dyn lingoclaw_core::Provider>) -> Self {
        let stores = InMemoryStores::new();
        let vectors = Arc::new(InMemoryVectorIndex::new());
        let principal = lingoclaw_core::Principal {
            user_id: 1,
            token_valid: true,
        };
        let session = lingoclaw_core::Session::new(
            &principal,
            "es",
            provider,
            lingoclaw_core::ModelSet::default(),
            stores.repos.clone(),
            vectors.clone(),
        );
        Self {
            session,
            stores,
            vectors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_user_is_visible_through_bundle() {
        let stores = InMemoryStores::new();
        stores.seed_user(3, "ana", 5000).await;
        let user = stores.repos.users.get_by_id(3).await.unwrap().unwrap();
        assert_eq!(user.token_quota, 5000);
    }
}
