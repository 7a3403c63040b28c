//! In-process repositories.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use lingoclaw_core::error::RepositoryError;
use lingoclaw_core::record::{Entity, Page, PageResult, Repository, Resource, UserId};
use tokio::sync::RwLock;

/// A [`Repository`] that keeps records in a map ordered by id.
///
/// Ids start at 1 and are never reused.
pub struct InMemoryRepository<T> {
    resource: Resource,
    rows: RwLock<BTreeMap<i64, T>>,
    next_id: AtomicI64,
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Store a record under its own id, e.g. to seed users.
    pub async fn insert_with_id(&self, record: T) {
        let id = record.id();
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        self.rows.write().await.insert(id, record);
    }

    fn not_found(&self, id: i64) -> RepositoryError {
        RepositoryError::NotFound {
            resource: self.resource,
            id,
        }
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn get_by_id(&self, id: i64) -> Result<Option<T>, RepositoryError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn create(&self, mut record: T) -> Result<T, RepositoryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.set_id(id);
        self.rows.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: T) -> Result<T, RepositoryError> {
        let mut rows = self.rows.write().await;
        let slot = rows.get_mut(&record.id()).ok_or_else(|| self.not_found(record.id()))?;
        *slot = record.clone();
        Ok(record)
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| self.not_found(id))
    }

    async fn list(&self, user_id: UserId, page: Page) -> Result<PageResult<T>, RepositoryError> {
        let rows = self.rows.read().await;
        let owned: Vec<&T> = rows.values().filter(|r| r.user_id() == user_id).collect();
        Ok(PageResult {
            total: owned.len(),
            items: owned
                .into_iter()
                .skip(page.offset)
                .take(page.limit)
                .cloned()
                .collect(),
        })
    }

    async fn all_for_user(&self, user_id: UserId) -> Result<Vec<T>, RepositoryError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn count(&self, user_id: UserId) -> Result<usize, RepositoryError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.user_id() == user_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingoclaw_core::record::StoryRecord;

    fn story(user_id: UserId, summary: &str) -> StoryRecord {
        StoryRecord {
            id: 0,
            user_id,
            category: "travel".into(),
            summary: summary.into(),
            content: format!("{summary}, told in full"),
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let repo = InMemoryRepository::new(Resource::Story);
        let a = repo.create(story(1, "a")).await.unwrap();
        let b = repo.create(story(1, "b")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(repo.get_by_id(2).await.unwrap().unwrap().summary, "b");
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let repo = InMemoryRepository::new(Resource::Story);
        let mut s = story(1, "a");
        s.id = 42;
        let err = repo.update(s).await.unwrap_err();
        assert_eq!(err.error_type(), "story_not_found");
        assert!(repo.delete(42).await.is_err());
    }

    #[tokio::test]
    async fn update_replaces_record() {
        let repo = InMemoryRepository::new(Resource::Story);
        let mut s = repo.create(story(1, "a")).await.unwrap();
        s.summary = "edited".into();
        repo.update(s).await.unwrap();
        assert_eq!(repo.get_by_id(1).await.unwrap().unwrap().summary, "edited");
        repo.delete(1).await.unwrap();
        assert!(repo.get_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_pages_only_the_users_rows() {
        let repo = InMemoryRepository::new(Resource::Story);
        for i in 0..5 {
            repo.create(story(1, &format!("mine {i}"))).await.unwrap();
            repo.create(story(2, &format!("theirs {i}"))).await.unwrap();
        }
        let page = repo.list(1, Page { offset: 2, limit: 2 }).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].summary, "mine 2");
        assert_eq!(repo.count(2).await.unwrap(), 5);
        assert_eq!(repo.all_for_user(3).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn seeded_ids_are_not_reused() {
        let repo = InMemoryRepository::new(Resource::Story);
        let mut s = story(1, "seed");
        s.id = 10;
        repo.insert_with_id(s).await;
        assert_eq!(repo.create(story(1, "next")).await.unwrap().id, 11);
    }
}
