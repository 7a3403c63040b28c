//! Learning records and the persistence seams they are stored behind.
//!
//! Repositories and the vector index are collaborators: the domain only
//! relies on the traits here. `lingoclaw-memory` provides in-process
//! implementations.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

/// Identifier of an end user.
pub type UserId = i64;

/// Every kind of stored record. Also used as the vector collection name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    User,
    Memory,
    Vocab,
    Grammar,
    Mistake,
    Story,
    QuestionSet,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Memory => "memory",
            Self::Vocab => "vocab",
            Self::Grammar => "grammar",
            Self::Mistake => "mistake",
            Self::Story => "story",
            Self::QuestionSet => "question_set",
        }
    }

    pub fn not_found_type(&self) -> &'static str {
        match self {
            Self::User => "user_not_found",
            Self::Memory => "memory_not_found",
            Self::Vocab => "vocab_not_found",
            Self::Grammar => "grammar_not_found",
            Self::Mistake => "mistake_not_found",
            Self::Story => "story_not_found",
            Self::QuestionSet => "question_set_not_found",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "memory" => Some(Self::Memory),
            "vocab" => Some(Self::Vocab),
            "grammar" => Some(Self::Grammar),
            "mistake" => Some(Self::Mistake),
            "story" => Some(Self::Story),
            "question_set" => Some(Self::QuestionSet),
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that can live in a [`Repository`].
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> i64;
    fn set_id(&mut self, id: i64);
    /// Owner of the record. Users own themselves.
    fn user_id(&self) -> UserId;
}

macro_rules! owned_entity {
    ($ty:ty) => {
        impl Entity for $ty {
            fn id(&self) -> i64 {
                self.id
            }
            fn set_id(&mut self, id: i64) {
                self.id = id;
            }
            fn user_id(&self) -> UserId {
                self.user_id
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    /// Token budget per quota window.
    pub token_quota: i64,
}

impl Entity for UserRecord {
    fn id(&self) -> i64 {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
    fn user_id(&self) -> UserId {
        self.id
    }
}

/// A fact about the learner maintained by the record agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub user_id: UserId,
    pub category: String,
    pub summary: String,
    pub content: String,
    /// Higher sorts first when building prompts.
    pub priority: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    Vocab,
    Grammar,
}

impl SkillKind {
    pub fn resource(&self) -> Resource {
        match self {
            Self::Vocab => Resource::Vocab,
            Self::Grammar => Resource::Grammar,
        }
    }
}

/// A vocabulary item or grammar point with its practice history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: i64,
    pub user_id: UserId,
    pub kind: SkillKind,
    pub name: String,
    pub usage: String,
    pub language: String,
    pub correct_count: u32,
    pub review_count: u32,
    pub last_review_at: Option<DateTime<Utc>>,
}

impl SkillRecord {
    /// Mastery ratio in `0.0..=1.0`; unreviewed items are `0.0`.
    pub fn status(&self) -> f64 {
        if self.review_count == 0 {
            0.0
        } else {
            f64::from(self.correct_count) / f64::from(self.review_count)
        }
    }

    /// Count one practice attempt.
    pub fn record_practice(&mut self, correct: bool) {
        self.review_count += 1;
        if correct {
            self.correct_count += 1;
        }
        self.last_review_at = Some(Utc::now());
    }
}

/// A wrongly answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MistakeRecord {
    pub id: i64,
    pub user_id: UserId,
    pub question: String,
    pub question_type: String,
    pub language: String,
    pub answer: String,
    pub correct_answer: String,
    pub error_reason: String,
    /// The full question, answer key included.
    pub question_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryRecord {
    pub id: i64,
    pub user_id: UserId,
    pub category: String,
    pub summary: String,
    pub content: String,
}

/// A generated question set together with its answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSetRecord {
    pub id: i64,
    pub user_id: UserId,
    pub language: String,
    pub questions: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

owned_entity!(MemoryRecord);
owned_entity!(SkillRecord);
owned_entity!(MistakeRecord);
owned_entity!(StoryRecord);
owned_entity!(QuestionSetRecord);

/// Pagination window for [`Repository::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// CRUD access to one record type.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<T>, RepositoryError>;

    /// Store a new record; the repository assigns the id.
    async fn create(&self, record: T) -> Result<T, RepositoryError>;

    /// Replace an existing record.
    async fn update(&self, record: T) -> Result<T, RepositoryError>;

    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;

    /// One page of a user's records, ordered by id.
    async fn list(&self, user_id: UserId, page: Page) -> Result<PageResult<T>, RepositoryError>;

    /// Every record owned by `user_id`, ordered by id.
    async fn all_for_user(&self, user_id: UserId) -> Result<Vec<T>, RepositoryError>;

    async fn count(&self, user_id: UserId) -> Result<usize, RepositoryError> {
        Ok(self.all_for_user(user_id).await?.len())
    }
}

/// Fetch a record and make sure `user_id` owns it.
pub async fn get_owned<T: Entity>(
    repo: &dyn Repository<T>,
    resource: Resource,
    user_id: UserId,
    id: i64,
) -> Result<T, RepositoryError> {
    let record = repo
        .get_by_id(id)
        .await?
        .ok_or(RepositoryError::NotFound { resource, id })?;
    if record.user_id() != user_id {
        // Do not reveal that another user's record exists.
        return Err(RepositoryError::NotFound { resource, id });
    }
    Ok(record)
}

/// Restricts a vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorFilter {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredId {
    pub id: i64,
    pub score: f32,
}

/// Similarity search over record embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        collection: Resource,
        id: i64,
        user_id: UserId,
        vector: Vec<f32>,
    ) -> Result<(), RepositoryError>;

    async fn remove(&self, collection: Resource, id: i64) -> Result<(), RepositoryError>;

    /// Ids ranked by descending similarity.
    async fn search(
        &self,
        collection: Resource,
        vector: &[f32],
        filter: VectorFilter,
        limit: usize,
    ) -> Result<Vec<ScoredId>, RepositoryError>;
}

/// All repositories a request may touch.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn Repository<UserRecord>>,
    pub memories: Arc<dyn Repository<MemoryRecord>>,
    pub vocab: Arc<dyn Repository<SkillRecord>>,
    pub grammar: Arc<dyn Repository<SkillRecord>>,
    pub mistakes: Arc<dyn Repository<MistakeRecord>>,
    pub stories: Arc<dyn Repository<StoryRecord>>,
    pub question_sets: Arc<dyn Repository<QuestionSetRecord>>,
}

impl Repositories {
    pub fn skills(&self, kind: SkillKind) -> &Arc<dyn Repository<SkillRecord>> {
        match kind {
            SkillKind::Vocab => &self.vocab,
            SkillKind::Grammar => &self.grammar,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill() -> SkillRecord {
        SkillRecord {
            id: 1,
            user_id: 1,
            kind: SkillKind::Vocab,
            name: "casa".into(),
            usage: "la casa es grande".into(),
            language: "es".into(),
            correct_count: 0,
            review_count: 0,
            last_review_at: None,
        }
    }

    #[test]
    fn skill_status_is_ratio() {
        let mut s = skill();
        assert_eq!(s.status(), 0.0);
        s.record_practice(true);
        s.record_practice(false);
        s.record_practice(true);
        s.record_practice(true);
        assert_eq!(s.review_count, 4);
        assert!((s.status() - 0.75).abs() < f64::EPSILON);
        assert!(s.last_review_at.is_some());
    }

    #[test]
    fn resource_names_round_trip() {
        for r in [
            Resource::Memory,
            Resource::Vocab,
            Resource::Grammar,
            Resource::Mistake,
            Resource::Story,
        ] {
            assert_eq!(Resource::parse(r.as_str()), Some(r));
        }
        assert_eq!(Resource::parse("nope"), None);
        assert_eq!(Resource::Story.not_found_type(), "story_not_found");
    }

    #[test]
    fn user_owns_itself() {
        let u = UserRecord {
            id: 9,
            name: "ana".into(),
            token_quota: 1000,
        };
        assert_eq!(u.user_id(), 9);
    }
}
