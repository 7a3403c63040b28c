//! Tools that maintain the learner profile (`MemoryRecord`s).
//!
//! Every write is mirrored into the vector index so `search_resource` can
//! find memories by meaning.

use async_trait::async_trait;
use chrono::Utc;
use lingoclaw_core::error::ToolError;
use lingoclaw_core::record::{MemoryRecord, Resource, get_owned};
use lingoclaw_core::tool::{Tool, ToolResult, required_i64, required_str};
use lingoclaw_core::Session;
use serde_json::Value;
use tracing::info;

use crate::{index_text, to_json};

fn embedding_text(memory: &MemoryRecord) -> String {
    format!("{}\n{}", memory.summary, memory.content)
}

pub struct AddMemoryTool {
    session: Session,
}

impl AddMemoryTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for AddMemoryTool {
    fn name(&self) -> &str {
        "add_memory"
    }

    fn description(&self) -> &str {
        "Remember a new fact about the learner (goals, level, interests, recurring problems). \
         Search existing memories first and prefer update_memory over duplicates."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "category": { "type": "string" },
                "summary": { "type": "string", "description": "One line" },
                "content": { "type": "string" },
                "priority": { "type": "integer", "description": "Higher is more important", "default": 0 }
            },
            "required": ["category", "summary", "content"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let record = MemoryRecord {
            id: 0,
            user_id: self.session.user_id,
            category: required_str(&arguments, "category")?.to_string(),
            summary: required_str(&arguments, "summary")?.to_string(),
            content: required_str(&arguments, "content")?.to_string(),
            priority: arguments["priority"].as_i64().unwrap_or(0) as i32,
            updated_at: Utc::now(),
        };
        let record = self.session.repos.memories.create(record).await?;
        index_text(&self.session, Resource::Memory, record.id, &embedding_text(&record)).await?;
        info!(user_id = record.user_id, id = record.id, "Memory added");

        Ok(ToolResult::ok(format!("Memory {} saved.", record.id)).with_data(to_json(&record)?))
    }
}

pub struct UpdateMemoryTool {
    session: Session,
}

impl UpdateMemoryTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for UpdateMemoryTool {
    fn name(&self) -> &str {
        "update_memory"
    }

    fn description(&self) -> &str {
        "Change an existing memory. Only the given fields are replaced."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "category": { "type": "string" },
                "summary": { "type": "string" },
                "content": { "type": "string" },
                "priority": { "type": "integer" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let id = required_i64(&arguments, "id")?;
        let repo = self.session.repos.memories.as_ref();
        let mut record = get_owned(repo, Resource::Memory, self.session.user_id, id).await?;

        if let Some(category) = arguments["category"].as_str() {
            record.category = category.to_string();
        }
        if let Some(summary) = arguments["summary"].as_str() {
            record.summary = summary.to_string();
        }
        if let Some(content) = arguments["content"].as_str() {
            record.content = content.to_string();
        }
        if let Some(priority) = arguments["priority"].as_i64() {
            record.priority = priority as i32;
        }
        record.updated_at = Utc::now();

        let record = repo.update(record).await?;
        index_text(&self.session, Resource::Memory, record.id, &embedding_text(&record)).await?;

        Ok(ToolResult::ok(format!("Memory {id} updated.")).with_data(to_json(&record)?))
    }
}

pub struct DeleteMemoryTool {
    session: Session,
}

impl DeleteMemoryTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for DeleteMemoryTool {
    fn name(&self) -> &str {
        "delete_memory"
    }

    fn description(&self) -> &str {
        "Forget a memory that is wrong or no longer true."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "id": { "type": "integer" } },
            "required": ["id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let id = required_i64(&arguments, "id")?;
        let repo = self.session.repos.memories.as_ref();
        get_owned(repo, Resource::Memory, self.session.user_id, id).await?;
        repo.delete(id).await?;
        self.session.vectors.remove(Resource::Memory, id).await?;

        Ok(ToolResult::ok(format!("Memory {id} deleted.")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingoclaw_core::error::RepositoryError;
    use lingoclaw_core::testing::ScriptedProvider;
    use lingoclaw_memory::TestBed;
    use std::sync::Arc;

    fn bed() -> (TestBed, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::default());
        (TestBed::new(provider.clone()), provider)
    }

    #[tokio::test]
    async fn add_update_delete_keeps_index_in_sync() {
        let (bed, provider) = bed();
        let s = bed.session.clone();

        let added = AddMemoryTool::new(s.clone())
            .execute(serde_json::json!({
                "category": "goal", "summary": "Trip", "content": "Travels to Peru in May", "priority": 3
            }))
            .await
            .unwrap();
        let id = added.data.unwrap()["id"].as_i64().unwrap();
        assert_eq!(bed.vectors.len().await, 1);
        assert_eq!(provider.embed_calls(), 1);

        UpdateMemoryTool::new(s.clone())
            .execute(serde_json::json!({"id": id, "content": "Travels to Peru in June"}))
            .await
            .unwrap();
        let stored = s.repos.memories.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.content, "Travels to Peru in June");
        assert_eq!(stored.summary, "Trip");
        assert_eq!(stored.priority, 3);
        assert_eq!(provider.embed_calls(), 2);

        DeleteMemoryTool::new(s.clone())
            .execute(serde_json::json!({"id": id}))
            .await
            .unwrap();
        assert!(s.repos.memories.get_by_id(id).await.unwrap().is_none());
        assert_eq!(bed.vectors.len().await, 0);
    }

    #[tokio::test]
    async fn cannot_touch_another_users_memory() {
        let (bed, _) = bed();
        let foreign = bed
            .session
            .repos
            .memories
            .create(MemoryRecord {
                id: 0,
                user_id: 2,
                category: "c".into(),
                summary: "s".into(),
                content: "x".into(),
                priority: 0,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let err = DeleteMemoryTool::new(bed.session.clone())
            .execute(serde_json::json!({"id": foreign.id}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Repository(RepositoryError::NotFound { resource: Resource::Memory, .. })
        ));
        assert!(bed.session.repos.memories.get_by_id(foreign.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn add_requires_summary() {
        let (bed, _) = bed();
        let err = AddMemoryTool::new(bed.session.clone())
            .execute(serde_json::json!({"category": "goal", "content": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
