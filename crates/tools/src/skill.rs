//! Vocabulary and grammar tracking tools.
//!
//! One implementation serves both kinds; the [`SkillKind`] picks the
//! repository, vector collection and tool name.

use async_trait::async_trait;
use lingoclaw_core::error::ToolError;
use lingoclaw_core::record::{SkillKind, SkillRecord, get_owned};
use lingoclaw_core::tool::{Tool, ToolResult, required_i64, required_str};
use lingoclaw_core::Session;
use serde_json::Value;
use tracing::info;

use crate::{index_text, to_json};

fn required_bool(args: &Value, key: &str) -> Result<bool, ToolError> {
    args.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing required '{key}' parameter")))
}

fn outcome(record: &SkillRecord, correct: bool) -> String {
    format!(
        "{} '{}' recorded as {} ({}/{} correct).",
        record.kind.resource(),
        record.name,
        if correct { "correct" } else { "incorrect" },
        record.correct_count,
        record.review_count,
    )
}

/// `add_and_record_vocab` / `add_and_record_grammar`.
///
/// Creates the item with its first practice result. If the learner already
/// has an item with the same name (ignoring case) the practice is recorded
/// on it instead.
pub struct AddAndRecordSkillTool {
    session: Session,
    kind: SkillKind,
    name: String,
}

impl AddAndRecordSkillTool {
    pub fn new(session: Session, kind: SkillKind) -> Self {
        Self {
            session,
            kind,
            name: format!("add_and_record_{}", kind.resource()),
        }
    }
}

#[async_trait]
impl Tool for AddAndRecordSkillTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        match self.kind {
            SkillKind::Vocab => {
                "Track a word or phrase the learner used and whether they used it correctly."
            }
            SkillKind::Grammar => {
                "Track a grammar point the learner used and whether they used it correctly."
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "usage": { "type": "string", "description": "Example sentence or explanation" },
                "correct": { "type": "boolean" }
            },
            "required": ["name", "usage", "correct"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let name = required_str(&arguments, "name")?.trim();
        let usage = required_str(&arguments, "usage")?;
        let correct = required_bool(&arguments, "correct")?;
        let repo = self.session.repos.skills(self.kind);

        let existing = repo
            .all_for_user(self.session.user_id)
            .await?
            .into_iter()
            .find(|r| r.name.to_lowercase() == name.to_lowercase());

        let record = match existing {
            Some(mut record) => {
                record.record_practice(correct);
                repo.update(record).await?
            }
            None => {
                let mut record = SkillRecord {
                    id: 0,
                    user_id: self.session.user_id,
                    kind: self.kind,
                    name: name.to_string(),
                    usage: usage.to_string(),
                    language: self.session.target_language.clone(),
                    correct_count: 0,
                    review_count: 0,
                    last_review_at: None,
                };
                record.record_practice(correct);
                let record = repo.create(record).await?;
                let text = format!("{}: {}", record.name, record.usage);
                index_text(&self.session, self.kind.resource(), record.id, &text).await?;
                info!(user_id = record.user_id, kind = %self.kind.resource(), id = record.id, "Skill added");
                record
            }
        };

        Ok(ToolResult::ok(outcome(&record, correct)).with_data(to_json(&record)?))
    }
}

/// `record_vocab` / `record_grammar`: one more practice result on an
/// existing item.
pub struct RecordSkillTool {
    session: Session,
    kind: SkillKind,
    name: String,
}

impl RecordSkillTool {
    pub fn new(session: Session, kind: SkillKind) -> Self {
        Self {
            session,
            kind,
            name: format!("record_{}", kind.resource()),
        }
    }
}

#[async_trait]
impl Tool for RecordSkillTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        match self.kind {
            SkillKind::Vocab => "Record a correct or incorrect use of a tracked vocabulary item by id.",
            SkillKind::Grammar => "Record a correct or incorrect use of a tracked grammar point by id.",
        }
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "correct": { "type": "boolean" }
            },
            "required": ["id", "correct"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let id = required_i64(&arguments, "id")?;
        let correct = required_bool(&arguments, "correct")?;
        let repo = self.session.repos.skills(self.kind).as_ref();

        let mut record = get_owned(repo, self.kind.resource(), self.session.user_id, id).await?;
        record.record_practice(correct);
        let record = repo.update(record).await?;

        Ok(ToolResult::ok(outcome(&record, correct)).with_data(to_json(&record)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingoclaw_core::error::RepositoryError;
    use lingoclaw_core::record::Resource;
    use lingoclaw_core::testing::ScriptedProvider;
    use lingoclaw_memory::TestBed;
    use std::sync::Arc;

    fn bed() -> TestBed {
        TestBed::new(Arc::new(ScriptedProvider::default()))
    }

    #[tokio::test]
    async fn add_creates_with_first_practice() {
        let bed = bed();
        let tool = AddAndRecordSkillTool::new(bed.session.clone(), SkillKind::Grammar);
        assert_eq!(tool.name(), "add_and_record_grammar");

        let result = tool
            .execute(serde_json::json!({
                "name": "subjuntivo", "usage": "Espero que vengas", "correct": false
            }))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["review_count"], 1);
        assert_eq!(data["correct_count"], 0);
        assert_eq!(data["language"], "es");
        assert_eq!(data["kind"], "grammar");
        assert_eq!(bed.vectors.len().await, 1);
        assert!(bed.session.repos.vocab.all_for_user(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_twice_records_on_existing_item() {
        let bed = bed();
        let tool = AddAndRecordSkillTool::new(bed.session.clone(), SkillKind::Vocab);
        for (name, correct) in [("Casa", true), ("casa", true)] {
            tool.execute(serde_json::json!({"name": name, "usage": "u", "correct": correct}))
                .await
                .unwrap();
        }
        let items = bed.session.repos.vocab.all_for_user(1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].review_count, 2);
        assert!((items[0].status() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn record_updates_counts() {
        let bed = bed();
        let added = AddAndRecordSkillTool::new(bed.session.clone(), SkillKind::Vocab)
            .execute(serde_json::json!({"name": "perro", "usage": "u", "correct": true}))
            .await
            .unwrap();
        let id = added.data.unwrap()["id"].as_i64().unwrap();

        let result = RecordSkillTool::new(bed.session.clone(), SkillKind::Vocab)
            .execute(serde_json::json!({"id": id, "correct": false}))
            .await
            .unwrap();
        assert!(result.output.contains("1/2 correct"));
    }

    #[tokio::test]
    async fn record_on_wrong_kind_is_not_found() {
        let bed = bed();
        let added = AddAndRecordSkillTool::new(bed.session.clone(), SkillKind::Vocab)
            .execute(serde_json::json!({"name": "perro", "usage": "u", "correct": true}))
            .await
            .unwrap();
        let id = added.data.unwrap()["id"].as_i64().unwrap();

        let err = RecordSkillTool::new(bed.session.clone(), SkillKind::Grammar)
            .execute(serde_json::json!({"id": id, "correct": true}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ToolError::Repository(RepositoryError::NotFound { resource: Resource::Grammar, .. })
        ));
    }
}
