//! Tools the LingoClaw agents call to read and maintain a learner's records.
//!
//! Every tool holds the request's [`Session`] and works through its
//! repositories, vector index and (metered) provider. Nothing here opens
//! resources of its own.

pub mod memory;
pub mod search;
pub mod skill;

use lingoclaw_core::error::ToolError;
use lingoclaw_core::record::Resource;
use lingoclaw_core::tool::ToolRegistry;
use lingoclaw_core::Session;
use tracing::debug;

pub use memory::{AddMemoryTool, DeleteMemoryTool, UpdateMemoryTool};
pub use search::SearchResourceTool;
pub use skill::{AddAndRecordSkillTool, RecordSkillTool};

/// Embed `text` and store it under `(resource, id)` for the session's user.
pub async fn index_text(
    session: &Session,
    resource: Resource,
    id: i64,
    text: &str,
) -> Result<(), ToolError> {
    let vector = session.embed(text).await?;
    session
        .vectors
        .upsert(resource, id, session.user_id, vector)
        .await?;
    debug!(%resource, id, "Indexed record");
    Ok(())
}

/// Tools for maintaining the learner profile after a quiz.
pub fn record_registry(session: &Session) -> ToolRegistry {
    use lingoclaw_core::record::SkillKind;

    ToolRegistry::new()
        .with(SearchResourceTool::new(session.clone()))
        .with(AddMemoryTool::new(session.clone()))
        .with(UpdateMemoryTool::new(session.clone()))
        .with(DeleteMemoryTool::new(session.clone()))
        .with(AddAndRecordSkillTool::new(session.clone(), SkillKind::Vocab))
        .with(RecordSkillTool::new(session.clone(), SkillKind::Vocab))
        .with(AddAndRecordSkillTool::new(session.clone(), SkillKind::Grammar))
        .with(RecordSkillTool::new(session.clone(), SkillKind::Grammar))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::ExecutionFailed {
        tool_name: "serialize".into(),
        reason: e.to_string(),
    })
}
