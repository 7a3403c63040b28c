//! `search_resource`: find a learner's records by regex or by similarity.

use async_trait::async_trait;
use lingoclaw_core::error::ToolError;
use lingoclaw_core::record::{Resource, VectorFilter};
use lingoclaw_core::tool::{Tool, ToolResult, required_str};
use lingoclaw_core::Session;
use regex_lite::RegexBuilder;
use serde_json::Value;
use tracing::debug;

use crate::to_json;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

/// Fields the model may search, per resource.
pub const SEARCHABLE_FIELDS: &[(Resource, &[&str])] = &[
    (Resource::Vocab, &["name", "usage"]),
    (Resource::Grammar, &["name", "usage"]),
    (Resource::Memory, &["content", "summary"]),
    (Resource::Story, &["category", "summary", "content"]),
    (
        Resource::Mistake,
        &["question", "answer", "correct_answer", "error_reason"],
    ),
];

fn is_searchable(resource: Resource, field: &str) -> bool {
    SEARCHABLE_FIELDS
        .iter()
        .any(|(r, fields)| *r == resource && fields.contains(&field))
}

pub struct SearchResourceTool {
    session: Session,
}

impl SearchResourceTool {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Every record of `resource` owned by the session user, as JSON.
    async fn load(&self, resource: Resource) -> Result<Vec<Value>, ToolError> {
        let repos = &self.session.repos;
        let user = self.session.user_id;
        let rows = match resource {
            Resource::Vocab => to_json(&repos.vocab.all_for_user(user).await?)?,
            Resource::Grammar => to_json(&repos.grammar.all_for_user(user).await?)?,
            Resource::Memory => to_json(&repos.memories.all_for_user(user).await?)?,
            Resource::Story => to_json(&repos.stories.all_for_user(user).await?)?,
            Resource::Mistake => to_json(&repos.mistakes.all_for_user(user).await?)?,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "'{other}' is not searchable"
                )));
            }
        };
        Ok(match rows {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }

    fn regex_search(
        rows: Vec<Value>,
        field: &str,
        query: &str,
        limit: usize,
    ) -> Vec<Value> {
        // Models often send plain phrases with stray metacharacters.
        let regex = RegexBuilder::new(query)
            .case_insensitive(true)
            .build()
            .or_else(|_| {
                RegexBuilder::new(&regex_lite::escape(query))
                    .case_insensitive(true)
                    .build()
            });
        let Ok(regex) = regex else {
            return Vec::new();
        };

        rows.into_iter()
            .filter(|row| {
                row.get(field)
                    .and_then(Value::as_str)
                    .is_some_and(|text| regex.is_match(text))
            })
            .take(limit)
            .collect()
    }

    async fn vector_search(
        &self,
        resource: Resource,
        rows: Vec<Value>,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, ToolError> {
        let vector = self.session.embed(query).await?;
        let hits = self
            .session
            .vectors
            .search(
                resource,
                &vector,
                VectorFilter {
                    user_id: self.session.user_id,
                },
                limit,
            )
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let mut row = rows
                    .iter()
                    .find(|r| r.get("id").and_then(Value::as_i64) == Some(hit.id))?
                    .clone();
                row["score"] = Value::from(hit.score);
                Some(row)
            })
            .collect())
    }
}

#[async_trait]
impl Tool for SearchResourceTool {
    fn name(&self) -> &str {
        "search_resource"
    }

    fn description(&self) -> &str {
        "Search the learner's records. Regex search (default) matches the given field \
         case-insensitively. Vector search ranks records by meaning and ignores 'field'. \
         Searchable: vocab.name, vocab.usage, grammar.name, grammar.usage, memory.content, \
         memory.summary, story.category, story.summary, story.content, mistake.question, \
         mistake.answer, mistake.correct_answer, mistake.error_reason."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "resource": {
                    "type": "string",
                    "enum": ["vocab", "grammar", "memory", "story", "mistake"]
                },
                "field": { "type": "string", "description": "Field to match" },
                "query": { "type": "string", "description": "Regex, or free text for vector search" },
                "is_vector": { "type": "boolean", "default": false },
                "limit": { "type": "integer", "default": DEFAULT_LIMIT }
            },
            "required": ["resource", "field", "query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let resource_name = required_str(&arguments, "resource")?;
        let field = required_str(&arguments, "field")?;
        let query = required_str(&arguments, "query")?;
        let is_vector = arguments["is_vector"].as_bool().unwrap_or(false);
        let limit = arguments["limit"]
            .as_u64()
            .map_or(DEFAULT_LIMIT, |l| (l as usize).clamp(1, MAX_LIMIT));

        let resource = Resource::parse(resource_name).ok_or_else(|| {
            ToolError::InvalidArguments(format!("Unknown resource '{resource_name}'"))
        })?;
        if !is_searchable(resource, field) {
            return Err(ToolError::InvalidArguments(format!(
                "'{resource_name}.{field}' is not searchable"
            )));
        }

        let rows = self.load(resource).await?;
        let found = if is_vector {
            self.vector_search(resource, rows, query, limit).await?
        } else {
            Self::regex_search(rows, field, query, limit)
        };
        debug!(%resource, field, is_vector, hits = found.len(), "search_resource");

        let output = if found.is_empty() {
            format!("No {resource_name} records match '{query}'.")
        } else {
            serde_json::to_string_pretty(&found).unwrap_or_default()
        };
        Ok(ToolResult::ok(output).with_data(Value::Array(found)))
    }
}
