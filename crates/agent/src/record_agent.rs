//! The record agent: judges a submitted question set, updates the learner's
//! profile from the results and writes a study suggestion.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lingoclaw_core::error::{AgentError, RepositoryError, ToolError};
use lingoclaw_core::message::Message;
use lingoclaw_core::model::ModelTier;
use lingoclaw_core::record::{Resource, get_owned};
use lingoclaw_core::tool::{Tool, ToolRegistry, ToolResult, required_str};
use lingoclaw_core::{Error, Session};
use lingoclaw_questions::{JudgeResult, Question, QuestionHandler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::AgentSettings;
use crate::core_agent::{Agent, AgentContext};
use crate::profile::Profile;
use crate::loop_runner::ToolLoop;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub index: usize,
    #[serde(default)]
    pub answer: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInput {
    pub set_id: i64,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutput {
    pub suggestion: String,
    pub judge_results: Vec<JudgeResult>,
}

pub struct RecordAgent {
    settings: AgentSettings,
}

impl RecordAgent {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    fn tool_loop(&self, session: &Session, tools: ToolRegistry) -> ToolLoop {
        ToolLoop::new(
            session.provider.clone(),
            session.model(ModelTier::Standard),
            tools,
        )
        .with_temperature(self.settings.temperature)
        .with_max_iterations(self.settings.max_iterations)
    }

    fn record_prompt(language: &str, profile: &Profile) -> String {
        format!(
            "You maintain the learning profile of a student of '{language}' after a quiz.\n\n\
             Tools:\n\
             - search_resource: look up vocab, grammar, memories, stories and mistakes. Always \
             search vocab and grammar by regex before adding, so nothing is added twice.\n\
             - add_and_record_vocab / add_and_record_grammar: add a new item; the practice is \
             recorded automatically.\n\
             - record_vocab / record_grammar: record a correct or incorrect use of an existing item.\n\
             - add_memory / update_memory / delete_memory: keep facts about the learner. A memory \
             summary is one line; details go in content. Keep the style of existing memories.\n\n\
             Record every vocab and grammar point the quiz exercised, then reply with a short \
             note and no tool calls.\n\n{}",
            profile.record_context()
        )
    }

    fn suggestion_prompt(language: &str) -> String {
        format!(
            "You are the tutor of a student of '{language}'. Based on the quiz results and the \
             profile updates above, write a short, encouraging study suggestion in the student's \
             language and save it with set_suggestion."
        )
    }
}

/// Renders judged answers as the text the model reviews. Also the fallback
/// suggestion when the model never sets one.
pub fn judge_summary(results: &[JudgeResult]) -> String {
    results
        .iter()
        .map(|r| {
            let mut block = format!(
                "#{}\n{}\nAnswer: {}\n",
                r.index + 1,
                r.question,
                if r.answer.is_empty() { "(none)" } else { &r.answer },
            );
            if let Some(correct) = &r.correct_answer {
                block.push_str(&format!("Correct Answer: {correct}\n"));
            }
            block.push_str(&format!("Correct: {}\n", r.correct));
            if let Some(reason) = &r.error_reason {
                block.push_str(&format!("Error Reason: {reason}\n"));
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Agent for RecordAgent {
    type Input = RecordInput;
    type Output = RecordOutput;

    fn name(&self) -> &'static str {
        "record"
    }

    async fn run(
        &self,
        ctx: &AgentContext<RecordOutput>,
        input: RecordInput,
    ) -> Result<RecordOutput, Error> {
        let session = ctx.session();
        let set = get_owned(
            session.repos.question_sets.as_ref(),
            Resource::QuestionSet,
            session.user_id,
            input.set_id,
        )
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound { id, .. } => Error::from(AgentError::QuestionSetNotFound(id)),
            other => other.into(),
        })?;
        let questions: Vec<Question> = serde_json::from_value(set.questions)?;

        if let Some(bad) = input.answers.iter().find(|a| a.index >= questions.len()) {
            return Err(AgentError::InvalidInput(format!(
                "answer index {} out of range (set has {} questions)",
                bad.index,
                questions.len()
            ))
            .into());
        }

        let handler = QuestionHandler::new(session.clone());
        let mut judge_results = Vec::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            let answer = input
                .answers
                .iter()
                .rev()
                .find(|a| a.index == index)
                .map(|a| &a.answer)
                .filter(|a| !a.is_null());
            judge_results.push(handler.judge(index, question, answer).await?);
        }
        let correct = judge_results.iter().filter(|r| r.correct).count();
        let summary = judge_summary(&judge_results);

        ctx.message("📝", format!("{correct}/{} correct, updating your profile", questions.len()));
        let profile = Profile::load(session).await?;
        let language = &session.target_language;

        let record_loop = self.tool_loop(session, lingoclaw_tools::record_registry(session));
        let outcome = ctx
            .run_stream_events(
                &record_loop,
                vec![
                    Message::system(Self::record_prompt(language, &profile)),
                    Message::user(summary.clone()),
                ],
            )
            .await?;

        let suggestion = SuggestionSlot::default();
        let suggestion_loop = self.tool_loop(
            session,
            ToolRegistry::new().with(SetSuggestionTool::new(suggestion.clone())),
        );
        let mut messages = outcome.messages;
        messages.push(Message::user(Self::suggestion_prompt(language)));
        ctx.run_stream_events(&suggestion_loop, messages).await?;

        info!(
            user_id = session.user_id,
            set_id = input.set_id,
            correct,
            total = questions.len(),
            "Answers recorded"
        );
        Ok(RecordOutput {
            suggestion: suggestion.take().unwrap_or(summary),
            judge_results,
        })
    }
}

/// Where `set_suggestion` leaves its text.
#[derive(Debug, Clone, Default)]
pub struct SuggestionSlot(Arc<Mutex<Option<String>>>);

impl SuggestionSlot {
    pub fn take(&self) -> Option<String> {
        self.0.lock().unwrap().take()
    }

    fn set(&self, text: String) {
        *self.0.lock().unwrap() = Some(text);
    }
}

pub struct SetSuggestionTool {
    slot: SuggestionSlot,
}

impl SetSuggestionTool {
    pub fn new(slot: SuggestionSlot) -> Self {
        Self { slot }
    }
}

#[async_trait]
impl Tool for SetSuggestionTool {
    fn name(&self) -> &str {
        "set_suggestion"
    }

    fn description(&self) -> &str {
        "Save the study suggestion shown to the student. Calling it again replaces the text."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "suggestion": { "type": "string" } },
            "required": ["suggestion"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let text = required_str(&arguments, "suggestion")?.trim();
        if text.is_empty() {
            return Err(ToolError::InvalidArguments("suggestion must not be empty".into()));
        }
        self.slot.set(text.to_string());
        Ok(ToolResult::ok("Suggestion saved"))
    }
}
