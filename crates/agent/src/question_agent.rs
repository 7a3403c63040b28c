//! The question agent: builds a personalised question set for a learner.

use async_trait::async_trait;
use chrono::Utc;
use lingoclaw_core::error::AgentError;
use lingoclaw_core::message::Message;
use lingoclaw_core::model::ModelTier;
use lingoclaw_core::record::QuestionSetRecord;
use lingoclaw_core::tool::ToolRegistry;
use lingoclaw_core::Error;
use lingoclaw_questions::QuestionStack;
use lingoclaw_tools::SearchResourceTool;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::loop_runner::ToolLoop;
use crate::profile::Profile;
use crate::core_agent::{Agent, AgentContext};
use crate::AgentSettings;

const DEFAULT_COUNT: u32 = 5;
const MAX_COUNT: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionInput {
    /// What the learner asked to practise.
    pub request: String,
    #[serde(default)]
    pub count: Option<u32>,
}

/// The generated set. `questions` are public views without answers; the
/// answer key stays in the stored set identified by `set_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutput {
    pub set_id: i64,
    pub questions: Vec<serde_json::Value>,
}

pub struct QuestionAgent {
    settings: AgentSettings,
}

impl QuestionAgent {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    fn system_prompt(language: &str, count: u32, profile: &Profile) -> String {
        format!(
            "You are the question designer of a language learning platform. The learner \
             studies '{language}'. Write {count} questions that fit the learner's request, \
             level and past mistakes.\n\n\
             Use search_resource to look up the learner's vocab, grammar, memories, stories \
             and mistakes. Add questions with add_choice_question, add_match_question and \
             add_assembly_question; review them with list_questions and remove bad ones with \
             delete_question. Mix question types. Never reveal an answer in a stem. When the \
             set is complete, reply with a one-line summary and no tool calls.\n\n{}",
            profile.question_context()
        )
    }
}

#[async_trait]
impl Agent for QuestionAgent {
    type Input = QuestionInput;
    type Output = QuestionOutput;

    fn name(&self) -> &'static str {
        "question"
    }

    async fn run(
        &self,
        ctx: &AgentContext<QuestionOutput>,
        input: QuestionInput,
    ) -> Result<QuestionOutput, Error> {
        if input.request.trim().is_empty() {
            return Err(AgentError::InvalidInput("request must not be empty".into()).into());
        }
        let count = input.count.unwrap_or(DEFAULT_COUNT).clamp(1, MAX_COUNT);
        let session = ctx.session();

        ctx.message("🔍", "Reviewing your learning profile");
        let profile = Profile::load(session).await?;

        let stack = QuestionStack::new();
        let mut tools = ToolRegistry::new().with(SearchResourceTool::new(session.clone()));
        stack.register_tools(&mut tools);
        let tool_loop = ToolLoop::new(session.provider.clone(), session.model(ModelTier::Standard), tools)
            .with_temperature(self.settings.temperature)
            .with_max_iterations(self.settings.max_iterations);

        let messages = vec![
            Message::system(Self::system_prompt(&session.target_language, count, &profile)),
            Message::user(input.request),
        ];
        let mut outcome = ctx.run_stream_events(&tool_loop, messages).await?;

        let mut round = 0;
        while stack.is_empty() && round < self.settings.max_review_rounds {
            round += 1;
            info!(user_id = session.user_id, round, "No questions yet, asking again");
            let mut messages = outcome.messages;
            messages.push(Message::user(format!(
                "The question set is still empty. Add {count} questions with the add_*_question tools now."
            )));
            outcome = ctx.run_stream_events(&tool_loop, messages).await?;
        }

        let questions = stack.snapshot();
        if questions.is_empty() {
            return Err(AgentError::TaskFailed("the model produced no questions".into()).into());
        }

        let record = session
            .repos
            .question_sets
            .create(QuestionSetRecord {
                id: 0,
                user_id: session.user_id,
                language: session.target_language.clone(),
                questions: serde_json::to_value(&questions)?,
                created_at: Utc::now(),
            })
            .await?;
        info!(
            user_id = session.user_id,
            set_id = record.id,
            questions = questions.len(),
            usage = outcome.usage.total_tokens,
            "Question set created"
        );

        ctx.message("✅", format!("{} questions ready", questions.len()));
        Ok(QuestionOutput {
            set_id: record.id,
            questions: questions
                .iter()
                .map(|q| serde_json::to_value(q.public_view()))
                .collect::<Result<_, _>>()?,
        })
    }
}
