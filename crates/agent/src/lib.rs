//! The LingoClaw agents and the machinery that streams them.
//!
//! An agent is a [`core_agent::Agent`] whose progress flows to the caller as
//! [`lingoclaw_core::AgentEvent`]s:
//!
//! 1. **Spawn** the run on its own task ([`run_stream`])
//! 2. **Reason** through a [`ToolLoop`], forwarding model and tool progress
//! 3. **Finish** with exactly one `result` event carrying the agent's output
//!
//! Dropping the returned stream aborts the run.

pub mod core_agent;
pub mod loop_runner;
pub mod profile;
pub mod question_agent;
pub mod record_agent;
pub mod stream_event;

use lingoclaw_config::AppConfig;

pub use core_agent::{Agent, AgentContext, EventStream, run_stream};
pub use loop_runner::{LoopOutcome, ToolLoop};
pub use profile::Profile;
pub use question_agent::{QuestionAgent, QuestionInput, QuestionOutput};
pub use record_agent::{RecordAgent, RecordInput, RecordOutput, SetSuggestionTool, SubmittedAnswer};
pub use stream_event::LoopEvent;

/// Knobs shared by the concrete agents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSettings {
    /// Model turns per tool loop.
    pub max_iterations: u32,
    /// Extra rounds the question agent gets when it produced nothing.
    pub max_review_rounds: u32,
    pub temperature: f32,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            max_review_rounds: config.agent.max_review_rounds,
            temperature: config.llm.temperature,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
