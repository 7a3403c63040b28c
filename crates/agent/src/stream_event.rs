//! Native events of the reasoning loop.
//!
//! [`crate::ToolLoop`] reports its progress as `LoopEvent`s.
//! [`crate::AgentContext::run_stream_events`] translates the ones clients care
//! about into [`AgentEvent`]s and drops the rest.

use lingoclaw_core::AgentEvent;
use lingoclaw_core::provider::Usage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// A model call is about to start.
    ModelStart { iteration: u32 },

    /// A fragment of model output.
    ModelStream { chunk: String },

    /// The model call finished.
    ModelEnd { usage: Option<Usage> },

    /// A tool is about to run.
    ToolStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// A tool finished, successfully or not.
    ToolEnd {
        id: String,
        name: String,
        input: serde_json::Value,
        output: String,
        success: bool,
    },

    /// The model answered without requesting tools.
    ChainEnd { iterations: u32 },
}

impl LoopEvent {
    /// The client-facing event for this one, if any.
    pub fn to_agent_event<R>(&self) -> Option<AgentEvent<R>> {
        match self {
            Self::ModelStart { .. } => Some(AgentEvent::thinking()),
            Self::ModelStream { chunk } if !chunk.is_empty() => Some(AgentEvent::chunk(chunk.clone())),
            Self::ModelStream { .. } => None,
            Self::ModelEnd { .. } => Some(AgentEvent::stream_end()),
            Self::ToolEnd {
                name,
                input,
                output,
                success,
                ..
            } => Some(AgentEvent::tool_call(
                name.clone(),
                serde_json::json!({
                    "input": input,
                    "output": output,
                    "success": success,
                }),
            )),
            Self::ToolStart { .. } | Self::ChainEnd { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Event = AgentEvent<serde_json::Value>;

    #[test]
    fn model_events_map_to_thinking_chunk_end() {
        assert_eq!(
            LoopEvent::ModelStart { iteration: 1 }.to_agent_event::<serde_json::Value>(),
            Some(Event::thinking())
        );
        assert_eq!(
            LoopEvent::ModelStream { chunk: "Ho".into() }.to_agent_event::<serde_json::Value>(),
            Some(Event::chunk("Ho"))
        );
        assert_eq!(
            LoopEvent::ModelEnd { usage: None }.to_agent_event::<serde_json::Value>(),
            Some(Event::stream_end())
        );
    }

    #[test]
    fn empty_fragments_and_bookkeeping_are_dropped() {
        let dropped = [
            LoopEvent::ModelStream { chunk: String::new() },
            LoopEvent::ToolStart {
                id: "c".into(),
                name: "t".into(),
                input: json!({}),
            },
            LoopEvent::ChainEnd { iterations: 2 },
        ];
        for e in dropped {
            assert!(e.to_agent_event::<serde_json::Value>().is_none(), "{e:?}");
        }
    }

    #[test]
    fn tool_end_carries_input_and_output() {
        let e = LoopEvent::ToolEnd {
            id: "c".into(),
            name: "add_memory".into(),
            input: json!({"summary": "s"}),
            output: "Memory 1 saved.".into(),
            success: true,
        };
        assert_eq!(
            e.to_agent_event::<serde_json::Value>(),
            Some(Event::tool_call(
                "add_memory",
                json!({"input": {"summary": "s"}, "output": "Memory 1 saved.", "success": true})
            ))
        );
    }
}
