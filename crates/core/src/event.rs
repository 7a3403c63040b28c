//! Agent progress events, the wire vocabulary of a streamed run.
//!
//! Every event serializes as `{"type": <kind>, "data": {...}}`. The set of
//! kinds is closed; `R` is the payload of the terminal `result` event and
//! differs per agent.

use serde::{Deserialize, Serialize};

/// One progress or result event of an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent<R = serde_json::Value> {
    /// Human-readable status line.
    Message { emoji: String, message: String },

    /// The model started generating.
    Thinking {},

    /// A fragment of model output.
    StreamChunk { chunk: String },

    /// The model finished generating.
    StreamEnd {},

    /// A tool finished; `tool_data` carries its input and output.
    ToolCall {
        tool_name: String,
        tool_data: serde_json::Value,
    },

    /// The final payload. Always the last event of a run.
    Result(R),
}

impl<R> AgentEvent<R> {
    pub fn message(emoji: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Message {
            emoji: emoji.into(),
            message: message.into(),
        }
    }

    pub fn thinking() -> Self {
        Self::Thinking {}
    }

    pub fn chunk(chunk: impl Into<String>) -> Self {
        Self::StreamChunk {
            chunk: chunk.into(),
        }
    }

    pub fn stream_end() -> Self {
        Self::StreamEnd {}
    }

    pub fn tool_call(tool_name: impl Into<String>, tool_data: serde_json::Value) -> Self {
        Self::ToolCall {
            tool_name: tool_name.into(),
            tool_data,
        }
    }

    /// The `type` discriminator as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::Thinking {} => "thinking",
            Self::StreamChunk { .. } => "stream_chunk",
            Self::StreamEnd {} => "stream_end",
            Self::ToolCall { .. } => "tool_call",
            Self::Result(_) => "result",
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Event = AgentEvent<serde_json::Value>;

    #[test]
    fn message_wire_format() {
        let e = Event::message("🔍", "Reviewing your profile");
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"type": "message", "data": {"emoji": "🔍", "message": "Reviewing your profile"}})
        );
    }

    #[test]
    fn empty_variants_carry_empty_data() {
        assert_eq!(
            serde_json::to_string(&Event::thinking()).unwrap(),
            r#"{"type":"thinking","data":{}}"#
        );
        assert_eq!(
            serde_json::to_string(&Event::stream_end()).unwrap(),
            r#"{"type":"stream_end","data":{}}"#
        );
    }

    #[test]
    fn chunk_and_tool_call_wire_format() {
        assert_eq!(
            serde_json::to_value(Event::chunk("Hel")).unwrap(),
            json!({"type": "stream_chunk", "data": {"chunk": "Hel"}})
        );
        let e = Event::tool_call("add_memory", json!({"input": {"content": "x"}, "output": "ok"}));
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"type": "tool_call", "data": {"tool_name": "add_memory", "tool_data": {"input": {"content": "x"}, "output": "ok"}}})
        );
    }

    #[test]
    fn result_payload_is_the_data() {
        #[derive(Serialize)]
        struct Payload {
            set_id: i64,
        }
        let e: AgentEvent<Payload> = AgentEvent::Result(Payload { set_id: 4 });
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"type": "result", "data": {"set_id": 4}})
        );
        assert!(e.is_result());
        assert_eq!(e.kind(), "result");
    }

    #[test]
    fn events_deserialize_from_wire() {
        let e: Event = serde_json::from_str(r#"{"type":"stream_chunk","data":{"chunk":"lo"}}"#).unwrap();
        assert_eq!(e, Event::chunk("lo"));
        let e: Event = serde_json::from_str(r#"{"type":"result","data":[]}"#).unwrap();
        assert_eq!(e, Event::Result(json!([])));
    }

    #[test]
    fn kinds_match_serialized_tag() {
        for e in [
            Event::message("a", "b"),
            Event::thinking(),
            Event::chunk("c"),
            Event::stream_end(),
            Event::tool_call("t", json!({})),
            Event::Result(json!(null)),
        ] {
            let v = serde_json::to_value(&e).unwrap();
            assert_eq!(v["type"], e.kind());
        }
    }
}
