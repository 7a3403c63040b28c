//! Shared test helpers: a scripted provider for driving agents and tools
//! without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use crate::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage,
};

/// Usage reported by every scripted reply.
pub const SCRIPTED_USAGE: Usage = Usage {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

/// A provider that returns a sequence of scripted responses.
///
/// Each `complete` call pops the next response; once the script runs out it
/// answers with an empty assistant message, which ends any tool loop.
/// Embeddings are a deterministic character histogram, so similar strings
/// land close together.
#[derive(Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    embed_calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn push(&self, response: ProviderResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Every chat request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn embed_calls(&self) -> usize {
        *self.embed_calls.lock().unwrap()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| text_response("")).with_model(model))
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        *self.embed_calls.lock().unwrap() += 1;
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|s| char_histogram(s)).collect(),
            model: request.model,
            usage: Some(Usage {
                prompt_tokens: 4,
                completion_tokens: 0,
                total_tokens: 4,
            }),
        })
    }
}

impl ProviderResponse {
    fn with_model(mut self, model: String) -> Self {
        if self.model.is_empty() {
            self.model = model;
        }
        self
    }
}

fn char_histogram(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; 26];
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
    }
    v
}

/// A plain assistant reply.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(SCRIPTED_USAGE),
        model: String::new(),
        metadata: serde_json::Map::new(),
    }
}

/// An assistant reply that requests tool calls.
pub fn tool_call_response(calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools("", calls),
        usage: Some(SCRIPTED_USAGE),
        model: String::new(),
        metadata: serde_json::Map::new(),
    }
}

pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}
