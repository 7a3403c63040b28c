//! OpenAI chat-completions and embeddings client.
//!
//! Talks to `{base_url}/chat/completions` and `{base_url}/embeddings`, so any
//! OpenAI-compatible endpoint works. Streaming responses are parsed from SSE
//! by [`SseDecoder`], which is independent of the HTTP layer.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lingoclaw_config::LlmConfig;
use lingoclaw_core::error::ProviderError;
use lingoclaw_core::message::{Message, MessageToolCall, Role};
use lingoclaw_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from the `[llm]` config section. Requires an API key.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured("llm.api_key (or OPENAI_API_KEY) is not set".into())
        })?;
        Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn chat_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&request.messages),
            "stream": stream,
        });
        // Reasoning models only accept their default temperature.
        if !is_reasoning_model(&request.model) {
            body["temperature"] = serde_json::json!(request.temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
        }
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match response.status().as_u16() {
            200 => Ok(response),
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                Err(ProviderError::RateLimited { retry_after_secs })
            }
            401 | 403 => Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            status => {
                let message = response.text().await.unwrap_or_default();
                warn!(status, body = %message, path, "Provider returned error");
                Err(ProviderError::ApiError {
                    status_code: status,
                    message,
                })
            }
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// `o1`, `o3`, `o4-mini`, ...
fn is_reasoning_model(model: &str) -> bool {
    let mut chars = model.chars();
    chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            }
            .into(),
            content: Some(m.content.clone()),
            tool_calls: (!m.tool_calls.is_empty()).then(|| {
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(model = %request.model, "Sending completion request");
        let response = self.post("chat/completions", &Self::chat_body(&request, false)).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message: Message::assistant_with_tools(choice.message.content.unwrap_or_default(), tool_calls),
            usage: api_response.usage.map(Usage::from),
            model: api_response.model,
            metadata: serde_json::Map::new(),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(model = %request.model, count = request.inputs.len(), "Sending embedding request");
        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });
        let response = self.post("embeddings", &body).await?;

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        Ok(EmbeddingResponse {
            embeddings: api_resp.data.into_iter().map(|d| d.embedding).collect(),
            model: api_resp.model,
            usage: api_resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: 0,
                total_tokens: u.total_tokens,
            }),
        })
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        debug!(model = %request.model, "Sending streaming request");
        let response = self.post("chat/completions", &Self::chat_body(&request, true)).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };
                for out in decoder.feed(&String::from_utf8_lossy(&chunk)) {
                    if tx.send(Ok(out)).await.is_err() {
                        return; // receiver dropped
                    }
                }
                if decoder.is_finished() {
                    return;
                }
            }

            // Connection closed without [DONE] or a usage chunk.
            let _ = tx.send(Ok(decoder.finish())).await;
        });

        Ok(rx)
    }
}

/// Incremental parser for an OpenAI chat-completions SSE body.
///
/// Content deltas become non-final chunks. Tool-call fragments are merged by
/// index and delivered, together with usage, in one final `done` chunk.
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
    tool_calls: BTreeMap<u32, MessageToolCall>,
    finished: bool,
}

impl SseDecoder {
    /// Feed raw body text; returns the chunks completed by it.
    pub fn feed(&mut self, text: &str) -> Vec<StreamChunk> {
        self.buffer.push_str(text);
        let mut out = Vec::new();

        while !self.finished {
            let Some(line_end) = self.buffer.find('\n') else {
                break;
            };
            let line: String = self.buffer.drain(..=line_end).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                continue; // blank line, comment or other field
            };
            let data = data.trim();

            if data == "[DONE]" {
                out.push(self.finish());
                break;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(resp) => self.apply(resp, &mut out),
                Err(e) => trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk"),
            }
        }
        out
    }

    fn apply(&mut self, resp: StreamResponse, out: &mut Vec<StreamChunk>) {
        if let Some(choice) = resp.choices.into_iter().next() {
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let acc = self.tool_calls.entry(delta.index).or_insert_with(|| MessageToolCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                });
                if let Some(id) = delta.id {
                    acc.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        acc.name = name;
                    }
                    if let Some(args) = function.arguments {
                        acc.arguments.push_str(&args);
                    }
                }
            }

            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out.push(StreamChunk {
                    content: Some(content),
                    tool_calls: Vec::new(),
                    done: false,
                    usage: None,
                });
            }
        }

        // With include_usage the usage chunk is the last data chunk.
        if let Some(usage) = resp.usage {
            let mut last = self.finish();
            last.usage = Some(usage.into());
            out.push(last);
        }
    }

    /// Final chunk carrying the accumulated tool calls.
    pub fn finish(&mut self) -> StreamChunk {
        self.finished = true;
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.tool_calls).into_values().collect(),
            done: true,
            usage: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.into(),
            messages: vec![Message::system("You are a tutor"), Message::user("Hola")],
            temperature: 0.2,
            max_tokens: Some(256),
            tools: vec![ToolDefinition {
                name: "add_memory".into(),
                description: "Remember a fact".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            stream: false,
        }
    }

    #[test]
    fn missing_api_key_is_not_configured() {
        let err = OpenAiProvider::from_config(&LlmConfig::default()).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let p = OpenAiProvider::new("http://localhost:8080/v1/", "k", Duration::from_secs(5)).unwrap();
        assert_eq!(p.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn reasoning_models_detected() {
        assert!(is_reasoning_model("o3"));
        assert!(is_reasoning_model("o4-mini"));
        assert!(!is_reasoning_model("gpt-4o-mini"));
        assert!(!is_reasoning_model("omni"));
    }

    #[test]
    fn chat_body_for_chat_model() {
        let body = OpenAiProvider::chat_body(&request("gpt-4o-mini"), false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hola");
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(body["max_completion_tokens"], 256);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "add_memory");
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn chat_body_for_reasoning_stream() {
        let body = OpenAiProvider::chat_body(&request("o4-mini"), true);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn tool_messages_convert() {
        let msgs = vec![
            Message::assistant_with_tools(
                "",
                vec![MessageToolCall {
                    id: "call_1".into(),
                    name: "record_vocab".into(),
                    arguments: r#"{"id":3}"#.into(),
                }],
            ),
            Message::tool_result("call_1", "ok"),
        ];
        let api = to_api_messages(&msgs);
        assert_eq!(api[0].tool_calls.as_ref().unwrap()[0].function.name, "record_vocab");
        assert_eq!(api[1].role, "tool");
        assert_eq!(api[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn decoder_emits_content_then_usage() {
        let mut d = SseDecoder::default();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":10,\"completion_tokens\":5,\"total_tokens\":15}}\n\n",
            "data: [DONE]\n\n",
        );
        let chunks = d.feed(body);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content.as_deref(), Some("Hel"));
        assert_eq!(chunks[1].content.as_deref(), Some("lo"));
        assert!(chunks[2].done);
        assert_eq!(chunks[2].usage.map(|u| u.total_tokens), Some(15));
        assert!(d.is_finished());
    }

    #[test]
    fn decoder_handles_split_lines() {
        let mut d = SseDecoder::default();
        assert!(d.feed("data: {\"choices\":[{\"delta\":{\"con").is_empty());
        let chunks = d.feed("tent\":\"¡Hola!\"}}]}\r\n\r\n");
        assert_eq!(chunks[0].content.as_deref(), Some("¡Hola!"));
    }

    #[test]
    fn decoder_merges_tool_call_fragments_in_index_order() {
        let mut d = SseDecoder::default();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"id\":\"call_b\",\"function\":{\"name\":\"list_questions\",\"arguments\":\"\"}},{\"index\":0,\"id\":\"call_a\",\"function\":{\"name\":\"add_choice_question\",\"arguments\":\"{\\\"stem\\\"\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\":\\\"x\\\"}\"}}]}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":1,\"function\":{\"arguments\":\"{}\"}}]}}]}\n",
            "data: [DONE]\n",
        );
        let chunks = d.feed(body);
        let last = chunks.last().unwrap();
        assert!(last.done);
        assert_eq!(last.tool_calls.len(), 2);
        assert_eq!(last.tool_calls[0].id, "call_a");
        assert_eq!(last.tool_calls[0].arguments, "{\"stem\":\"x\"}");
        assert_eq!(last.tool_calls[1].name, "list_questions");
        assert_eq!(last.tool_calls[1].arguments, "{}");
    }

    #[test]
    fn decoder_ignores_garbage_and_stops_after_done() {
        let mut d = SseDecoder::default();
        let chunks = d.feed("data: not json\nevent: ping\ndata: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
    }

    #[test]
    fn finish_without_done_flushes_tool_calls() {
        let mut d = SseDecoder::default();
        d.feed("data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"c\",\"function\":{\"name\":\"delete_question\",\"arguments\":\"{\\\"index\\\":0}\"}}]}}]}\n");
        let last = d.finish();
        assert_eq!(last.tool_calls[0].name, "delete_question");
        assert!(last.usage.is_none());
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}],
            "model": "text-embedding-3-small",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(parsed.usage.unwrap().total_tokens, 8);
    }
}
