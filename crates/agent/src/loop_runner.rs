//! The reasoning loop: call the model, run the tools it asks for, repeat.

use std::sync::Arc;

use lingoclaw_core::message::Message;
use lingoclaw_core::provider::{Provider, ProviderRequest, Usage};
use lingoclaw_core::tool::{ToolCall, ToolRegistry};
use lingoclaw_core::Error;
use tracing::{debug, warn};

use crate::stream_event::LoopEvent;

/// What a finished loop leaves behind.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The full transcript, including tool calls and results.
    pub messages: Vec<Message>,
    /// Text of the last model turn.
    pub final_text: String,
    pub iterations: u32,
    pub tool_calls_made: usize,
    /// Summed over every model call of this loop.
    pub usage: Usage,
    /// The loop stopped at `max_iterations` while the model still wanted tools.
    pub hit_iteration_limit: bool,
}

/// Drives one model through tool calls until it answers in plain text.
pub struct ToolLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    tools: Arc<ToolRegistry>,
    max_iterations: u32,
}

impl ToolLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: ToolRegistry) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            tools: Arc::new(tools),
            max_iterations: 8,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Model turns allowed before the loop gives up. At least one.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop from `messages`, reporting progress through `on_event`.
    ///
    /// Provider errors (including quota exhaustion) end the loop. Tool errors
    /// are sent back to the model as the tool's result.
    pub async fn run(
        &self,
        mut messages: Vec<Message>,
        on_event: &mut (dyn FnMut(LoopEvent) + Send),
    ) -> Result<LoopOutcome, Error> {
        let definitions = self.tools.definitions();
        let mut usage = Usage::default();
        let mut tool_calls_made = 0;
        let mut final_text = String::new();

        for iteration in 1..=self.max_iterations {
            debug!(model = %self.model, iteration, "Tool loop iteration");
            on_event(LoopEvent::ModelStart { iteration });

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: None,
                tools: definitions.clone(),
                stream: true,
            };
            let mut rx = self.provider.stream(request).await?;

            let mut content = String::new();
            let mut calls = Vec::new();
            let mut turn_usage = None;
            while let Some(chunk) = rx.recv().await {
                let chunk = chunk?;
                if let Some(text) = chunk.content
                    && !text.is_empty()
                {
                    content.push_str(&text);
                    on_event(LoopEvent::ModelStream { chunk: text });
                }
                calls.extend(chunk.tool_calls);
                if chunk.usage.is_some() {
                    turn_usage = chunk.usage;
                }
            }

            if let Some(u) = turn_usage {
                usage.prompt_tokens += u.prompt_tokens;
                usage.completion_tokens += u.completion_tokens;
                usage.total_tokens += u.total_tokens;
            }
            on_event(LoopEvent::ModelEnd { usage: turn_usage });
            final_text.clone_from(&content);

            if calls.is_empty() {
                messages.push(Message::assistant(content));
                on_event(LoopEvent::ChainEnd {
                    iterations: iteration,
                });
                return Ok(LoopOutcome {
                    messages,
                    final_text,
                    iterations: iteration,
                    tool_calls_made,
                    usage,
                    hit_iteration_limit: false,
                });
            }

            messages.push(Message::assistant_with_tools(content, calls.clone()));
            for tc in &calls {
                tool_calls_made += 1;
                let (input, output, success) = match serde_json::from_str(&tc.arguments) {
                    Ok(arguments) => {
                        let call = ToolCall {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            arguments,
                        };
                        on_event(LoopEvent::ToolStart {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: call.arguments.clone(),
                        });
                        match self.tools.execute(&call).await {
                            Ok(result) => (call.arguments, result.output, result.success),
                            Err(e) => {
                                warn!(tool = %tc.name, error = %e, "Tool execution failed");
                                (call.arguments, format!("Error: {e}"), false)
                            }
                        }
                    }
                    Err(e) => {
                        warn!(tool = %tc.name, error = %e, "Tool arguments are not valid JSON");
                        (
                            serde_json::Value::String(tc.arguments.clone()),
                            format!("Error: arguments are not valid JSON: {e}"),
                            false,
                        )
                    }
                };

                messages.push(Message::tool_result(&tc.id, &output));
                on_event(LoopEvent::ToolEnd {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input,
                    output,
                    success,
                });
            }
        }

        warn!(
            model = %self.model,
            max_iterations = self.max_iterations,
            "Max tool iterations reached"
        );
        Ok(LoopOutcome {
            messages,
            final_text,
            iterations: self.max_iterations,
            tool_calls_made,
            usage,
            hit_iteration_limit: true,
        })
    }
}
