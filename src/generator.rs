//! Answer generation via the Anthropic Messages API.
//!
//! Defines the wire types for requests and responses, the [`ModelProvider`]
//! trait that abstracts the transport, and [`AnswerGenerator`], which runs
//! the round-bounded tool loop: submit, execute any requested tools, feed
//! the results back, and repeat until the model answers in text or the
//! round budget runs out.
//!
//! # Retry Strategy
//!
//! The Anthropic provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ModelConfig;
use crate::models::Source;
use crate::tools::{ToolDefinition, ToolRegistry};

/// Static system prompt, shared by every request.
const SYSTEM_PROMPT: &str = r#"You are an AI assistant specialized in course materials and educational content with access to a comprehensive search tool for course information.

Search Tool Usage:
- Use the search tool **only** for questions about specific course content or detailed educational materials
- **You can use the search tool multiple times if needed** to answer complex queries
- Use tools iteratively for multi-step reasoning (e.g., comparing courses, gathering detailed information)
- Synthesize search results into accurate, fact-based responses
- If search yields no results, state this clearly without offering alternatives

Response Protocol:
- **General knowledge questions**: Answer using existing knowledge without searching
- **Course-specific questions**: Search first, then answer
- **Complex questions**: Use multiple searches to gather all necessary information
- **No meta-commentary**:
 - Provide direct answers only - no reasoning process, search explanations, or question-type analysis
 - Do not mention "based on the search results"

All responses must be:
1. **Brief, Concise and focused** - Get to the point quickly
2. **Educational** - Maintain instructional value
3. **Clear** - Use accessible language
4. **Example-supported** - Include relevant examples when they aid understanding
Provide only the direct answer to what was asked."#;

// ═══════════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════════

/// One block of message content, in the Messages API shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Why the model stopped. Unknown reasons map to [`StopReason::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content,
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        ChatMessage {
            role: "assistant".to_string(),
            content,
        }
    }
}

/// One submission to the model. Tools may be empty, in which case the
/// request goes out without tool definitions.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub messages: Vec<ChatMessage>,
    pub system: String,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl ModelResponse {
    /// First text block, or empty when the response carries none.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn is_tool_use(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Provider
// ═══════════════════════════════════════════════════════════════════════════

/// Transport for one model submission.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn create_message(&self, request: &MessageRequest) -> Result<ModelResponse>;
}

/// Provider backed by `POST https://api.anthropic.com/v1/messages`.
///
/// Requires the `ANTHROPIC_API_KEY` environment variable, read at call
/// time so that keyless commands (ingest, course listings) keep working.
pub struct AnthropicProvider {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl AnthropicProvider {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(AnthropicProvider {
            client,
            model: config.name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, request: &MessageRequest) -> Result<Value> {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "messages": request.messages,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::to_value(&request.tools)?;
            body["tool_choice"] = serde_json::json!({"type": "auto"});
        }

        Ok(body)
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    async fn create_message(&self, request: &MessageRequest) -> Result<ModelResponse> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;

        let body = self.request_body(request)?;
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.anthropic.com/v1/messages")
                .header("x-api-key", &api_key)
                .header("anthropic-version", "2023-06-01")
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: ModelResponse = response
                            .json()
                            .await
                            .context("Invalid Anthropic API response")?;
                        return Ok(parsed);
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Anthropic API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429), don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Anthropic API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tool orchestration
// ═══════════════════════════════════════════════════════════════════════════

/// Final answer text plus the sources gathered along the way.
#[derive(Debug, Clone, Default)]
pub struct GeneratedAnswer {
    pub text: String,
    pub sources: Vec<Source>,
}

/// Drives the tool loop on top of a [`ModelProvider`].
///
/// The loop submits at most `max_rounds + 1` requests: the initial one,
/// then one per tool round. The last permitted round omits the tool
/// definitions, and a round budget that runs out yields the last
/// response's text rather than an error.
pub struct AnswerGenerator {
    provider: Arc<dyn ModelProvider>,
    max_rounds: usize,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn ModelProvider>, max_rounds: usize) -> Self {
        AnswerGenerator {
            provider,
            max_rounds,
        }
    }

    pub async fn generate(
        &self,
        query: &str,
        history: Option<&str>,
        registry: Option<&ToolRegistry>,
    ) -> Result<GeneratedAnswer> {
        let system = match history {
            Some(history) => format!("{}\n\nPrevious conversation:\n{}", SYSTEM_PROMPT, history),
            None => SYSTEM_PROMPT.to_string(),
        };

        let definitions = registry.map(|r| r.definitions()).unwrap_or_default();

        let mut messages = vec![ChatMessage::user(vec![ContentBlock::Text {
            text: query.to_string(),
        }])];

        let mut response = self
            .provider
            .create_message(&MessageRequest {
                messages: messages.clone(),
                system: system.clone(),
                tools: definitions.clone(),
            })
            .await?;

        let registry = match registry {
            Some(registry) if response.is_tool_use() => registry,
            _ => {
                return Ok(GeneratedAnswer {
                    text: response.text(),
                    sources: Vec::new(),
                })
            }
        };

        let mut sources = Vec::new();

        for round in 1..=self.max_rounds {
            messages.push(ChatMessage::assistant(response.content.clone()));

            let mut tool_results = Vec::new();
            for block in &response.content {
                if let ContentBlock::ToolUse { id, name, input } = block {
                    let output = registry.execute(name, input).await;
                    // Keep the attributions from the latest round that
                    // produced any
                    if !output.sources.is_empty() {
                        sources = output.sources;
                    }
                    tool_results.push(ContentBlock::ToolResult {
                        tool_use_id: id.clone(),
                        content: output.text,
                    });
                }
            }

            if !tool_results.is_empty() {
                messages.push(ChatMessage::user(tool_results));
            }

            // The last permitted round goes out without tool definitions
            let tools = if round < self.max_rounds {
                definitions.clone()
            } else {
                Vec::new()
            };

            response = self
                .provider
                .create_message(&MessageRequest {
                    messages: messages.clone(),
                    system: system.clone(),
                    tools,
                })
                .await?;

            if !response.is_tool_use() {
                break;
            }
        }

        Ok(GeneratedAnswer {
            text: response.text(),
            sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolOutput};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        responses: Mutex<VecDeque<ModelResponse>>,
        requests: Mutex<Vec<MessageRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ModelResponse>) -> Self {
            ScriptedProvider {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<MessageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn create_message(&self, request: &MessageRequest) -> Result<ModelResponse> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted response left"))
        }
    }

    struct EchoTool {
        name: &'static str,
        sources: Vec<Source>,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name.to_string(),
                description: "echoes its input".to_string(),
                input_schema: json!({"type": "object"}),
            }
        }

        async fn execute(&self, input: &Value) -> ToolOutput {
            ToolOutput {
                text: format!("echo:{}", input),
                sources: self.sources.clone(),
            }
        }
    }

    fn source(text: &str) -> Source {
        Source {
            text: text.to_string(),
            course_link: None,
            lesson_number: None,
            lesson_link: None,
        }
    }

    fn echo_registry(name: &'static str, sources: Vec<Source>) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(EchoTool { name, sources }))
            .unwrap();
        registry
    }

    fn text_response(text: &str) -> ModelResponse {
        ModelResponse {
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            stop_reason: StopReason::EndTurn,
        }
    }

    fn tool_response(id: &str, name: &str) -> ModelResponse {
        ModelResponse {
            content: vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: json!({"query": "x"}),
            }],
            stop_reason: StopReason::ToolUse,
        }
    }

    #[test]
    fn test_response_wire_format_parses() {
        let json = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "tu_1", "name": "search_course_content", "input": {"query": "mcp"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 20}
        }"#;

        let response: ModelResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.content.len(), 2);
        assert_eq!(response.text(), "Let me look.");
    }

    #[test]
    fn test_unknown_stop_reason_maps_to_other() {
        let reason: StopReason = serde_json::from_str("\"pause_turn\"").unwrap();
        assert_eq!(reason, StopReason::Other);
    }

    #[test]
    fn test_tool_result_serializes_with_tag() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "tu_1".to_string(),
            content: "found it".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "tool_result", "tool_use_id": "tu_1", "content": "found it"})
        );
    }

    #[tokio::test]
    async fn test_direct_answer_skips_tool_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Paris.")]));
        let generator = AnswerGenerator::new(provider.clone(), 5);
        let registry = echo_registry("echo", vec![source("s")]);

        let answer = generator
            .generate("Capital of France?", None, Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer.text, "Paris.");
        assert!(answer.sources.is_empty());

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn test_single_round_feeds_results_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("tu_1", "echo"),
            text_response("Done."),
        ]));
        let generator = AnswerGenerator::new(provider.clone(), 5);
        let registry = echo_registry("echo", vec![source("lesson one")]);

        let answer = generator
            .generate("What is in lesson 1?", None, Some(&registry))
            .await
            .unwrap();

        assert_eq!(answer.text, "Done.");
        assert_eq!(answer.sources, vec![source("lesson one")]);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);

        // query, assistant tool_use, user tool_result
        let follow_up = &requests[1].messages;
        assert_eq!(follow_up.len(), 3);
        assert_eq!(follow_up[1].role, "assistant");
        assert_eq!(follow_up[2].role, "user");
        match &follow_up[2].content[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                assert_eq!(tool_use_id, "tu_1");
                assert!(content.starts_with("echo:"));
            }
            other => panic!("expected tool_result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_round_budget_caps_submissions() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("tu_1", "echo"),
            tool_response("tu_2", "echo"),
            text_response("Finally."),
        ]));
        let generator = AnswerGenerator::new(provider.clone(), 2);
        let registry = echo_registry("echo", Vec::new());

        let answer = generator
            .generate("Compare two courses", None, Some(&registry))
            .await
            .unwrap();
        assert_eq!(answer.text, "Finally.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        assert!(!requests[0].tools.is_empty());
        assert!(!requests[1].tools.is_empty());
        // Last permitted round carries no tool definitions
        assert!(requests[2].tools.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_budget_returns_last_text() {
        let dangling = ModelResponse {
            content: vec![
                ContentBlock::Text {
                    text: "Partial answer".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "tu_2".to_string(),
                    name: "echo".to_string(),
                    input: json!({}),
                },
            ],
            stop_reason: StopReason::ToolUse,
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("tu_1", "echo"),
            dangling,
        ]));
        let generator = AnswerGenerator::new(provider.clone(), 1);
        let registry = echo_registry("echo", Vec::new());

        let answer = generator
            .generate("q", None, Some(&registry))
            .await
            .unwrap();
        assert_eq!(answer.text, "Partial answer");
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_latest_nonempty_sources_win() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(EchoTool {
                name: "first",
                sources: vec![source("old")],
            }))
            .unwrap();
        registry
            .register(Box::new(EchoTool {
                name: "second",
                sources: vec![source("new")],
            }))
            .unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("tu_1", "first"),
            tool_response("tu_2", "second"),
            text_response("ok"),
        ]));
        let generator = AnswerGenerator::new(provider, 5);
        let answer = generator.generate("q", None, Some(&registry)).await.unwrap();
        assert_eq!(answer.sources, vec![source("new")]);
    }

    #[tokio::test]
    async fn test_empty_round_keeps_previous_sources() {
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(EchoTool {
                name: "first",
                sources: vec![source("kept")],
            }))
            .unwrap();
        registry
            .register(Box::new(EchoTool {
                name: "second",
                sources: Vec::new(),
            }))
            .unwrap();

        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response("tu_1", "first"),
            tool_response("tu_2", "second"),
            text_response("ok"),
        ]));
        let generator = AnswerGenerator::new(provider, 5);
        let answer = generator.generate("q", None, Some(&registry)).await.unwrap();
        assert_eq!(answer.sources, vec![source("kept")]);
    }

    #[tokio::test]
    async fn test_history_lands_in_system_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("hi")]));
        let generator = AnswerGenerator::new(provider.clone(), 5);

        generator
            .generate("q", Some("User: a\nAssistant: b"), None)
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(
            requests[0].system,
            format!("{}\n\nPrevious conversation:\nUser: a\nAssistant: b", SYSTEM_PROMPT)
        );
    }

    #[tokio::test]
    async fn test_no_registry_means_no_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("hi")]));
        let generator = AnswerGenerator::new(provider.clone(), 5);

        let answer = generator.generate("q", None, None).await.unwrap();
        assert_eq!(answer.text, "hi");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].system, SYSTEM_PROMPT);
    }
}
