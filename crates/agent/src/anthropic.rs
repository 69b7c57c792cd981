//! Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use triage_core::config::LlmConfig;
use triage_core::domain::message::{Message, ToolCall};

use crate::llm::{CompletionRequest, LlmClient, LlmError, ModelReply, ToolChoice};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const BASE_RETRY_DELAY_MS: u64 = 500;

pub struct AnthropicClient {
    client: Client,
    endpoint: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl AnthropicClient {
    /// `timeout` is the budget for one `complete` call. Each HTTP attempt gets
    /// an equal share of what is left after the retry backoff, so every
    /// retry still fits inside the callers' `llm.timeout_secs` deadline.
    pub fn new(
        api_key: &SecretString,
        base_url: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        let mut headers = header::HeaderMap::new();
        let mut key = header::HeaderValue::from_str(api_key.expose_secret())
            .map_err(|error| LlmError::Unavailable(format!("invalid api key format: {error}")))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", header::HeaderValue::from_static(ANTHROPIC_VERSION));

        let attempt_timeout = per_attempt_timeout(timeout, max_retries);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(attempt_timeout)
            .build()
            .map_err(|error| LlmError::Unavailable(error.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            max_retries,
            timeout_secs: attempt_timeout.as_secs(),
        })
    }

    pub fn from_config(config: &LlmConfig, api_key: &SecretString) -> Result<Self, LlmError> {
        Self::new(
            api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    async fn send_once(&self, body: &MessagesRequest<'_>) -> Result<MessagesResponse, Attempt> {
        let response = self.client.post(&self.endpoint).json(body).send().await.map_err(|error| {
            if error.is_timeout() {
                Attempt::Retry(LlmError::Timeout { secs: self.timeout_secs })
            } else {
                Attempt::Retry(LlmError::Unavailable(error.to_string()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|parsed| parsed.error.message)
                .unwrap_or(raw);
            let error = LlmError::Api { status: status.as_u16(), message };
            return Err(if is_retryable(status) {
                Attempt::Retry(error)
            } else {
                Attempt::Fatal(error)
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|error| Attempt::Fatal(LlmError::InvalidResponse(error.to_string())))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply, LlmError> {
        let (system, messages) = to_api_messages(&request.system, &request.messages);
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: (!system.is_empty()).then_some(system.as_str()),
            messages,
            tools: request
                .tools
                .iter()
                .map(|tool| ApiTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.input_schema,
                })
                .collect(),
            tool_choice: (!request.tools.is_empty()).then(|| match &request.tool_choice {
                ToolChoice::Auto => ApiToolChoice::Auto,
                ToolChoice::Required(name) => ApiToolChoice::Tool { name: name.clone() },
            }),
        };

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(response) => {
                    debug!(
                        event_name = "llm.anthropic.completed",
                        model = %request.model,
                        stop_reason = response.stop_reason.as_deref().unwrap_or("unknown"),
                        "model call completed"
                    );
                    return into_reply(response);
                }
                Err(Attempt::Retry(error)) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = retry_delay_ms(attempt);
                    warn!(
                        event_name = "llm.anthropic.retry",
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay,
                        error = %error,
                        "transient model backend failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(Attempt::Retry(error)) | Err(Attempt::Fatal(error)) => return Err(error),
            }
        }
    }
}

const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

fn retry_delay_ms(attempt: u32) -> u64 {
    BASE_RETRY_DELAY_MS.saturating_mul(1u64 << attempt.saturating_sub(1).min(16))
}

fn total_backoff(max_retries: u32) -> Duration {
    Duration::from_millis((1..=max_retries).map(retry_delay_ms).sum())
}

fn per_attempt_timeout(budget: Duration, max_retries: u32) -> Duration {
    let attempts = max_retries.saturating_add(1);
    (budget.saturating_sub(total_backoff(max_retries)) / attempts).max(MIN_ATTEMPT_TIMEOUT)
}

enum Attempt {
    Retry(LlmError),
    Fatal(LlmError),
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504 | 529)
}

/// Folds system messages into the system prompt and groups consecutive blocks
/// that share an API role into a single turn. Tool results must sit in the
/// user turn directly after the assistant turn that requested them.
fn to_api_messages(system: &str, messages: &[Message]) -> (String, Vec<ApiMessage>) {
    let mut system = system.to_owned();
    let mut turns: Vec<ApiMessage> = Vec::new();

    for message in messages {
        let (role, block) = match message {
            Message::System { content } => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(content);
                continue;
            }
            Message::User { content } => ("user", ContentBlock::Text { text: content.clone() }),
            Message::Assistant { content } => {
                ("assistant", ContentBlock::Text { text: content.clone() })
            }
            Message::ToolCall(call) => (
                "assistant",
                ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                },
            ),
            Message::ToolResult(result) => (
                "user",
                ContentBlock::ToolResult {
                    tool_use_id: result.call_id.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                },
            ),
        };

        match turns.last_mut() {
            Some(turn) if turn.role == role => turn.content.push(block),
            _ => turns.push(ApiMessage { role, content: vec![block] }),
        }
    }

    (system, turns)
}

fn into_reply(response: MessagesResponse) -> Result<ModelReply, LlmError> {
    let mut text = String::new();
    let mut calls = Vec::new();

    for block in response.content {
        match block {
            ResponseBlock::Text { text: part } => text.push_str(&part),
            ResponseBlock::ToolUse { id, name, input } => {
                calls.push(ToolCall { id, name, arguments: input })
            }
            ResponseBlock::Other => {}
        }
    }

    if !calls.is_empty() {
        return Ok(ModelReply::ToolCalls(calls));
    }
    if response.stop_reason.as_deref() == Some("tool_use") {
        return Err(LlmError::InvalidResponse(
            "stop_reason was tool_use but no tool_use block was returned".to_owned(),
        ));
    }
    Ok(ModelReply::Text(text))
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ApiToolChoice>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
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
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiToolChoice {
    Auto,
    Tool { name: String },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use triage_core::domain::message::{Message, ToolCall, ToolResult};

    use std::time::Duration;

    use super::{
        into_reply, per_attempt_timeout, to_api_messages, total_backoff, ApiToolChoice, LlmError,
        MessagesRequest, MessagesResponse, ModelReply,
    };

    #[test]
    fn every_attempt_and_backoff_fit_inside_the_call_budget() {
        assert_eq!(per_attempt_timeout(Duration::from_secs(30), 2), Duration::from_millis(9_500));
        assert_eq!(per_attempt_timeout(Duration::from_secs(30), 0), Duration::from_secs(30));

        for (budget_secs, retries) in [(30, 2), (60, 3), (120, 5), (300, 6)] {
            let budget = Duration::from_secs(budget_secs);
            let worst_case = per_attempt_timeout(budget, retries) * (retries + 1)
                + total_backoff(retries);
            assert!(worst_case <= budget, "{budget_secs}s with {retries} retries overruns");
        }
    }

    #[test]
    fn tiny_budgets_keep_a_usable_attempt_timeout() {
        assert_eq!(per_attempt_timeout(Duration::from_secs(1), 10), Duration::from_secs(1));
    }

    #[test]
    fn consecutive_tool_calls_and_results_are_grouped_into_single_turns() {
        let first = ToolCall {
            id: "toolu_1".to_owned(),
            name: "file_bug_report".to_owned(),
            arguments: json!({"title": "a", "description": "b"}),
        };
        let second = ToolCall { id: "toolu_2".to_owned(), ..first.clone() };
        let history = vec![
            Message::system("extra rule"),
            Message::user("File a bug report regarding: export crashes"),
            Message::ToolCall(first.clone()),
            Message::ToolCall(second.clone()),
            Message::ToolResult(ToolResult::success(&first, "filed")),
            Message::ToolResult(ToolResult::failure(&second, "tool timed out")),
            Message::assistant("Filed it."),
        ];

        let (system, turns) = to_api_messages("base prompt", &history);
        assert_eq!(system, "base prompt\n\nextra rule");

        let roles = turns.iter().map(|turn| turn.role).collect::<Vec<_>>();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);

        let encoded = serde_json::to_value(&turns).expect("serialize turns");
        assert_eq!(encoded[1]["content"].as_array().map(Vec::len), Some(2));
        assert_eq!(encoded[1]["content"][0]["type"], "tool_use");
        assert_eq!(encoded[2]["content"][0]["type"], "tool_result");
        assert_eq!(encoded[2]["content"][0]["tool_use_id"], "toolu_1");
        assert!(encoded[2]["content"][0].get("is_error").is_none());
        assert_eq!(encoded[2]["content"][1]["is_error"], true);
    }

    #[test]
    fn forced_tool_choice_serializes_with_tool_name() {
        let schema = json!({"type": "object"});
        let request = MessagesRequest {
            model: "claude",
            max_tokens: 256,
            system: Some("classify"),
            messages: Vec::new(),
            tools: vec![super::ApiTool {
                name: "classify_message",
                description: "record the classification",
                input_schema: &schema,
            }],
            tool_choice: Some(ApiToolChoice::Tool { name: "classify_message".to_owned() }),
        };

        let encoded = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(encoded["tool_choice"], json!({"type": "tool", "name": "classify_message"}));
        assert_eq!(encoded["tools"][0]["input_schema"], schema);
    }

    #[test]
    fn response_with_tool_use_becomes_tool_calls_and_unknown_blocks_are_skipped() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Let me search."},
                {"type": "tool_use", "id": "toolu_9", "name": "search_documentation", "input": {"query": "search api"}}
            ],
            "stop_reason": "tool_use"
        }))
        .expect("parse response");

        match into_reply(response).expect("reply") {
            ModelReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "search_documentation");
                assert_eq!(calls[0].arguments["query"], "search api");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn text_response_concatenates_blocks_and_rejects_inconsistent_stop_reason() {
        let text: MessagesResponse = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "Here are "}, {"type": "text", "text": "the docs."}],
            "stop_reason": "end_turn"
        }))
        .expect("parse response");
        assert_eq!(into_reply(text).expect("reply"), ModelReply::Text("Here are the docs.".to_owned()));

        let broken: MessagesResponse =
            serde_json::from_value(json!({"content": [], "stop_reason": "tool_use"}))
                .expect("parse response");
        assert!(matches!(into_reply(broken), Err(LlmError::InvalidResponse(_))));
    }
}
