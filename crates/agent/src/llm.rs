use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use triage_core::domain::message::{Message, ToolCall};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model backend unreachable: {0}")]
    Unavailable(String),
    #[error("model backend returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model backend returned an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Tool definition handed to the model: name, description and JSON schema of
/// the arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolChoice {
    /// Model decides whether to call a tool or answer in text.
    Auto,
    /// Model must call the named tool.
    Required(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply, LlmError>;
}

/// Deterministic backend that replays a fixed script and records every request.
/// An exhausted script reports the backend as unavailable.
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ModelReply, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(script: impl IntoIterator<Item = Result<ModelReply, LlmError>>) -> Self {
        Self { script: Mutex::new(script.into_iter().collect()), requests: Mutex::default() }
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<ModelReply, LlmError> {
        self.requests.lock().await.push(request);
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Unavailable("scripted backend exhausted".to_owned())))
    }
}

#[cfg(test)]
mod tests {
    use triage_core::domain::message::Message;

    use super::{CompletionRequest, LlmClient, LlmError, ModelReply, ScriptedLlmClient, ToolChoice};

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_owned(),
            system: "system".to_owned(),
            messages: vec![Message::user(text)],
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: 64,
        }
    }

    #[tokio::test]
    async fn scripted_client_replays_in_order_then_reports_unavailable() {
        let client = ScriptedLlmClient::new([Ok(ModelReply::Text("one".to_owned()))]);

        let first = client.complete(request("a")).await.expect("first reply");
        assert_eq!(first, ModelReply::Text("one".to_owned()));

        let second = client.complete(request("b")).await;
        assert!(matches!(second, Err(LlmError::Unavailable(_))));

        let recorded = client.requests().await;
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[1].messages, vec![Message::user("b")]);
        assert_eq!(client.remaining().await, 0);
    }
}
