//! Category sub-agent: a bounded tool-use loop around a single bound tool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use triage_core::config::AppConfig;
use triage_core::domain::category::Category;
use triage_core::domain::message::{Message, ToolCall, ToolResult};
use triage_core::domain::state::ConversationState;

use crate::llm::{CompletionRequest, LlmClient, LlmError, ModelReply, ToolChoice};
use crate::prompts::sub_agent_system_prompt;
use crate::tools::Tool;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("model requested tool `{requested}` but only `{bound}` is bound")]
    UnboundTool { bound: &'static str, requested: String },
    #[error("no final answer within {limit} tool rounds")]
    ToolRoundsExhausted { limit: u32 },
}

#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub model: String,
    pub max_tokens: u32,
    pub max_tool_rounds: u32,
    pub llm_timeout: Duration,
    pub tool_timeout: Duration,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.llm.agent_model.clone(),
            max_tokens: config.llm.max_tokens,
            max_tool_rounds: config.agent.max_tool_rounds,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            tool_timeout: Duration::from_secs(config.agent.tool_timeout_secs),
        }
    }
}

pub struct SubAgent {
    category: Category,
    system_prompt: String,
    tool: Arc<dyn Tool>,
    llm: Arc<dyn LlmClient>,
    settings: AgentSettings,
}

impl SubAgent {
    pub fn new(
        category: Category,
        tool: Arc<dyn Tool>,
        llm: Arc<dyn LlmClient>,
        settings: AgentSettings,
    ) -> Self {
        Self { category, system_prompt: sub_agent_system_prompt(category), tool, llm, settings }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn tool_name(&self) -> &'static str {
        self.tool.name()
    }

    /// Runs until the model answers in text. The answer is appended to the
    /// state as an assistant message.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        correlation_id: &str,
    ) -> Result<(), AgentError> {
        let limit = self.settings.max_tool_rounds;
        let mut rounds = 0;
        let mut executed: HashMap<String, String> = HashMap::new();

        loop {
            let calls = match self.next_reply(state).await? {
                ModelReply::Text(text) => {
                    info!(
                        event_name = "agent.subagent.completed",
                        correlation_id,
                        category = %self.category,
                        tool_rounds = rounds,
                        "sub-agent produced final answer"
                    );
                    state.push(Message::assistant(text));
                    return Ok(());
                }
                ModelReply::ToolCalls(calls) if calls.is_empty() => {
                    state.push(Message::assistant(String::new()));
                    return Ok(());
                }
                ModelReply::ToolCalls(calls) => calls,
            };

            if let Some(foreign) = calls.iter().find(|call| call.name != self.tool.name()) {
                warn!(
                    event_name = "agent.subagent.unbound_tool",
                    correlation_id,
                    category = %self.category,
                    requested = %foreign.name,
                    "model requested a tool outside its binding"
                );
                return Err(AgentError::UnboundTool {
                    bound: self.tool.name(),
                    requested: foreign.name.clone(),
                });
            }

            if rounds == limit {
                warn!(
                    event_name = "agent.subagent.rounds_exhausted",
                    correlation_id,
                    category = %self.category,
                    limit,
                    "sub-agent exceeded tool round limit"
                );
                return Err(AgentError::ToolRoundsExhausted { limit });
            }
            rounds += 1;

            for call in &calls {
                state.push(Message::ToolCall(call.clone()));
            }
            for call in &calls {
                let result = self.execute(call, &mut executed, correlation_id).await;
                state.push(Message::ToolResult(result));
            }
        }
    }

    async fn next_reply(&self, state: &ConversationState) -> Result<ModelReply, AgentError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            system: self.system_prompt.clone(),
            messages: state.messages().to_vec(),
            tools: vec![self.tool.spec()],
            tool_choice: ToolChoice::Auto,
            max_tokens: self.settings.max_tokens,
        };

        let timeout = self.settings.llm_timeout;
        let reply = tokio::time::timeout(timeout, self.llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout { secs: timeout.as_secs() })??;
        Ok(reply)
    }

    /// Successful results are remembered per run; a repeated call with the
    /// same arguments is answered from memory instead of re-executing.
    async fn execute(
        &self,
        call: &ToolCall,
        executed: &mut HashMap<String, String>,
        correlation_id: &str,
    ) -> ToolResult {
        let key = call.arguments.to_string();
        if let Some(content) = executed.get(&key) {
            debug!(
                event_name = "agent.tool.deduplicated",
                correlation_id,
                tool = %call.name,
                "identical tool call served from run cache"
            );
            return ToolResult::success(call, content.clone());
        }

        let timeout = self.settings.tool_timeout;
        match tokio::time::timeout(timeout, self.tool.execute(call.arguments.clone())).await {
            Ok(Ok(content)) => {
                info!(
                    event_name = "agent.tool.executed",
                    correlation_id,
                    tool = %call.name,
                    "tool executed"
                );
                executed.insert(key, content.clone());
                ToolResult::success(call, content)
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "agent.tool.failed",
                    correlation_id,
                    tool = %call.name,
                    error = %error,
                    "tool execution failed"
                );
                ToolResult::failure(call, format!("Tool error: {error}"))
            }
            Err(_) => {
                warn!(
                    event_name = "agent.tool.timeout",
                    correlation_id,
                    tool = %call.name,
                    timeout_ms = timeout.as_millis() as u64,
                    "tool execution timed out"
                );
                let message =
                    format!("Tool error: `{}` timed out after {}ms", call.name, timeout.as_millis());
                ToolResult::failure(call, message)
            }
        }
    }
}
