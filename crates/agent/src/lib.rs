//! Triage agent: classification and routing of inbound Slack messages.
//!
//! A request flows through a small state machine:
//! 1. **Guardrails** (`guardrails`) reject empty or oversized input before any model call.
//! 2. **Classification** (`classifier`) maps the message to one [`Category`] through a
//!    forced, schema-checked tool call.
//! 3. **Dispatch** (`graph`) hands the conversation to the sub-agent of that category.
//! 4. **Sub-agent** (`runtime`) runs a bounded tool-use loop around its single bound tool
//!    (`tools`) until the model answers in text.
//!
//! The model backend sits behind [`llm::LlmClient`]; `anthropic` implements it over the
//! Anthropic Messages API and [`llm::ScriptedLlmClient`] replays canned replies.
//!
//! [`Category`]: triage_core::domain::category::Category

pub mod anthropic;
pub mod classifier;
pub mod graph;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod runtime;
pub mod tools;

pub use anthropic::AnthropicClient;
pub use classifier::{ClassificationError, Classifier, ClassifierSettings};
pub use graph::{CategoryAgents, GraphOutcome, RoutingError, RoutingGraph, FALLBACK_REPLY};
pub use guardrails::InputGuardrail;
pub use llm::{LlmClient, LlmError, ModelReply, ScriptedLlmClient};
pub use runtime::{AgentError, AgentSettings, SubAgent};
pub use tools::{bound_tool, Tool, ToolExecutionError};
