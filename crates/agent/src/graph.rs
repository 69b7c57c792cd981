//! Routing graph: validate, classify, dispatch to exactly one sub-agent, finish.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info};
use triage_core::config::AppConfig;
use triage_core::domain::category::Category;
use triage_core::domain::message::Message;
use triage_core::domain::state::ConversationState;
use triage_core::errors::ApplicationError;

use crate::classifier::{ClassificationError, Classifier, ClassifierSettings};
use crate::guardrails::InputGuardrail;
use crate::llm::{LlmClient, LlmError};
use crate::prompts::task_instruction;
use crate::runtime::{AgentError, AgentSettings, SubAgent};
use crate::tools::{bound_tool, Tool};

pub const FALLBACK_REPLY: &str = "I processed your message successfully.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphNode {
    Start,
    Classifying,
    Agent(Category),
    End,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Classifying => f.write_str("classifying"),
            Self::Agent(category) => write!(f, "{category}_agent"),
            Self::End => f.write_str("end"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphEvent {
    InputAccepted,
    Classified(Category),
    FinalReply,
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputAccepted => f.write_str("input_accepted"),
            Self::Classified(category) => write!(f, "classified({category})"),
            Self::FinalReply => f.write_str("final_reply"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("illegal transition from `{from}` on `{event}`")]
    IllegalTransition { from: GraphNode, event: GraphEvent },
    #[error("no classification recorded at dispatch time")]
    MissingClassification,
}

pub fn transition(node: GraphNode, event: GraphEvent) -> Result<GraphNode, RoutingError> {
    match (node, event) {
        (GraphNode::Start, GraphEvent::InputAccepted) => Ok(GraphNode::Classifying),
        (GraphNode::Classifying, GraphEvent::Classified(category)) => {
            Ok(GraphNode::Agent(category))
        }
        (GraphNode::Agent(_), GraphEvent::FinalReply) => Ok(GraphNode::End),
        (from, event) => Err(RoutingError::IllegalTransition { from, event }),
    }
}

#[derive(Clone, Debug)]
pub struct GraphOutcome {
    pub category: Category,
    pub reply: String,
    pub state: ConversationState,
}

/// The three sub-agents, one per category.
pub struct CategoryAgents {
    pub documentation: SubAgent,
    pub bug: SubAgent,
    pub feature_request: SubAgent,
}

impl CategoryAgents {
    pub fn with_default_tools(llm: Arc<dyn LlmClient>, settings: &AgentSettings) -> Self {
        Self::with_tools(llm, settings, bound_tool)
    }

    /// Binds each category to the tool `tool_for` returns for it.
    pub fn with_tools(
        llm: Arc<dyn LlmClient>,
        settings: &AgentSettings,
        tool_for: impl Fn(Category) -> Arc<dyn Tool>,
    ) -> Self {
        let agent = |category| {
            SubAgent::new(category, tool_for(category), llm.clone(), settings.clone())
        };
        Self {
            documentation: agent(Category::Documentation),
            bug: agent(Category::Bug),
            feature_request: agent(Category::FeatureRequest),
        }
    }

    fn for_category(&self, category: Category) -> &SubAgent {
        match category {
            Category::Documentation => &self.documentation,
            Category::Bug => &self.bug,
            Category::FeatureRequest => &self.feature_request,
        }
    }
}

pub struct RoutingGraph {
    guardrail: InputGuardrail,
    classifier: Classifier,
    agents: CategoryAgents,
}

impl RoutingGraph {
    pub fn new(guardrail: InputGuardrail, classifier: Classifier, agents: CategoryAgents) -> Self {
        Self { guardrail, classifier, agents }
    }

    /// Wires the classifier and the three default sub-agents to one backend.
    pub fn from_config(config: &AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        let classifier = Classifier::new(
            llm.clone(),
            ClassifierSettings {
                model: config.llm.classifier_model.clone(),
                max_tokens: config.llm.max_tokens,
                timeout: Duration::from_secs(config.llm.timeout_secs),
            },
        );
        let agents = CategoryAgents::with_default_tools(llm, &AgentSettings::from_config(config));
        Self::new(InputGuardrail::new(config.agent.max_message_chars), classifier, agents)
    }

    pub async fn invoke(&self, message: &str) -> Result<GraphOutcome, ApplicationError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        self.invoke_traced(message, &correlation_id).await
    }

    pub async fn invoke_traced(
        &self,
        message: &str,
        correlation_id: &str,
    ) -> Result<GraphOutcome, ApplicationError> {
        self.guardrail.check(message)?;
        let mut state = ConversationState::new(message);
        let mut node = step(GraphNode::Start, GraphEvent::InputAccepted)?;

        info!(event_name = "agent.graph.classifying", correlation_id, "classifying message");
        let classification = self.classifier.classify(message).await.map_err(|error| {
            error!(
                event_name = "agent.graph.classification_failed",
                correlation_id,
                error = %error,
                "classification failed"
            );
            classification_failure(error)
        })?;
        let category = classification.category;

        node = step(node, GraphEvent::Classified(category))?;
        state.set_classification(category)?;
        state.push(Message::user(task_instruction(category, message)));
        info!(
            event_name = "agent.graph.routed",
            correlation_id,
            node = %node,
            reasoning = %classification.reasoning,
            "message routed to sub-agent"
        );

        let dispatched = state
            .classification()
            .ok_or(RoutingError::MissingClassification)
            .map_err(routing_failure)?;
        let agent = self.agents.for_category(dispatched);
        agent.run(&mut state, correlation_id).await.map_err(|error| {
            error!(
                event_name = "agent.graph.subagent_failed",
                correlation_id,
                category = %dispatched,
                error = %error,
                "sub-agent failed"
            );
            agent_failure(dispatched, error)
        })?;
        step(node, GraphEvent::FinalReply)?;

        let reply = match state.last_assistant_text() {
            Some(text) if !text.trim().is_empty() => text.to_owned(),
            _ => FALLBACK_REPLY.to_owned(),
        };
        info!(
            event_name = "agent.graph.completed",
            correlation_id,
            category = %dispatched,
            reply_chars = reply.chars().count(),
            "request completed"
        );

        Ok(GraphOutcome { category: dispatched, reply, state })
    }
}

fn step(node: GraphNode, event: GraphEvent) -> Result<GraphNode, ApplicationError> {
    transition(node, event).map_err(routing_failure)
}

fn routing_failure(error: RoutingError) -> ApplicationError {
    ApplicationError::Routing(error.to_string())
}

fn classification_failure(error: ClassificationError) -> ApplicationError {
    match error {
        ClassificationError::Timeout { secs } => {
            ApplicationError::Timeout { stage: "classification", secs }
        }
        other => ApplicationError::Classification(other.to_string()),
    }
}

fn agent_failure(category: Category, error: AgentError) -> ApplicationError {
    match error {
        AgentError::ToolRoundsExhausted { limit } => {
            ApplicationError::ToolRoundsExhausted { category, limit }
        }
        AgentError::Llm(LlmError::Timeout { secs }) => {
            ApplicationError::Timeout { stage: "sub-agent", secs }
        }
        other => ApplicationError::Agent(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{transition, GraphEvent, GraphNode, RoutingError};
    use triage_core::domain::category::Category;

    #[test]
    fn happy_path_transitions() {
        let node = transition(GraphNode::Start, GraphEvent::InputAccepted).expect("start");
        assert_eq!(node, GraphNode::Classifying);
        let node = transition(node, GraphEvent::Classified(Category::Bug)).expect("classified");
        assert_eq!(node, GraphNode::Agent(Category::Bug));
        assert_eq!(transition(node, GraphEvent::FinalReply), Ok(GraphNode::End));
    }

    #[test]
    fn skipping_classification_is_illegal() {
        let error = transition(GraphNode::Start, GraphEvent::FinalReply).expect_err("illegal");
        assert_eq!(
            error,
            RoutingError::IllegalTransition {
                from: GraphNode::Start,
                event: GraphEvent::FinalReply
            }
        );
        assert_eq!(error.to_string(), "illegal transition from `start` on `final_reply`");
    }

    #[test]
    fn end_is_terminal_and_reclassification_is_illegal() {
        assert!(transition(GraphNode::End, GraphEvent::InputAccepted).is_err());
        assert!(transition(
            GraphNode::Agent(Category::Documentation),
            GraphEvent::Classified(Category::Bug)
        )
        .is_err());
        assert_eq!(GraphNode::Agent(Category::FeatureRequest).to_string(), "feature_request_agent");
    }
}
