//! How the Slack listener reaches the routing graph.
//!
//! `HttpAgentClient` talks to a deployed `/invoke` endpoint; `LocalAgentClient`
//! runs the graph in the same process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use triage_agent::graph::RoutingGraph;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentClientError {
    #[error("agent endpoint unreachable: {0}")]
    Transport(String),
    #[error("agent endpoint returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("agent endpoint returned an unreadable body: {0}")]
    Decode(String),
    #[error("agent rejected the message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn invoke(&self, message: &str, correlation_id: &str)
        -> Result<String, AgentClientError>;
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct InvokeResponse {
    response: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

pub struct HttpAgentClient {
    client: Client,
    invoke_url: String,
}

impl HttpAgentClient {
    pub fn new(agent_url: &str, timeout: Duration) -> Result<Self, AgentClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AgentClientError::Transport(error.to_string()))?;
        Ok(Self { client, invoke_url: format!("{}/invoke", agent_url.trim_end_matches('/')) })
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn invoke(
        &self,
        message: &str,
        correlation_id: &str,
    ) -> Result<String, AgentClientError> {
        let response = self
            .client
            .post(&self.invoke_url)
            .header(CORRELATION_HEADER, correlation_id)
            .json(&InvokeRequest { message })
            .send()
            .await
            .map_err(|error| AgentClientError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_owned());
            warn!(
                event_name = "slack.agent_client.http_failed",
                correlation_id,
                status = status.as_u16(),
                "agent endpoint returned an error status"
            );
            return Err(AgentClientError::Status { status: status.as_u16(), message });
        }

        response
            .json::<InvokeResponse>()
            .await
            .map(|body| body.response)
            .map_err(|error| AgentClientError::Decode(error.to_string()))
    }
}

pub struct LocalAgentClient {
    graph: Arc<RoutingGraph>,
}

impl LocalAgentClient {
    pub fn new(graph: Arc<RoutingGraph>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl AgentClient for LocalAgentClient {
    async fn invoke(
        &self,
        message: &str,
        correlation_id: &str,
    ) -> Result<String, AgentClientError> {
        match self.graph.invoke_traced(message, correlation_id).await {
            Ok(outcome) => {
                info!(
                    event_name = "slack.agent_client.local_ok",
                    correlation_id,
                    category = %outcome.category,
                    "message answered in process"
                );
                Ok(outcome.reply)
            }
            Err(error) => {
                let interface = error.into_interface(correlation_id);
                Err(AgentClientError::Rejected(interface.user_message()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mockito::Matcher;
    use serde_json::json;
    use triage_agent::llm::{LlmError, ModelReply, ScriptedLlmClient};
    use triage_agent::RoutingGraph;
    use triage_core::domain::message::ToolCall;
    use triage_core::AppConfig;

    use super::{AgentClient, AgentClientError, HttpAgentClient, LocalAgentClient};

    #[tokio::test]
    async fn http_client_posts_message_and_reads_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/invoke")
            .match_header("x-correlation-id", "Ev1")
            .match_body(Matcher::Json(json!({"message": "How do I log in?"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response": "Use SSO."}"#)
            .create_async()
            .await;

        let agent_url = format!("{}/", server.url());
        let client = HttpAgentClient::new(&agent_url, Duration::from_secs(5)).expect("client");
        let reply = client.invoke("How do I log in?", "Ev1").await.expect("reply");

        assert_eq!(reply, "Use SSO.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_client_surfaces_error_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/invoke")
            .with_status(400)
            .with_body(r#"{"error": "Message is required"}"#)
            .create_async()
            .await;

        let client = HttpAgentClient::new(&server.url(), Duration::from_secs(5)).expect("client");
        let error = client.invoke(" ", "Ev2").await.expect_err("bad request");

        assert_eq!(
            error,
            AgentClientError::Status { status: 400, message: "Message is required".to_owned() }
        );
    }

    #[tokio::test]
    async fn local_client_runs_the_graph_in_process() {
        let llm = Arc::new(ScriptedLlmClient::new([
            Ok::<_, LlmError>(ModelReply::ToolCalls(vec![ToolCall {
                id: "toolu_1".to_owned(),
                name: "classify_message".to_owned(),
                arguments: json!({"reasoning": "asks for a feature", "category": "feature_request"}),
            }])),
            Ok(ModelReply::Text("Noted, dark mode is on the list.".to_owned())),
        ]));
        let graph = RoutingGraph::from_config(&AppConfig::default(), llm);

        let reply = LocalAgentClient::new(Arc::new(graph))
            .invoke("Please add dark mode", "Ev3")
            .await
            .expect("reply");

        assert_eq!(reply, "Noted, dark mode is on the list.");
    }

    #[tokio::test]
    async fn local_client_maps_validation_failures_to_user_text() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<Result<ModelReply, LlmError>>::new()));
        let graph = RoutingGraph::from_config(&AppConfig::default(), llm);

        let error =
            LocalAgentClient::new(Arc::new(graph)).invoke("", "Ev4").await.expect_err("rejected");

        assert_eq!(error, AgentClientError::Rejected("Message is required".to_owned()));
    }
}
