use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use triage_agent::classifier::{Classifier, ClassifierSettings};
use triage_agent::graph::{CategoryAgents, RoutingGraph, FALLBACK_REPLY};
use triage_agent::guardrails::InputGuardrail;
use triage_agent::llm::{LlmError, ModelReply, ScriptedLlmClient};
use triage_agent::runtime::AgentSettings;
use triage_agent::tools::{bound_tool, Tool, ToolExecutionError};
use triage_core::domain::category::Category;
use triage_core::domain::message::{Message, ToolCall};
use triage_core::errors::{ApplicationError, DomainError};

fn classify(category: &str) -> Result<ModelReply, LlmError> {
    Ok(ModelReply::ToolCalls(vec![ToolCall {
        id: "toolu_classify".to_owned(),
        name: "classify_message".to_owned(),
        arguments: json!({"reasoning": "test routing", "category": category}),
    }]))
}

fn tool_call(id: &str, name: &str, arguments: Value) -> Result<ModelReply, LlmError> {
    Ok(ModelReply::ToolCalls(vec![ToolCall {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments,
    }]))
}

fn text(reply: &str) -> Result<ModelReply, LlmError> {
    Ok(ModelReply::Text(reply.to_owned()))
}

fn agent_settings() -> AgentSettings {
    AgentSettings {
        model: "agent-model".to_owned(),
        max_tokens: 512,
        max_tool_rounds: 4,
        llm_timeout: Duration::from_secs(5),
        tool_timeout: Duration::from_secs(5),
    }
}

fn graph_with_tools(
    llm: Arc<ScriptedLlmClient>,
    tool_for: impl Fn(Category) -> Arc<dyn Tool>,
) -> RoutingGraph {
    let classifier = Classifier::new(
        llm.clone(),
        ClassifierSettings {
            model: "classifier-model".to_owned(),
            max_tokens: 256,
            timeout: Duration::from_secs(5),
        },
    );
    let agents = CategoryAgents::with_tools(llm, &agent_settings(), tool_for);
    RoutingGraph::new(InputGuardrail::new(200), classifier, agents)
}

fn graph(llm: Arc<ScriptedLlmClient>) -> RoutingGraph {
    graph_with_tools(llm, bound_tool)
}

#[tokio::test]
async fn documentation_question_is_answered_by_the_documentation_agent() {
    let llm = Arc::new(ScriptedLlmClient::new([
        classify("documentation"),
        tool_call("toolu_1", "search_documentation", json!({"query": "search API"})),
        text("Use `GET /search?q=` with your API token."),
    ]));

    let outcome = graph(llm.clone())
        .invoke_traced("How do I use the search API?", "scenario-1")
        .await
        .expect("request succeeds");

    assert_eq!(outcome.category, Category::Documentation);
    assert_eq!(outcome.reply, "Use `GET /search?q=` with your API token.");
    assert_eq!(outcome.state.classification(), Some(Category::Documentation));
    assert_eq!(
        outcome.state.messages()[0],
        Message::user("Search for documentation regarding: How do I use the search API?")
    );

    let requests = llm.requests().await;
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].model, "classifier-model");
    for request in &requests[1..] {
        assert_eq!(request.model, "agent-model");
        let offered = request.tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>();
        assert_eq!(offered, vec!["search_documentation"]);
    }
    assert!(outcome.state.tool_calls().all(|call| call.name == "search_documentation"));
}

#[tokio::test]
async fn empty_message_is_rejected_before_classification() {
    let llm = Arc::new(ScriptedLlmClient::new([classify("bug")]));

    let error = graph(llm.clone()).invoke("   ").await.expect_err("validation error");

    assert_eq!(error, ApplicationError::Domain(DomainError::EmptyMessage));
    assert!(llm.requests().await.is_empty(), "no model call may happen");
    let interface = error.into_interface("scenario-2");
    assert_eq!(interface.status_code(), 400);
    assert_eq!(interface.user_message(), "Message is required");
}

#[tokio::test]
async fn oversized_message_is_rejected_before_classification() {
    let llm = Arc::new(ScriptedLlmClient::new([classify("bug")]));

    let error = graph(llm.clone()).invoke(&"x".repeat(201)).await.expect_err("too long");

    assert_eq!(error, ApplicationError::Domain(DomainError::MessageTooLong { limit: 200 }));
    assert!(llm.requests().await.is_empty());
}

#[tokio::test]
async fn unavailable_classifier_fails_without_running_a_sub_agent() {
    let llm = Arc::new(ScriptedLlmClient::new([Err(LlmError::Unavailable(
        "connection refused".to_owned(),
    ))]));

    let error = graph(llm.clone()).invoke("The export button crashes").await.expect_err("fails");

    assert!(matches!(error, ApplicationError::Classification(_)));
    assert_eq!(llm.requests().await.len(), 1);
    assert_eq!(error.into_interface("scenario-3").status_code(), 500);
}

struct BrokenTracker;

#[async_trait]
impl Tool for BrokenTracker {
    fn name(&self) -> &'static str {
        "file_bug_report"
    }

    fn description(&self) -> &'static str {
        "File a bug report in the system."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: Value) -> Result<String, ToolExecutionError> {
        Err(ToolExecutionError::Failed {
            tool: "file_bug_report",
            reason: "tracker returned 502".to_owned(),
        })
    }
}

#[tokio::test]
async fn bug_tool_failure_is_still_answered() {
    let llm = Arc::new(ScriptedLlmClient::new([
        classify("bug"),
        tool_call(
            "toolu_1",
            "file_bug_report",
            json!({"title": "Export crashes", "description": "Clicking export closes the app"}),
        ),
        text("I couldn't file the bug automatically; the tracker is down. Please retry later."),
    ]));
    let graph = graph_with_tools(llm.clone(), |category| match category {
        Category::Bug => Arc::new(BrokenTracker) as Arc<dyn Tool>,
        other => bound_tool(other),
    });

    let outcome = graph.invoke("The export button crashes").await.expect("still answered");

    assert_eq!(outcome.category, Category::Bug);
    assert!(outcome.reply.contains("tracker is down"));
    let failure = outcome.state.messages().iter().find_map(|message| match message {
        Message::ToolResult(result) => Some(result.clone()),
        _ => None,
    });
    let failure = failure.expect("tool result recorded");
    assert!(failure.is_error);
    assert!(failure.content.contains("tracker returned 502"));
}

#[tokio::test]
async fn empty_final_text_falls_back_to_a_fixed_reply() {
    let llm = Arc::new(ScriptedLlmClient::new([classify("feature_request"), text("  ")]));

    let outcome = graph(llm).invoke("Please add dark mode").await.expect("request succeeds");

    assert_eq!(outcome.category, Category::FeatureRequest);
    assert_eq!(outcome.reply, FALLBACK_REPLY);
}

#[tokio::test]
async fn looping_sub_agent_surfaces_rounds_exhausted() {
    let mut script = vec![classify("documentation")];
    script.extend((0..5).map(|round| {
        tool_call(&format!("toolu_{round}"), "search_documentation", json!({"query": round}))
    }));
    let llm = Arc::new(ScriptedLlmClient::new(script));

    let error = graph(llm).invoke("Where are the docs?").await.expect_err("bounded loop");

    assert_eq!(
        error,
        ApplicationError::ToolRoundsExhausted { category: Category::Documentation, limit: 4 }
    );
    assert_eq!(error.into_interface("scenario-loop").status_code(), 500);
}

#[tokio::test]
async fn identical_scripts_produce_identical_outcomes() {
    let script = || {
        [
            classify("feature_request"),
            tool_call(
                "toolu_1",
                "create_feature_request",
                json!({"title": "Dark mode", "description": "Add a dark theme"}),
            ),
            text("Logged a feature request for dark mode."),
        ]
    };

    let first = graph(Arc::new(ScriptedLlmClient::new(script())))
        .invoke("Please add dark mode")
        .await
        .expect("first run");
    let second = graph(Arc::new(ScriptedLlmClient::new(script())))
        .invoke("Please add dark mode")
        .await
        .expect("second run");

    assert_eq!(first.reply, second.reply);
    assert_eq!(first.state, second.state);
}

#[tokio::test]
async fn timed_out_classifier_maps_to_gateway_timeout() {
    let llm = Arc::new(ScriptedLlmClient::new([Err(LlmError::Timeout { secs: 5 })]));

    let error = graph(llm.clone()).invoke("The export button crashes").await.expect_err("fails");

    assert_eq!(error, ApplicationError::Timeout { stage: "classification", secs: 5 });
    assert_eq!(llm.requests().await.len(), 1, "no sub-agent may run");
    assert_eq!(error.into_interface("scenario-timeout").status_code(), 504);
}

#[tokio::test]
async fn timed_out_sub_agent_round_maps_to_gateway_timeout() {
    let llm = Arc::new(ScriptedLlmClient::new([
        classify("bug"),
        Err(LlmError::Timeout { secs: 5 }),
    ]));

    let error = graph(llm.clone()).invoke("The export button crashes").await.expect_err("fails");

    assert_eq!(error, ApplicationError::Timeout { stage: "sub-agent", secs: 5 });
    assert_eq!(llm.requests().await.len(), 2);
    assert_eq!(error.into_interface("scenario-timeout").status_code(), 504);
}

#[tokio::test]
async fn tool_outside_the_category_binding_fails_the_request() {
    let llm = Arc::new(ScriptedLlmClient::new([
        classify("documentation"),
        tool_call(
            "toolu_1",
            "file_bug_report",
            json!({"title": "Export crashes", "description": "Clicking export closes the app"}),
        ),
        text("unreachable"),
    ]));

    let error = graph(llm.clone()).invoke("Where are the docs?").await.expect_err("unbound");

    assert!(
        matches!(&error, ApplicationError::Agent(reason) if reason.contains("file_bug_report")),
        "unexpected error: {error:?}"
    );
    assert_eq!(llm.remaining().await, 1, "the loop stops at the unbound call");
    assert_eq!(error.into_interface("scenario-unbound").status_code(), 500);
}
