use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};
use triage_core::domain::category::{Category, ClassificationResult};
use triage_core::domain::message::{Message, ToolCall, ToolResult};

use crate::llm::{CompletionRequest, LlmClient, LlmError, ModelReply, ToolChoice, ToolSpec};
use crate::prompts::{classifier_system_prompt, classifier_user_prompt, CLASSIFY_TOOL_NAME};

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classification backend failed: {0}")]
    Backend(#[source] LlmError),
    #[error("classification timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("classification output violated the schema: {0}")]
    Schema(String),
}

impl From<LlmError> for ClassificationError {
    fn from(value: LlmError) -> Self {
        match value {
            LlmError::Timeout { secs } => Self::Timeout { secs },
            other => Self::Backend(other),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClassifierSettings {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Maps a message to exactly one [`Category`] through a forced tool call
/// whose input schema is the classification contract.
pub struct Classifier {
    llm: Arc<dyn LlmClient>,
    settings: ClassifierSettings,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>, settings: ClassifierSettings) -> Self {
        Self { llm, settings }
    }

    /// One corrective retry is attempted when the output does not parse.
    pub async fn classify(
        &self,
        message: &str,
    ) -> Result<ClassificationResult, ClassificationError> {
        let mut conversation = vec![Message::user(classifier_user_prompt(message))];

        let first = self.request(&conversation).await?;
        let violation = match parse_reply(&first) {
            Ok(result) => return Ok(result),
            Err(violation) => violation,
        };

        warn!(
            event_name = "agent.classify.schema_violation",
            attempt = 1,
            violation = %violation.reason,
            "classifier output rejected, retrying with correction"
        );
        match (&first, violation.call) {
            (_, Some(call)) => {
                let correction = format!(
                    "Invalid classification: {}. Call `{CLASSIFY_TOOL_NAME}` again with a `reasoning` string and a `category` that is exactly one of: documentation, bug, feature_request.",
                    violation.reason
                );
                conversation.push(Message::ToolCall(call.clone()));
                conversation.push(Message::ToolResult(ToolResult::failure(&call, correction)));
            }
            (ModelReply::Text(text), None) => {
                conversation.push(Message::assistant(text.clone()));
                conversation.push(Message::user(format!(
                    "You must answer by calling the `{CLASSIFY_TOOL_NAME}` tool, not in text."
                )));
            }
            (ModelReply::ToolCalls(_), None) => {
                conversation.push(Message::user(format!(
                    "You must call the `{CLASSIFY_TOOL_NAME}` tool exactly once."
                )));
            }
        }

        let second = self.request(&conversation).await?;
        parse_reply(&second).map_err(|violation| {
            warn!(
                event_name = "agent.classify.schema_violation",
                attempt = 2,
                violation = %violation.reason,
                "classifier output rejected after correction"
            );
            ClassificationError::Schema(violation.reason)
        })
    }

    async fn request(&self, conversation: &[Message]) -> Result<ModelReply, ClassificationError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            system: classifier_system_prompt(),
            messages: conversation.to_vec(),
            tools: vec![classification_tool()],
            tool_choice: ToolChoice::Required(CLASSIFY_TOOL_NAME.to_owned()),
            max_tokens: self.settings.max_tokens,
        };

        let reply = tokio::time::timeout(self.settings.timeout, self.llm.complete(request))
            .await
            .map_err(|_| ClassificationError::Timeout { secs: self.settings.timeout.as_secs() })??;
        Ok(reply)
    }
}

struct Violation {
    reason: String,
    call: Option<ToolCall>,
}

fn parse_reply(reply: &ModelReply) -> Result<ClassificationResult, Violation> {
    let calls = match reply {
        ModelReply::Text(_) => {
            return Err(Violation {
                reason: "model replied in text instead of calling the tool".to_owned(),
                call: None,
            })
        }
        ModelReply::ToolCalls(calls) => calls,
    };

    let [call] = calls.as_slice() else {
        return Err(Violation {
            reason: format!("expected exactly one tool call, got {}", calls.len()),
            call: None,
        });
    };

    if call.name != CLASSIFY_TOOL_NAME {
        return Err(Violation {
            reason: format!("unexpected tool `{}`", call.name),
            call: Some(call.clone()),
        });
    }

    let result = serde_json::from_value::<ClassificationResult>(call.arguments.clone())
        .map_err(|error| Violation { reason: error.to_string(), call: Some(call.clone()) })?;
    info!(
        event_name = "agent.classify.completed",
        category = %result.category,
        "message classified"
    );
    Ok(result)
}

fn classification_tool() -> ToolSpec {
    let categories: Vec<Value> =
        Category::ALL.iter().map(|category| Value::from(category.as_str())).collect();
    ToolSpec {
        name: CLASSIFY_TOOL_NAME.to_owned(),
        description: "Record the classification of the incoming message.".to_owned(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "reasoning": {
                    "type": "string",
                    "description": "Step-by-step reasoning behind the classification."
                },
                "category": {
                    "type": "string",
                    "enum": categories,
                    "description": "'documentation' when a user is looking for information, 'bug' when a user is reporting an issue, or 'feature_request' when a user is suggesting a new feature."
                }
            },
            "required": ["reasoning", "category"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use triage_core::domain::category::Category;
    use triage_core::domain::message::{Message, ToolCall};

    use super::{ClassificationError, Classifier, ClassifierSettings};
    use crate::llm::{
        CompletionRequest, LlmClient, LlmError, ModelReply, ScriptedLlmClient, ToolChoice,
    };

    fn settings() -> ClassifierSettings {
        ClassifierSettings {
            model: "classifier".to_owned(),
            max_tokens: 256,
            timeout: Duration::from_secs(5),
        }
    }

    fn classify_call(arguments: serde_json::Value) -> ModelReply {
        ModelReply::ToolCalls(vec![ToolCall {
            id: "toolu_c".to_owned(),
            name: "classify_message".to_owned(),
            arguments,
        }])
    }

    #[tokio::test]
    async fn forced_tool_call_yields_a_category() {
        let llm = Arc::new(ScriptedLlmClient::new([Ok(classify_call(
            json!({"reasoning": "asks how to use an api", "category": "documentation"}),
        ))]));
        let classifier = Classifier::new(llm.clone(), settings());

        let result = classifier.classify("How do I use the search API?").await.expect("classified");
        assert_eq!(result.category, Category::Documentation);

        let requests = llm.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_choice, ToolChoice::Required("classify_message".to_owned()));
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(
            requests[0].messages,
            vec![Message::user("Classify the following message:\nHow do I use the search API?")]
        );
    }

    #[tokio::test]
    async fn out_of_schema_category_is_corrected_once() {
        let llm = Arc::new(ScriptedLlmClient::new([
            Ok(classify_call(json!({"reasoning": "unsure", "category": "question"}))),
            Ok(classify_call(json!({"reasoning": "reports a crash", "category": "bug"}))),
        ]));
        let classifier = Classifier::new(llm.clone(), settings());

        let result = classifier.classify("the export button crashes").await.expect("classified");
        assert_eq!(result.category, Category::Bug);

        let retry = &llm.requests().await[1];
        assert!(matches!(retry.messages[1], Message::ToolCall(_)));
        match &retry.messages[2] {
            Message::ToolResult(result) => {
                assert!(result.is_error);
                assert!(result.content.starts_with("Invalid classification"));
            }
            other => panic!("expected corrective tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_violation_fails_without_fabricating_a_category() {
        let llm = Arc::new(ScriptedLlmClient::new([
            Ok(ModelReply::Text("It is a bug.".to_owned())),
            Ok(classify_call(json!({"category": "other"}))),
        ]));
        let classifier = Classifier::new(llm.clone(), settings());

        let error = classifier.classify("something").await.expect_err("schema violation");
        assert!(matches!(error, ClassificationError::Schema(_)));
        assert_eq!(llm.remaining().await, 0);
    }

    #[tokio::test]
    async fn unreachable_backend_is_reported_as_backend_failure() {
        let llm = Arc::new(ScriptedLlmClient::new([Err(LlmError::Unavailable(
            "connection refused".to_owned(),
        ))]));
        let classifier = Classifier::new(llm, settings());

        let error = classifier.classify("hello").await.expect_err("backend down");
        assert!(matches!(error, ClassificationError::Backend(LlmError::Unavailable(_))));
    }

    struct Stalled;

    #[async_trait]
    impl LlmClient for Stalled {
        async fn complete(&self, _request: CompletionRequest) -> Result<ModelReply, LlmError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ModelReply::Text(String::new()))
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let classifier = Classifier::new(
            Arc::new(Stalled),
            ClassifierSettings { timeout: Duration::from_millis(20), ..settings() },
        );

        let error = classifier.classify("hello").await.expect_err("timeout");
        assert!(matches!(error, ClassificationError::Timeout { .. }));
    }
}
