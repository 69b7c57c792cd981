use serde::Serialize;

use crate::domain::category::Category;
use crate::domain::message::{Message, ToolCall};
use crate::errors::DomainError;

/// Unit of work threaded through the routing graph for one request.
///
/// The original message is fixed at construction, the message log only grows,
/// and the classification can be recorded once.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationState {
    slack_message: String,
    messages: Vec<Message>,
    classification: Option<Category>,
}

impl ConversationState {
    pub fn new(slack_message: impl Into<String>) -> Self {
        Self { slack_message: slack_message.into(), messages: Vec::new(), classification: None }
    }

    pub fn slack_message(&self) -> &str {
        &self.slack_message
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn classification(&self) -> Option<Category> {
        self.classification
    }

    pub fn set_classification(&mut self, category: Category) -> Result<(), DomainError> {
        if let Some(existing) = self.classification {
            return Err(DomainError::ClassificationAlreadySet { existing, attempted: category });
        }
        self.classification = Some(category);
        Ok(())
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::Assistant { content } => Some(content.as_str()),
            _ => None,
        })
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.messages.iter().filter_map(|message| match message {
            Message::ToolCall(call) => Some(call),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ConversationState;
    use crate::domain::category::Category;
    use crate::domain::message::{Message, ToolCall};
    use crate::errors::DomainError;

    #[test]
    fn classification_can_only_be_set_once() {
        let mut state = ConversationState::new("the export button crashes");
        assert_eq!(state.classification(), None);

        state.set_classification(Category::Bug).expect("first set");
        let error = state.set_classification(Category::Documentation).expect_err("second set");

        assert_eq!(
            error,
            DomainError::ClassificationAlreadySet {
                existing: Category::Bug,
                attempted: Category::Documentation,
            }
        );
        assert_eq!(state.classification(), Some(Category::Bug));
    }

    #[test]
    fn message_log_preserves_insertion_order() {
        let mut state = ConversationState::new("hello");
        state.push(Message::user("first"));
        state.push(Message::ToolCall(ToolCall {
            id: "call-1".to_owned(),
            name: "search_documentation".to_owned(),
            arguments: json!({"query": "hello"}),
        }));
        state.push(Message::assistant("second"));
        state.push(Message::assistant("third"));

        let roles = state.messages().iter().map(Message::role).collect::<Vec<_>>();
        assert_eq!(roles, vec!["user", "tool_call", "assistant", "assistant"]);
        assert_eq!(state.last_assistant_text(), Some("third"));
        assert_eq!(state.tool_calls().count(), 1);
        assert_eq!(state.slack_message(), "hello");
    }
}
