use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant { content: content.into() }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } | Self::User { content } | Self::Assistant { content } => {
                Some(content)
            }
            Self::ToolResult(result) => Some(&result.content),
            Self::ToolCall(_) => None,
        }
    }
}

/// A model's request to run a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Message, ToolCall, ToolResult};

    #[test]
    fn messages_serialize_with_role_tag() {
        let call = ToolCall {
            id: "toolu_1".to_owned(),
            name: "search_documentation".to_owned(),
            arguments: json!({"query": "search api"}),
        };
        let value = serde_json::to_value(Message::ToolCall(call.clone())).expect("serialize");
        assert_eq!(value["role"], "tool_call");
        assert_eq!(value["name"], "search_documentation");

        let result = Message::ToolResult(ToolResult::failure(&call, "boom"));
        assert_eq!(result.role(), "tool_result");
        assert_eq!(result.text(), Some("boom"));
        assert_eq!(Message::user("hi").text(), Some("hi"));
        assert_eq!(Message::ToolCall(call).text(), None);
    }
}
