use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use triage_core::domain::category::Category;

use crate::llm::ToolSpec;

#[derive(Debug, Error)]
pub enum ToolExecutionError {
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },
    #[error("`{tool}` failed: {reason}")]
    Failed { tool: &'static str, reason: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String, ToolExecutionError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            input_schema: self.input_schema(),
        }
    }
}

/// The one tool a category's sub-agent may call.
pub fn bound_tool(category: Category) -> Arc<dyn Tool> {
    match category {
        Category::Documentation => Arc::new(SearchDocumentation),
        Category::Bug => Arc::new(FileBugReport),
        Category::FeatureRequest => Arc::new(CreateFeatureRequest),
    }
}

fn parse_args<T>(tool: &'static str, input: Value) -> Result<T, ToolExecutionError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(input)
        .map_err(|error| ToolExecutionError::InvalidArguments { tool, reason: error.to_string() })
}

fn require_text(tool: &'static str, field: &str, value: &str) -> Result<(), ToolExecutionError> {
    if value.trim().is_empty() {
        return Err(ToolExecutionError::InvalidArguments {
            tool,
            reason: format!("`{field}` must not be empty"),
        });
    }
    Ok(())
}

fn or_none(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("none")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        })
    }
}

const LEVELS: [&str; 4] = ["low", "medium", "high", "critical"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchDocumentationArgs {
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    10
}

pub struct SearchDocumentation;

#[async_trait]
impl Tool for SearchDocumentation {
    fn name(&self) -> &'static str {
        "search_documentation"
    }

    fn description(&self) -> &'static str {
        "Search for documentation based on a query string."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "The search query to find relevant documentation"},
                "category": {"type": "string", "description": "Filter results by documentation category"},
                "max_results": {"type": "integer", "minimum": 1, "description": "Maximum number of results to return (default: 10)"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> Result<String, ToolExecutionError> {
        let args: SearchDocumentationArgs = parse_args(self.name(), input)?;
        require_text(self.name(), "query", &args.query)?;
        Ok(format!(
            "Documentation search performed for query: '{}' in category: '{}' with max_results: {}",
            args.query,
            or_none(&args.category),
            args.max_results
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileBugReportArgs {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub severity: Priority,
    #[serde(default)]
    pub steps_to_reproduce: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
}

pub struct FileBugReport;

#[async_trait]
impl Tool for FileBugReport {
    fn name(&self) -> &'static str {
        "file_bug_report"
    }

    fn description(&self) -> &'static str {
        "File a bug report in the system."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Brief title describing the bug"},
                "description": {"type": "string", "description": "Detailed description of the bug"},
                "severity": {"type": "string", "enum": LEVELS, "description": "Bug severity (default: medium)"},
                "steps_to_reproduce": {"type": "string", "description": "Steps needed to reproduce the bug"},
                "environment": {"type": "string", "description": "Environment information where the bug occurs"}
            },
            "required": ["title", "description"]
        })
    }

    async fn execute(&self, input: Value) -> Result<String, ToolExecutionError> {
        let args: FileBugReportArgs = parse_args(self.name(), input)?;
        require_text(self.name(), "title", &args.title)?;
        require_text(self.name(), "description", &args.description)?;
        Ok(format!(
            "Bug report filed: '{}' with severity: '{}' in environment: '{}'",
            args.title,
            args.severity,
            or_none(&args.environment)
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFeatureRequestArgs {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assignee: Option<String>,
}

pub struct CreateFeatureRequest;

#[async_trait]
impl Tool for CreateFeatureRequest {
    fn name(&self) -> &'static str {
        "create_feature_request"
    }

    fn description(&self) -> &'static str {
        "Create a new feature request in the system."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Brief title describing the feature request"},
                "description": {"type": "string", "description": "Detailed description of the requested feature"},
                "priority": {"type": "string", "enum": LEVELS, "description": "Priority level (default: medium)"},
                "assignee": {"type": "string", "description": "User to assign the feature request to"}
            },
            "required": ["title", "description"]
        })
    }

    async fn execute(&self, input: Value) -> Result<String, ToolExecutionError> {
        let args: CreateFeatureRequestArgs = parse_args(self.name(), input)?;
        require_text(self.name(), "title", &args.title)?;
        require_text(self.name(), "description", &args.description)?;
        Ok(format!(
            "Feature request created: '{}' with priority: '{}' assigned to: '{}'",
            args.title,
            args.priority,
            or_none(&args.assignee)
        ))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use triage_core::domain::category::Category;

    use super::{bound_tool, FileBugReport, SearchDocumentation, Tool, ToolExecutionError};

    #[test]
    fn each_category_binds_a_distinct_tool() {
        let names = Category::ALL.map(|category| bound_tool(category).name());
        assert_eq!(names, ["search_documentation", "file_bug_report", "create_feature_request"]);
    }

    #[tokio::test]
    async fn search_documentation_echoes_arguments_with_defaults() {
        let output = SearchDocumentation
            .execute(json!({"query": "search api"}))
            .await
            .expect("search succeeds");
        assert_eq!(
            output,
            "Documentation search performed for query: 'search api' in category: 'none' with max_results: 10"
        );
    }

    #[tokio::test]
    async fn bug_report_defaults_severity_to_medium() {
        let output = FileBugReport
            .execute(json!({
                "title": "Export crashes",
                "description": "Clicking export closes the app",
                "environment": "macOS 14"
            }))
            .await
            .expect("bug filed");
        assert_eq!(
            output,
            "Bug report filed: 'Export crashes' with severity: 'medium' in environment: 'macOS 14'"
        );
    }

    #[tokio::test]
    async fn feature_request_reports_priority_and_assignee() {
        let output = bound_tool(Category::FeatureRequest)
            .execute(json!({
                "title": "Dark mode",
                "description": "Add a dark theme",
                "priority": "high",
                "assignee": "design"
            }))
            .await
            .expect("feature request created");
        assert_eq!(
            output,
            "Feature request created: 'Dark mode' with priority: 'high' assigned to: 'design'"
        );
    }

    #[tokio::test]
    async fn malformed_arguments_are_rejected_without_side_effects() {
        for input in [
            json!({"description": "no title"}),
            json!({"title": "x", "description": "y", "severity": "urgent"}),
            json!({"title": "  ", "description": "blank title"}),
        ] {
            let error = FileBugReport.execute(input).await.expect_err("invalid arguments");
            assert!(matches!(
                error,
                ToolExecutionError::InvalidArguments { tool: "file_bug_report", .. }
            ));
        }
    }

    #[test]
    fn spec_exposes_schema_with_required_fields() {
        let spec = FileBugReport.spec();
        assert_eq!(spec.name, "file_bug_report");
        assert_eq!(spec.input_schema["required"], json!(["title", "description"]));
    }
}
