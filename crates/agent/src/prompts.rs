use triage_core::domain::category::Category;

pub const CLASSIFY_TOOL_NAME: &str = "classify_message";

/// Triage rule shown to the classifier for each category.
pub fn triage_rule(category: Category) -> &'static str {
    match category {
        Category::Documentation => {
            "Questions about the product, different apis, or existing features."
        }
        Category::Bug => "Issues with the product, different apis, or existing features.",
        Category::FeatureRequest => "Suggestions for new features or improvements.",
    }
}

pub fn classifier_system_prompt() -> String {
    format!(
        "< Role >
You are a helpful assistant on a slack channel. You are a top-notch customer support agent. \
Your job is to classify incoming messages from user to assist them.
</ Role >

< Instructions >
Classify the below message into one of these categories:

1. documentation - The message is about documentation.
2. bug - The message is about a bug.
3. feature_request - The message is about a feature request.

Record your answer by calling the `{CLASSIFY_TOOL_NAME}` tool.
</ Instructions >

< Rules >
Messages that are about documentation:
{docs}

Messages that are about a bug:
{bug}

Messages that are about a feature request:
{feature}
</ Rules >",
        docs = triage_rule(Category::Documentation),
        bug = triage_rule(Category::Bug),
        feature = triage_rule(Category::FeatureRequest),
    )
}

pub fn classifier_user_prompt(message: &str) -> String {
    format!("Classify the following message:\n{message}")
}

/// Instruction appended to the conversation once the category is known.
pub fn task_instruction(category: Category, message: &str) -> String {
    match category {
        Category::Documentation => format!("Search for documentation regarding: {message}"),
        Category::Bug => format!("File a bug report regarding: {message}"),
        Category::FeatureRequest => format!("Suggest a feature regarding: {message}"),
    }
}

pub fn sub_agent_system_prompt(category: Category) -> String {
    let role = match category {
        Category::Documentation => "searches for documentation relevant",
        Category::Bug => "files a bug report in response",
        Category::FeatureRequest => "suggests a feature in response",
    };
    format!("You are a helpful assistant that {role} to a message from a slack channel.")
}
