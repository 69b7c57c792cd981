use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use toml::Value;
use triage_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let llm_api_key = match &config.llm.api_key {
        Some(_) => "<redacted>".to_string(),
        None => format!("<unset> (resolved from secret `{}`)", config.secrets.llm_api_key_name),
    };
    let agent_url = config.slack.agent_url.clone().unwrap_or_else(|| "<in-process>".to_string());
    let secrets_file = config
        .secrets
        .file_path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());

    let fields = vec![
        row("environment", format!("{:?}", config.environment), &["TRIAGE_ENVIRONMENT"]),
        row("llm.api_key", llm_api_key, &["TRIAGE_LLM_API_KEY", "ANTHROPIC_API_KEY"]),
        row("llm.base_url", config.llm.base_url.clone(), &["TRIAGE_LLM_BASE_URL"]),
        row(
            "llm.classifier_model",
            config.llm.classifier_model.clone(),
            &["TRIAGE_LLM_CLASSIFIER_MODEL"],
        ),
        row("llm.agent_model", config.llm.agent_model.clone(), &["TRIAGE_LLM_AGENT_MODEL"]),
        row("llm.max_tokens", config.llm.max_tokens.to_string(), &["TRIAGE_LLM_MAX_TOKENS"]),
        row("llm.timeout_secs", config.llm.timeout_secs.to_string(), &["TRIAGE_LLM_TIMEOUT_SECS"]),
        row("llm.max_retries", config.llm.max_retries.to_string(), &["TRIAGE_LLM_MAX_RETRIES"]),
        row(
            "agent.max_tool_rounds",
            config.agent.max_tool_rounds.to_string(),
            &["TRIAGE_AGENT_MAX_TOOL_ROUNDS"],
        ),
        row(
            "agent.tool_timeout_secs",
            config.agent.tool_timeout_secs.to_string(),
            &["TRIAGE_AGENT_TOOL_TIMEOUT_SECS"],
        ),
        row(
            "agent.request_timeout_secs",
            config.agent.request_timeout_secs.to_string(),
            &["TRIAGE_AGENT_REQUEST_TIMEOUT_SECS"],
        ),
        row(
            "agent.max_message_chars",
            config.agent.max_message_chars.to_string(),
            &["TRIAGE_AGENT_MAX_MESSAGE_CHARS"],
        ),
        row(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["TRIAGE_SERVER_BIND_ADDRESS"],
        ),
        row("server.port", config.server.port.to_string(), &["TRIAGE_SERVER_PORT"]),
        row(
            "server.service_name",
            config.server.service_name.clone(),
            &["TRIAGE_SERVER_SERVICE_NAME"],
        ),
        row("slack.enabled", config.slack.enabled.to_string(), &["TRIAGE_SLACK_ENABLED"]),
        row("slack.bot_token", redact_token(&config.slack.bot_token), &["TRIAGE_SLACK_BOT_TOKEN"]),
        row(
            "slack.signing_secret",
            redact_secret(&config.slack.signing_secret),
            &["TRIAGE_SLACK_SIGNING_SECRET"],
        ),
        row(
            "slack.allowed_channel",
            config.slack.allowed_channel.clone(),
            &["TRIAGE_SLACK_ALLOWED_CHANNEL"],
        ),
        row("slack.agent_url", agent_url, &["TRIAGE_SLACK_AGENT_URL"]),
        row(
            "slack.api_timeout_secs",
            config.slack.api_timeout_secs.to_string(),
            &["TRIAGE_SLACK_API_TIMEOUT_SECS"],
        ),
        row(
            "secrets.backend",
            format!("{:?}", config.secrets.backend),
            &["TRIAGE_SECRETS_BACKEND"],
        ),
        row("secrets.file_path", secrets_file, &["TRIAGE_SECRETS_FILE_PATH"]),
        row(
            "logging.level",
            config.logging.level.clone(),
            &["TRIAGE_LOGGING_LEVEL", "TRIAGE_LOG_LEVEL"],
        ),
        row(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TRIAGE_LOGGING_FORMAT", "TRIAGE_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["triage.toml", "config/triage.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

type Row = (&'static str, String, &'static [&'static str]);

fn row(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Row {
    (key, value, env_keys)
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the Slack token family prefix (`xoxb`, `xapp`) visible.
fn redact_token(token: &SecretString) -> String {
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &SecretString) -> String {
    if secret.expose_secret().trim().is_empty() { "<empty>" } else { "<redacted>" }.to_string()
}
