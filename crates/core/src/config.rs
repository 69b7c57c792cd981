use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub slack: SlackConfig,
    pub secrets: SecretsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub classifier_model: String,
    pub agent_model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub max_tool_rounds: u32,
    pub tool_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_message_chars: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub service_name: String,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub enabled: bool,
    pub bot_token: SecretString,
    pub signing_secret: SecretString,
    pub allowed_channel: String,
    pub agent_url: Option<String>,
    pub api_base_url: String,
    pub signature_tolerance_secs: u64,
    pub api_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SecretsConfig {
    pub backend: SecretBackend,
    pub file_path: Option<PathBuf>,
    pub llm_api_key_name: String,
    pub slack_bot_token_name: String,
    pub slack_signing_secret_name: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretBackend {
    Env,
    File,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub environment: Option<Environment>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub classifier_model: Option<String>,
    pub agent_model: Option<String>,
    pub max_tool_rounds: Option<u32>,
    pub server_port: Option<u16>,
    pub slack_enabled: Option<bool>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_allowed_channel: Option<String>,
    pub slack_agent_url: Option<String>,
    pub secrets_backend: Option<SecretBackend>,
    pub secrets_file_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                classifier_model: "claude-3-5-sonnet-20240620".to_string(),
                agent_model: "claude-sonnet-4-20250514".to_string(),
                max_tokens: 1024,
                timeout_secs: 30,
                max_retries: 2,
            },
            agent: AgentConfig {
                max_tool_rounds: 6,
                tool_timeout_secs: 10,
                request_timeout_secs: 90,
                max_message_chars: 4_000,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                service_name: "slack-agent".to_string(),
                graceful_shutdown_secs: 15,
            },
            slack: SlackConfig {
                enabled: false,
                bot_token: String::new().into(),
                signing_secret: String::new().into(),
                allowed_channel: "all-ai-tools-testing".to_string(),
                agent_url: None,
                api_base_url: "https://slack.com/api".to_string(),
                signature_tolerance_secs: 300,
                api_timeout_secs: 10,
            },
            secrets: SecretsConfig {
                backend: SecretBackend::Env,
                file_path: None,
                llm_api_key_name: "ANTHROPIC_API_KEY".to_string(),
                slack_bot_token_name: "SLACK_BOT_TOKEN".to_string(),
                slack_signing_secret_name: "SLACK_SIGNING_SECRET".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(ConfigError::Validation(format!(
                "unsupported environment `{other}` (expected dev|prod)"
            ))),
        }
    }
}

impl std::str::FromStr for SecretBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "env" => Ok(Self::Env),
            "file" => Ok(Self::File),
            other => Err(ConfigError::Validation(format!(
                "unsupported secrets backend `{other}` (expected env|file)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("triage.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(environment) = patch.environment {
            self.environment = environment;
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(classifier_model) = llm.classifier_model {
                self.llm.classifier_model = classifier_model;
            }
            if let Some(agent_model) = llm.agent_model {
                self.llm.agent_model = agent_model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(max_tool_rounds) = agent.max_tool_rounds {
                self.agent.max_tool_rounds = max_tool_rounds;
            }
            if let Some(tool_timeout_secs) = agent.tool_timeout_secs {
                self.agent.tool_timeout_secs = tool_timeout_secs;
            }
            if let Some(request_timeout_secs) = agent.request_timeout_secs {
                self.agent.request_timeout_secs = request_timeout_secs;
            }
            if let Some(max_message_chars) = agent.max_message_chars {
                self.agent.max_message_chars = max_message_chars;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(service_name) = server.service_name {
                self.server.service_name = service_name;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(enabled) = slack.enabled {
                self.slack.enabled = enabled;
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(slack_signing_secret_value) = slack.signing_secret {
                self.slack.signing_secret = secret_value(slack_signing_secret_value);
            }
            if let Some(allowed_channel) = slack.allowed_channel {
                self.slack.allowed_channel = allowed_channel;
            }
            if let Some(agent_url) = slack.agent_url {
                self.slack.agent_url = Some(agent_url);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(signature_tolerance_secs) = slack.signature_tolerance_secs {
                self.slack.signature_tolerance_secs = signature_tolerance_secs;
            }
            if let Some(api_timeout_secs) = slack.api_timeout_secs {
                self.slack.api_timeout_secs = api_timeout_secs;
            }
        }

        if let Some(secrets) = patch.secrets {
            if let Some(backend) = secrets.backend {
                self.secrets.backend = backend;
            }
            if let Some(file_path) = secrets.file_path {
                self.secrets.file_path = Some(file_path);
            }
            if let Some(name) = secrets.llm_api_key_name {
                self.secrets.llm_api_key_name = name;
            }
            if let Some(name) = secrets.slack_bot_token_name {
                self.secrets.slack_bot_token_name = name;
            }
            if let Some(name) = secrets.slack_signing_secret_name {
                self.secrets.slack_signing_secret_name = name;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRIAGE_ENVIRONMENT") {
            self.environment = value.parse()?;
        }

        let llm_api_key = read_env("TRIAGE_LLM_API_KEY").or_else(|| read_env("ANTHROPIC_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRIAGE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("TRIAGE_LLM_CLASSIFIER_MODEL") {
            self.llm.classifier_model = value;
        }
        if let Some(value) = read_env("TRIAGE_LLM_AGENT_MODEL") {
            self.llm.agent_model = value;
        }
        if let Some(value) = read_env("TRIAGE_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("TRIAGE_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TRIAGE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TRIAGE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TRIAGE_AGENT_MAX_TOOL_ROUNDS") {
            self.agent.max_tool_rounds = parse_u32("TRIAGE_AGENT_MAX_TOOL_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_AGENT_TOOL_TIMEOUT_SECS") {
            self.agent.tool_timeout_secs = parse_u64("TRIAGE_AGENT_TOOL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_AGENT_REQUEST_TIMEOUT_SECS") {
            self.agent.request_timeout_secs =
                parse_u64("TRIAGE_AGENT_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_AGENT_MAX_MESSAGE_CHARS") {
            self.agent.max_message_chars = parse_usize("TRIAGE_AGENT_MAX_MESSAGE_CHARS", &value)?;
        }

        if let Some(value) = read_env("TRIAGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TRIAGE_SERVER_PORT") {
            self.server.port = parse_u16("TRIAGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_SERVER_SERVICE_NAME") {
            self.server.service_name = value;
        }
        if let Some(value) = read_env("TRIAGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TRIAGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIAGE_SLACK_ENABLED") {
            self.slack.enabled = parse_bool("TRIAGE_SLACK_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("TRIAGE_SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("TRIAGE_SLACK_ALLOWED_CHANNEL") {
            self.slack.allowed_channel = value;
        }
        if let Some(value) = read_env("TRIAGE_SLACK_AGENT_URL") {
            self.slack.agent_url = Some(value);
        }
        if let Some(value) = read_env("TRIAGE_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("TRIAGE_SLACK_SIGNATURE_TOLERANCE_SECS") {
            self.slack.signature_tolerance_secs =
                parse_u64("TRIAGE_SLACK_SIGNATURE_TOLERANCE_SECS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_SLACK_API_TIMEOUT_SECS") {
            self.slack.api_timeout_secs = parse_u64("TRIAGE_SLACK_API_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIAGE_SECRETS_BACKEND") {
            self.secrets.backend = value.parse()?;
        }
        if let Some(value) = read_env("TRIAGE_SECRETS_FILE_PATH") {
            self.secrets.file_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("TRIAGE_SECRETS_LLM_API_KEY_NAME") {
            self.secrets.llm_api_key_name = value;
        }
        if let Some(value) = read_env("TRIAGE_SECRETS_SLACK_BOT_TOKEN_NAME") {
            self.secrets.slack_bot_token_name = value;
        }
        if let Some(value) = read_env("TRIAGE_SECRETS_SLACK_SIGNING_SECRET_NAME") {
            self.secrets.slack_signing_secret_name = value;
        }

        let log_level = read_env("TRIAGE_LOGGING_LEVEL").or_else(|| read_env("TRIAGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRIAGE_LOGGING_FORMAT").or_else(|| read_env("TRIAGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(environment) = overrides.environment {
            self.environment = environment;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(classifier_model) = overrides.classifier_model {
            self.llm.classifier_model = classifier_model;
        }
        if let Some(agent_model) = overrides.agent_model {
            self.llm.agent_model = agent_model;
        }
        if let Some(max_tool_rounds) = overrides.max_tool_rounds {
            self.agent.max_tool_rounds = max_tool_rounds;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }

        if let Some(enabled) = overrides.slack_enabled {
            self.slack.enabled = enabled;
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(slack_signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(slack_signing_secret);
        }
        if let Some(allowed_channel) = overrides.slack_allowed_channel {
            self.slack.allowed_channel = allowed_channel;
        }
        if let Some(agent_url) = overrides.slack_agent_url {
            self.slack.agent_url = Some(agent_url);
        }

        if let Some(backend) = overrides.secrets_backend {
            self.secrets.backend = backend;
        }
        if let Some(file_path) = overrides.secrets_file_path {
            self.secrets.file_path = Some(file_path);
        }
    }

    /// Validates shape and ranges. Credential presence is checked after secret
    /// resolution at bootstrap, because credentials may come from a secret store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_slack(&self.slack)?;
        validate_secrets(&self.secrets)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// In `prod` every credential comes from the file-backed secret store.
    /// Keys set inline in the config file or through environment variables
    /// are only accepted in `dev`.
    pub fn check_credential_sources(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Dev {
            return Ok(());
        }

        if self.secrets.backend != SecretBackend::File {
            return Err(ConfigError::Validation(
                "environment `prod` reads credentials from the secret store; set secrets.backend = \"file\" and secrets.file_path".to_string(),
            ));
        }

        let mut inline = Vec::new();
        if self.llm.api_key.is_some() {
            inline.push(("llm.api_key", &self.secrets.llm_api_key_name));
        }
        if self.slack.enabled && !self.slack.bot_token.expose_secret().is_empty() {
            inline.push(("slack.bot_token", &self.secrets.slack_bot_token_name));
        }
        if self.slack.enabled && !self.slack.signing_secret.expose_secret().is_empty() {
            inline.push(("slack.signing_secret", &self.secrets.slack_signing_secret_name));
        }

        match inline.first() {
            None => Ok(()),
            Some((key, secret_name)) => Err(ConfigError::Validation(format!(
                "{key} must not be set inline or through the environment in `prod`; store it as secret `{secret_name}`"
            ))),
        }
    }
}

impl SlackConfig {
    /// Checks the credentials the listener needs once secrets have been resolved.
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        let bot_token = self.bot_token.expose_secret();
        if bot_token.is_empty() {
            return Err(ConfigError::Validation(
                "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
            ));
        }
        if !bot_token.starts_with("xoxb-") {
            let hint = if bot_token.starts_with("xapp-") {
                " (hint: you may have used the app-level token instead of the bot token)"
            } else {
                ""
            };
            return Err(ConfigError::Validation(format!(
                "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
            )));
        }

        if self.signing_secret.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string()
            ));
        }

        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("triage.toml"), PathBuf::from("config/triage.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.classifier_model.trim().is_empty() || llm.agent_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.classifier_model and llm.agent_model must not be empty".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.max_retries > 10 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 10".to_string()));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_tool_rounds == 0 || agent.max_tool_rounds > 10 {
        return Err(ConfigError::Validation(
            "agent.max_tool_rounds must be in range 1..=10".to_string(),
        ));
    }

    if agent.tool_timeout_secs == 0 || agent.tool_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "agent.tool_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if agent.request_timeout_secs == 0 || agent.request_timeout_secs > 900 {
        return Err(ConfigError::Validation(
            "agent.request_timeout_secs must be in range 1..=900".to_string(),
        ));
    }

    if agent.max_message_chars == 0 {
        return Err(ConfigError::Validation(
            "agent.max_message_chars must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.service_name.trim().is_empty() {
        return Err(ConfigError::Validation("server.service_name must not be empty".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if !slack.enabled {
        return Ok(());
    }

    if slack.allowed_channel.trim().trim_start_matches('#').is_empty() {
        return Err(ConfigError::Validation(
            "slack.allowed_channel is required when slack.enabled is true".to_string(),
        ));
    }

    if let Some(agent_url) = &slack.agent_url {
        if !agent_url.starts_with("http://") && !agent_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "slack.agent_url must start with http:// or https://".to_string(),
            ));
        }
    }

    if !slack.api_base_url.starts_with("http://") && !slack.api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if slack.signature_tolerance_secs == 0 {
        return Err(ConfigError::Validation(
            "slack.signature_tolerance_secs must be greater than zero".to_string(),
        ));
    }

    if !(1..=60).contains(&slack.api_timeout_secs) {
        return Err(ConfigError::Validation(
            "slack.api_timeout_secs must be between 1 and 60".to_string(),
        ));
    }

    Ok(())
}

fn validate_secrets(secrets: &SecretsConfig) -> Result<(), ConfigError> {
    if secrets.backend == SecretBackend::File && secrets.file_path.is_none() {
        return Err(ConfigError::Validation(
            "secrets.file_path is required when secrets.backend is `file`".to_string(),
        ));
    }

    let names = [
        ("secrets.llm_api_key_name", &secrets.llm_api_key_name),
        ("secrets.slack_bot_token_name", &secrets.slack_bot_token_name),
        ("secrets.slack_signing_secret_name", &secrets.slack_signing_secret_name),
    ];
    for (key, value) in names {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{key} must not be empty")));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    environment: Option<Environment>,
    llm: Option<LlmPatch>,
    agent: Option<AgentPatch>,
    server: Option<ServerPatch>,
    slack: Option<SlackPatch>,
    secrets: Option<SecretsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    classifier_model: Option<String>,
    agent_model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    max_tool_rounds: Option<u32>,
    tool_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    max_message_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    service_name: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    enabled: Option<bool>,
    bot_token: Option<String>,
    signing_secret: Option<String>,
    allowed_channel: Option<String>,
    agent_url: Option<String>,
    api_base_url: Option<String>,
    signature_tolerance_secs: Option<u64>,
    api_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SecretsPatch {
    backend: Option<SecretBackend>,
    file_path: Option<PathBuf>,
    llm_api_key_name: Option<String>,
    slack_bot_token_name: Option<String>,
    slack_signing_secret_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
