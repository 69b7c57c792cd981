use std::{sync::Arc, time::Duration};

use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;
use triage_agent::{AnthropicClient, LlmClient, LlmError, RoutingGraph};
use triage_core::config::{AppConfig, ConfigError, LoadOptions, SecretBackend, SecretsConfig};
use triage_core::secrets::{
    require_secret, CachedSecretStore, EnvSecretStore, JsonFileSecretStore, SecretError,
    SecretStore,
};
use triage_slack::{
    AgentClient, AgentClientError, HttpAgentClient, HttpSlackWebApi, LocalAgentClient,
    SlackApiError, SlackListener,
};

use crate::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("secret resolution failed: {0}")]
    Secret(#[from] SecretError),
    #[error("model client could not be built: {0}")]
    Llm(#[from] LlmError),
    #[error("slack client could not be built: {0}")]
    Slack(#[from] SlackApiError),
    #[error("agent client could not be built: {0}")]
    AgentClient(#[from] AgentClientError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(mut config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        environment = ?config.environment,
        "starting application bootstrap"
    );

    let store = secret_store(&config.secrets)?;
    resolve_credentials(&mut config, store.as_ref()).await?;
    let api_key = config
        .llm
        .api_key
        .clone()
        .ok_or_else(|| SecretError::Missing(config.secrets.llm_api_key_name.clone()))?;

    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::from_config(&config.llm, &api_key)?);
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        base_url = %config.llm.base_url,
        classifier_model = %config.llm.classifier_model,
        agent_model = %config.llm.agent_model,
        "model client configured"
    );

    bootstrap_with_llm(config, llm)
}

/// Wires the graph and optional Slack listener around an existing model client.
pub fn bootstrap_with_llm(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    let graph = Arc::new(RoutingGraph::from_config(&config, llm));
    let mut state = AppState::new(&config, graph.clone());

    if config.slack.enabled {
        let agent: Arc<dyn AgentClient> = match &config.slack.agent_url {
            Some(url) => Arc::new(HttpAgentClient::new(
                url,
                Duration::from_secs(config.agent.request_timeout_secs),
            )?),
            None => Arc::new(LocalAgentClient::new(graph)),
        };
        let web = Arc::new(HttpSlackWebApi::new(
            &config.slack.api_base_url,
            config.slack.bot_token.clone(),
            Duration::from_secs(config.slack.api_timeout_secs),
        )?);
        state = state.with_slack(Arc::new(SlackListener::from_config(&config.slack, web, agent)));
        info!(
            event_name = "system.bootstrap.slack_ready",
            correlation_id = "bootstrap",
            allowed_channel = %config.slack.allowed_channel,
            agent_transport = if config.slack.agent_url.is_some() { "http" } else { "in_process" },
            "slack listener enabled"
        );
    }

    Ok(Application { config, state })
}

pub fn secret_store(config: &SecretsConfig) -> Result<Arc<dyn SecretStore>, BootstrapError> {
    match config.backend {
        SecretBackend::Env => Ok(Arc::new(CachedSecretStore::new(EnvSecretStore))),
        SecretBackend::File => {
            let path = config.file_path.clone().ok_or_else(|| {
                ConfigError::Validation("secrets.file_path is required for the file backend".into())
            })?;
            Ok(Arc::new(CachedSecretStore::new(JsonFileSecretStore::new(path))))
        }
    }
}

/// Fills credentials that configuration left empty from the secret store.
///
/// The model key is always required; Slack credentials only when the
/// listener is enabled. In `prod` nothing may be preset, so every
/// credential is read from the store.
pub async fn resolve_credentials(
    config: &mut AppConfig,
    store: &dyn SecretStore,
) -> Result<(), BootstrapError> {
    config.check_credential_sources()?;

    if config.llm.api_key.is_none() {
        config.llm.api_key = Some(require_secret(store, &config.secrets.llm_api_key_name).await?);
    }

    if config.slack.enabled {
        if config.slack.bot_token.expose_secret().is_empty() {
            config.slack.bot_token =
                require_secret(store, &config.secrets.slack_bot_token_name).await?;
        }
        if config.slack.signing_secret.expose_secret().is_empty() {
            config.slack.signing_secret =
                require_secret(store, &config.secrets.slack_signing_secret_name).await?;
        }
        config.slack.validate_credentials()?;
    }

    info!(
        event_name = "system.bootstrap.secrets_resolved",
        correlation_id = "bootstrap",
        backend = ?config.secrets.backend,
        "credentials resolved"
    );
    Ok(())
}
