use std::fs;
use std::future::Future;
use std::path::Path;

use serde_json::{json, Value};
use triage_core::config::{AppConfig, LoadOptions};
use triage_core::errors::ApplicationError;
use triage_server::bootstrap::{bootstrap_with_config, Application};
use triage_server::gateway::handle_event;
use uuid::Uuid;

use super::{CommandResult, EXIT_BOOTSTRAP, EXIT_CONFIG, EXIT_REQUEST};

const COMMAND: &str = "invoke";

/// Classifies and answers one message, exactly as `/invoke` would.
pub fn run_message(message: &str) -> CommandResult {
    let correlation_id = new_correlation_id();
    with_application(|application| async move {
        let state = &application.state;
        let limit = state.request_timeout;
        let run = state.graph.invoke_traced(message, &correlation_id);
        let outcome = tokio::time::timeout(limit, run)
            .await
            .unwrap_or(Err(ApplicationError::Timeout { stage: "request", secs: limit.as_secs() }));

        match outcome {
            Ok(outcome) => CommandResult::success_with(
                COMMAND,
                outcome.reply,
                Some(json!({
                    "category": outcome.category.to_string(),
                    "correlation_id": correlation_id,
                })),
            ),
            Err(error) => CommandResult::failure_with(
                COMMAND,
                error.error_class(),
                error.to_string(),
                EXIT_REQUEST,
                Some(json!({ "correlation_id": correlation_id })),
            ),
        }
    })
}

/// Feeds a gateway event file through the serverless entry point.
pub fn run_event(path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_event",
                format!("could not read event file `{}`: {error}", path.display()),
                EXIT_CONFIG,
            );
        }
    };
    let event: Value = match serde_json::from_str(&raw) {
        Ok(event) => event,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_event",
                format!("event file `{}` is not valid JSON: {error}", path.display()),
                EXIT_CONFIG,
            );
        }
    };

    let correlation_id = new_correlation_id();
    with_application(|application| async move {
        let response = handle_event(&application.state, &event, &correlation_id).await;
        let status = response.status_code;
        let details = serde_json::to_value(&response).ok();

        if status < 400 {
            CommandResult::success_with(COMMAND, format!("gateway answered {status}"), details)
        } else {
            CommandResult::failure_with(
                COMMAND,
                "gateway_error",
                format!("gateway answered {status}"),
                EXIT_REQUEST,
                details,
            )
        }
    })
}

/// Loads config, bootstraps with the Slack listener off, and runs `task`
/// on a single-threaded runtime.
fn with_application<F, Fut>(task: F) -> CommandResult
where
    F: FnOnce(Application) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let mut config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            );
        }
    };
    config.slack.enabled = false;

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_BOOTSTRAP,
            );
        }
    };

    runtime.block_on(async {
        match bootstrap_with_config(config).await {
            Ok(application) => task(application).await,
            Err(error) => {
                CommandResult::failure(COMMAND, "bootstrap", error.to_string(), EXIT_BOOTSTRAP)
            }
        }
    })
}

fn new_correlation_id() -> String {
    format!("cli-{}", Uuid::new_v4())
}
