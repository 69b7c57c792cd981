use secrecy::ExposeSecret;
use serde::Serialize;
use triage_core::config::{AppConfig, LoadOptions};
use triage_core::secrets::{require_secret, SecretStore};
use triage_server::bootstrap::secret_store;

use super::{CommandResult, EXIT_CONFIG};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_CONFIG };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.extend(check_credentials(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["llm_credentials", "slack_credentials"] {
                checks.push(DoctorCheck::skipped(
                    name,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    // Skipped checks do not fail the report; only an explicit failure does.
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_credentials(config: &AppConfig) -> [DoctorCheck; 2] {
    if let Err(error) = config.check_credential_sources() {
        return [
            DoctorCheck::fail("llm_credentials", error.to_string()),
            DoctorCheck::fail("slack_credentials", error.to_string()),
        ];
    }

    let store = match secret_store(&config.secrets) {
        Ok(store) => store,
        Err(error) => {
            return [
                DoctorCheck::fail("llm_credentials", error.to_string()),
                DoctorCheck::fail("slack_credentials", error.to_string()),
            ];
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return [
                DoctorCheck::fail("llm_credentials", details.clone()),
                DoctorCheck::fail("slack_credentials", details),
            ];
        }
    };

    runtime.block_on(async {
        [
            check_llm_credentials(config, store.as_ref()).await,
            check_slack_credentials(config, store.as_ref()).await,
        ]
    })
}

async fn check_llm_credentials(config: &AppConfig, store: &dyn SecretStore) -> DoctorCheck {
    if config.llm.api_key.is_some() {
        return DoctorCheck::pass("llm_credentials", "api key provided by configuration");
    }

    let name = &config.secrets.llm_api_key_name;
    match require_secret(store, name).await {
        Ok(_) => DoctorCheck::pass(
            "llm_credentials",
            format!("resolved secret `{name}` from the {:?} backend", config.secrets.backend),
        ),
        Err(error) => DoctorCheck::fail("llm_credentials", error.to_string()),
    }
}

async fn check_slack_credentials(config: &AppConfig, store: &dyn SecretStore) -> DoctorCheck {
    if !config.slack.enabled {
        return DoctorCheck::skipped("slack_credentials", "slack listener is disabled");
    }

    let mut slack = config.slack.clone();
    if slack.bot_token.expose_secret().is_empty() {
        match require_secret(store, &config.secrets.slack_bot_token_name).await {
            Ok(token) => slack.bot_token = token,
            Err(error) => return DoctorCheck::fail("slack_credentials", error.to_string()),
        }
    }
    if slack.signing_secret.expose_secret().is_empty() {
        match require_secret(store, &config.secrets.slack_signing_secret_name).await {
            Ok(secret) => slack.signing_secret = secret,
            Err(error) => return DoctorCheck::fail("slack_credentials", error.to_string()),
        }
    }

    match slack.validate_credentials() {
        Ok(()) => DoctorCheck::pass(
            "slack_credentials",
            format!("bot token and signing secret ready for channel `{}`", slack.allowed_channel),
        ),
        Err(error) => DoctorCheck::fail("slack_credentials", error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
