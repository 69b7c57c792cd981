use std::{
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Result;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;
use triage_core::config::{AppConfig, LoadOptions};
use triage_server::{bootstrap, router};

fn init_logging(config: &AppConfig) {
    use triage_core::config::LogFormat::*;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let bootstrap::Application { config, state } = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        service = %state.service.name,
        slack_enabled = state.slack.is_some(),
        "triage server listening"
    );

    let background = state.background.clone();
    let stopping = Arc::new(Notify::new());
    let stopping_at = Arc::new(OnceLock::new());
    let trigger = stopping.clone();
    let marker = stopping_at.clone();
    let server = async move {
        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move {
                wait_for_shutdown().await;
                let _ = marker.set(Instant::now());
                trigger.notify_one();
            })
            .await
    };
    let grace = Duration::from_secs(config.server.graceful_shutdown_secs);
    let drain_deadline = async move {
        stopping.notified().await;
        tracing::info!(
            event_name = "system.server.stopping",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "draining in-flight requests"
        );
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result?,
        () = drain_deadline => {
            tracing::warn!(
                event_name = "system.server.forced_shutdown",
                correlation_id = "shutdown",
                "grace period elapsed with requests still in flight"
            );
        }
    }

    // Background Slack replies share the same grace window as requests.
    let remaining = stopping_at
        .get()
        .map_or(grace, |started: &Instant| grace.saturating_sub(started.elapsed()));
    let abandoned = background.drain(remaining).await;
    if abandoned > 0 {
        tracing::warn!(
            event_name = "system.server.background_aborted",
            correlation_id = "shutdown",
            abandoned,
            "grace period elapsed with slack events still processing"
        );
    }

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "triage server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
}
