//! HTTP surface of the triage agent.
//!
//! - `POST /invoke` runs one message through the routing graph
//! - `GET /health` reports liveness without touching the model backend
//! - `POST /slack/events` receives Slack Events API requests when the
//!   listener is enabled
//!
//! `gateway` exposes the same behaviour for serverless-style JSON events.

pub mod background;
pub mod bootstrap;
pub mod correlation;
pub mod gateway;
pub mod health;
pub mod invoke;
pub mod slack_events;

use std::{sync::Arc, time::Duration};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use triage_agent::RoutingGraph;
use triage_core::AppConfig;
use triage_slack::SlackListener;

use crate::background::BackgroundTasks;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub version: &'static str,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), version: env!("CARGO_PKG_VERSION") }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<RoutingGraph>,
    pub service: ServiceInfo,
    pub request_timeout: Duration,
    pub slack: Option<Arc<SlackListener>>,
    pub background: BackgroundTasks,
}

impl AppState {
    pub fn new(config: &AppConfig, graph: Arc<RoutingGraph>) -> Self {
        Self {
            graph,
            service: ServiceInfo::new(config.server.service_name.clone()),
            request_timeout: Duration::from_secs(config.agent.request_timeout_secs),
            slack: None,
            background: BackgroundTasks::new(),
        }
    }

    pub fn with_slack(mut self, listener: Arc<SlackListener>) -> Self {
        self.slack = Some(listener);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health))
        .route("/invoke", post(invoke::invoke));
    if state.slack.is_some() {
        router = router.route("/slack/events", post(slack_events::events));
    }

    router
        .layer(middleware::from_fn(correlation::propagate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
