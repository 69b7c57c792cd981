use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{AppState, ServiceInfo};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

impl HealthResponse {
    pub fn healthy(service: &ServiceInfo) -> Self {
        Self {
            status: "healthy".to_owned(),
            service: service.name.clone(),
            version: service.version.to_owned(),
        }
    }
}

/// Liveness only: no model, tool or Slack call is made here.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(&state.service))
}
