//! Serverless-style entry point.
//!
//! Events carrying `httpMethod` are treated as API-gateway proxy requests and
//! answered with JSON and CORS headers. Anything else is a direct invocation
//! of the form `{"message": "..."}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use triage_core::errors::{DomainError, InterfaceError};

use crate::{
    health::HealthResponse,
    invoke::{answer, extract_message, ErrorBody, InvokeResponse},
    AppState,
};

pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    pub body: String,
}

impl GatewayResponse {
    fn json<T: Serialize>(status_code: u16, payload: &T) -> Self {
        let body = serde_json::to_string(payload)
            .unwrap_or_else(|_| r#"{"error":"An unexpected internal error occurred."}"#.to_owned());
        Self { status_code, headers: None, body }
    }

    fn error(error: &InterfaceError) -> Self {
        Self::json(error.status_code(), &ErrorBody { error: error.user_message() })
    }

    fn with_http_headers(mut self) -> Self {
        self.headers = Some(BTreeMap::from([
            ("Access-Control-Allow-Origin".to_owned(), "*".to_owned()),
            ("Content-Type".to_owned(), "application/json".to_owned()),
        ]));
        self
    }
}

pub async fn handle_event(
    state: &AppState,
    event: &Value,
    correlation_id: &str,
) -> GatewayResponse {
    match event.get("httpMethod").and_then(Value::as_str) {
        Some(method) => {
            let path = event.get("path").and_then(Value::as_str).unwrap_or_default();
            info!(
                event_name = "server.gateway.http_event",
                correlation_id,
                method,
                path,
                "handling gateway http event"
            );
            http_event(state, method, path, event.get("body"), correlation_id)
                .await
                .with_http_headers()
        }
        None => {
            let Some(message) = event.get("message").and_then(Value::as_str) else {
                return GatewayResponse::error(&message_required(correlation_id));
            };
            respond(state, message, correlation_id).await
        }
    }
}

async fn http_event(
    state: &AppState,
    method: &str,
    path: &str,
    body: Option<&Value>,
    correlation_id: &str,
) -> GatewayResponse {
    match method.to_ascii_uppercase().as_str() {
        "GET" if path.ends_with("/health") => {
            GatewayResponse::json(200, &HealthResponse::healthy(&state.service))
        }
        "POST" => {
            let message = match body {
                Some(Value::String(raw)) => extract_message(raw.as_bytes(), correlation_id),
                Some(payload @ Value::Object(_)) => payload
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .ok_or_else(|| message_required(correlation_id)),
                _ => Err(message_required(correlation_id)),
            };
            match message {
                Ok(message) => respond(state, &message, correlation_id).await,
                Err(error) => GatewayResponse::error(&error),
            }
        }
        _ => GatewayResponse::json(405, &ErrorBody { error: METHOD_NOT_ALLOWED.to_owned() }),
    }
}

async fn respond(state: &AppState, message: &str, correlation_id: &str) -> GatewayResponse {
    match answer(state, message, correlation_id).await {
        Ok(reply) => GatewayResponse::json(200, &InvokeResponse { response: reply }),
        Err(error) => GatewayResponse::error(&error),
    }
}

fn message_required(correlation_id: &str) -> InterfaceError {
    InterfaceError::BadRequest {
        message: DomainError::EmptyMessage.to_string(),
        correlation_id: correlation_id.to_owned(),
    }
}
