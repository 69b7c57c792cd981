use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use triage_core::errors::{ApplicationError, DomainError, InterfaceError};

use crate::{correlation::CorrelationId, AppState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub response: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Pulls `message` out of a JSON request body.
///
/// A missing or non-string `message` reads as absent; blank text is left for
/// the graph's input guardrail to reject.
pub fn extract_message(body: &[u8], correlation_id: &str) -> Result<String, InterfaceError> {
    let bad_request = |message: &str| InterfaceError::BadRequest {
        message: message.to_owned(),
        correlation_id: correlation_id.to_owned(),
    };

    let payload: Value = serde_json::from_slice(body)
        .map_err(|_| bad_request("request body must be a JSON object with a `message` field"))?;
    payload
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| bad_request(&DomainError::EmptyMessage.to_string()))
}

/// Runs one message through the graph under the request deadline.
pub async fn answer(
    state: &AppState,
    message: &str,
    correlation_id: &str,
) -> Result<String, InterfaceError> {
    let limit = state.request_timeout;
    let outcome =
        tokio::time::timeout(limit, state.graph.invoke_traced(message, correlation_id)).await;

    let failure = match outcome {
        Ok(Ok(outcome)) => {
            info!(
                event_name = "server.invoke.completed",
                correlation_id,
                category = %outcome.category,
                "message answered"
            );
            return Ok(outcome.reply);
        }
        Ok(Err(failure)) => failure,
        Err(_) => ApplicationError::Timeout { stage: "request", secs: limit.as_secs() },
    };

    match &failure {
        ApplicationError::Domain(_) => warn!(
            event_name = "server.invoke.rejected",
            correlation_id,
            error_class = failure.error_class(),
            error = %failure,
            "message rejected"
        ),
        _ => error!(
            event_name = "server.invoke.failed",
            correlation_id,
            error_class = failure.error_class(),
            error = %failure,
            "message could not be answered"
        ),
    }
    Err(failure.into_interface(correlation_id))
}

pub async fn invoke(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    body: Bytes,
) -> Response {
    let message = match extract_message(&body, &correlation_id) {
        Ok(message) => message,
        Err(error) => return error_response(&error),
    };

    match answer(&state, &message, &correlation_id).await {
        Ok(reply) => (StatusCode::OK, Json(InvokeResponse { response: reply })).into_response(),
        Err(error) => error_response(&error),
    }
}

pub fn error_response(error: &InterfaceError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody { error: error.user_message() })).into_response()
}
