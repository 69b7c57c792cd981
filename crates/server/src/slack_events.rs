use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use tracing::{info, warn};
use triage_slack::{
    listener::{ListenerResponse, RequestHeaders, RETRY_NUM_HEADER},
    signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
};

use crate::{correlation::CorrelationId, invoke::ErrorBody, AppState};

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
}

/// Acknowledges Slack right away and runs accepted events in the background.
pub async fn events(
    State(state): State<AppState>,
    Extension(CorrelationId(correlation_id)): Extension<CorrelationId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(listener) = state.slack.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let request_headers = RequestHeaders {
        timestamp: header(&headers, TIMESTAMP_HEADER),
        signature: header(&headers, SIGNATURE_HEADER),
        retry_num: header(&headers, RETRY_NUM_HEADER),
    };

    match listener.accept(&request_headers, &body).await {
        Ok(ListenerResponse::Challenge(challenge)) => {
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(ListenerResponse::Accepted(envelope)) => {
            info!(
                event_name = "server.slack.accepted",
                correlation_id = %correlation_id,
                event_id = %envelope.event_id,
                "slack event accepted"
            );
            state
                .background
                .spawn(async move {
                    if let Err(error) = listener.process(&envelope).await {
                        warn!(
                            event_name = "server.slack.process_failed",
                            correlation_id = %envelope.event_id,
                            error = %error,
                            "slack event processing failed"
                        );
                    }
                })
                .await;
            StatusCode::OK.into_response()
        }
        Ok(ListenerResponse::Duplicate { .. } | ListenerResponse::Acknowledged) => {
            StatusCode::OK.into_response()
        }
        Err(error) => {
            warn!(
                event_name = "server.slack.rejected",
                correlation_id = %correlation_id,
                error = %error,
                "slack request rejected"
            );
            let status =
                StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
            (status, Json(ErrorBody { error: error.to_string() })).into_response()
        }
    }
}
