use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use triage_core::config::SlackConfig;

use crate::{
    agent_client::AgentClient,
    events::{
        default_dispatcher, parse_payload, DispatchError, EventContext, EventDispatcher,
        EventsApiPayload, HandlerResult, PayloadError, SlackEnvelope,
    },
    signature::{SignatureError, SignatureVerifier},
    web::{SlackApiError, SlackWebApi},
};

pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
const SEEN_EVENT_CAPACITY: usize = 1_024;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl ListenerError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Signature(_) => 401,
            Self::Payload(_) => 400,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("failed to post reply: {0}")]
    Post(#[from] SlackApiError),
}

/// Header values Slack attaches to every Events API request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub timestamp: Option<String>,
    pub signature: Option<String>,
    pub retry_num: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenerResponse {
    Challenge(String),
    /// Accepted for processing; the caller acknowledges Slack and then runs
    /// [`SlackListener::process`].
    Accepted(SlackEnvelope),
    Duplicate { event_id: String },
    Acknowledged,
}

/// Bounded memory of event ids that were already accepted.
pub struct DeliveryGuard {
    capacity: usize,
    seen: Mutex<(VecDeque<String>, HashSet<String>)>,
}

impl DeliveryGuard {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), seen: Mutex::default() }
    }

    /// Returns `true` the first time an id is offered.
    pub async fn first_delivery(&self, event_id: &str) -> bool {
        let mut guard = self.seen.lock().await;
        let (order, ids) = &mut *guard;
        if ids.contains(event_id) {
            return false;
        }
        if order.len() == self.capacity {
            if let Some(oldest) = order.pop_front() {
                ids.remove(&oldest);
            }
        }
        order.push_back(event_id.to_owned());
        ids.insert(event_id.to_owned());
        true
    }
}

pub struct SlackListener {
    verifier: SignatureVerifier,
    dispatcher: EventDispatcher,
    web: Arc<dyn SlackWebApi>,
    deliveries: DeliveryGuard,
}

impl SlackListener {
    pub fn new(
        verifier: SignatureVerifier,
        dispatcher: EventDispatcher,
        web: Arc<dyn SlackWebApi>,
    ) -> Self {
        Self { verifier, dispatcher, web, deliveries: DeliveryGuard::new(SEEN_EVENT_CAPACITY) }
    }

    pub fn from_config(
        config: &SlackConfig,
        web: Arc<dyn SlackWebApi>,
        agent: Arc<dyn AgentClient>,
    ) -> Self {
        let verifier = SignatureVerifier::new(
            config.signing_secret.clone(),
            Duration::from_secs(config.signature_tolerance_secs),
        );
        let dispatcher = default_dispatcher(agent, web.clone(), &config.allowed_channel);
        Self::new(verifier, dispatcher, web)
    }

    /// Verifies and classifies one Events API request without running any
    /// handler, so the HTTP layer can answer Slack inside its deadline.
    pub async fn accept(
        &self,
        headers: &RequestHeaders,
        body: &[u8],
    ) -> Result<ListenerResponse, ListenerError> {
        self.verifier.verify(headers.timestamp.as_deref(), headers.signature.as_deref(), body)?;

        match parse_payload(body)? {
            EventsApiPayload::UrlVerification { challenge } => {
                info!(event_name = "slack.listener.url_verification", "answering url challenge");
                Ok(ListenerResponse::Challenge(challenge))
            }
            EventsApiPayload::EventCallback(envelope) => {
                let first = self.deliveries.first_delivery(&envelope.event_id).await;
                if headers.retry_num.is_some() || !first {
                    debug!(
                        event_name = "slack.listener.duplicate",
                        correlation_id = %envelope.event_id,
                        retry_num = headers.retry_num.as_deref().unwrap_or("0"),
                        "dropping redelivered event"
                    );
                    return Ok(ListenerResponse::Duplicate { event_id: envelope.event_id });
                }
                Ok(ListenerResponse::Accepted(envelope))
            }
            EventsApiPayload::Other { payload_type } => {
                debug!(
                    event_name = "slack.listener.unhandled_payload",
                    payload_type = %payload_type,
                    "acknowledging payload without handler"
                );
                Ok(ListenerResponse::Acknowledged)
            }
        }
    }

    pub async fn process(&self, envelope: &SlackEnvelope) -> Result<HandlerResult, ProcessError> {
        let ctx = EventContext { correlation_id: envelope.event_id.clone() };
        let result = self.dispatcher.dispatch(envelope, &ctx).await.map_err(|error| {
            warn!(
                event_name = "slack.listener.dispatch_failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "event handler failed"
            );
            error
        })?;

        if let HandlerResult::Responded(message) = &result {
            self.web.post_message(message).await?;
            info!(
                event_name = "slack.listener.replied",
                correlation_id = %ctx.correlation_id,
                channel_id = %message.channel,
                "posted threaded reply"
            );
        }
        Ok(result)
    }
}
