use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{
    agent_client::{AgentClient, AgentClientError},
    mrkdwn::markdown_to_mrkdwn,
    web::{FileInfo, OutgoingMessage, SlackWebApi},
};

pub const AGENT_FAILURE_REPLY: &str =
    ":warning: Sorry, I couldn't process your message right now. Please try again later.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub event_id: String,
    pub team_id: Option<String>,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    FileShared(FileSharedEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::FileShared(_) => SlackEventType::FileShared,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    FileShared,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub user_id: Option<String>,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl MessageEvent {
    /// Replies go into the existing thread, or start one under the message.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSharedEvent {
    pub file_id: String,
    pub channel_id: String,
    pub user_id: Option<String>,
    pub event_ts: String,
}

/// Top-level body of an Events API request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventsApiPayload {
    UrlVerification { challenge: String },
    EventCallback(SlackEnvelope),
    Other { payload_type: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("request body is not valid json: {0}")]
    InvalidJson(String),
    #[error("`{payload_type}` payload is missing `{field}`")]
    MissingField { payload_type: String, field: &'static str },
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(rename = "type")]
    payload_type: String,
    challenge: Option<String>,
    event_id: Option<String>,
    team_id: Option<String>,
    event: Option<Value>,
}

#[derive(Deserialize)]
struct RawEventKind {
    #[serde(rename = "type")]
    event_type: String,
}

#[derive(Deserialize)]
struct RawMessage {
    channel: Option<String>,
    user: Option<String>,
    #[serde(default)]
    text: String,
    ts: Option<String>,
    thread_ts: Option<String>,
    bot_id: Option<String>,
    subtype: Option<String>,
}

#[derive(Deserialize)]
struct RawFileShared {
    file_id: Option<String>,
    channel_id: Option<String>,
    user_id: Option<String>,
    event_ts: Option<String>,
}

pub fn parse_payload(body: &[u8]) -> Result<EventsApiPayload, PayloadError> {
    let raw: RawPayload =
        serde_json::from_slice(body).map_err(|error| PayloadError::InvalidJson(error.to_string()))?;

    match raw.payload_type.as_str() {
        "url_verification" => {
            let challenge = raw.challenge.ok_or_else(|| missing(&raw.payload_type, "challenge"))?;
            Ok(EventsApiPayload::UrlVerification { challenge })
        }
        "event_callback" => {
            let event_id = raw.event_id.ok_or_else(|| missing("event_callback", "event_id"))?;
            let event = raw.event.ok_or_else(|| missing("event_callback", "event"))?;
            Ok(EventsApiPayload::EventCallback(SlackEnvelope {
                event_id,
                team_id: raw.team_id,
                event: parse_event(event)?,
            }))
        }
        _ => Ok(EventsApiPayload::Other { payload_type: raw.payload_type }),
    }
}

/// Only `message` and `file_shared` bodies are typed; every other event
/// type is kept as `Unsupported` whatever shape its fields have.
fn parse_event(value: Value) -> Result<SlackEvent, PayloadError> {
    let kind: RawEventKind = serde_json::from_value(value.clone()).map_err(invalid_json)?;

    match kind.event_type.as_str() {
        "message" => {
            let raw: RawMessage = serde_json::from_value(value).map_err(invalid_json)?;
            Ok(SlackEvent::Message(MessageEvent {
                channel_id: raw.channel.ok_or_else(|| missing("message", "channel"))?,
                user_id: raw.user,
                text: raw.text,
                ts: raw.ts.ok_or_else(|| missing("message", "ts"))?,
                thread_ts: raw.thread_ts,
                bot_id: raw.bot_id,
                subtype: raw.subtype,
            }))
        }
        "file_shared" => {
            let raw: RawFileShared = serde_json::from_value(value).map_err(invalid_json)?;
            Ok(SlackEvent::FileShared(FileSharedEvent {
                file_id: raw.file_id.ok_or_else(|| missing("file_shared", "file_id"))?,
                channel_id: raw.channel_id.ok_or_else(|| missing("file_shared", "channel_id"))?,
                user_id: raw.user_id,
                event_ts: raw.event_ts.ok_or_else(|| missing("file_shared", "event_ts"))?,
            }))
        }
        _ => Ok(SlackEvent::Unsupported { event_type: kind.event_type }),
    }
}

fn invalid_json(error: serde_json::Error) -> PayloadError {
    PayloadError::InvalidJson(error.to_string())
}

fn missing(payload_type: &str, field: &'static str) -> PayloadError {
    PayloadError::MissingField { payload_type: payload_type.to_owned(), field }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(OutgoingMessage),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("could not resolve channel `{channel_id}`: {reason}")]
    ChannelLookup { channel_id: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn default_dispatcher(
    agent: Arc<dyn AgentClient>,
    web: Arc<dyn SlackWebApi>,
    allowed_channel: &str,
) -> EventDispatcher {
    let filter = Arc::new(ChannelFilter::new(allowed_channel, web.clone()));
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(agent, filter.clone()));
    dispatcher.register(FileSharedHandler::new(web, filter));
    dispatcher
}

/// Admits events from one channel, named either by id or by name.
pub struct ChannelFilter {
    allowed: String,
    web: Arc<dyn SlackWebApi>,
    names: RwLock<HashMap<String, String>>,
}

impl ChannelFilter {
    pub fn new(allowed: &str, web: Arc<dyn SlackWebApi>) -> Self {
        Self {
            allowed: allowed.trim().trim_start_matches('#').to_owned(),
            web,
            names: RwLock::default(),
        }
    }

    pub async fn allows(&self, channel_id: &str) -> Result<bool, EventHandlerError> {
        if channel_id == self.allowed {
            return Ok(true);
        }
        Ok(self.channel_name(channel_id).await? == self.allowed)
    }

    async fn channel_name(&self, channel_id: &str) -> Result<String, EventHandlerError> {
        if let Some(name) = self.names.read().await.get(channel_id) {
            return Ok(name.clone());
        }

        let info = self.web.conversation_info(channel_id).await.map_err(|error| {
            EventHandlerError::ChannelLookup {
                channel_id: channel_id.to_owned(),
                reason: error.to_string(),
            }
        })?;
        let name = if info.name_normalized.is_empty() { info.name } else { info.name_normalized };
        self.names.write().await.insert(channel_id.to_owned(), name.clone());
        Ok(name)
    }
}

pub struct MessageHandler {
    agent: Arc<dyn AgentClient>,
    filter: Arc<ChannelFilter>,
}

impl MessageHandler {
    pub fn new(agent: Arc<dyn AgentClient>, filter: Arc<ChannelFilter>) -> Self {
        Self { agent, filter }
    }
}

#[async_trait]
impl EventHandler for MessageHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        // Edits, joins and the bot's own replies all arrive as messages.
        if event.bot_id.is_some() || event.subtype.is_some() || event.text.trim().is_empty() {
            return Ok(HandlerResult::Ignored);
        }
        if !self.filter.allows(&event.channel_id).await? {
            debug!(
                event_name = "slack.message.outside_channel",
                correlation_id = %ctx.correlation_id,
                channel_id = %event.channel_id,
                "ignoring message from another channel"
            );
            return Ok(HandlerResult::Ignored);
        }

        info!(
            event_name = "slack.message.forwarded",
            correlation_id = %ctx.correlation_id,
            channel_id = %event.channel_id,
            "forwarding message to agent"
        );
        let text = match self.agent.invoke(&event.text, &ctx.correlation_id).await {
            Ok(reply) => markdown_to_mrkdwn(&reply),
            Err(error) => {
                warn!(
                    event_name = "slack.message.agent_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "agent call failed"
                );
                agent_failure_text(&error)
            }
        };

        Ok(HandlerResult::Responded(OutgoingMessage {
            channel: event.channel_id.clone(),
            thread_ts: Some(event.reply_thread_ts().to_owned()),
            text,
        }))
    }
}

fn agent_failure_text(error: &AgentClientError) -> String {
    match error {
        AgentClientError::Rejected(message)
        | AgentClientError::Status { status: 400, message } => format!(":warning: {message}"),
        _ => AGENT_FAILURE_REPLY.to_owned(),
    }
}

pub struct FileSharedHandler {
    web: Arc<dyn SlackWebApi>,
    filter: Arc<ChannelFilter>,
}

impl FileSharedHandler {
    pub fn new(web: Arc<dyn SlackWebApi>, filter: Arc<ChannelFilter>) -> Self {
        Self { web, filter }
    }
}

#[async_trait]
impl EventHandler for FileSharedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::FileShared
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::FileShared(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if !self.filter.allows(&event.channel_id).await? {
            return Ok(HandlerResult::Ignored);
        }

        let text = match self.web.file_info(&event.file_id).await {
            Ok(file) => file_details(&file, event.user_id.as_deref()),
            Err(error) => {
                warn!(
                    event_name = "slack.file_shared.lookup_failed",
                    correlation_id = %ctx.correlation_id,
                    file_id = %event.file_id,
                    error = %error,
                    "files.info failed"
                );
                format!(":warning: Error retrieving file information: {error}")
            }
        };

        Ok(HandlerResult::Responded(OutgoingMessage {
            channel: event.channel_id.clone(),
            thread_ts: Some(event.event_ts.clone()),
            text,
        }))
    }
}

pub fn file_details(file: &FileInfo, sharer: Option<&str>) -> String {
    let uploader = file.user.as_deref().or(sharer).unwrap_or("unknown");
    format!(
        "📎 File details:\n• Name: {}\n• Type: {}\n• Size: {:.1} KB\n• Uploaded by: <@{uploader}>\n",
        file.name.as_deref().unwrap_or("unknown"),
        file.filetype.as_deref().unwrap_or("unknown"),
        file.size as f64 / 1024.0,
    )
}
