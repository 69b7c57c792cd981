//! Slack integration for the triage agent.
//!
//! Slack delivers Events API requests over HTTP. The listener checks the
//! request signature, drops redeliveries and routes `message` and
//! `file_shared` events to their handlers, which answer in a thread.
//!
//! ```text
//! Events API → SlackListener::accept → (ack) → SlackListener::process
//!                                                 ↓
//!                       EventDispatcher → MessageHandler → AgentClient
//!                                     ↘ FileSharedHandler → files.info
//! ```
//!
//! - `signature` - `v0` request signing
//! - `events` - payload parsing, dispatcher and handlers
//! - `listener` - verification, redelivery guard and reply posting
//! - `agent_client` - `/invoke` over HTTP or the graph in process
//! - `web` - the Web API methods the handlers call
//! - `mrkdwn` - Markdown to Slack formatting

pub mod agent_client;
pub mod events;
pub mod listener;
pub mod mrkdwn;
pub mod signature;
pub mod web;

pub use agent_client::{AgentClient, AgentClientError, HttpAgentClient, LocalAgentClient};
pub use events::{default_dispatcher, EventDispatcher, HandlerResult, SlackEnvelope, SlackEvent};
pub use listener::{ListenerError, ListenerResponse, RequestHeaders, SlackListener};
pub use mrkdwn::markdown_to_mrkdwn;
pub use signature::SignatureVerifier;
pub use web::{HttpSlackWebApi, OutgoingMessage, SlackApiError, SlackWebApi};
