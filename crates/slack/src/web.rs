use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("slack api `{method}` unreachable: {reason}")]
    Transport { method: &'static str, reason: String },
    #[error("slack api `{method}` returned error `{error}`")]
    Api { method: &'static str, error: String },
    #[error("slack api `{method}` returned an unreadable response: {reason}")]
    Decode { method: &'static str, reason: String },
}

impl SlackApiError {
    /// Slack's short error code (`channel_not_found`, `not_in_channel`, ...).
    pub fn code(&self) -> &str {
        match self {
            Self::Api { error, .. } => error,
            Self::Transport { .. } => "transport_error",
            Self::Decode { .. } => "invalid_response",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub name_normalized: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FileInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filetype: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub user: Option<String>,
}

#[async_trait]
pub trait SlackWebApi: Send + Sync {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), SlackApiError>;
    async fn conversation_info(&self, channel_id: &str) -> Result<ChannelInfo, SlackApiError>;
    async fn file_info(&self, file_id: &str) -> Result<FileInfo, SlackApiError>;
}

pub struct HttpSlackWebApi {
    client: Client,
    base_url: String,
    bot_token: SecretString,
}

impl HttpSlackWebApi {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let client = Client::builder().timeout(timeout).build().map_err(|error| {
            SlackApiError::Transport { method: "client.build", reason: error.to_string() }
        })?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_owned(), bot_token })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call<T>(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .bearer_auth(self.bot_token.expose_secret())
            .send()
            .await
            .map_err(|error| SlackApiError::Transport { method, reason: error.to_string() })?;

        let envelope = response
            .json::<Value>()
            .await
            .map_err(|error| SlackApiError::Decode { method, reason: error.to_string() })?;

        if !envelope.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let error =
                envelope.get("error").and_then(Value::as_str).unwrap_or("unknown_error").to_owned();
            return Err(SlackApiError::Api { method, error });
        }

        debug!(event_name = "slack.api.ok", method, "slack api call succeeded");
        serde_json::from_value(envelope)
            .map_err(|error| SlackApiError::Decode { method, reason: error.to_string() })
    }
}

#[derive(Deserialize)]
struct ChannelEnvelope {
    channel: ChannelInfo,
}

#[derive(Deserialize)]
struct FileEnvelope {
    file: FileInfo,
}

#[derive(Deserialize)]
struct Acknowledged {}

#[async_trait]
impl SlackWebApi for HttpSlackWebApi {
    async fn post_message(&self, message: &OutgoingMessage) -> Result<(), SlackApiError> {
        let request = self
            .client
            .post(self.url("chat.postMessage"))
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .json(message);
        self.call::<Acknowledged>("chat.postMessage", request).await.map(|_| ())
    }

    async fn conversation_info(&self, channel_id: &str) -> Result<ChannelInfo, SlackApiError> {
        let request =
            self.client.get(self.url("conversations.info")).query(&[("channel", channel_id)]);
        self.call::<ChannelEnvelope>("conversations.info", request)
            .await
            .map(|envelope| envelope.channel)
    }

    async fn file_info(&self, file_id: &str) -> Result<FileInfo, SlackApiError> {
        let request = self.client.get(self.url("files.info")).query(&[("file", file_id)]);
        self.call::<FileEnvelope>("files.info", request).await.map(|envelope| envelope.file)
    }
}
