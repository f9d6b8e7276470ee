//! Webhook transport for the assistant's REST channel
//!
//! One POST per turn. The reply is a JSON array of entries carrying any mix
//! of `text`, `image` and `custom`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::attachment::Attachment;
use crate::config::Config;
use crate::error::{AssistantError, Result};
use crate::lang::Lang;
use crate::session::SessionId;

/// Request body for one turn
#[derive(Debug, Clone, Serialize)]
pub struct OutboundTurn {
    pub sender: SessionId,
    pub message: String,
    pub metadata: TurnMetadata,
}

/// Side-channel data the backend reads alongside the utterance
#[derive(Debug, Clone, Serialize)]
pub struct TurnMetadata {
    pub lang: Lang,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

/// One unit of backend output
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplyEntry {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub custom: Option<Value>,
}

impl ReplyEntry {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Anything that can carry a turn to the assistant and bring back its reply
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    async fn send(&self, turn: &OutboundTurn, timeout: Duration) -> Result<Vec<ReplyEntry>>;
}

#[derive(Clone)]
pub struct WebhookClient {
    client: Client,
    url: Url,
}

impl WebhookClient {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(config.webhook_url()?))
    }

    /// Scheme, host and port only; the query may hold the auth token
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.url.origin().ascii_serialization(), self.url.path())
    }

    async fn post(&self, turn: &OutboundTurn) -> Result<Vec<ReplyEntry>> {
        let response = self
            .client
            .post(self.url.clone())
            .json(turn)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::Backend {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| AssistantError::Transport(format!("invalid reply body: {}", e)))
    }
}

#[async_trait]
impl ConversationTransport for WebhookClient {
    async fn send(&self, turn: &OutboundTurn, timeout: Duration) -> Result<Vec<ReplyEntry>> {
        debug!(
            endpoint = %self.endpoint(),
            sender = %turn.sender.short(),
            attachment = turn.metadata.attachment.is_some(),
            "posting turn"
        );

        // Dropping the request future on expiry cancels the call
        let result = match tokio::time::timeout(timeout, self.post(turn)).await {
            Ok(result) => result,
            Err(_) => Err(AssistantError::Timeout(timeout)),
        };

        match &result {
            Ok(entries) => debug!(entries = entries.len(), "assistant replied"),
            Err(e) => warn!(error = %e, "webhook call failed"),
        }
        result
    }
}
