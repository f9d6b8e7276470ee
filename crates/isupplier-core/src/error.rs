//! Error taxonomy for the assistant core

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the core components.
///
/// Transport variants never reach the user as-is: the turn controller turns
/// them into a single localized notice. Storage and capability failures
/// degrade the feature instead of failing the application.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// The webhook call exceeded its time bound and was cancelled
    #[error("assistant did not reply within {0:?}")]
    Timeout(Duration),

    /// The webhook answered with a non-success status
    #[error("assistant backend returned status {status}")]
    Backend { status: u16 },

    /// Connection-level failure or an unreadable reply body
    #[error("transport error: {0}")]
    Transport(String),

    /// Voice capture is not available in this environment
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// Persistent storage could not be read or written
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A user-selected file could not be read
    #[error("could not read attachment: {0}")]
    Attachment(String),
}

impl AssistantError {
    /// True for errors produced by the webhook transport
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Backend { .. } | Self::Transport(_)
        )
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Backend {
                status: status.as_u16(),
            };
        }
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AssistantError>;
