use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};

/// A user-selected file, encoded for a single webhook turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "name")]
    pub filename: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "data")]
    pub base64_payload: String,
}

impl Attachment {
    pub fn from_bytes(filename: impl Into<String>, bytes: &[u8]) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            filename,
            mime_type,
            size_bytes: bytes.len() as u64,
            base64_payload: STANDARD.encode(bytes),
        }
    }

    /// Read the whole file into memory and encode it
    pub async fn read(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| AssistantError::Attachment(format!("{} is not a file", path.display())))?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AssistantError::Attachment(format!("{}: {}", path.display(), e)))?;

        Ok(Self::from_bytes(filename, &bytes))
    }
}
