//! Chat transcripts stored as a JSON array of messages.

use async_trait::async_trait;
use sidecar_core::error::HostError;
use sidecar_core::{ChatLog, ChatPersistence};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A chat transcript file. Saving rewrites the whole file.
#[derive(Debug, Clone)]
pub struct JsonChatFile {
    path: PathBuf,
}

impl JsonChatFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the transcript. A missing file is an error, an empty array is not.
    pub async fn load(&self) -> Result<ChatLog, HostError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            HostError::LoadFailed(format!("{}: {e}", self.path.display()))
        })?;

        let chat: ChatLog = serde_json::from_str(&content).map_err(|e| {
            HostError::LoadFailed(format!("{} is not a chat transcript: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), messages = chat.len(), "Loaded chat");
        Ok(chat)
    }
}

#[async_trait]
impl ChatPersistence for JsonChatFile {
    async fn save_chat(&self, chat: &ChatLog) -> Result<(), HostError> {
        let json = serde_json::to_string_pretty(chat)
            .map_err(|e| HostError::SaveFailed(format!("Failed to serialize chat: {e}")))?;

        // Staged write, then rename over the target
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| HostError::SaveFailed(format!("{}: {e}", staging.display())))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| HostError::SaveFailed(format!("{}: {e}", self.path.display())))?;

        debug!(path = %self.path.display(), messages = chat.len(), "Saved chat");
        Ok(())
    }
}
