//! Wiring one chat file into a ready event handler.

use crate::chat_file::JsonChatFile;
use chrono::Utc;
use sidecar_config::AppConfig;
use sidecar_core::error::HostError;
use sidecar_core::{Addon, AddonRegistry, ChatLog, HostContext, HostEvent};
use sidecar_formatter::{MemoryDom, ResultFormatter};
use sidecar_providers::ProviderRouter;
use sidecar_runtime::EventHandler;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A chat file opened as a host, with the full add-on pipeline behind it.
pub struct Session {
    addons: Vec<Addon>,
    handler: EventHandler<MemoryDom>,
}

impl Session {
    /// Load `chat_path` and build the pipeline from `config` and `router`.
    pub async fn open(
        config: &AppConfig,
        chat_path: &Path,
        router: Arc<ProviderRouter>,
    ) -> Result<Self, HostError> {
        let file = Arc::new(JsonChatFile::new(chat_path));
        let chat = file.load().await?;

        // The document is complete as soon as it is built
        let mut ui = config.ui.clone();
        ui.indicator_retry_ms = 0;
        ui.restore_settle_ms = 0;

        let dom = Arc::new(Mutex::new(MemoryDom::from_chat(&chat)));
        let formatter = Arc::new(ResultFormatter::new(dom, ui));
        let host = HostContext::new(chat).with_persistence(file);
        let registry = Arc::new(AddonRegistry::new(config.addons.clone()));

        let handler = EventHandler::new(host, registry, router, formatter).with_config(config);
        Ok(Self {
            addons: config.addons.clone(),
            handler,
        })
    }

    pub fn handler(&self) -> &EventHandler<MemoryDom> {
        &self.handler
    }

    pub fn addons(&self) -> &[Addon] {
        &self.addons
    }

    /// Snapshot of the chat as it is now.
    pub async fn chat(&self) -> ChatLog {
        self.handler.host().chat.read().await.clone()
    }

    /// Restore stored results into the document and serialize it.
    pub async fn render(&self) -> String {
        self.handler
            .handle_event(&HostEvent::ChatLoaded {
                timestamp: Utc::now(),
            })
            .await;
        let dom = self.handler.formatter().dom();
        let html = dom.lock().await.to_html();
        html
    }
}
