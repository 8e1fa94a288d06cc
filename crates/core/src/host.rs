//! Host seam: what the engine needs from the chat application.
//!
//! The host hands over one normalized [`HostContext`]: the live chat log, the
//! cards the prompt context may include, and a hook to persist the chat after
//! the engine patched a message.

use crate::chat::{CharacterCard, ChatLog, UserCard, WorldInfo};
use crate::error::HostError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The host-owned chat log, shared with the engine.
///
/// Every write to a message's `mes` happens under the write lock against the
/// live message, never against a copy taken earlier.
pub type SharedChat = Arc<RwLock<ChatLog>>;

/// The host's chat-save hook.
#[async_trait]
pub trait ChatPersistence: Send + Sync {
    async fn save_chat(&self, chat: &ChatLog) -> Result<(), HostError>;
}

/// A persistence hook that saves nothing. Useful for tests and dry runs.
pub struct NoopPersistence;

#[async_trait]
impl ChatPersistence for NoopPersistence {
    async fn save_chat(&self, _chat: &ChatLog) -> Result<(), HostError> {
        Ok(())
    }
}

/// Everything the engine reads from the host.
#[derive(Clone)]
pub struct HostContext {
    pub chat: SharedChat,
    pub character: Option<CharacterCard>,
    pub user: Option<UserCard>,
    pub world: Option<WorldInfo>,
    pub persistence: Arc<dyn ChatPersistence>,
}

impl HostContext {
    /// Create a context around a chat log with no cards and a no-op save hook.
    pub fn new(chat: ChatLog) -> Self {
        Self {
            chat: Arc::new(RwLock::new(chat)),
            character: None,
            user: None,
            world: None,
            persistence: Arc::new(NoopPersistence),
        }
    }

    pub fn with_character(mut self, card: CharacterCard) -> Self {
        self.character = Some(card);
        self
    }

    pub fn with_user(mut self, card: UserCard) -> Self {
        self.user = Some(card);
        self
    }

    pub fn with_world(mut self, world: WorldInfo) -> Self {
        self.world = Some(world);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn ChatPersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    /// Persist the current chat through the host hook.
    pub async fn save_chat(&self) -> Result<(), HostError> {
        let chat = self.chat.read().await;
        self.persistence.save_chat(&chat).await
    }
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostContext")
            .field("character", &self.character.is_some())
            .field("user", &self.user.is_some())
            .field("world", &self.world.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPersistence(AtomicUsize);

    #[async_trait]
    impl ChatPersistence for CountingPersistence {
        async fn save_chat(&self, _chat: &ChatLog) -> Result<(), HostError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn save_chat_goes_through_hook() {
        let counter = Arc::new(CountingPersistence(AtomicUsize::new(0)));
        let host = HostContext::new(vec![ChatMessage::user("U", "hi")])
            .with_persistence(counter.clone());
        host.save_chat().await.unwrap();
        host.save_chat().await.unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
