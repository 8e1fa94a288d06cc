//! # Sidecar Core
//!
//! Domain types, host seam traits, and error definitions for the Sidecar
//! chat add-on engine. This crate has **no framework dependencies** beyond
//! serialization and async plumbing. Every other crate depends inward on it.
//!
//! Everything the engine needs from its host (the chat log, the chat-save
//! hook, the add-on list, the AI backend) is expressed as a type or trait
//! here. Implementations live in their respective crates or in the host.

pub mod addon;
pub mod chat;
pub mod error;
pub mod event;
pub mod host;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use addon::{
    Addon, AddonRegistry, AddonSource, ContextSettings, ResponseLocation, ResultFormat,
    TriggerMode,
};
pub use chat::{
    CharacterCard, ChatLog, ChatMessage, MessageId, UserCard, WorldInfo, position_of_key,
};
pub use error::{Error, Result};
pub use event::{EventBus, HostEvent};
pub use host::{ChatPersistence, HostContext, NoopPersistence, SharedChat};
pub use provider::{CompletionRequest, CompletionResponse, Provider, Usage};
