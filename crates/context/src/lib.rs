//! Prompt context assembly for Sidecar add-ons.
//!
//! Gathers the recent conversation and the character, user and world cards
//! an add-on asked for, then fills them into the add-on's prompt template.

pub mod builder;

pub use builder::{BATCH_DELIMITER, BuiltContext, ContextBuilder, NO_MESSAGES};
