//! Context builder — turns chat state into add-on prompts.
//!
//! Assembles five context fields from the host's chat data and substitutes
//! them into an add-on's prompt template:
//!
//! | Token | Source |
//! |-------|--------|
//! | `{{lastMessages}}` | trailing N non-empty messages, one per line |
//! | `{{charCard}}` | character card (if the add-on includes it) |
//! | `{{userCard}}` | user persona (if the add-on includes it) |
//! | `{{worldCard}}` | world info (if the add-on includes it) |
//! | `{{currentMessage}}` | most recent AI message text |
//!
//! # Determinism
//!
//! Building is a pure transform: identical inputs always produce identical
//! prompts. No I/O, no clock.

use serde::{Deserialize, Serialize};
use sidecar_core::addon::Addon;
use sidecar_core::chat::{CharacterCard, ChatMessage, UserCard, WorldInfo};
use tracing::trace;

// ── Types ─────────────────────────────────────────────────────────────────

/// Placeholder used when there are no messages to show.
pub const NO_MESSAGES: &str = "No previous messages.";
const NO_CHAR_DATA: &str = "No character card data available.";
const NO_USER_DATA: &str = "No user card data available.";
const NO_WORLD_DATA: &str = "No world card data available.";

/// Delimiter between add-on sections in a combined prompt.
pub const BATCH_DELIMITER: &str = "\n\n---\n\n";

/// The per-add-on context, consumed once to build a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltContext {
    pub last_messages: String,
    pub char_card: String,
    pub user_card: String,
    pub world_card: String,
    pub current_message: String,
}

// ── Builder ───────────────────────────────────────────────────────────────

/// The context builder. Stateless; create one and reuse it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the context an add-on's prompt will see.
    pub fn build_context(
        &self,
        addon: &Addon,
        chat_log: &[ChatMessage],
        char_data: Option<&CharacterCard>,
        user_data: Option<&UserCard>,
        world_data: Option<&WorldInfo>,
    ) -> BuiltContext {
        let settings = &addon.context_settings;
        let count = if settings.messages_count == 0 {
            10
        } else {
            settings.messages_count
        };
        let last = Self::get_last_messages(chat_log, count);
        trace!(addon_id = %addon.id, messages = last.len(), "Building context");

        BuiltContext {
            last_messages: Self::format_messages(&last),
            char_card: if settings.include_char_card {
                Self::format_char_card(char_data)
            } else {
                String::new()
            },
            user_card: if settings.include_user_card {
                Self::format_user_card(user_data)
            } else {
                String::new()
            },
            world_card: if settings.include_world_card {
                Self::format_world_card(world_data)
            } else {
                String::new()
            },
            current_message: Self::get_current_message(chat_log),
        }
    }

    /// Substitute context fields into the add-on's prompt template.
    ///
    /// Unknown `{{tokens}}` are left verbatim.
    pub fn build_prompt(&self, addon: &Addon, context: &BuiltContext) -> String {
        addon
            .prompt
            .replace("{{lastMessages}}", &context.last_messages)
            .replace("{{charCard}}", &context.char_card)
            .replace("{{userCard}}", &context.user_card)
            .replace("{{worldCard}}", &context.world_card)
            .replace("{{currentMessage}}", &context.current_message)
    }

    /// Combine several add-on prompts into one request.
    ///
    /// Add-ons and contexts are paired positionally; extras on either side
    /// are ignored.
    pub fn build_batch_prompt(&self, addons: &[Addon], contexts: &[BuiltContext]) -> String {
        addons
            .iter()
            .zip(contexts)
            .map(|(addon, ctx)| format!("=== {} ===\n{}", addon.name, self.build_prompt(addon, ctx)))
            .collect::<Vec<_>>()
            .join(BATCH_DELIMITER)
    }

    /// The trailing `count` messages that carry text, in chat order.
    pub fn get_last_messages(chat_log: &[ChatMessage], count: usize) -> Vec<&ChatMessage> {
        let with_text: Vec<&ChatMessage> = chat_log.iter().filter(|m| m.has_text()).collect();
        let skip = with_text.len().saturating_sub(count);
        with_text.into_iter().skip(skip).collect()
    }

    /// Render messages as `[Role] Name: text` lines.
    pub fn format_messages(messages: &[&ChatMessage]) -> String {
        if messages.is_empty() {
            return NO_MESSAGES.to_string();
        }

        messages
            .iter()
            .map(|m| {
                let role = if m.is_user { "User" } else { "Character" };
                let name = if m.name.is_empty() { "Unknown" } else { &m.name };
                format!("[{role}] {name}: {}", m.mes)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Text of the most recent AI message, or `""` if there is none.
    pub fn get_current_message(chat_log: &[ChatMessage]) -> String {
        chat_log
            .iter()
            .rev()
            .find(|m| !m.is_user && !m.mes.is_empty())
            .map(|m| m.mes.clone())
            .unwrap_or_default()
    }

    pub fn format_char_card(card: Option<&CharacterCard>) -> String {
        let Some(card) = card else {
            return String::new();
        };
        render_fields(
            &[
                ("Name", card.name.as_deref()),
                ("Description", card.description.as_deref()),
                ("Personality", card.personality.as_deref()),
                ("Scenario", card.scenario.as_deref()),
                ("First Message", card.first_mes.as_deref()),
                ("Message Example", card.mes_example.as_deref()),
                ("System", card.system.as_deref()),
            ],
            NO_CHAR_DATA,
        )
    }

    pub fn format_user_card(card: Option<&UserCard>) -> String {
        let Some(card) = card else {
            return String::new();
        };
        render_fields(
            &[
                ("Name", card.name.as_deref()),
                ("Description", card.description.as_deref()),
                ("Avatar", card.avatar.as_deref()),
            ],
            NO_USER_DATA,
        )
    }

    pub fn format_world_card(world: Option<&WorldInfo>) -> String {
        let Some(world) = world else {
            return String::new();
        };
        let entries = world
            .entries
            .as_ref()
            .filter(|v| !v.is_null())
            .map(|v| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()));
        render_fields(
            &[
                ("World Name", world.name.as_deref()),
                ("Description", world.description.as_deref()),
                ("Entries", entries.as_deref()),
            ],
            NO_WORLD_DATA,
        )
    }
}

/// `Label: value` lines for the present, non-empty fields.
fn render_fields(fields: &[(&str, Option<&str>)], placeholder: &str) -> String {
    let lines: Vec<String> = fields
        .iter()
        .filter_map(|(label, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| format!("{label}: {v}"))
        })
        .collect();

    if lines.is_empty() {
        placeholder.to_string()
    } else {
        lines.join("\n")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
