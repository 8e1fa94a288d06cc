//! Add-on configuration types.
//!
//! An add-on is a user-defined prompt template plus the settings that decide
//! which context it sees, which model runs it, and how its result is shown.
//! Keys are camelCase so settings exported by the original extension load
//! unchanged.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// How a result is wrapped when it is spliced into the chat transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// Plain text after a blank line
    Append,
    /// Horizontal-rule delimited block titled with the add-on name
    Separate,
    /// `<details>` disclosure block titled with the add-on name
    #[default]
    Collapsible,
}

/// Where a result is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseLocation {
    /// Spliced into the AI message's rendered content
    ChatHistory,
    /// Rendered in a per-message results panel
    #[default]
    OutsideChatlog,
}

/// When an add-on runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    /// Runs on every new AI message
    #[default]
    Auto,
    /// Runs only on explicit trigger
    Manual,
}

/// Which parts of the chat an add-on's prompt may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSettings {
    #[serde(default = "default_messages_count")]
    pub messages_count: usize,
    #[serde(default)]
    pub include_char_card: bool,
    #[serde(default)]
    pub include_user_card: bool,
    #[serde(default)]
    pub include_world_card: bool,
}

fn default_messages_count() -> usize {
    10
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            messages_count: default_messages_count(),
            include_char_card: false,
            include_user_card: false,
            include_world_card: false,
        }
    }
}

/// A single add-on definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    /// Unique, stable identifier (used in transcript markers)
    pub id: String,

    /// Display name
    pub name: String,

    /// Prompt template with `{{token}}` placeholders
    #[serde(default)]
    pub prompt: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub result_format: ResultFormat,

    #[serde(default)]
    pub response_location: ResponseLocation,

    #[serde(default)]
    pub context_settings: ContextSettings,

    #[serde(default)]
    pub trigger_mode: TriggerMode,

    /// Provider override (falls back to the configured default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model override (falls back to the configured default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Addon {
    /// Create an enabled add-on with default settings.
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt: prompt.into(),
            enabled: true,
            result_format: ResultFormat::default(),
            response_location: ResponseLocation::default(),
            context_settings: ContextSettings::default(),
            trigger_mode: TriggerMode::default(),
            provider: None,
            model: None,
        }
    }

    pub fn with_format(mut self, format: ResultFormat) -> Self {
        self.result_format = format;
        self
    }

    pub fn with_location(mut self, location: ResponseLocation) -> Self {
        self.response_location = location;
        self
    }

    pub fn with_context(mut self, settings: ContextSettings) -> Self {
        self.context_settings = settings;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this add-on should run for an automatic (event-driven) trigger.
    pub fn runs_automatically(&self) -> bool {
        self.enabled && self.trigger_mode == TriggerMode::Auto
    }
}

/// Source of add-on definitions (the add-on manager).
pub trait AddonSource: Send + Sync {
    fn all_addons(&self) -> Vec<Addon>;

    fn addon(&self, id: &str) -> Option<Addon> {
        self.all_addons().into_iter().find(|a| a.id == id)
    }
}

/// In-memory add-on registry, typically seeded from configuration.
#[derive(Debug, Default)]
pub struct AddonRegistry {
    addons: RwLock<Vec<Addon>>,
}

impl AddonRegistry {
    pub fn new(addons: Vec<Addon>) -> Self {
        Self {
            addons: RwLock::new(addons),
        }
    }

    /// Insert an add-on, replacing any existing one with the same id.
    pub fn upsert(&self, addon: Addon) {
        let mut addons = self.addons.write().unwrap_or_else(|e| e.into_inner());
        match addons.iter_mut().find(|a| a.id == addon.id) {
            Some(existing) => *existing = addon,
            None => addons.push(addon),
        }
    }

    /// Remove an add-on. Returns true if it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut addons = self.addons.write().unwrap_or_else(|e| e.into_inner());
        let before = addons.len();
        addons.retain(|a| a.id != id);
        addons.len() < before
    }

    pub fn len(&self) -> usize {
        self.addons.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AddonSource for AddonRegistry {
    fn all_addons(&self) -> Vec<Addon> {
        self.addons
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addon_defaults_from_minimal_json() {
        let addon: Addon =
            serde_json::from_str(r#"{"id":"sum","name":"Summary","prompt":"x"}"#).unwrap();
        assert!(addon.enabled);
        assert_eq!(addon.result_format, ResultFormat::Collapsible);
        assert_eq!(addon.response_location, ResponseLocation::OutsideChatlog);
        assert_eq!(addon.context_settings.messages_count, 10);
        assert_eq!(addon.trigger_mode, TriggerMode::Auto);
    }

    #[test]
    fn addon_parses_original_settings_keys() {
        let json = r#"{
            "id": "mood",
            "name": "Mood",
            "prompt": "{{currentMessage}}",
            "enabled": false,
            "resultFormat": "separate",
            "responseLocation": "chatHistory",
            "contextSettings": { "messagesCount": 3, "includeCharCard": true }
        }"#;
        let addon: Addon = serde_json::from_str(json).unwrap();
        assert!(!addon.enabled);
        assert_eq!(addon.result_format, ResultFormat::Separate);
        assert_eq!(addon.response_location, ResponseLocation::ChatHistory);
        assert_eq!(addon.context_settings.messages_count, 3);
        assert!(addon.context_settings.include_char_card);
        assert!(!addon.context_settings.include_user_card);
    }

    #[test]
    fn manual_addons_do_not_run_automatically() {
        let mut addon = Addon::new("a", "A", "");
        assert!(addon.runs_automatically());
        addon.trigger_mode = TriggerMode::Manual;
        assert!(!addon.runs_automatically());
        assert!(!Addon::new("b", "B", "").disabled().runs_automatically());
    }

    #[test]
    fn registry_upsert_replaces_by_id() {
        let registry = AddonRegistry::new(vec![Addon::new("a", "First", "")]);
        registry.upsert(Addon::new("a", "Renamed", ""));
        registry.upsert(Addon::new("b", "Second", ""));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.addon("a").unwrap().name, "Renamed");
        assert!(registry.remove("b"));
        assert!(!registry.remove("b"));
    }
}
