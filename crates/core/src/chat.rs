//! Chat transcript types supplied by the host.
//!
//! A `ChatMessage`'s `mes` field is the raw transcript text. It is both what
//! the user reads and the substrate that persisted add-on results are
//! embedded into, so the engine only ever appends to or patches it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host message identifier. Hosts use either strings or numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

/// A single message in the host's chat log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    /// Raw transcript text
    #[serde(default)]
    pub mes: String,

    #[serde(default)]
    pub is_user: bool,

    /// Sender display name
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_date: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(name: impl Into<String>, mes: impl Into<String>) -> Self {
        Self {
            id: None,
            mes: mes.into(),
            is_user: true,
            name: name.into(),
            send_date: Some(Utc::now()),
        }
    }

    /// Create a character (AI) message.
    pub fn character(name: impl Into<String>, mes: impl Into<String>) -> Self {
        Self {
            id: None,
            mes: mes.into(),
            is_user: false,
            name: name.into(),
            send_date: Some(Utc::now()),
        }
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_send_date(mut self, date: DateTime<Utc>) -> Self {
        self.send_date = Some(date);
        self
    }

    /// Whether the message carries any non-whitespace text.
    pub fn has_text(&self) -> bool {
        !self.mes.trim().is_empty()
    }

    /// Stable key used to correlate this message with injected UI.
    ///
    /// Falls back to the message's position when the host assigned no id.
    pub fn key(&self, index: usize) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => format!("msg_{index}"),
        }
    }
}

/// The ordered chat log.
pub type ChatLog = Vec<ChatMessage>;

/// Index of the message whose [`ChatMessage::key`] equals `key`.
pub fn position_of_key(chat: &[ChatMessage], key: &str) -> Option<usize> {
    chat.iter()
        .enumerate()
        .position(|(index, message)| message.key(index) == key)
}

/// Character card fields the prompt context may include.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_mes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mes_example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// User persona card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// World info (lorebook) data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<serde_json::Value>,
}
