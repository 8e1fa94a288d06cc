//! Error types for the Sidecar domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Sidecar operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Host errors ---
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    // --- Transcript storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Empty response from model")]
    EmptyResponse,
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Chat load failed: {0}")]
    LoadFailed(String),

    #[error("Chat save failed: {0}")]
    SaveFailed(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("No AI message available")]
    NoAiMessage,

    #[error("Add-on not found: {0}")]
    AddonNotFound(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Stored result for '{addon_id}' is not valid base64: {reason}")]
    InvalidEncoding { addon_id: String, reason: String },

    #[error("Stored result for '{addon_id}' is not valid UTF-8")]
    InvalidUtf8 { addon_id: String },

    #[error("Add-on id '{addon_id}' cannot be embedded in a storage marker")]
    UnembeddableAddonId { addon_id: String },
}
