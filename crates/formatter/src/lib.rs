//! # Sidecar Formatter
//!
//! Everything that happens to an add-on result after the model answers:
//!
//! - **Formatting**: sanitize and wrap the response for the transcript or
//!   the results panel ([`format_result`])
//! - **Persistence**: Base64 HTML-comment markers inside the message text, so
//!   results survive a chat save and reload ([`store`])
//! - **History**: every stored result of one add-on across a chat
//! - **Presentation**: loading and error indicators, result panels, edit,
//!   copy and delete, all through the [`Dom`] seam ([`ResultFormatter`])
//! - **Restoration**: rebuilding the rendered results from markers after a
//!   chat is loaded
//!
//! The transcript is the source of truth. The document is a projection of it
//! and can always be rebuilt with
//! [`ResultFormatter::restore_blocks_from_metadata`].

pub mod dom;
pub mod format;
pub mod history;
pub mod locator;
pub mod present;
pub mod restore;
pub mod store;

pub use dom::{Dom, MemoryDom, NodeId};
pub use format::format_result;
pub use history::{StoredResult, get_all_results_for_addon};
pub use locator::MessageCache;
pub use present::{EditSession, ResultFormatter, RetryTarget};
pub use store::{
    delete_result_from_metadata, save_result_to_metadata, update_result_in_metadata,
};
