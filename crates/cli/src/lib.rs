//! Library half of the `sidecar` binary.
//!
//! The binary treats a JSON transcript file as its host: the chat log is read
//! from the file, results are written back into it, and the document is an
//! in-memory [`MemoryDom`](sidecar_formatter::MemoryDom) rendered from it.

pub mod chat_file;
pub mod session;

pub use chat_file::JsonChatFile;
pub use session::Session;
