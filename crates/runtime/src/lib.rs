//! # Sidecar Runtime
//!
//! The orchestrator between the host and the add-on pipeline. An
//! [`EventHandler`] receives [`HostEvent`](sidecar_core::HostEvent)s and, per
//! applicable add-on, builds the prompt context, calls the resolved provider,
//! persists the raw result into the transcript and projects it into the
//! document.

pub mod handler;

pub use handler::{EventHandler, latest_ai_index};
