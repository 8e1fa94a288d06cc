//! AI provider implementations for Sidecar.
//!
//! All providers implement the `sidecar_core::Provider` trait.
//! The router selects the provider and model for each add-on.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
