//! Output safety for Sidecar — sanitizing model responses and escaping
//! engine-generated text before either reaches the host's markup.
//!
//! Provides:
//! - **Sanitization**: ordered rewrite rules that keep AI-generated HTML from
//!   escaping its result container or running code
//! - **Escaping**: plain-text to HTML escaping for names and error messages

pub mod escape;
pub mod sanitize;

pub use escape::escape_html;
pub use sanitize::{sanitize_content, sanitize_with_report};
