//! `sidecar run` — Run add-ons against the latest AI message of a chat file.

use sidecar::Session;
use sidecar_core::error::HostError;
use sidecar_providers::build_from_config;
use sidecar_runtime::latest_ai_index;
use std::path::Path;
use std::sync::Arc;

/// Providers that serve without an API key.
const LOCAL_PROVIDERS: &[&str] = &["ollama", "llamacpp", "vllm"];

pub async fn run(
    config_path: Option<&Path>,
    chat: &Path,
    addon_ids: Vec<String>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    if !config.has_api_key() && !LOCAL_PROVIDERS.contains(&config.default_provider.as_str()) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    SIDECAR_API_KEY     = 'sk-...'");
        eprintln!("    OPENROUTER_API_KEY  = 'sk-or-v1-...'");
        eprintln!("    OPENAI_API_KEY      = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", super::config_file(config_path).display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    if let Some(unknown) = addon_ids
        .iter()
        .find(|id| !config.addons.iter().any(|a| &a.id == *id))
    {
        return Err(HostError::AddonNotFound(unknown.clone()).into());
    }

    let router = Arc::new(build_from_config(&config));
    let session = Session::open(&config, chat, router).await?;
    let Some(message_index) = latest_ai_index(&session.chat().await) else {
        return Err(HostError::NoAiMessage.into());
    };

    let handler = session.handler();
    let (attempted, produced) = if all {
        let attempted = session.addons().iter().filter(|a| a.enabled).count();
        (attempted, handler.trigger_addons(&[]).await)
    } else if !addon_ids.is_empty() {
        (addon_ids.len(), handler.trigger_addons(&addon_ids).await)
    } else {
        let attempted = session
            .addons()
            .iter()
            .filter(|a| a.runs_automatically())
            .count();
        (attempted, handler.on_ai_message(message_index).await)
    };

    if attempted == 0 {
        println!("  No add-ons to run. Declare some under [[addons]] in the config.");
        return Ok(());
    }

    println!(
        "  ✅ {produced}/{attempted} add-on result(s) saved to {}",
        chat.display()
    );
    if produced < attempted {
        println!("  ⚠️  {} add-on(s) failed. Run with --verbose for details.", attempted - produced);
    }

    Ok(())
}
