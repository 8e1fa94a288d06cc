//! `sidecar prompt` — Print the prompts add-ons would send, without sending them.

use sidecar::JsonChatFile;
use sidecar_context::ContextBuilder;
use sidecar_core::Addon;
use sidecar_core::error::HostError;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    chat: &Path,
    addon_ids: Vec<String>,
    batch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let chat = JsonChatFile::new(chat).load().await?;

    let addons: Vec<Addon> = if addon_ids.is_empty() {
        config.addons.into_iter().filter(|a| a.enabled).collect()
    } else {
        addon_ids
            .iter()
            .map(|id| {
                config
                    .addons
                    .iter()
                    .find(|a| &a.id == id)
                    .cloned()
                    .ok_or_else(|| HostError::AddonNotFound(id.clone()))
            })
            .collect::<Result<_, _>>()?
    };

    if addons.is_empty() {
        println!("  No enabled add-ons.");
        return Ok(());
    }

    let builder = ContextBuilder::new();
    let contexts: Vec<_> = addons
        .iter()
        .map(|addon| builder.build_context(addon, &chat, None, None, None))
        .collect();

    if batch {
        println!("{}", builder.build_batch_prompt(&addons, &contexts));
        return Ok(());
    }

    for (addon, context) in addons.iter().zip(&contexts) {
        println!("── {} ({}) ──", addon.name, addon.id);
        println!("{}", builder.build_prompt(addon, context));
        println!();
    }

    Ok(())
}
