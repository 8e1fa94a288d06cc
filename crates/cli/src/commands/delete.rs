//! `sidecar delete` — Remove an add-on's stored results from a chat file.

use sidecar::Session;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    chat: &Path,
    addon_id: &str,
    message: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let session = Session::open(&config, chat, super::offline_router(&config)).await?;
    let handler = session.handler();

    let indices: Vec<usize> = match message {
        Some(index) => vec![index],
        None => (0..session.chat().await.len()).collect(),
    };

    let mut deleted = 0;
    for index in indices {
        if handler
            .formatter()
            .delete_result(&handler.host().chat, index, addon_id)
            .await
        {
            deleted += 1;
        }
    }

    if deleted == 0 {
        println!("  Nothing to delete for '{addon_id}'.");
        return Ok(());
    }

    handler.host().save_chat().await?;
    println!("  🗑️  Deleted {deleted} result(s) for '{addon_id}' from {}", chat.display());
    Ok(())
}
