//! `sidecar history` — List an add-on's stored results, newest first.

use sidecar::JsonChatFile;
use sidecar_formatter::get_all_results_for_addon;
use std::path::Path;

pub async fn run(chat: &Path, addon_id: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let chat = JsonChatFile::new(chat).load().await?;
    let results = get_all_results_for_addon(&chat, addon_id);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("  No stored results for '{addon_id}'.");
        return Ok(());
    }

    println!("  {} result(s) for '{addon_id}':", results.len());
    println!();
    for result in &results {
        let edited = if result.edited { " (edited)" } else { "" };
        println!(
            "  #{} [{}] {}{edited}",
            result.message_index,
            result.message_id,
            result.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        println!("    on: {}", result.message_preview.replace('\n', " "));
        for line in result.content.lines() {
            println!("    │ {line}");
        }
        println!();
    }

    Ok(())
}
