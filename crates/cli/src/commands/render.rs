//! `sidecar render` — Print the chat as HTML with stored results restored.

use sidecar::Session;
use std::path::Path;

pub async fn run(config_path: Option<&Path>, chat: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let session = Session::open(&config, chat, super::offline_router(&config)).await?;
    println!("{}", session.render().await);
    Ok(())
}
