pub mod config_cmd;
pub mod delete;
pub mod history;
pub mod prompt;
pub mod render;
pub mod run;

use sidecar_config::AppConfig;
use sidecar_providers::ProviderRouter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The config file in use: the explicit one, or `~/.sidecar/config.toml`.
pub fn config_file(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// A router with no providers, for commands that never call a model.
pub fn offline_router(config: &AppConfig) -> Arc<ProviderRouter> {
    Arc::new(ProviderRouter::new(
        &config.default_provider,
        &config.default_model,
    ))
}
