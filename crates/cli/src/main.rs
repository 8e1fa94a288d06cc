//! Sidecar CLI — the main entry point.
//!
//! Commands:
//! - `run`     — Run add-ons against the latest AI message of a chat file
//! - `history` — List an add-on's stored results
//! - `delete`  — Remove stored results
//! - `render`  — Print the chat as HTML with results restored
//! - `prompt`  — Preview the prompts add-ons would send
//! - `config`  — Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "sidecar",
    about = "Sidecar — AI add-ons for chat transcripts",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.sidecar/config.toml)
    #[arg(long, global = true, env = "SIDECAR_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run add-ons against the latest AI message and save the results
    Run {
        /// Chat transcript (JSON array of messages)
        #[arg(long)]
        chat: PathBuf,

        /// Run only this add-on (repeatable)
        #[arg(long = "addon", value_name = "ID")]
        addons: Vec<String>,

        /// Run every enabled add-on, including manual ones
        #[arg(long, conflicts_with = "addons")]
        all: bool,
    },

    /// List an add-on's stored results, newest first
    History {
        #[arg(long)]
        chat: PathBuf,

        addon_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an add-on's stored results
    Delete {
        #[arg(long)]
        chat: PathBuf,

        addon_id: String,

        /// Only this message index (default: every message)
        #[arg(long)]
        message: Option<usize>,
    },

    /// Print the chat as HTML with stored results restored
    Render {
        #[arg(long)]
        chat: PathBuf,
    },

    /// Print the prompts add-ons would send
    Prompt {
        #[arg(long)]
        chat: PathBuf,

        /// Only this add-on (repeatable)
        #[arg(long = "addon", value_name = "ID")]
        addons: Vec<String>,

        /// Combine all prompts into one request
        #[arg(long)]
        batch: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run { chat, addons, all } => commands::run::run(config, &chat, addons, all).await?,
        Commands::History {
            chat,
            addon_id,
            json,
        } => commands::history::run(&chat, &addon_id, json).await?,
        Commands::Delete {
            chat,
            addon_id,
            message,
        } => commands::delete::run(config, &chat, &addon_id, message).await?,
        Commands::Render { chat } => commands::render::run(config, &chat).await?,
        Commands::Prompt {
            chat,
            addons,
            batch,
        } => commands::prompt::run(config, &chat, addons, batch).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config).await?,
            ConfigAction::Path => commands::config_cmd::path(config).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config).await?,
        },
    }

    Ok(())
}
