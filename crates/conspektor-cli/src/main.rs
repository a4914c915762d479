//! Conspektor CLI
//!
//! Command-line interface for Conspektor - collaborative notes editing.

use std::fs::File;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use conspektor_core::{Config, DocumentIdentity, GatewayClient};

mod commands;
mod output;
mod prompt;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "conspektor")]
#[command(about = "Conspektor - collaborative notes from the terminal")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Act as this user (overrides config)
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit a document live
    Edit {
        /// Document ID
        id: String,
    },
    /// Edit a document by path (/users/{user}/documents/{id})
    Open {
        /// Editor path
        path: String,
    },
    /// List documents
    #[command(alias = "ls")]
    List,
    /// Create a new document
    #[command(alias = "new")]
    Create {
        /// Document title
        title: String,
    },
    /// Delete a document
    #[command(alias = "rm")]
    Delete {
        /// Document ID
        id: String,
    },
    /// Share a document with another user
    Share {
        /// Document ID
        id: String,
        /// Username to share with
        username: String,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (gateway_url, hub_url, user, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands must work even with a broken config file
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(&output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, &output)
            }
        };
    }

    let config = Config::load()?;
    init_logging(&config);

    let user = cli.user.clone().or_else(|| config.user.clone());
    let gateway = GatewayClient::new(&config.gateway_url).context("Invalid gateway URL")?;

    match cli.command {
        Commands::Edit { id } => {
            let Some(user) = user else {
                bail!(
                    "No user configured. Pass --user or run:\n  conspektor config set user <name>"
                );
            };
            let identity = DocumentIdentity::new(&id, &user)?;
            commands::edit::run(&config, identity, &output).await
        }
        Commands::Open { path } => {
            let identity = DocumentIdentity::from_path(&path)?;
            commands::edit::run(&config, identity, &output).await
        }
        Commands::List => commands::documents::list(&gateway, &output).await,
        Commands::Create { title } => {
            commands::documents::create(&gateway, title, user.as_deref(), &output).await
        }
        Commands::Delete { id } => commands::documents::delete(&gateway, id, &output).await,
        Commands::Share { id, username } => {
            commands::documents::share(&gateway, id, username, &output).await
        }
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Initialize file logging
///
/// Only initializes if CONSPEKTOR_LOG environment variable is set.
/// Logs to config.log_file or {data_dir}/conspektor.log so the terminal
/// stays free for editing.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("CONSPEKTOR_LOG") else {
        return;
    };

    let log_path = config.log_path();
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "conspektor_core={},conspektor_cli={}",
        log_level, log_level
    ));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}
