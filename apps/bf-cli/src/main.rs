//! `bf`: command-line access to the Blackfynn platform.

mod commands;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::config::CliConfig;

#[derive(Parser)]
#[clap(name = "bf", version, about = "Blackfynn datasets, packages and uploads")]
struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// API host, overriding the configuration file.
    #[clap(long, global = true)]
    base_url: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = cli.config.unwrap_or_else(config::config_path);

    let mut settings = CliConfig::load_from(&path)?;
    settings.apply_env(|name| std::env::var(name).ok());
    if let Some(url) = cli.base_url {
        settings.base_url = url;
    }
    tracing::debug!(path = %path.display(), base_url = %settings.base_url, "configuration loaded");

    cli.command.run(settings, &path).await
}
