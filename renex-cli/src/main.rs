//! Renex CLI
//!
//! Command-line interface for inspecting a running Renovate executor.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "renex")]
#[command(about = "Renovate executor CLI", long_about = None)]
struct Cli {
    /// Executor URL
    #[arg(long, env = "RENEX_URL", default_value = "http://localhost:4000")]
    url: String,

    /// Secret for the inspection endpoints
    #[arg(long, env = "RENEX_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        url: cli.url,
        api_secret: cli.api_secret,
    };

    handle_command(cli.command, &config).await
}
