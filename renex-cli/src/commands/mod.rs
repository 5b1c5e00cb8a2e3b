//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod hook;
mod jobs;
mod status;

use anyhow::Result;
use clap::Subcommand;
use renex_core::WorkClass;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show executor health and slot usage
    Status,
    /// List running batches
    Jobs {
        /// Only show this work class (scheduled or event)
        #[arg(long)]
        class: Option<WorkClass>,
    },
    /// List queued batches
    Queue {
        /// Only show this work class (scheduled or event)
        #[arg(long)]
        class: Option<WorkClass>,
    },
    /// Replay a webhook payload against the executor
    Hook {
        /// Event kind, e.g. push or pull_request
        #[arg(long)]
        event: String,

        /// Header carrying the event kind
        #[arg(long, default_value = "x-github-event")]
        header: String,

        /// JSON payload file
        payload: PathBuf,
    },
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        Commands::Status => status::show_status(&client).await,
        Commands::Jobs { class } => jobs::list_jobs(&client, class).await,
        Commands::Queue { class } => jobs::list_queue(&client, class).await,
        Commands::Hook {
            event,
            header,
            payload,
        } => hook::send_hook(&client, &header, &event, &payload).await,
    }
}

/// Classes to display for an optional `--class` filter
fn classes(filter: Option<WorkClass>) -> Vec<WorkClass> {
    match filter {
        Some(class) => vec![class],
        None => WorkClass::ALL.to_vec(),
    }
}
