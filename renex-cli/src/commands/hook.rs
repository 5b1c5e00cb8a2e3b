//! Webhook replay command

use std::path::Path;

use anyhow::{Context, Result};
use colored::*;
use renex_client::{ExecutorClient, HookStatus};

/// Send a stored webhook payload to the executor
pub async fn send_hook(
    client: &ExecutorClient,
    header: &str,
    event: &str,
    payload: &Path,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(payload)
        .await
        .with_context(|| format!("failed to read {}", payload.display()))?;
    let body: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", payload.display()))?;

    let response = client.send_hook(header, event, &body).await?;

    let status = match response.status {
        HookStatus::Queued => "queued".green(),
        HookStatus::Duplicate => "duplicate".yellow(),
        HookStatus::Ignored => "ignored".dimmed(),
    };
    println!("{} {} event: {}", "✓".green(), response.event_kind.bold(), status);
    if let Some(id) = response.batch_id {
        println!("  Batch:         {}", id.to_string().dimmed());
    }
    if response.merge_request {
        println!("  {}", "Merge request event".cyan());
    }

    Ok(())
}
