//! Job and queue command handlers

use anyhow::Result;
use colored::*;
use renex_client::ExecutorClient;
use renex_core::{Batch, WorkClass};

use super::classes;

/// List running batches
pub async fn list_jobs(client: &ExecutorClient, filter: Option<WorkClass>) -> Result<()> {
    let jobs = client.list_jobs().await?;

    for class in classes(filter) {
        let entries = jobs.get(class);
        if entries.is_empty() {
            println!("{}", format!("No running {} jobs.", class).yellow());
            continue;
        }

        println!(
            "{}",
            format!("{} running {} job(s):", entries.len(), class).bold()
        );
        println!();
        for entry in entries {
            print_batch(&entry.batch);
            println!(
                "    Started:      {}",
                entry
                    .started_at
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed()
            );
            println!();
        }
    }

    Ok(())
}

/// List queued batches
pub async fn list_queue(client: &ExecutorClient, filter: Option<WorkClass>) -> Result<()> {
    let queue = client.list_queue().await?;

    for class in classes(filter) {
        let entries = queue.get(class);
        if entries.is_empty() {
            println!("{}", format!("No queued {} batches.", class).yellow());
            continue;
        }

        println!(
            "{}",
            format!("{} queued {} batch(es):", entries.len(), class).bold()
        );
        println!();
        for (position, entry) in entries.iter().enumerate() {
            print!("{} ", format!("{:>3}.", position + 1).dimmed());
            print_batch(&entry.batch);
            println!(
                "    Queued:       {}",
                entry
                    .queued_at
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed()
            );
            println!();
        }
    }

    Ok(())
}

fn print_batch(batch: &Batch) {
    println!("  {} {}", "▸".cyan(), batch.job_name().bold());
    println!("    Batch:        {}", batch.id.to_string().dimmed());
    println!("    Repositories: {}", batch.paths().join(", "));
}
