//! Status command

use anyhow::Result;
use colored::*;
use renex_client::ExecutorClient;
use renex_core::WorkClass;

/// Show whether the executor is up and how busy each class is
pub async fn show_status(client: &ExecutorClient) -> Result<()> {
    client.health().await?;
    println!("{} {}", "●".green(), format!("Executor at {} is up", client.base_url()).bold());

    let (jobs, queue) = match tokio::try_join!(client.list_jobs(), client.list_queue()) {
        Ok(lists) => lists,
        Err(e) if e.is_client_error() => {
            println!("  {}", format!("Inspection unavailable: {}", e).yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    for class in WorkClass::ALL {
        println!(
            "  {:<10} {} running, {} queued",
            class.to_string().cyan(),
            jobs.get(class).len(),
            queue.get(class).len()
        );
    }

    Ok(())
}
