//! Renex Server
//!
//! Admission and concurrency-limited scheduling of Renovate jobs.
//!
//! The server:
//! 1. Loads configuration from the environment (and an optional `.env`)
//! 2. Verifies the selected runner backend
//! 3. Starts the scheduler control loop
//! 4. Starts the scheduled producer
//! 5. Serves the HTTP API (health, inspection, webhooks)
//!
//! The process exits with an error when the scheduled producer gives up, so
//! a supervisor can restart it.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod discovery;
pub mod producer;
pub mod scheduler;

#[cfg(test)]
mod testing;

use crate::api::AppState;
use crate::config::Config;
use crate::discovery::create_discovery;
use crate::producer::{CronProducer, HookProducer};
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine, the environment may be set elsewhere
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "renex_server=info,renex_runner=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    info!("Starting Renovate executor...");

    let config = Config::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let runner = renex_runner::create_runner(&config.runner)?;
    runner
        .verify()
        .await
        .with_context(|| format!("{} runner is not usable", runner.name()))?;

    let discovery = create_discovery(&config.discovery)
        .with_context(|| format!("cannot set up {} discovery", config.discovery.source))?;

    let scheduler = Arc::new(Scheduler::new(runner, config.scheduler.clone()));
    let cron = CronProducer::new(
        discovery.clone(),
        scheduler.clone(),
        config.producer.clone(),
    );

    let state = AppState {
        scheduler: scheduler.clone(),
        hooks: HookProducer::new(discovery, scheduler.clone()),
        api: Arc::new(config.api.clone()),
    };
    let app = api::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!(
        "Listening on {} (API {}, webhooks {}{})",
        addr,
        enabled(config.api.api_enabled),
        enabled(config.api.webhook_enabled),
        if config.api.webhook_secret.is_some() {
            ", signed"
        } else {
            ""
        }
    );

    let control_loop = tokio::spawn(scheduler.run());

    let outcome = tokio::select! {
        result = cron.run() => {
            result.context("scheduled producer stopped")
        }
        result = axum::serve(listener, app).into_future() => {
            result.context("HTTP server stopped")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    control_loop.abort();

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    outcome
}

fn enabled(flag: bool) -> &'static str {
    if flag { "enabled" } else { "disabled" }
}
