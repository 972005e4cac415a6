//! Tally - resilient account reconciliation worker
//!
//! Main entry point for the worker process.

use anyhow::Context;
use tally_worker::{run_for_from_env, wait_for_shutdown, WorkerContext};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before logging so it can set RUST_LOG and TALLY_LOG_FORMAT
    let dotenv = dotenvy::dotenv();
    tally_infra::observability::init();
    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Could not load .env file"),
    }

    let config = tally_infra::config::load().context("failed to load configuration")?;
    let run_for = run_for_from_env().context("failed to read run duration")?;
    let context = WorkerContext::new(config).context("failed to initialize worker")?;

    let mut worker = context.worker();
    worker.start().context("failed to start worker")?;
    info!(run_for_ms = run_for.map(|d| d.as_millis() as u64), "Tally worker started");

    let reason = wait_for_shutdown(run_for).await;
    info!(%reason, "Shutdown requested");

    worker.stop().await.context("worker did not stop cleanly")?;
    info!("Tally worker stopped");
    Ok(())
}
