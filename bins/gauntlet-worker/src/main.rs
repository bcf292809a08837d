use anyhow::{Context, Result};
use gauntlet_common::BatchRequest;
use gauntlet_engine::{EngineConfig, ExecutionScheduler};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};
use tokio::signal;
use tracing::{info, warn};

/// Batch worker: one `BatchRequest` JSON document on stdin, one
/// `{task_id: [report, ...]}` map on stdout. Configuration comes from the
/// environment; attempt lists are in arrival order and callers sort by
/// `attempt_index`.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    info!("Gauntlet worker booting...");

    let config = EngineConfig::from_env();
    info!(
        interpreter = %config.interpreter.display(),
        grace_seconds = config.grace_period.as_secs_f64(),
        max_memory_bytes = config.max_memory_bytes,
        "Engine configured"
    );

    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .await
        .context("failed to read batch request from stdin")?;
    let batch: BatchRequest = serde_json::from_str(&raw).context("malformed batch request")?;

    info!(
        tasks = batch.tasks.len(),
        worker_count = batch.worker_count,
        "Batch received"
    );

    let scheduler = ExecutionScheduler::new(config);

    // In-flight children are killed and reaped when the batch future drops.
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        warn!("Received shutdown signal, abandoning batch");
    };

    tokio::select! {
        outcome = scheduler.submit(batch.tasks, batch.worker_count) => {
            let results = outcome.context("batch rejected before dispatch")?;
            info!(
                tasks = results.task_count(),
                attempts = results.attempt_count(),
                "Batch complete"
            );
            let payload = serde_json::to_string(&results.into_reports())
                .context("failed to serialize batch reports")?;
            let mut stdout = io::stdout();
            stdout.write_all(payload.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        _ = shutdown => {}
    }

    info!("Worker shutdown complete");
    Ok(())
}
