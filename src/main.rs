//! Minimal process entrypoint.
//!
//! A full CLI (subcommands, progress rendering, interactive prompts) is out of
//! scope (§1) — this binary only wires the engine together: load config, init
//! logging, load a decomposition from the path given as the first argument,
//! resume from any existing checkpoint, and run the orchestrator to completion
//! with the in-process [`EchoWorkerRunner`] demonstration fixture.

use std::sync::Arc;

use anyhow::{Context, Result};
use swarm_engine::domain::models::Decomposition;
use swarm_engine::domain::ports::NullEventSink;
use swarm_engine::infrastructure::checkpoint::FileCheckpointStore;
use swarm_engine::infrastructure::config::ConfigLoader;
use swarm_engine::infrastructure::logging;
use swarm_engine::services::{EchoWorkerRunner, Orchestrator, OrchestratorConfig, TierPolicy, WorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logging_handle = logging::init(&config.logging).context("failed to initialize logging")?;

    let decomposition_path = std::env::args()
        .nth(1)
        .context("usage: swarm-engine <decomposition.json>")?;
    let raw = std::fs::read_to_string(&decomposition_path)
        .with_context(|| format!("failed to read {decomposition_path}"))?;
    let decomposition: Decomposition =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {decomposition_path}"))?;

    let checkpoint_store = config
        .checkpoint_path
        .as_ref()
        .map(|path| Arc::new(FileCheckpointStore::new(path.clone())) as Arc<dyn swarm_engine::domain::ports::CheckpointStore>);

    let pool = WorkerPool::new(config.worker_tiers.clone());
    let orchestrator = Orchestrator::new(
        decomposition,
        config.swarm.clone(),
        pool,
        Arc::new(EchoWorkerRunner),
        TierPolicy::default(),
        OrchestratorConfig::default(),
        Box::new(NullEventSink),
        checkpoint_store,
    )
    .context("decomposition rejected")?;

    if orchestrator.resume().await.context("failed to resume from checkpoint")? {
        tracing::info!("resumed from existing checkpoint");
    }

    orchestrator.run().await.context("orchestrator run failed")?;

    let stats = orchestrator.stats();
    tracing::info!(
        completed = stats.completed,
        failed = stats.failed,
        skipped = stats.skipped,
        tokens = orchestrator.total_tokens_used(),
        "run complete"
    );
    Ok(())
}
