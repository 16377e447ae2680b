//! The worker-runner port the Orchestrator dispatches ready tasks through (§4.E).
//!
//! Actual worker agents (language-model-driven, tool-using) are out of scope per §1;
//! this trait is the seam the core hands off through, plus a trivial in-process
//! demonstration/test fixture (see `services::orchestrator::EchoWorkerRunner`).

use async_trait::async_trait;

use crate::domain::models::Task;

/// Result of running one task to completion, reported back to the Orchestrator (§6.2).
#[derive(Debug, Clone)]
pub struct SwarmTaskResult {
    /// Whether the worker considers the task successfully completed.
    pub success: bool,
    /// Free-text output (stored on the task when successful).
    pub output: String,
    /// Tokens consumed across the worker's model calls.
    pub tokens_used: u64,
    /// Estimated monetary cost of the worker's model calls.
    pub cost_used: f64,
    /// Wall-clock duration of the run, in milliseconds.
    pub duration_ms: u64,
    /// The model that ultimately produced the result (after any provider failover).
    pub model: String,
}

/// Executes a single task by driving a worker agent to completion.
///
/// Out of scope per §1 ("Individual worker agents... Tool implementations"); the
/// core only depends on this narrow contract.
#[async_trait]
pub trait WorkerRunner: Send + Sync {
    /// Run `task`, given the synthesized dependency context (§4.C.9), on the given
    /// model tier, returning a [`SwarmTaskResult`].
    async fn run(&self, task: &Task, dependency_context: &str, tier: &str) -> SwarmTaskResult;
}
