//! The Orchestrator (§4.E): the loop binding the Task Queue (§4.C) and Worker Pool
//! (§4.D), emitting events, reconciling stale dispatches, and coordinating resume.
//!
//! Grounded on SPEC_FULL.md §4.E's pseudocode directly; the teacher's
//! `services/swarm_orchestrator/` module split inspired the "thin coordinator over
//! well-defined subsystems" framing (its `mod.rs` doc comment), though this
//! orchestrator is far smaller in scope — it owns no repositories, only the queue,
//! pool, provider chain's caller (the worker), and a checkpoint store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::domain::models::{Decomposition, SwarmConfig, Task, TaskId, TaskType};
use crate::domain::ports::{CheckpointStore, EventSink, SwarmTaskResult, WorkerRunner};
use crate::services::task_queue::{QueueStats, TaskQueue};
use crate::services::worker_pool::WorkerPool;

/// Maps a [`TaskType`] to the worker pool tier that should run it. Research/test/
/// review tasks default to a cheap tier; everything that produces or restructures
/// code defaults to a stronger one. Callers may override individual types.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    overrides: HashMap<TaskType, String>,
    default_cheap: String,
    default_strong: String,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            overrides: HashMap::new(),
            default_cheap: "small".to_string(),
            default_strong: "large".to_string(),
        }
    }
}

impl TierPolicy {
    /// Override the tier used for one task type.
    #[must_use]
    pub fn with_override(mut self, task_type: TaskType, tier: impl Into<String>) -> Self {
        self.overrides.insert(task_type, tier.into());
        self
    }

    /// Resolve the preferred tier for `task_type` (§4.E `preferredTierFor`).
    #[must_use]
    pub fn tier_for(&self, task_type: TaskType) -> &str {
        if let Some(tier) = self.overrides.get(&task_type) {
            return tier;
        }
        match task_type {
            TaskType::Research | TaskType::Test | TaskType::Review => &self.default_cheap,
            TaskType::Implement | TaskType::Refactor | TaskType::Merge | TaskType::Fixup => &self.default_strong,
        }
    }
}

/// Tunables specific to the orchestrator loop itself, distinct from the queue's
/// own `SwarmConfig` (§4.C.1).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How often the stale-dispatch reconciler runs, independent of the actual
    /// staleness threshold (`swarm.stale_after_ms`) it checks against.
    pub reconcile_poll_ms: u64,
    /// How often a checkpoint is persisted, when a [`CheckpointStore`] is configured.
    pub checkpoint_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reconcile_poll_ms: 5_000,
            checkpoint_interval_ms: 30_000,
        }
    }
}

/// A completed worker run, fed back through the completion channel.
struct WorkerOutcome {
    task_id: TaskId,
    slot_index: usize,
    result: SwarmTaskResult,
}

/// Binds the Task Queue and Worker Pool into the execution loop described in §4.E.
///
/// Queue mutations are synchronous and must not interleave (§5); the queue is
/// guarded by a single `std::sync::Mutex` rather than an async lock, since no
/// `.await` ever happens while it is held (the teacher's `Arc<RwLock<HashMap<..>>>`
/// service idiom, adapted to a `std::sync::Mutex` per the sync-core/async-edges
/// design decision in `DESIGN.md`).
pub struct Orchestrator {
    queue: std::sync::Mutex<TaskQueue>,
    pool: WorkerPool,
    worker: Arc<dyn WorkerRunner>,
    tiers: TierPolicy,
    config: OrchestratorConfig,
    stale_after_ms: i64,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    total_tokens: AtomicU64,
}

impl Orchestrator {
    /// Load `decomposition` into a fresh queue and construct the orchestrator.
    ///
    /// # Errors
    /// Propagates [`crate::domain::error::QueueError::CyclicDecomposition`] if the
    /// decomposition's dependency graph contains a cycle (§4.C.1, §7).
    pub fn new(
        decomposition: Decomposition,
        swarm_config: SwarmConfig,
        pool: WorkerPool,
        worker: Arc<dyn WorkerRunner>,
        tiers: TierPolicy,
        config: OrchestratorConfig,
        sink: Box<dyn EventSink>,
        checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    ) -> Result<Self, crate::domain::error::QueueError> {
        let stale_after_ms = swarm_config.stale_after_ms as i64;
        let queue = TaskQueue::load_from_decomposition(decomposition, swarm_config, sink)?;
        Ok(Self {
            queue: std::sync::Mutex::new(queue),
            pool,
            worker,
            tiers,
            config,
            stale_after_ms,
            checkpoint_store,
            total_tokens: AtomicU64::new(0),
        })
    }

    /// Resume from the configured checkpoint store, if any checkpoint exists.
    /// Overlays its runtime state onto the freshly loaded queue, then immediately
    /// reconciles every `dispatched` task as stale — per §4.E's resume contract,
    /// "`activeTaskIds = ∅` and a `staleAfterMs` of 0, which re-readies everything
    /// that was mid-flight" — since no worker from the previous process is alive.
    ///
    /// # Errors
    /// Propagates checkpoint-store I/O failures and checkpoint corruption errors
    /// (§7: "fatal; surface to caller without mutating in-memory state" — the
    /// queue's own `restore_from_checkpoint` already upholds that for the overlay
    /// step itself).
    pub async fn resume(&self) -> anyhow::Result<bool> {
        let Some(store) = &self.checkpoint_store else {
            return Ok(false);
        };
        let Some(checkpoint) = store.load().await? else {
            return Ok(false);
        };

        let mut queue = self.lock_queue();
        queue.restore_from_checkpoint(checkpoint)?;
        let now = Utc::now();
        let recovered = queue.reconcile_stale_dispatched(0, now, &std::collections::HashSet::new());
        for id in recovered {
            tracing::info!(task_id = %id, "re-readied mid-flight task on resume");
        }
        Ok(true)
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, TaskQueue> {
        self.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current per-status counts, for diagnostics/tests.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.lock_queue().get_stats(Utc::now())
    }

    /// Total tokens consumed across every worker run so far.
    #[must_use]
    pub fn total_tokens_used(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    /// Drive the loop in §4.E to completion: dispatch ready tasks, await worker
    /// results or the periodic stale/checkpoint timers, update the queue, and
    /// advance waves, until `queue.isComplete()`.
    ///
    /// # Errors
    /// Propagates queue errors from `mark_dispatched`/`mark_completed`/`mark_failed`
    /// (these only occur on a logic error — a task id vanishing mid-flight — and are
    /// treated as fatal rather than silently skipped) and checkpoint-store I/O errors.
    pub async fn run(&self) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::channel::<WorkerOutcome>(64);
        let mut stale_interval = tokio::time::interval(StdDuration::from_millis(self.config.reconcile_poll_ms.max(1)));
        stale_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut checkpoint_interval =
            tokio::time::interval(StdDuration::from_millis(self.config.checkpoint_interval_ms.max(1)));
        checkpoint_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            self.dispatch_ready(&tx);

            if self.lock_queue().is_complete() {
                return Ok(());
            }

            tokio::select! {
                Some(outcome) = rx.recv() => {
                    self.handle_outcome(outcome)?;
                }
                _ = stale_interval.tick() => {
                    self.reconcile_stale();
                }
                _ = checkpoint_interval.tick(), if self.checkpoint_store.is_some() => {
                    self.persist_checkpoint().await?;
                }
            }

            let mut queue = self.lock_queue();
            if queue.is_current_wave_complete() {
                queue.advance_wave();
            }
        }
    }

    /// §4.E's dispatch phase: `for task in queue.getAllReadyTasks(): ... spawn(runWorker(...))`.
    /// Stops early once the pool has no free slot for the next candidate — the same
    /// task is simply re-offered on the next loop iteration.
    fn dispatch_ready(&self, tx: &mpsc::Sender<WorkerOutcome>) {
        let mut to_spawn = Vec::new();
        {
            let mut queue = self.lock_queue();
            let now = Utc::now();
            let candidates: Vec<(TaskId, TaskType)> =
                queue.get_all_ready_tasks(now).into_iter().map(|t| (t.id().clone(), t.task_type())).collect();

            for (id, task_type) in candidates {
                let tier = self.tiers.tier_for(task_type).to_string();
                let Some(slot) = self.pool.acquire(id.clone(), Some(&tier)) else {
                    break;
                };
                if let Err(err) = queue.mark_dispatched(id.as_str(), &slot.tier) {
                    tracing::warn!(task_id = %id, error = %err, "dispatch raced past readiness; releasing slot");
                    self.pool.release(slot.index);
                    continue;
                }
                let dependency_context = queue.dependency_context(id.as_str());
                let Some(task) = queue.get(id.as_str()).cloned() else {
                    self.pool.release(slot.index);
                    continue;
                };
                to_spawn.push((slot, task, dependency_context));
            }
        }

        for (slot, task, dependency_context) in to_spawn {
            let worker = self.worker.clone();
            let tx = tx.clone();
            let tier = slot.tier.clone();
            let slot_index = slot.index;
            let task_id = task.id().clone();
            tracing::info!(task_id = %task_id, tier = %tier, "dispatched task to worker");
            tokio::spawn(async move {
                let result = worker.run(&task, &dependency_context, &tier).await;
                let _ = tx
                    .send(WorkerOutcome { task_id, slot_index, result })
                    .await;
            });
        }
    }

    /// §4.E's `on worker_completed` handler.
    fn handle_outcome(&self, outcome: WorkerOutcome) -> Result<(), crate::domain::error::QueueError> {
        self.pool.release(outcome.slot_index);
        self.total_tokens.fetch_add(outcome.result.tokens_used, Ordering::Relaxed);

        let mut queue = self.lock_queue();
        if outcome.result.success {
            queue.mark_completed(outcome.task_id.as_str(), outcome.result.output)?;
        } else {
            let retried = queue.mark_failed(outcome.task_id.as_str(), outcome.result.output)?;
            if retried {
                tracing::info!(task_id = %outcome.task_id, "task failed, retry scheduled");
            } else {
                tracing::warn!(task_id = %outcome.task_id, "task failed terminally; dependents cascade-skipped");
            }
        }
        Ok(())
    }

    /// §4.E's `on stale_timer` handler / §4.C.10.
    fn reconcile_stale(&self) {
        let active = self.pool.active_task_ids();
        let now = Utc::now();
        let mut queue = self.lock_queue();
        let recovered = queue.reconcile_stale_dispatched(self.stale_after_ms, now, &active);
        drop(queue);
        for id in recovered {
            tracing::warn!(task_id = %id, "stale dispatch reconciled: worker presumed dead, task re-readied");
        }
    }

    /// §4.E's `on checkpoint_timer` handler.
    async fn persist_checkpoint(&self) -> anyhow::Result<()> {
        let Some(store) = &self.checkpoint_store else {
            return Ok(());
        };
        let checkpoint = self.lock_queue().get_checkpoint_state();
        store.save(&checkpoint).await
    }
}

/// A trivial in-process [`WorkerRunner`] that always succeeds, echoing the task's
/// description back as output. Used for demonstration and as a test fixture, since
/// real worker agents (language-model-driven, tool-using) are out of scope per §1.
pub struct EchoWorkerRunner;

#[async_trait]
impl WorkerRunner for EchoWorkerRunner {
    async fn run(&self, task: &Task, dependency_context: &str, tier: &str) -> SwarmTaskResult {
        let mut output = format!("completed: {}", task.description());
        if !dependency_context.is_empty() {
            output.push_str("\n\n--- dependency context ---\n");
            output.push_str(dependency_context);
        }
        SwarmTaskResult {
            success: true,
            output,
            tokens_used: 0,
            cost_used: 0.0,
            duration_ms: 0,
            model: format!("echo/{tier}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DependencyGraph, ExecutionStrategy, TaskType};
    use crate::domain::ports::NullEventSink;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, id, format!("do {id}"), TaskType::Implement, 1)
            .with_dependencies(deps.iter().map(|d| TaskId::normalize(d)).collect())
    }

    fn decomposition(subtasks: Vec<Task>, parallel_groups: Vec<Vec<&str>>) -> Decomposition {
        Decomposition {
            original_task: "test".to_string(),
            subtasks,
            dependency_graph: DependencyGraph {
                execution_order: Vec::new(),
                parallel_groups: parallel_groups
                    .into_iter()
                    .map(|g| g.into_iter().map(TaskId::normalize).collect())
                    .collect(),
                cycles: Vec::new(),
            },
            conflicts: Vec::new(),
            strategy: ExecutionStrategy::Parallel,
        }
    }

    #[tokio::test]
    async fn drives_linear_chain_to_completion() {
        let decomp = decomposition(
            vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])],
            vec![vec!["a"], vec!["b"], vec!["c"]],
        );
        let orchestrator = Orchestrator::new(
            decomp,
            SwarmConfig::default(),
            WorkerPool::new([("small".to_string(), 2), ("large".to_string(), 2)]),
            Arc::new(EchoWorkerRunner),
            TierPolicy::default(),
            OrchestratorConfig::default(),
            Box::new(NullEventSink),
            None,
        )
        .unwrap();

        tokio::time::timeout(StdDuration::from_secs(5), orchestrator.run()).await.unwrap().unwrap();

        let stats = orchestrator.stats();
        assert_eq!(stats.completed, 3);
    }

    #[tokio::test]
    async fn parallel_wave_completes_with_single_slot_per_tier() {
        let decomp = decomposition(
            vec![task("a", &[]), task("b", &[]), task("c", &["a", "b"])],
            vec![vec!["a", "b"], vec!["c"]],
        );
        let orchestrator = Orchestrator::new(
            decomp,
            SwarmConfig::default(),
            WorkerPool::new([("large".to_string(), 1)]),
            Arc::new(EchoWorkerRunner),
            TierPolicy::default(),
            OrchestratorConfig::default(),
            Box::new(NullEventSink),
            None,
        )
        .unwrap();

        tokio::time::timeout(StdDuration::from_secs(5), orchestrator.run()).await.unwrap().unwrap();
        assert_eq!(orchestrator.stats().completed, 3);
    }
}
