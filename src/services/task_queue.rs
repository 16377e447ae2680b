//! The Task Queue & Wave Scheduler (§4.C) — the core of the core.
//!
//! Modeled as a single aggregate owning a task table plus a secondary
//! `wave -> task ids` index, per the Design Note in SPEC_FULL.md §9 ("model as a
//! single aggregate structure owning its task table by id and a secondary
//! `wave -> taskIds` index"). Cycle detection and topological ordering are
//! delegated to [`crate::services::dependency`], grounded on the teacher's
//! `services/dependency_resolver.rs`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::error::QueueError;
use crate::domain::models::{
    Checkpoint, Conflict, ConflictType, Decomposition, Event, FileConflictStrategy, FixupTask,
    PartialContext, SwarmConfig, Task, TaskId, TaskSnapshot, TaskStatus, TaskType, CHECKPOINT_VERSION,
};
use crate::domain::ports::EventSink;
use crate::services::dependency;

/// Per-status counts plus the dispatchable-ready subset (§4.C.12 `getStats`).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Count of tasks in each status.
    pub pending: usize,
    pub ready: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub deleted: usize,
    /// Ready tasks that are not hidden behind a retry cooldown, as of the `now`
    /// passed to `get_stats`.
    pub ready_dispatchable: usize,
}

impl QueueStats {
    /// Sum of all per-status counts (§8: "sum(stats) = |D.subtasks|").
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.ready + self.dispatched + self.completed + self.failed + self.skipped + self.deleted
    }
}

/// The Task Queue & Wave Scheduler (§4.C).
pub struct TaskQueue {
    tasks: HashMap<TaskId, Task>,
    wave_index: HashMap<usize, Vec<TaskId>>,
    current_wave: usize,
    num_waves: usize,
    config: SwarmConfig,
    sink: Box<dyn EventSink>,
    on_skip: Option<Box<dyn Fn(&TaskId, &str) + Send + Sync>>,
}

impl TaskQueue {
    /// Load a decomposition, rejecting it wholesale if its dependency graph
    /// contains a cycle (§4.C.1, §7: "no partial state is committed").
    #[tracing::instrument(skip(decomposition, config, sink))]
    pub fn load_from_decomposition(
        decomposition: Decomposition,
        config: SwarmConfig,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, QueueError> {
        if !decomposition.dependency_graph.cycles.is_empty() {
            return Err(QueueError::CyclicDecomposition(decomposition.dependency_graph.cycles.len()));
        }
        if let Some(cycle) = dependency::detect_cycle(&decomposition.subtasks) {
            return Err(QueueError::CyclicDecomposition(cycle.len()));
        }

        let mut queue = Self {
            tasks: HashMap::new(),
            wave_index: HashMap::new(),
            current_wave: 0,
            num_waves: decomposition.dependency_graph.parallel_groups.len().max(1),
            config,
            sink,
            on_skip: None,
        };

        let group_of: HashMap<&TaskId, usize> = decomposition
            .dependency_graph
            .parallel_groups
            .iter()
            .enumerate()
            .flat_map(|(wave, ids)| ids.iter().map(move |id| (id, wave)))
            .collect();

        let topo = dependency::topological_sort(&decomposition.subtasks)
            .ok_or(QueueError::CyclicDecomposition(1))?;
        let task_by_id: HashMap<TaskId, Task> = decomposition
            .subtasks
            .into_iter()
            .map(|t| (t.id().clone(), t))
            .collect();

        let mut assigned_wave: HashMap<TaskId, usize> = HashMap::new();
        for id in &topo {
            let wave = if let Some(&w) = group_of.get(id) {
                w
            } else {
                let task = &task_by_id[id];
                task.dependencies()
                    .iter()
                    .filter_map(|d| assigned_wave.get(d))
                    .max()
                    .map_or(0, |m| m + 1)
            };
            assigned_wave.insert(id.clone(), wave);
        }

        let mut tasks = task_by_id;
        for (id, task) in &mut tasks {
            let wave = assigned_wave.get(id).copied().unwrap_or(0);
            task.set_wave(wave);
        }

        // §4.C.6 conflict strategy, applied before edges are built so later wave
        // bumps are reflected in the dispatch ordering from the start.
        Self::apply_conflicts(&mut tasks, &decomposition.conflicts, queue.config.file_conflict_strategy);

        // Build the mutual blockedBy/blocks adjacency from declared dependencies.
        let deps_of: HashMap<TaskId, Vec<TaskId>> =
            tasks.iter().map(|(id, t)| (id.clone(), t.dependencies().to_vec())).collect();
        for (id, deps) in &deps_of {
            for dep in deps {
                if let Some(dep_task) = tasks.get_mut(dep) {
                    dep_task.add_blocks(id.clone());
                }
                if let Some(this_task) = tasks.get_mut(id) {
                    this_task.add_blocked_by(dep.clone());
                }
            }
        }

        queue.num_waves = queue
            .num_waves
            .max(tasks.values().map(Task::wave).max().map_or(0, |m| m + 1));

        for (id, task) in tasks {
            queue.wave_index.entry(task.wave()).or_default().push(id.clone());
            queue.tasks.insert(id, task);
        }

        queue.promote_ready_for_wave(0, Utc::now());
        Ok(queue)
    }

    fn apply_conflicts(tasks: &mut HashMap<TaskId, Task>, conflicts: &[Conflict], strategy: FileConflictStrategy) {
        for conflict in conflicts {
            if conflict.conflict_type != ConflictType::WriteWrite {
                continue;
            }
            match strategy {
                FileConflictStrategy::Serialize => {
                    let mut ids = conflict.task_ids.clone();
                    ids.sort_by_key(|id| tasks.get(id).map(Task::wave).unwrap_or(0));
                    let mut min_next_wave = 0usize;
                    for id in ids {
                        if let Some(task) = tasks.get_mut(&id) {
                            if task.wave() < min_next_wave {
                                task.set_wave(min_next_wave);
                            }
                            min_next_wave = task.wave() + 1;
                        }
                    }
                }
                FileConflictStrategy::MergeWarn => {
                    for id in &conflict.task_ids {
                        if let Some(task) = tasks.get_mut(id) {
                            task.metadata_mut().insert(
                                "conflict_warning".to_string(),
                                serde_json::json!({
                                    "resource": conflict.resource,
                                    "with": conflict.task_ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                                }),
                            );
                        }
                    }
                }
            }
        }
    }

    /// Register a listener invoked once per task the queue cascade-skips, so the
    /// Orchestrator can decide whether to cancel an in-flight worker (§4.C.4, §9's
    /// "cancel vs ignore" Open Question — the queue only signals).
    pub fn set_skip_listener(&mut self, listener: impl Fn(&TaskId, &str) + Send + Sync + 'static) {
        self.on_skip = Some(Box::new(listener));
    }

    fn resolve(raw: &str) -> TaskId {
        TaskId::normalize(raw)
    }

    /// Look up a task by (possibly shorthand) id.
    #[must_use]
    pub fn get(&self, raw_id: &str) -> Option<&Task> {
        self.tasks.get(&Self::resolve(raw_id))
    }

    /// Current wave index.
    #[must_use]
    pub const fn current_wave(&self) -> usize {
        self.current_wave
    }

    /// Tasks with status `ready`, `wave = current_wave`, and no live retry cooldown
    /// (§4.C.3 `getReadyTasks`).
    #[must_use]
    pub fn get_ready_tasks(&self, now: DateTime<Utc>) -> Vec<&Task> {
        let mut ready: Vec<&Task> = self
            .wave_index
            .get(&self.current_wave)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.status() == TaskStatus::Ready && t.retry_after().is_none_or(|r| r <= now))
            .collect();
        ready.sort_by(|a, b| dispatch_order(a, b));
        ready
    }

    /// All ready tasks across all waves, subject to the same cooldown filter,
    /// sorted by `(wave ASC, complexity DESC, id ASC)` (§4.C.3, §5).
    #[must_use]
    pub fn get_all_ready_tasks(&self, now: DateTime<Utc>) -> Vec<&Task> {
        let mut ready: Vec<&Task> = self
            .tasks
            .values()
            .filter(|t| t.status() == TaskStatus::Ready && t.retry_after().is_none_or(|r| r <= now))
            .collect();
        ready.sort_by(|a, b| dispatch_order(a, b));
        ready
    }

    /// True iff every task in the current wave is terminal (§4.C.3).
    #[must_use]
    pub fn is_current_wave_complete(&self) -> bool {
        self.wave_index
            .get(&self.current_wave)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tasks.get(id))
            .all(|t| t.status().is_terminal())
    }

    /// True iff every task in the queue is terminal (§4.C.12 `isComplete`).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.tasks.values().all(|t| t.status().is_terminal())
    }

    /// Increment `current_wave`, then promote/cascade-skip every task in the new
    /// wave per the partial-dependency policy (§4.C.3, §4.C.5).
    #[tracing::instrument(skip(self))]
    pub fn advance_wave(&mut self) {
        self.current_wave += 1;
        let now = Utc::now();
        self.promote_ready_for_wave(self.current_wave, now);
        self.sink.emit(Event::WaveAdvanced { wave: self.current_wave, at: now });
    }

    fn promote_ready_for_wave(&mut self, wave: usize, now: DateTime<Utc>) {
        let ids: Vec<TaskId> = self.wave_index.get(&wave).cloned().unwrap_or_default();
        for id in ids {
            self.evaluate_readiness(&id, now);
        }
    }

    /// Evaluate whether a still-`pending` task can be promoted, deferred, or must
    /// be cascade-skipped, per its dependencies' current terminal state (§4.C.2's
    /// Promote-to-ready row and §4.C.5's partial-dependency formula).
    fn evaluate_readiness(&mut self, id: &TaskId, now: DateTime<Utc>) {
        let Some(task) = self.tasks.get(id) else { return };
        if task.status() != TaskStatus::Pending {
            return;
        }
        // The wave gate only defers *promotion*: a dependent must not become
        // dispatchable ahead of its own wave. Cascade-skip is not promotion and
        // fires regardless of wave index (§4.C.4: "regardless of current state"),
        // so it must not be short-circuited by this check.
        let wave = task.wave();
        let deps = task.dependencies().to_vec();

        if deps.is_empty() {
            if wave <= self.current_wave {
                self.promote(id, now);
            }
            return;
        }

        let all_terminal = deps.iter().all(|d| self.tasks.get(d).is_some_and(|t| t.status().is_terminal()));
        if !all_terminal {
            return;
        }

        let succeeded: Vec<TaskId> = deps
            .iter()
            .filter(|d| self.tasks.get(*d).is_some_and(|t| t.status() == TaskStatus::Completed))
            .cloned()
            .collect();
        let failed: Vec<TaskId> = deps.iter().filter(|d| !succeeded.contains(d)).cloned().collect();
        let ratio = succeeded.len() as f64 / deps.len() as f64;

        if ratio >= self.config.partial_dependency_threshold {
            if wave <= self.current_wave {
                self.promote(id, now);
                if ratio < 1.0 {
                    if let Some(task) = self.tasks.get_mut(id) {
                        task.set_partial_context(PartialContext { ratio, succeeded, failed });
                    }
                }
            }
        } else if let Some(first_failed) = failed.first() {
            // §4.C.4's wording applies verbatim when every dependency failed (the
            // plain cascade case); a genuine partial mix that still falls short of
            // the threshold uses §4.C.5's wording instead.
            if succeeded.is_empty() {
                self.skip_one(id, &format!("skipped due to failed dependency {first_failed}"), now);
            } else {
                self.skip_one(id, "insufficient dependency success ratio", now);
            }
        }
    }

    fn promote(&mut self, id: &TaskId, now: DateTime<Utc>) {
        if let Some(task) = self.tasks.get_mut(id) {
            if task.status() == TaskStatus::Pending {
                task.promote_to_ready();
                self.sink.emit(Event::TaskUpdated { task_id: id.clone(), at: now });
            }
        }
    }

    /// Dispatch a `ready` task to a worker (§4.C.2 `markDispatched`).
    #[tracing::instrument(skip(self))]
    pub fn mark_dispatched(&mut self, raw_id: &str, tier: &str) -> Result<(), QueueError> {
        let id = Self::resolve(raw_id);
        let now = Utc::now();
        let task = self.tasks.get_mut(&id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if task.status() != TaskStatus::Ready {
            return Err(QueueError::InvalidTransition { id: id.to_string(), from: task.status() });
        }
        task.mark_dispatched(tier, now);
        self.sink.emit(Event::TaskDispatched { task_id: id, tier: tier.to_string(), at: now });
        Ok(())
    }

    /// Record a successful result. A no-op if the task is already `skipped` or
    /// `failed` (§4.C.2, the absorbing-terminal guarantee in §3.1/§9).
    #[tracing::instrument(skip(self, output))]
    pub fn mark_completed(&mut self, raw_id: &str, output: impl Into<String>) -> Result<(), QueueError> {
        let id = Self::resolve(raw_id);
        let now = Utc::now();
        let task = self.tasks.get_mut(&id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        let was_terminal = task.status().is_terminal();
        task.mark_completed(output, now);
        if was_terminal {
            tracing::debug!(task_id = %id, "markCompleted against a terminal task was a no-op");
            return Ok(());
        }
        self.sink.emit(Event::TaskCompleted { task_id: id.clone(), at: now });
        self.cascade_from(&id, now);
        Ok(())
    }

    /// Record a failed attempt. Returns `Ok(true)` if a retry was scheduled
    /// (revert to `ready` with a backoff cooldown), `Ok(false)` if the task is now
    /// terminally `failed` and cascade-skip was triggered for its dependents
    /// (§4.C.2 `markFailed`).
    #[tracing::instrument(skip(self, reason))]
    pub fn mark_failed(&mut self, raw_id: &str, reason: impl Into<String>) -> Result<bool, QueueError> {
        let id = Self::resolve(raw_id);
        let now = Utc::now();
        let reason = reason.into();

        let task = self.tasks.get_mut(&id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if task.status().is_terminal() {
            tracing::debug!(task_id = %id, "markFailed against a terminal task was a no-op");
            return Ok(false);
        }

        if task.attempts() <= self.config.max_retries {
            let delay_ms = self.config.retry_backoff_ms * 2u64.pow(task.attempts().min(16));
            let retry_after = now + chrono::Duration::milliseconds(delay_ms as i64);
            task.reschedule_retry(retry_after, now);
            self.sink.emit(Event::TaskUpdated { task_id: id, at: now });
            return Ok(true);
        }

        task.mark_failed_terminal(reason, now);
        self.sink.emit(Event::TaskFailed { task_id: id.clone(), reason: "max retries exceeded".to_string(), at: now });
        self.cascade_from(&id, now);
        Ok(false)
    }

    /// Explicitly cancel a non-terminal task (§4.C.2 `cancel`).
    #[tracing::instrument(skip(self))]
    pub fn cancel(&mut self, raw_id: &str) -> Result<(), QueueError> {
        let id = Self::resolve(raw_id);
        let now = Utc::now();
        let task = self.tasks.get_mut(&id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if task.status().is_terminal() {
            return Ok(());
        }
        task.mark_skipped("cancelled", now);
        self.sink.emit(Event::TaskSkipped { task_id: id.clone(), reason: "cancelled".to_string(), at: now });
        self.cascade_from(&id, now);
        Ok(())
    }

    /// Mark a temporary ineligibility window on a task without changing its
    /// status (§4.C.7 `setRetryAfter`).
    pub fn set_retry_after(&mut self, raw_id: &str, delay_ms: u64, now: DateTime<Utc>) -> Result<(), QueueError> {
        let id = Self::resolve(raw_id);
        let task = self.tasks.get_mut(&id).ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        task.reschedule_retry(now + chrono::Duration::milliseconds(delay_ms as i64), now);
        Ok(())
    }

    /// Whenever a task reaches a terminal state, re-evaluate every task it directly
    /// blocks; tasks whose remaining dependencies are not all terminal simply wait
    /// (re-triggered later by their own other dependencies finishing). This is how
    /// cascade-skip (§4.C.4) and partial-dependency tolerance (§4.C.5) compose: a
    /// strict chain (`threshold = 1.0`, single dependency per hop) skips every
    /// transitive dependent immediately without waiting for an `advanceWave` call,
    /// while a fan-in task with other still-pending dependencies is left alone
    /// until the rest resolve.
    fn cascade_from(&mut self, id: &TaskId, now: DateTime<Utc>) {
        let Some(task) = self.tasks.get(id) else { return };
        let dependents = task.blocks().to_vec();
        for dep_id in dependents {
            self.evaluate_readiness(&dep_id, now);
        }
        let _ = now;
    }

    fn skip_one(&mut self, id: &TaskId, reason: &str, now: DateTime<Utc>) {
        let Some(task) = self.tasks.get_mut(id) else { return };
        if task.status().is_terminal() {
            return;
        }
        task.mark_skipped(reason, now);
        self.sink.emit(Event::TaskSkipped { task_id: id.clone(), reason: reason.to_string(), at: now });
        if let Some(listener) = &self.on_skip {
            listener(id, reason);
        }
        self.cascade_from(&id.clone(), now);
    }

    /// Insert new tasks into the current wave (§4.C.8). Stores `fixesTaskId` and
    /// `fixInstructions` on the task's metadata so the worker prompt-builder can
    /// embed them.
    #[tracing::instrument(skip(self, fixups))]
    pub fn add_fixup_tasks(&mut self, fixups: Vec<FixupTask>) {
        let now = Utc::now();
        for fixup in fixups {
            let mut task = fixup.task;
            task.set_wave(self.current_wave);
            task.metadata_mut().insert(
                "fixesTaskId".to_string(),
                serde_json::Value::String(fixup.fixes_task_id.to_string()),
            );
            task.metadata_mut().insert(
                "fixInstructions".to_string(),
                serde_json::Value::String(fixup.fix_instructions),
            );
            let id = task.id().clone();
            self.wave_index.entry(self.current_wave).or_default().push(id.clone());
            self.tasks.insert(id.clone(), task);
            self.sink.emit(Event::TaskCreated { task_id: id.clone(), at: now });
            self.evaluate_readiness(&id, now);
        }
    }

    /// Synthesize the dependency context string embedded in the worker prompt
    /// (§4.C.9): one stanza per completed dependency, truncated per config, with a
    /// `WARNING: <k>/<n> dependencies succeeded` stanza prepended when the task
    /// carries a [`PartialContext`].
    #[must_use]
    pub fn dependency_context(&self, raw_id: &str) -> String {
        let id = Self::resolve(raw_id);
        let Some(task) = self.tasks.get(&id) else { return String::new() };

        let mut out = String::new();
        if let Some(partial) = task.partial_context() {
            out.push_str(&format!(
                "WARNING: {}/{} dependencies succeeded\n\n",
                partial.succeeded.len(),
                partial.succeeded.len() + partial.failed.len()
            ));
        }

        let limit = self.config.dependency_context_truncate_chars;
        for dep_id in task.dependencies() {
            let Some(dep) = self.tasks.get(dep_id) else { continue };
            if dep.status() != TaskStatus::Completed {
                continue;
            }
            let output = dep.output().unwrap_or_default();
            let truncated: String = output.chars().take(limit).collect();
            out.push_str(&format!(
                "{} task \"{}\":\n{}\n\n",
                task_type_label(dep.task_type()),
                dep.description(),
                truncated
            ));
        }
        out
    }

    /// Revert any `dispatched` task whose lease has expired and is not among
    /// `active_task_ids` back to `ready`; returns the reverted ids (§4.C.10).
    #[tracing::instrument(skip(self, active_task_ids))]
    pub fn reconcile_stale_dispatched(
        &mut self,
        stale_after_ms: i64,
        now: DateTime<Utc>,
        active_task_ids: &HashSet<TaskId>,
    ) -> Vec<TaskId> {
        let mut recovered = Vec::new();
        for task in self.tasks.values_mut() {
            if task.status() != TaskStatus::Dispatched {
                continue;
            }
            let Some(dispatched_at) = task.dispatched_at() else { continue };
            let stale = now - dispatched_at > chrono::Duration::milliseconds(stale_after_ms);
            if stale && !active_task_ids.contains(task.id()) {
                task.promote_to_ready();
                recovered.push(task.id().clone());
            }
        }
        recovered
    }

    /// A fully serializable snapshot of queue state (§4.C.11, §6.3).
    #[must_use]
    pub fn get_checkpoint_state(&self) -> Checkpoint {
        let tasks = self
            .tasks
            .values()
            .map(|t| TaskSnapshot {
                id: t.id().clone(),
                status: t.status(),
                wave: t.wave(),
                attempts: t.attempts(),
                dispatched_at: t.dispatched_at(),
                retry_after: t.retry_after(),
                owner_tier: t.owner_tier().map(ToString::to_string),
                output: t.output().map(ToString::to_string),
                partial_context: t.partial_context().cloned(),
                extra: HashMap::new(),
            })
            .collect();

        let active_owners: Vec<String> = self
            .tasks
            .values()
            .filter(|t| t.status() == TaskStatus::Dispatched)
            .filter_map(|t| t.owner_tier().map(ToString::to_string))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        Checkpoint {
            version: CHECKPOINT_VERSION,
            current_wave: self.current_wave,
            tasks,
            active_owners,
            extra: HashMap::new(),
        }
    }

    /// Overlay the mutable runtime fields from `checkpoint` onto this
    /// already-structurally-loaded queue (§4.C.11). The structural graph
    /// (subject/description/dependencies) is not carried by a checkpoint; callers
    /// must `load_from_decomposition` the same decomposition first. `dispatched`
    /// status is preserved as-is — the caller is responsible for calling
    /// [`Self::reconcile_stale_dispatched`] afterward (§4.C.11, §4.E resume).
    #[tracing::instrument(skip(self, checkpoint))]
    pub fn restore_from_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), QueueError> {
        if checkpoint.version > CHECKPOINT_VERSION {
            return Err(QueueError::CheckpointCorrupt(format!(
                "unsupported checkpoint version {}",
                checkpoint.version
            )));
        }
        for snapshot in &checkpoint.tasks {
            if !self.tasks.contains_key(&snapshot.id) {
                return Err(QueueError::CheckpointCorrupt(format!(
                    "checkpoint references unknown task {}",
                    snapshot.id
                )));
            }
        }

        // Nothing must be mutated until every snapshot has been validated above
        // (§7: "fatal; surface to caller without mutating in-memory state").
        for snapshot in checkpoint.tasks {
            if let Some(task) = self.tasks.get_mut(&snapshot.id) {
                task.restore_runtime_state(
                    snapshot.status,
                    snapshot.wave,
                    snapshot.attempts,
                    snapshot.dispatched_at,
                    snapshot.retry_after,
                    snapshot.owner_tier,
                    snapshot.output,
                    snapshot.partial_context,
                );
            }
        }
        self.current_wave = self.current_wave.max(checkpoint.current_wave);
        self.rebuild_wave_index();
        Ok(())
    }

    fn rebuild_wave_index(&mut self) {
        self.wave_index.clear();
        for (id, task) in &self.tasks {
            self.wave_index.entry(task.wave()).or_default().push(id.clone());
        }
    }

    /// Per-status counts plus the dispatchable-ready subset (§4.C.12).
    #[must_use]
    pub fn get_stats(&self, now: DateTime<Utc>) -> QueueStats {
        let mut stats = QueueStats::default();
        for task in self.tasks.values() {
            match task.status() {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Ready => {
                    stats.ready += 1;
                    if task.retry_after().is_none_or(|r| r <= now) {
                        stats.ready_dispatchable += 1;
                    }
                }
                TaskStatus::Dispatched => stats.dispatched += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Skipped => stats.skipped += 1,
                TaskStatus::Deleted => stats.deleted += 1,
            }
        }
        stats
    }

    /// Number of waves in the loaded decomposition.
    #[must_use]
    pub const fn num_waves(&self) -> usize {
        self.num_waves
    }
}

fn task_type_label(t: TaskType) -> &'static str {
    match t {
        TaskType::Research => "research",
        TaskType::Implement => "implement",
        TaskType::Test => "test",
        TaskType::Review => "review",
        TaskType::Refactor => "refactor",
        TaskType::Merge => "merge",
        TaskType::Fixup => "fixup",
    }
}

/// `(wave ASC, complexity DESC, id ASC)` — the deterministic dispatch order
/// required by §4.C.3/§5.
fn dispatch_order(a: &Task, b: &Task) -> std::cmp::Ordering {
    a.wave()
        .cmp(&b.wave())
        .then_with(|| b.complexity().cmp(&a.complexity()))
        .then_with(|| a.id().cmp(b.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DependencyGraph, ExecutionStrategy, FileConflictStrategy};
    use crate::domain::ports::NullEventSink;

    fn task(id: &str, deps: &[&str], complexity: u32) -> Task {
        Task::new(id, id, format!("desc {id}"), TaskType::Implement, complexity)
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

    fn queue(decomp: Decomposition, config: SwarmConfig) -> TaskQueue {
        TaskQueue::load_from_decomposition(decomp, config, Box::new(NullEventSink)).unwrap()
    }

    /// Scenario 1: linear chain, happy path.
    #[test]
    fn scenario_linear_chain_happy_path() {
        let decomp = decomposition(
            vec![task("a", &[], 1), task("b", &["a"], 1), task("c", &["b"], 1)],
            vec![vec!["a"], vec!["b"], vec!["c"]],
        );
        let mut q = queue(decomp, SwarmConfig::default());
        let now = Utc::now();

        q.mark_dispatched("a", "small").unwrap();
        q.mark_completed("a", "ok").unwrap();
        assert!(q.is_current_wave_complete());
        q.advance_wave();

        q.mark_dispatched("b", "small").unwrap();
        q.mark_completed("b", "ok").unwrap();
        assert!(q.is_current_wave_complete());
        q.advance_wave();

        q.mark_dispatched("c", "small").unwrap();
        q.mark_completed("c", "ok").unwrap();

        let stats = q.get_stats(now);
        assert_eq!(stats.completed, 3);
        assert_eq!(q.current_wave(), 2);
        assert!(q.is_complete());
    }

    /// Scenario 2: cascade-skip with maxRetries = 0.
    #[test]
    fn scenario_cascade_skip() {
        let decomp = decomposition(
            vec![task("a", &[], 1), task("b", &["a"], 1), task("c", &["b"], 1)],
            vec![vec!["a"], vec!["b"], vec!["c"]],
        );
        let mut config = SwarmConfig::default();
        config.max_retries = 0;
        let mut q = queue(decomp, config);
        let now = Utc::now();

        q.mark_dispatched("a", "small").unwrap();
        let retried = q.mark_failed("a", "boom").unwrap();
        assert!(!retried);

        let stats = q.get_stats(now);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(q.get("b").unwrap().status(), TaskStatus::Skipped);
        assert_eq!(q.get("c").unwrap().status(), TaskStatus::Skipped);
    }

    /// Scenario 3: partial-deps permissive (threshold = 0.5).
    #[test]
    fn scenario_partial_deps_permissive() {
        let decomp = decomposition(
            vec![
                task("a", &[], 1),
                task("b", &[], 1),
                task("c", &[], 1),
                task("d", &[], 1),
                task("merge", &["a", "b", "c", "d"], 1),
            ],
            vec![vec!["a", "b", "c", "d"], vec!["merge"]],
        );
        let mut config = SwarmConfig::default();
        config.partial_dependency_threshold = 0.5;
        config.max_retries = 0;
        let mut q = queue(decomp, config);

        for id in ["a", "b", "c"] {
            q.mark_dispatched(id, "small").unwrap();
            q.mark_completed(id, "ok").unwrap();
        }
        q.mark_dispatched("d", "small").unwrap();
        q.mark_failed("d", "boom").unwrap();

        q.advance_wave();

        let merge = q.get("merge").unwrap();
        assert_eq!(merge.status(), TaskStatus::Ready);
        let partial = merge.partial_context().unwrap();
        assert!((partial.ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(partial.succeeded.len(), 3);
        assert_eq!(partial.failed.len(), 1);

        let ctx = q.dependency_context("merge");
        assert!(ctx.contains("WARNING"));
        assert!(ctx.contains("3/4"));
    }

    /// Scenario 4: partial-deps strict (threshold = 1.0).
    #[test]
    fn scenario_partial_deps_strict() {
        let decomp = decomposition(
            vec![
                task("a", &[], 1),
                task("b", &[], 1),
                task("c", &[], 1),
                task("d", &[], 1),
                task("merge", &["a", "b", "c", "d"], 1),
            ],
            vec![vec!["a", "b", "c", "d"], vec!["merge"]],
        );
        let mut config = SwarmConfig::default();
        config.partial_dependency_threshold = 1.0;
        config.max_retries = 0;
        let mut q = queue(decomp, config);

        for id in ["a", "b", "c"] {
            q.mark_dispatched(id, "small").unwrap();
            q.mark_completed(id, "ok").unwrap();
        }
        q.mark_dispatched("d", "small").unwrap();
        q.mark_failed("d", "boom").unwrap();
        q.advance_wave();

        assert_eq!(q.get("merge").unwrap().status(), TaskStatus::Skipped);
    }

    /// Scenario 5: retry with cooldown.
    #[test]
    fn scenario_retry_with_cooldown() {
        let decomp = decomposition(vec![task("a", &[], 1)], vec![vec!["a"]]);
        let mut config = SwarmConfig::default();
        config.max_retries = 1;
        let mut q = queue(decomp, config);
        let now = Utc::now();

        q.mark_dispatched("a", "small").unwrap();
        let retried = q.mark_failed("a", "boom").unwrap();
        assert!(retried);

        let task = q.get("a").unwrap();
        assert_eq!(task.status(), TaskStatus::Ready);
        assert!(task.retry_after().unwrap() > now);
        assert!(q.get_ready_tasks(now).is_empty());
    }

    /// Scenario 7 (queue side): aggregate stats sum to subtask count (universal
    /// invariant in §8), exercised alongside a write-write conflict serialize check.
    #[test]
    fn conflict_serialize_pushes_later_task_to_distinct_wave() {
        let mut a = task("a", &[], 1);
        a = a.with_modifies(vec!["file.rs".to_string()]);
        let mut b = task("b", &[], 1);
        b = b.with_modifies(vec!["file.rs".to_string()]);
        let decomp = Decomposition {
            original_task: "test".to_string(),
            subtasks: vec![a, b],
            dependency_graph: DependencyGraph {
                execution_order: Vec::new(),
                parallel_groups: vec![vec![TaskId::normalize("a"), TaskId::normalize("b")]],
                cycles: Vec::new(),
            },
            conflicts: vec![Conflict {
                resource: "file.rs".to_string(),
                task_ids: vec![TaskId::normalize("a"), TaskId::normalize("b")],
                conflict_type: ConflictType::WriteWrite,
                severity: "high".to_string(),
                suggestion: "serialize".to_string(),
            }],
            strategy: ExecutionStrategy::Parallel,
        };
        let mut config = SwarmConfig::default();
        config.file_conflict_strategy = FileConflictStrategy::Serialize;
        let q = queue(decomp, config);
        assert_ne!(q.get("a").unwrap().wave(), q.get("b").unwrap().wave());
    }

    #[test]
    fn cyclic_decomposition_is_rejected() {
        let decomp = decomposition(vec![task("a", &["b"], 1), task("b", &["a"], 1)], vec![vec!["a", "b"]]);
        let result = TaskQueue::load_from_decomposition(decomp, SwarmConfig::default(), Box::new(NullEventSink));
        assert!(result.is_err());
    }

    #[test]
    fn checkpoint_round_trip_preserves_observable_state() {
        let decomp = decomposition(
            vec![task("a", &[], 1), task("b", &["a"], 1)],
            vec![vec!["a"], vec!["b"]],
        );
        let mut q = queue(decomp, SwarmConfig::default());
        q.mark_dispatched("a", "small").unwrap();

        let checkpoint = q.get_checkpoint_state();

        let decomp2 = decomposition(
            vec![task("a", &[], 1), task("b", &["a"], 1)],
            vec![vec!["a"], vec!["b"]],
        );
        let mut restored = queue(decomp2, SwarmConfig::default());
        restored.restore_from_checkpoint(checkpoint).unwrap();

        assert_eq!(restored.get("a").unwrap().status(), TaskStatus::Dispatched);
        assert_eq!(restored.current_wave(), q.current_wave());
    }

    #[test]
    fn reconcile_stale_dispatched_reverts_abandoned_lease() {
        let decomp = decomposition(vec![task("a", &[], 1)], vec![vec!["a"]]);
        let mut q = queue(decomp, SwarmConfig::default());
        q.mark_dispatched("a", "small").unwrap();

        let later = Utc::now() + chrono::Duration::milliseconds(10_000);
        let recovered = q.reconcile_stale_dispatched(1_000, later, &HashSet::new());
        assert_eq!(recovered, vec![TaskId::normalize("a")]);
        assert_eq!(q.get("a").unwrap().status(), TaskStatus::Ready);
    }
}
