//! The `Task` entity and its status state machine (§3.1, §4.C.2).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A task identifier. Ids may carry a `task-N` prefix; bare numeric shorthand
/// (`"N"`) is accepted as an alias at every public entry point via [`TaskId::normalize`].
///
/// Per the Design Note in SPEC_FULL.md §9 ("Shorthand id acceptance... implement as
/// a single normalization function applied uniformly at every public entry point;
/// never duplicate the rule") this is the *only* place shorthand expansion happens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Normalize a raw id string: bare numeric shorthand (`"3"`) becomes `"task-3"`;
    /// anything else is taken verbatim.
    #[must_use]
    pub fn normalize(raw: &str) -> Self {
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            Self(format!("task-{raw}"))
        } else {
            Self(raw.to_string())
        }
    }

    /// Borrow the normalized id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl From<String> for TaskId {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

/// The kind of work a task represents (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Investigate and report, producing no code change by itself.
    Research,
    /// Author new code/content fulfilling the task's description.
    Implement,
    /// Write or run tests against prior work.
    Test,
    /// Review a prior task's output.
    Review,
    /// Restructure existing code without changing behavior.
    Refactor,
    /// Reconcile outputs of parallel siblings (often the partial-deps merge point).
    Merge,
    /// Remedy a deficiency in a completed sibling task's output (§4.C.8).
    Fixup,
}

/// Lifecycle status of a task (§3.1, §4.C.2).
///
/// `Pending -> Ready -> Dispatched -> {Completed, Failed, Skipped}`, with `Deleted`
/// reachable only via an explicit `update(..., status: deleted)` and `Skipped`
/// reachable from any non-terminal state via cascade or explicit cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Loaded but not yet evaluated as runnable.
    Pending,
    /// Dependencies satisfied (subject to partial-deps policy); eligible for dispatch.
    Ready,
    /// A worker has been assigned; holds the worker pool slot.
    Dispatched,
    /// Finished successfully. Terminal, absorbing.
    Completed,
    /// Exhausted retries. Terminal, absorbing.
    Failed,
    /// Cascade-skipped or explicitly cancelled. Terminal, absorbing.
    Skipped,
    /// Explicitly removed by the Task Manager. Terminal, absorbing.
    Deleted,
}

impl TaskStatus {
    /// Terminal statuses are absorbing: no further transition is permitted except
    /// the explicit `deleted` escape hatch handled by the Task Manager directly.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Deleted
        )
    }
}

/// Context attached to a task that became ready despite some dependencies failing
/// (§3.1 "Partial-Context", §4.C.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialContext {
    /// Fraction of dependencies that completed successfully.
    pub ratio: f64,
    /// Ids of dependencies that completed successfully.
    pub succeeded: Vec<TaskId>,
    /// Ids of dependencies that did not complete successfully.
    pub failed: Vec<TaskId>,
}

/// A single unit of work (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    subject: String,
    description: String,
    active_form: String,
    task_type: TaskType,
    complexity: u32,
    dependencies: Vec<TaskId>,
    modifies: Vec<String>,
    reads: Vec<String>,
    metadata: HashMap<String, Value>,

    status: TaskStatus,
    wave: usize,
    attempts: u32,
    blocked_by: Vec<TaskId>,
    blocks: Vec<TaskId>,

    owner: Option<String>,
    dispatched_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    retry_after: Option<DateTime<Utc>>,
    owner_tier: Option<String>,
    output: Option<String>,
    partial_context: Option<PartialContext>,
    fail_reason: Option<String>,
}

impl Task {
    /// Build a new, `pending` task. `active_form` defaults to
    /// `"Working on " + lowercase(subject)"` per §4.B's `create` contract when `None`
    /// is passed.
    #[must_use]
    pub fn new(
        id: impl Into<TaskId>,
        subject: impl Into<String>,
        description: impl Into<String>,
        task_type: TaskType,
        complexity: u32,
    ) -> Self {
        let subject = subject.into();
        let active_form = format!("Working on {}", subject.to_lowercase());
        Self {
            id: id.into(),
            subject,
            description: description.into(),
            active_form,
            task_type,
            complexity: complexity.max(1),
            dependencies: Vec::new(),
            modifies: Vec::new(),
            reads: Vec::new(),
            metadata: HashMap::new(),
            status: TaskStatus::Pending,
            wave: 0,
            attempts: 0,
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            owner: None,
            dispatched_at: None,
            updated_at: Utc::now(),
            retry_after: None,
            owner_tier: None,
            output: None,
            partial_context: None,
            fail_reason: None,
        }
    }

    /// Override the progressive-tense display label.
    #[must_use]
    pub fn with_active_form(mut self, active_form: impl Into<String>) -> Self {
        self.active_form = active_form.into();
        self
    }

    /// Attach dependency ids. Does not itself populate `blocked_by`/`blocks`; the
    /// queue's graph-mutation methods own that invariant (§9 Design Note).
    #[must_use]
    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Declare logical resources this task writes.
    #[must_use]
    pub fn with_modifies(mut self, paths: Vec<String>) -> Self {
        self.modifies = paths;
        self
    }

    /// Declare logical resources this task reads.
    #[must_use]
    pub fn with_reads(mut self, paths: Vec<String>) -> Self {
        self.reads = paths;
        self
    }

    /// Attach opaque metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Task id.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Subject line.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Full description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Progressive-tense display label.
    #[must_use]
    pub fn active_form(&self) -> &str {
        &self.active_form
    }

    /// Task type.
    #[must_use]
    pub const fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Complexity score (≥ 1), used as the tie-breaker in dispatch ordering (§5).
    #[must_use]
    pub const fn complexity(&self) -> u32 {
        self.complexity
    }

    /// Declared dependency ids (not necessarily mirrored in `blocked_by` until the
    /// queue has processed the load event).
    #[must_use]
    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    /// Logical resources written.
    #[must_use]
    pub fn modifies(&self) -> &[String] {
        &self.modifies
    }

    /// Logical resources read.
    #[must_use]
    pub fn reads(&self) -> &[String] {
        &self.reads
    }

    /// Opaque metadata map.
    #[must_use]
    pub const fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Mutable access to metadata, used by `update` patches and recovery stamping.
    pub fn metadata_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.metadata
    }

    /// Current lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Wave index assigned at load time (§4.C.2).
    #[must_use]
    pub const fn wave(&self) -> usize {
        self.wave
    }

    /// Set the wave index. Used by the queue during load and conflict serialization.
    pub const fn set_wave(&mut self, wave: usize) {
        self.wave = wave;
    }

    /// Number of dispatch attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Ids of tasks this task is blocked by.
    #[must_use]
    pub fn blocked_by(&self) -> &[TaskId] {
        &self.blocked_by
    }

    /// Ids of tasks this task blocks.
    #[must_use]
    pub fn blocks(&self) -> &[TaskId] {
        &self.blocks
    }

    /// Add an entry to `blocked_by` if not already present (idempotent, §4.B).
    pub fn add_blocked_by(&mut self, id: TaskId) {
        if !self.blocked_by.contains(&id) {
            self.blocked_by.push(id);
        }
    }

    /// Add an entry to `blocks` if not already present (idempotent, §4.B).
    pub fn add_blocks(&mut self, id: TaskId) {
        if !self.blocks.contains(&id) {
            self.blocks.push(id);
        }
    }

    /// Remove every occurrence of `id` from both adjacency lists (used when a task
    /// is deleted, per §4.B's `update(..., status: deleted)` contract).
    pub fn scrub_edge(&mut self, id: &TaskId) {
        self.blocked_by.retain(|x| x != id);
        self.blocks.retain(|x| x != id);
    }

    /// Current owner, if claimed. A `pending` task must never observe `Some` here
    /// outside of the brief window before invariant repair runs (§4.B).
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Clear the owner unconditionally. Used by invariant repair on load and by
    /// stale-lease reconciliation.
    pub fn clear_owner(&mut self) {
        self.owner = None;
    }

    /// Timestamp of last mutation.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Timestamp the task entered `dispatched`, if applicable.
    #[must_use]
    pub const fn dispatched_at(&self) -> Option<DateTime<Utc>> {
        self.dispatched_at
    }

    /// Earliest time at which this task becomes eligible for dispatch again, if a
    /// retry cooldown is in effect (§4.C.7).
    #[must_use]
    pub const fn retry_after(&self) -> Option<DateTime<Utc>> {
        self.retry_after
    }

    /// Worker pool tier that claimed this task while dispatched.
    #[must_use]
    pub fn owner_tier(&self) -> Option<&str> {
        self.owner_tier.as_deref()
    }

    /// Stored result output once completed.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    /// Partial-dependency context, if this task was promoted to ready despite a
    /// dependency failure (§4.C.5).
    #[must_use]
    pub const fn partial_context(&self) -> Option<&PartialContext> {
        self.partial_context.as_ref()
    }

    /// Human-readable reason this task failed or was skipped, if any.
    #[must_use]
    pub fn fail_reason(&self) -> Option<&str> {
        self.fail_reason.as_deref()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Transition to `ready`. Caller (the queue) is responsible for checking the
    /// precondition (`pending ∧ ¬blocked ∧ wave ≤ currentWave`); this method only
    /// performs the state change and timestamp bump.
    pub fn promote_to_ready(&mut self) {
        self.status = TaskStatus::Ready;
        self.touch();
    }

    /// Transition to `dispatched`, recording the assigned tier and timestamp.
    pub fn mark_dispatched(&mut self, tier: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Dispatched;
        self.owner_tier = Some(tier.into());
        self.dispatched_at = Some(now);
        self.attempts += 1;
        self.updated_at = now;
    }

    /// Transition to `completed`, storing the result output. A no-op (early return)
    /// if the task is already `skipped` or `failed`, per the absorbing-terminal
    /// invariant in §3.1/§9.
    pub fn mark_completed(&mut self, output: impl Into<String>, now: DateTime<Utc>) {
        if matches!(self.status, TaskStatus::Skipped | TaskStatus::Failed) {
            return;
        }
        self.status = TaskStatus::Completed;
        self.output = Some(output.into());
        self.updated_at = now;
    }

    /// Revert to `ready` with a retry cooldown set, per §4.C.2's `markFailed` retry branch.
    pub fn reschedule_retry(&mut self, retry_after: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = TaskStatus::Ready;
        self.retry_after = Some(retry_after);
        self.dispatched_at = None;
        self.owner_tier = None;
        self.updated_at = now;
    }

    /// Transition to `failed` terminally (retries exhausted).
    pub fn mark_failed_terminal(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.fail_reason = Some(reason.into());
        self.updated_at = now;
    }

    /// Cascade-skip or explicit cancel: transition to `skipped` with a reason.
    pub fn mark_skipped(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Skipped;
        self.fail_reason = Some(reason.into());
        self.updated_at = now;
    }

    /// Attach a partial-dependency context (§4.C.5).
    pub fn set_partial_context(&mut self, context: PartialContext) {
        self.partial_context = Some(context);
    }

    /// Clear the retry cooldown (used once it has elapsed and the task dispatches).
    pub fn clear_retry_after(&mut self) {
        self.retry_after = None;
    }

    /// Overlay the mutable runtime fields carried by a [`super::checkpoint::TaskSnapshot`]
    /// (§4.C.11). Structural fields (subject/description/dependencies/...) are left
    /// untouched — they come from re-loading the decomposition, not the checkpoint.
    #[allow(clippy::too_many_arguments)]
    pub fn restore_runtime_state(
        &mut self,
        status: TaskStatus,
        wave: usize,
        attempts: u32,
        dispatched_at: Option<DateTime<Utc>>,
        retry_after: Option<DateTime<Utc>>,
        owner_tier: Option<String>,
        output: Option<String>,
        partial_context: Option<PartialContext>,
    ) {
        self.status = status;
        self.wave = wave;
        self.attempts = attempts;
        self.dispatched_at = dispatched_at;
        self.retry_after = retry_after;
        self.owner_tier = owner_tier;
        self.output = output;
        self.partial_context = partial_context;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_id_normalizes_to_prefixed_form() {
        assert_eq!(TaskId::normalize("3").as_str(), "task-3");
        assert_eq!(TaskId::normalize("task-3").as_str(), "task-3");
        assert_eq!(TaskId::normalize("merge").as_str(), "merge");
    }

    #[test]
    fn default_active_form_is_derived_from_subject() {
        let t = Task::new("task-1", "Write Parser", "desc", TaskType::Implement, 2);
        assert_eq!(t.active_form(), "Working on write parser");
    }

    #[test]
    fn complete_after_skip_is_a_no_op() {
        let mut t = Task::new("task-1", "x", "d", TaskType::Implement, 1);
        let now = Utc::now();
        t.mark_skipped("cascade", now);
        t.mark_completed("late result", now);
        assert_eq!(t.status(), TaskStatus::Skipped);
        assert!(t.output().is_none());
    }

    #[test]
    fn complete_after_failed_is_a_no_op() {
        let mut t = Task::new("task-1", "x", "d", TaskType::Implement, 1);
        let now = Utc::now();
        t.mark_failed_terminal("boom", now);
        t.mark_completed("late result", now);
        assert_eq!(t.status(), TaskStatus::Failed);
    }

    #[test]
    fn blocked_by_add_is_idempotent() {
        let mut t = Task::new("task-1", "x", "d", TaskType::Implement, 1);
        let dep = TaskId::normalize("task-0");
        t.add_blocked_by(dep.clone());
        t.add_blocked_by(dep.clone());
        assert_eq!(t.blocked_by().len(), 1);
    }

    #[test]
    fn scrub_edge_removes_from_both_lists() {
        let mut t = Task::new("task-1", "x", "d", TaskType::Implement, 1);
        let other = TaskId::normalize("task-2");
        t.add_blocked_by(other.clone());
        t.add_blocks(other.clone());
        t.scrub_edge(&other);
        assert!(t.blocked_by().is_empty());
        assert!(t.blocks().is_empty());
    }

    #[test]
    fn terminal_statuses_are_absorbing() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(TaskStatus::Deleted.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
        assert!(!TaskStatus::Dispatched.is_terminal());
    }
}
