//! Inputs to the Task Queue: `Decomposition`, `DependencyGraph`, `Conflict` (§3.1, §4.C.1).

use serde::{Deserialize, Serialize};

use super::task::{Task, TaskId};

/// Overall execution strategy the decomposer recommends (not currently branched on
/// by the queue beyond informing defaults; carried through for worker-facing context).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Tasks may run fully in parallel within a wave.
    Parallel,
    /// Tasks should run one at a time regardless of wave grouping.
    Sequential,
    /// A mix, left to the conflict/wave machinery to resolve.
    Hybrid,
}

/// The kind of resource conflict the decomposer flagged between two or more tasks (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    /// Both tasks write the same resource.
    WriteWrite,
    /// One task reads what another writes.
    ReadWrite,
    /// Symmetric case of `ReadWrite`, kept distinct for fidelity to the source model.
    WriteRead,
}

/// A flagged resource conflict between tasks (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Logical resource name (typically a file path) in contention.
    pub resource: String,
    /// Ids of the tasks in contention over the resource.
    pub task_ids: Vec<TaskId>,
    /// The kind of conflict.
    pub conflict_type: ConflictType,
    /// Decomposer-assigned severity label (opaque to the queue; surfaced verbatim).
    pub severity: String,
    /// A human-readable suggestion for resolving the conflict.
    pub suggestion: String,
}

/// How the queue resolves flagged write-write conflicts when assigning waves (§4.C.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileConflictStrategy {
    /// Guarantee conflicting tasks land in different waves.
    Serialize,
    /// Leave wave assignment as-is; annotate the conflict as a warning instead.
    MergeWarn,
}

/// The dependency DAG handed down by the decomposer (§3.1).
///
/// The queue assumes `cycles` is empty; a non-empty list is a hard reject at load
/// time (§4.C.1, §7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// A topological sort of all task ids.
    pub execution_order: Vec<TaskId>,
    /// Parallel groups ("waves") the decomposer declares independent; index in this
    /// list is the task's initial wave assignment (§4.C.2's Load event).
    pub parallel_groups: Vec<Vec<TaskId>>,
    /// Detected cycles, each expressed as the ordered list of ids forming the cycle.
    /// Must be empty for the queue to accept the decomposition.
    pub cycles: Vec<Vec<TaskId>>,
}

/// The full input handed from the decomposer to the Orchestrator (§3.1, §4.C.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    /// A human-readable label for the overall goal being decomposed.
    pub original_task: String,
    /// The tasks themselves.
    pub subtasks: Vec<Task>,
    /// The dependency DAG over `subtasks`.
    pub dependency_graph: DependencyGraph,
    /// Resource conflicts flagged between subtasks.
    pub conflicts: Vec<Conflict>,
    /// Recommended execution strategy.
    pub strategy: ExecutionStrategy,
}

/// Swarm-wide tunables consumed by the Task Queue (§4.C.1) and Orchestrator (§4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Maximum retry attempts per task before it is terminally `failed` (§4.C.2).
    pub max_retries: u32,
    /// Fraction of dependencies that must succeed for a dependent to become ready
    /// (§4.C.5). `1.0` is strict (default), `0.0` is best-effort.
    pub partial_dependency_threshold: f64,
    /// How write-write conflicts affect wave assignment (§4.C.6).
    pub file_conflict_strategy: FileConflictStrategy,
    /// Base backoff in milliseconds for retry cooldowns; actual delay is
    /// `retry_backoff_ms * 2^attempts` (§4.C.2).
    pub retry_backoff_ms: u64,
    /// Character limit each dependency's output is truncated to when synthesizing
    /// dependency context (§4.C.9).
    pub dependency_context_truncate_chars: usize,
    /// Window after which a `dispatched` task with no corresponding active worker
    /// is considered stale (§4.C.10, §4.E).
    pub stale_after_ms: u64,
    /// How often the Orchestrator persists a checkpoint (§4.E).
    pub checkpoint_interval_ms: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            partial_dependency_threshold: 1.0,
            file_conflict_strategy: FileConflictStrategy::Serialize,
            retry_backoff_ms: 1_000,
            dependency_context_truncate_chars: 2_000,
            stale_after_ms: 300_000,
            checkpoint_interval_ms: 30_000,
        }
    }
}

/// A task inserted into the current wave to remedy a completed sibling's deficient
/// output (§4.C.8, §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixupTask {
    /// The task being constructed for the fixup.
    pub task: Task,
    /// Id of the sibling task this fixup addresses.
    pub fixes_task_id: TaskId,
    /// Instructions describing what must change, embedded in the worker prompt.
    pub fix_instructions: String,
}
