//! Checkpoint snapshot format (§3.1, §4.C.11, §6.3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::task::{PartialContext, TaskId, TaskStatus};

/// The current on-disk checkpoint format version. Bumped only on a breaking change
/// to the shape below; within a major version, unknown fields round-trip losslessly
/// via `extra` (§6.3: "Backward compatibility is required within a major version").
pub const CHECKPOINT_VERSION: u32 = 1;

/// Per-task state sufficient to reconstruct queue behavior (§3.1's "Checkpoint" entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// Task id.
    pub id: TaskId,
    /// Status at checkpoint time. `dispatched` is preserved as-is (§4.C.11); the
    /// Orchestrator, not the checkpoint format, is responsible for reconciling it.
    pub status: TaskStatus,
    /// Wave index.
    pub wave: usize,
    /// Attempts made so far.
    pub attempts: u32,
    /// Timestamp the task was last dispatched, if applicable.
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Retry-cooldown expiry, if a retry is scheduled.
    pub retry_after: Option<DateTime<Utc>>,
    /// Worker pool tier that owned this task while dispatched.
    pub owner_tier: Option<String>,
    /// Stored result output, if completed.
    pub output: Option<String>,
    /// Partial-dependency context, if applicable.
    pub partial_context: Option<PartialContext>,
    /// Fields not recognized by this version of the format, preserved verbatim for
    /// forward/backward round-tripping.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A fully serializable snapshot of queue state (§4.C.11, §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format version; readers should reject checkpoints with a higher major
    /// version than they understand (§7: "Checkpoint corruption... fatal").
    pub version: u32,
    /// The wave the queue had reached at checkpoint time.
    pub current_wave: usize,
    /// Per-task snapshots.
    pub tasks: Vec<TaskSnapshot>,
    /// Owners considered active at checkpoint time (used to seed
    /// `reconcileStaleDispatched` on resume, §4.E).
    pub active_owners: Vec<String>,
    /// Fields not recognized by this version of the format.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}
