//! The structured event stream produced by the core (§6.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// One structured event. Variant names match the dotted event-name vocabulary used
/// throughout §4 (`task.created`, `provider.fallback`, etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    /// A task was created by the Task Manager.
    TaskCreated { task_id: TaskId, at: DateTime<Utc> },
    /// A task's fields were patched via `update`.
    TaskUpdated { task_id: TaskId, at: DateTime<Utc> },
    /// A task was handed to a worker slot.
    TaskDispatched { task_id: TaskId, tier: String, at: DateTime<Utc> },
    /// A task finished successfully.
    TaskCompleted { task_id: TaskId, at: DateTime<Utc> },
    /// A task terminally failed.
    TaskFailed { task_id: TaskId, reason: String, at: DateTime<Utc> },
    /// A task was cascade-skipped or explicitly cancelled.
    TaskSkipped { task_id: TaskId, reason: String, at: DateTime<Utc> },
    /// The wave scheduler advanced to a new wave.
    WaveAdvanced { wave: usize, at: DateTime<Utc> },
    /// A provider call succeeded.
    ProviderSuccess { provider: String, at: DateTime<Utc> },
    /// A provider call failed.
    ProviderFailure { provider: String, reason: String, at: DateTime<Utc> },
    /// The chain fell through from one provider to the next.
    ProviderFallback { from: String, to: String, at: DateTime<Utc> },
    /// A provider entered its cooldown window.
    ProviderCooldownStart { provider: String, until: DateTime<Utc>, at: DateTime<Utc> },
    /// A provider's cooldown elapsed.
    ProviderCooldownEnd { provider: String, at: DateTime<Utc> },
    /// Every provider in the chain failed for one call.
    ChainExhausted { at: DateTime<Utc> },
    /// A finding was posted to the blackboard.
    BlackboardFinding { agent_id: String, topic: String, at: DateTime<Utc> },
}
