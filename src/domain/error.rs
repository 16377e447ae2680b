//! Typed error enums for every subsystem boundary.
//!
//! Each enum is deliberately scoped to one component of §4 rather than a single
//! crate-wide error type, mirroring the teacher's per-domain `thiserror` enums.

use thiserror::Error;

use crate::domain::models::task::TaskStatus;

/// Errors raised by the Task Manager (§4.B).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskManagerError {
    /// No task with the given id (after shorthand normalization) exists.
    #[error("task not found: {0}")]
    NotFound(String),

    /// A task with the given id already exists.
    #[error("task already exists: {0}")]
    AlreadyExists(String),

    /// A `blockedBy`/`blocks` edge would reference a nonexistent task.
    #[error("dangling dependency edge: {0} references unknown task {1}")]
    DanglingEdge(String, String),
}

/// Errors raised by the Task Queue & Wave Scheduler (§4.C).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The decomposition's dependency graph contains at least one cycle; rejected
    /// wholesale per §4.C.1 / §7 ("Decomposition cycle... reject... no partial state
    /// is committed").
    #[error("decomposition rejected: {0} cycle(s) detected")]
    CyclicDecomposition(usize),

    /// No task with the given id exists in the queue.
    #[error("task not found: {0}")]
    NotFound(String),

    /// The requested transition's precondition was not met (§4.C.2's table).
    #[error("invalid transition for task {id}: {from:?} does not permit this event")]
    InvalidTransition {
        /// Task id the transition was attempted on.
        id: String,
        /// The task's status at the time of the attempt.
        from: TaskStatus,
    },

    /// Checkpoint restoration failed; the in-memory queue is left untouched (§7).
    #[error("checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),
}

/// Errors raised by the Fallback Provider Chain (§4.A).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderChainError {
    /// Rate limit exceeded on a provider call.
    #[error("rate limited")]
    RateLimited,

    /// Authentication failed; cooldown is indefinite until cleared by the operator.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A network-level failure (connection refused, DNS, timeout, etc).
    #[error("network error: {0}")]
    NetworkError(String),

    /// An error that does not fit any other classified category.
    #[error("unknown provider error: {0}")]
    Unknown(String),

    /// Every provider in the chain failed; aggregate error chosen by the priority
    /// rule in §4.A (`RATE_LIMITED` > `AUTHENTICATION_FAILED` > `NETWORK_ERROR` > `UNKNOWN`).
    #[error("chain exhausted: {0}")]
    ChainExhausted(Box<ProviderChainError>),

    /// `chat`/`chat_with_tools` was called with no providers configured.
    #[error("no providers configured")]
    NotConfigured,
}

impl ProviderChainError {
    /// Relative priority used when aggregating failures across a chain (§4.A).
    /// Higher value wins.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        match self {
            Self::RateLimited => 3,
            Self::AuthenticationFailed(_) => 2,
            Self::NetworkError(_) => 1,
            Self::ChainExhausted(_) | Self::Unknown(_) | Self::NotConfigured => 0,
        }
    }

    /// True when this failure class should be retried by the caller against the
    /// next candidate provider (all but `AuthenticationFailed`, per §7's policy
    /// that auth failures are "fatal for that provider").
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::AuthenticationFailed(_))
    }
}

/// Errors raised by the Shared Blackboard (§4.F).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlackboardError {
    /// A resource is already claimed in `exclusive` mode by another agent.
    #[error("resource {0} already exclusively claimed by {1}")]
    AlreadyClaimed(String, String),

    /// Attempted to release a claim that does not exist for the given agent.
    #[error("no claim on {0} held by {1}")]
    NoSuchClaim(String, String),
}
