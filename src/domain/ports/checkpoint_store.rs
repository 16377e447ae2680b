//! Checkpoint persistence port (§4.C.11, §4.E, §6.3).
//!
//! Grounded on the teacher's repository port shape (`domain/ports/task_repository.rs`):
//! an `#[async_trait]` trait returning owned values, no leaked storage details.

use async_trait::async_trait;

use crate::domain::models::Checkpoint;

/// Persists and retrieves the single checkpoint the Orchestrator resumes from.
///
/// Out of scope per §1 ("persistence back-ends beyond the markdown/checkpoint
/// serialization defined here") is anything beyond this one artifact; the core
/// only needs load/save of the latest snapshot.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist `checkpoint`, replacing whatever was previously stored.
    async fn save(&self, checkpoint: &Checkpoint) -> anyhow::Result<()>;

    /// Load the most recently saved checkpoint, if any exists yet.
    async fn load(&self) -> anyhow::Result<Option<Checkpoint>>;
}
