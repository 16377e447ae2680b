//! Domain entities (§3 of the specification).

pub mod blackboard;
pub mod checkpoint;
pub mod decomposition;
pub mod event;
pub mod provider;
pub mod task;

pub use blackboard::{ClaimMode, Finding, FindingQuery, FindingType};
pub use checkpoint::{Checkpoint, TaskSnapshot, CHECKPOINT_VERSION};
pub use decomposition::{
    Conflict, ConflictType, Decomposition, DependencyGraph, ExecutionStrategy,
    FileConflictStrategy, FixupTask, SwarmConfig,
};
pub use event::Event;
pub use provider::{ChatMessage, ChatOptions, ChatResponse, CircuitState, ProviderHealth, ToolCall, ToolSpec};
pub use task::{PartialContext, Task, TaskId, TaskStatus, TaskType};
