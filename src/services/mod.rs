//! Application services (§4): the Task Manager, Task Queue & Wave Scheduler,
//! Worker Pool, Fallback Provider Chain, Shared Blackboard, and the Orchestrator
//! binding them together.

pub mod blackboard;
pub mod dependency;
pub mod orchestrator;
pub mod provider_chain;
pub mod task_manager;
pub mod task_queue;
pub mod worker_pool;

pub use blackboard::Blackboard;
pub use orchestrator::{EchoWorkerRunner, Orchestrator, OrchestratorConfig, TierPolicy};
pub use provider_chain::{ProviderChain, ProviderChainConfig};
pub use task_manager::TaskManager;
pub use task_queue::{QueueStats, TaskQueue};
pub use worker_pool::WorkerPool;
