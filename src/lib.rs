//! swarm-engine - task orchestration core for a multi-worker coding agent swarm.
//!
//! Three tightly coupled subsystems: a Fallback Provider Chain ([`services::provider_chain`])
//! over pluggable language-model backends, a Task Manager ([`services::task_manager`]) and
//! Task Queue & Wave Scheduler ([`services::task_queue`]) over the same DAG of work,
//! and a Worker Pool ([`services::worker_pool`]) of tiered execution slots. The
//! [`services::orchestrator`] binds the queue and pool into a single run loop; a
//! [`services::blackboard`] lets concurrently running workers share findings out of band.

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::error;
pub use domain::models;
pub use domain::ports;
