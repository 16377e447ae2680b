//! Ports (trait seams) the core depends on but does not implement in full (§1, §6.1).

pub mod checkpoint_store;
pub mod event_sink;
pub mod provider;
pub mod worker;

pub use checkpoint_store::CheckpointStore;
pub use event_sink::{CallbackEventSink, EventSink, NullEventSink};
pub use provider::LanguageModelProvider;
pub use worker::{SwarmTaskResult, WorkerRunner};
