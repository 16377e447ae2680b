//! Ambient infrastructure: configuration loading, logging setup, checkpoint
//! persistence. None of this is part of the spec's three core subsystems — it is
//! the surrounding stack every real deployment of the core needs, built the way
//! the teacher crate builds it (`infrastructure/config`, `infrastructure/logging`).

pub mod checkpoint;
pub mod config;
pub mod logging;
