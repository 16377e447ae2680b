//! Structured logging setup via `tracing-subscriber` (ambient stack, carried
//! regardless of the spec's Non-goals per the "ambient concerns" rule).
//!
//! Grounded on the teacher's `infrastructure/logging/{config.rs,logger.rs}`: a
//! `LogConfig` struct plus a `LoggerImpl::init` that builds stdout and (optionally)
//! rotating-file `tracing-subscriber` layers gated by an `EnvFilter`.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format for the stdout layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON, one object per line.
    Json,
    /// Human-readable, ANSI-colored.
    Pretty,
}

/// How often the file appender rotates, when file logging is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// Roll over once per day.
    Daily,
    /// Roll over once per hour.
    Hourly,
    /// Never roll over; append to a single file.
    Never,
}

/// Logging configuration (§ambient stack).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Stdout output format.
    pub format: LogFormat,
    /// Directory for rotating log files; `None` means stdout-only.
    pub log_dir: Option<PathBuf>,
    /// File rotation policy, when `log_dir` is set.
    pub rotation: RotationPolicy,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            log_dir: None,
            rotation: RotationPolicy::Daily,
        }
    }
}

/// Holds the non-blocking writer guard(s) that must stay alive for the lifetime
/// of the process for buffered log lines to actually flush.
pub struct LoggingHandle {
    _guard: Option<WorkerGuard>,
}

/// Initialize the global `tracing` subscriber from a [`LogConfig`].
///
/// # Errors
/// Returns an error if `config.level` does not parse as a `tracing::Level`.
pub fn init(config: &LogConfig) -> anyhow::Result<LoggingHandle> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.parse()?)
        .from_env_lossy();

    if let Some(log_dir) = &config.log_dir {
        let appender = match config.rotation {
            RotationPolicy::Daily => rolling::daily(log_dir, "swarm-engine.log"),
            RotationPolicy::Hourly => rolling::hourly(log_dir, "swarm-engine.log"),
            RotationPolicy::Never => rolling::never(log_dir, "swarm-engine.log"),
        };
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true);

        match config.format {
            LogFormat::Json => {
                let stdout_layer = tracing_subscriber::fmt::layer().json().with_writer(io::stdout);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(stdout_layer)
                    .try_init()?;
            }
            LogFormat::Pretty => {
                let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout);
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(stdout_layer)
                    .try_init()?;
            }
        }
        Ok(LoggingHandle { _guard: Some(guard) })
    } else {
        match config.format {
            LogFormat::Json => {
                let stdout_layer = tracing_subscriber::fmt::layer().json().with_writer(io::stdout);
                tracing_subscriber::registry().with(env_filter).with(stdout_layer).try_init()?;
            }
            LogFormat::Pretty => {
                let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout);
                tracing_subscriber::registry().with(env_filter).with(stdout_layer).try_init()?;
            }
        }
        Ok(LoggingHandle { _guard: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_config_is_json_stdout_only() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.log_dir.is_none());
    }
}
