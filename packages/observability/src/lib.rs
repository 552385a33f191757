//! # Observability
//!
//! Centralized tracing setup for nagare services.
//!
//! Services call [`init_with_config`] once at startup and use standard
//! `tracing` macros everywhere else. Where the lines end up (stderr, a JSONL
//! file, or both) is decided here and nowhere else.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "nagare".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! })?;
//! ```
//!
//! With a `log_path`, every event is also written as one JSON document per
//! line, so the file can be followed with `tail -f ... | jq`.

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{CentralLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every JSONL line.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file. No file layer is installed when `None`.
    pub log_path: Option<PathBuf>,

    /// Emit compact human-readable lines to stderr.
    pub also_stderr: bool,

    /// Targets whose events go to the JSONL file only, never to stderr.
    pub file_only_targets: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
            file_only_targets: Vec::new(),
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// Fails only when the JSONL file cannot be opened. Calling this twice in
/// one process is a no-op for the second call.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let json_layer = match &config.log_path {
        Some(path) => {
            let writer = CentralLogWriter::new(path)?;
            Some(
                JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
                    .with_filter(env_filter(&config.default_level)),
            )
        }
        None => None,
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(io::stderr)
            .with_filter(console_filter(
                env_filter(&config.default_level),
                &config.file_only_targets,
            ))
    });

    let _ = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init();

    if let Some(path) = &config.log_path {
        tracing::debug!(log_path = %path.display(), "observability initialized");
    }

    Ok(())
}

/// Build an env filter from `RUST_LOG`, falling back to `default_level`.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Silence `targets` on top of `base`.
fn console_filter(base: EnvFilter, targets: &[String]) -> EnvFilter {
    targets.iter().fold(base, |filter, target| {
        match format!("{}=off", target).parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    })
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
