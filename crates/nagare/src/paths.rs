//! File system paths for nagare.

use crate::error::{NagareError, NagareResult};
use std::path::PathBuf;

/// Manages file system paths for nagare (`~/.nagare`).
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.nagare`.
    pub fn new() -> NagareResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| NagareError::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".nagare"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.nagare).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.nagare/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the logs directory (~/.nagare/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the tracing JSONL file (~/.nagare/logs/nagare.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("nagare.jsonl")
    }
}
