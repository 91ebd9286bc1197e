//! Runtime tuning parameters.
//!
//! Values come from [`RuntimeConfig::default`], optionally overlaid with a TOML
//! file (see [`RuntimeConfigFile`]) and finally with command-line overrides.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Fallback worker count when the platform cannot report its parallelism.
const FALLBACK_WORKERS: usize = 2;

/// Worker pool sizing shared by the pool and the runtime that owns it.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Number of OS threads executing job bodies.
    pub workers: usize,
    /// Cap on jobs queued but not yet picked up; `None` means unbounded.
    pub queue_capacity: Option<usize>,
    /// Prefix for worker thread names (`<prefix>-<index>`).
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    /// One worker per available core, unbounded queue.
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: None,
            thread_name: "job-worker".to_string(),
        }
    }
}

/// On-disk form of [`RuntimeConfig`]; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfigFile {
    pub workers: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub thread_name: Option<String>,
}

impl RuntimeConfig {
    /// Load a config from a TOML file, filling gaps with defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read runtime config {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("load runtime config {:?}", path))
    }

    /// Parse a config from TOML text, filling gaps with defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: RuntimeConfigFile = toml::from_str(raw).context("parse runtime config")?;
        let config = Self::default().merged(file);
        config.validate()?;
        Ok(config)
    }

    /// Overlay the values present in `file` on top of `self`.
    pub fn merged(mut self, file: RuntimeConfigFile) -> Self {
        if let Some(workers) = file.workers {
            self.workers = workers;
        }
        if file.queue_capacity.is_some() {
            self.queue_capacity = file.queue_capacity;
        }
        if let Some(name) = file.thread_name {
            self.thread_name = name;
        }
        self
    }

    /// Reject configurations the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.queue_capacity == Some(0) {
            bail!("queue_capacity must be at least 1 when set");
        }
        if self.thread_name.trim().is_empty() {
            bail!("thread_name must not be empty");
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_WORKERS)
}
