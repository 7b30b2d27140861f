//! Tracker configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Which orchestration consumes the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Tracker runs inside the instrumented process.
    Online,
    /// Tracker rewrites a finished trace file.
    Offline,
}

/// Recognized configuration options, loadable from a JSON file. Every field
/// is defaulted, so an empty object is a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Events between scheduled reachability analyses.
    pub analysis_interval: u64,
    pub mode: Mode,
    /// Offline only: collect last-use witnesses in a first pass and delay
    /// each death past the object's last witnessed use.
    pub witness_aware: bool,
    /// Report every still-live object as dead at shutdown / end of trace.
    pub final_drain: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { analysis_interval: 500, mode: Mode::Offline, witness_aware: true, final_drain: true }
    }
}

impl TrackerConfig {
    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not deserialize.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}
