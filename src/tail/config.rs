// SPDX-License-Identifier: Apache-2.0

//! Configuration snapshot consumed by the tailing core.

use std::path::PathBuf;
use std::time::Duration;

use glob::Pattern;

use crate::tail::error::{Error, Result};
use crate::tail::matcher::MatchRule;
use crate::tail::position::DEFAULT_SNAPSHOT_INTERVAL;
use crate::tail::watcher::WatcherConfig;

pub const DEFAULT_PATTERN: &str = "*.log";
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_POSITIONS_PATH: &str = "positions.json";

/// Configuration for the file monitor and its collaborators
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directories whose direct entries are watched
    pub directories: Vec<PathBuf>,
    /// Glob patterns matched against file basenames
    pub patterns: Vec<String>,
    /// Ordered match rules
    pub rules: Vec<MatchRule>,
    /// Read buffer size, also the longest line prefix that is matched
    pub buffer_size: usize,
    /// Where offsets are persisted
    pub positions_path: PathBuf,
    /// Delay between position snapshots
    pub snapshot_interval: Duration,
    pub watcher: WatcherConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            patterns: vec![DEFAULT_PATTERN.to_string()],
            rules: Vec::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            positions_path: PathBuf::from(DEFAULT_POSITIONS_PATH),
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            watcher: WatcherConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.directories.is_empty() {
            return Err(Error::Config(
                "At least one directory to watch must be specified".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("Buffer size must be greater than zero".to_string()));
        }
        if self.snapshot_interval.is_zero() {
            return Err(Error::Config(
                "Position update interval must be greater than zero".to_string(),
            ));
        }
        if self.watcher.poll_interval.is_zero() {
            return Err(Error::Config("Poll interval must be greater than zero".to_string()));
        }
        self.compile_patterns()?;
        Ok(())
    }

    /// Compile the file name globs
    pub fn compile_patterns(&self) -> Result<Vec<Pattern>> {
        if self.patterns.is_empty() {
            return Err(Error::Config(
                "At least one file pattern must be specified".to_string(),
            ));
        }
        self.patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| Error::InvalidGlob {
                    pattern: p.clone(),
                    message: e.msg.to_string(),
                })
            })
            .collect()
    }
}
