// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

use crate::tail::matcher::MatchRule;
use crate::tail::watcher::WatchMode;

/// Watch mode for file system monitoring
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WatchModeArg {
    /// Native watching first, polling if it cannot be initialized
    #[default]
    Auto,
    /// Force native file system watching (inotify/kqueue/FSEvents)
    Native,
    /// Force polling mode (use for NFS or when native watching is unreliable)
    Poll,
}

impl From<WatchModeArg> for WatchMode {
    fn from(w: WatchModeArg) -> Self {
        match w {
            WatchModeArg::Auto => WatchMode::Auto,
            WatchModeArg::Native => WatchMode::Native,
            WatchModeArg::Poll => WatchMode::Poll,
        }
    }
}

/// Flags of `tailmatch start`.
///
/// Every flag is optional; unset flags leave the value from the
/// configuration file, the environment or the built-in default in place.
#[derive(Debug, Args, Clone, Default)]
pub struct StartArgs {
    /// Path to a TOML configuration file
    #[arg(long, short = 'c', env = "TAILMATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma-separated directories to watch
    #[arg(long, env = "TAILMATCH_PATHS", value_delimiter = ',')]
    pub paths: Vec<PathBuf>,

    /// Comma-separated glob patterns matched against file names (default "*.log")
    #[arg(long, env = "TAILMATCH_PATTERNS", value_delimiter = ',')]
    pub patterns: Vec<String>,

    /// Match rule as LEVEL:REGEX, may be repeated (e.g. --rule critical:ERROR)
    #[arg(long = "rule", value_parser = parse_rule)]
    pub rules: Vec<MatchRule>,

    /// Path of the position store file (default "positions.json")
    #[arg(long, env = "TAILMATCH_POSITION_STORE")]
    pub position_store: Option<PathBuf>,

    /// Seconds between position store snapshots (default 5)
    #[arg(long, env = "TAILMATCH_POSITION_INTERVAL")]
    pub position_interval: Option<u64>,

    /// Read buffer size in bytes, longer lines are matched on their prefix (default 4096)
    #[arg(long, env = "TAILMATCH_BUFFER_SIZE")]
    pub buffer_size: Option<usize>,

    /// Watch mode: auto (default), native (inotify/kqueue/FSEvents), poll (for NFS)
    #[arg(value_enum, long, env = "TAILMATCH_WATCH_MODE")]
    pub watch_mode: Option<WatchModeArg>,

    /// Poll interval in milliseconds, used in poll mode or as fallback (default 250)
    #[arg(long, env = "TAILMATCH_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Seconds to wait for tasks to finish on shutdown
    #[arg(long, env = "TAILMATCH_SHUTDOWN_TIMEOUT_SECS", default_value = "10")]
    pub shutdown_timeout_secs: u64,
}

/// Parse a `LEVEL:REGEX` rule. The level ends at the first colon, so the
/// pattern itself may contain colons.
pub fn parse_rule(s: &str) -> Result<MatchRule, String> {
    let (level, pattern) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid rule `{s}`: expected LEVEL:REGEX"))?;

    let level = level.trim();
    if level.is_empty() {
        return Err(format!("invalid rule `{s}`: level is empty"));
    }
    if pattern.is_empty() {
        return Err(format!("invalid rule `{s}`: pattern is empty"));
    }

    Ok(MatchRule::new(pattern, level))
}
