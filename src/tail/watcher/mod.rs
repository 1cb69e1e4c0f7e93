// SPDX-License-Identifier: Apache-2.0

//! File system watcher abstractions for the file monitor.
//!
//! This module provides two watching strategies:
//! - **Native watching**: Uses OS-level file system notifications (inotify on Linux,
//!   FSEvents on macOS, ReadDirectoryChangesW on Windows) for immediate event detection.
//! - **Poll watching**: Falls back to periodic directory scans for environments
//!   where native watching isn't available or reliable (e.g., NFS, network shares).
//!
//! Every backend delivers events and asynchronous errors on two separate
//! channels, see [`WatchChannels`].

mod native;
mod poll;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use traits::{
    FileEvent, FileWatcher, WatchChannels, WatchSenders, WatcherError, watch_channels,
};

use std::time::Duration;

use serde::Deserialize;

/// Watch mode configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchMode {
    /// Tries native watching first, falls back to polling on failure.
    #[default]
    Auto,
    /// Force native file system watching (inotify/kqueue/FSEvents).
    Native,
    /// Force polling mode. Use this for network file systems (NFS).
    Poll,
}

impl std::str::FromStr for WatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(WatchMode::Auto),
            "native" => Ok(WatchMode::Native),
            "poll" | "polling" => Ok(WatchMode::Poll),
            _ => Err(format!(
                "Invalid watch mode '{}'. Valid options: auto, native, poll",
                s
            )),
        }
    }
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Watch mode: auto, native, or poll
    pub mode: WatchMode,
    /// Interval between directory scans in poll mode
    pub poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Create a watcher based on the configuration.
///
/// In `Auto` mode, this tries native watching first and falls back to polling
/// if native watching fails to initialize.
pub fn create_watcher(
    config: &WatcherConfig,
) -> Result<(Box<dyn FileWatcher>, WatchChannels), WatcherError> {
    match config.mode {
        WatchMode::Native => {
            let (watcher, channels) = NativeWatcher::new()?;
            Ok((Box::new(watcher), channels))
        }
        WatchMode::Poll => {
            let (watcher, channels) = PollWatcher::new(config.poll_interval)?;
            Ok((Box::new(watcher), channels))
        }
        WatchMode::Auto => match NativeWatcher::new() {
            Ok((watcher, channels)) => {
                tracing::info!("Using native file system watcher");
                Ok((Box::new(watcher), channels))
            }
            Err(e) => {
                tracing::warn!(
                    "Native file watching unavailable ({}), falling back to polling",
                    e
                );
                let (watcher, channels) = PollWatcher::new(config.poll_interval)?;
                Ok((Box::new(watcher), channels))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_mode_from_str() {
        assert_eq!("auto".parse::<WatchMode>().unwrap(), WatchMode::Auto);
        assert_eq!("native".parse::<WatchMode>().unwrap(), WatchMode::Native);
        assert_eq!("poll".parse::<WatchMode>().unwrap(), WatchMode::Poll);
        assert_eq!("polling".parse::<WatchMode>().unwrap(), WatchMode::Poll);
        assert_eq!("AUTO".parse::<WatchMode>().unwrap(), WatchMode::Auto);
        assert!("invalid".parse::<WatchMode>().is_err());
    }

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.mode, WatchMode::Auto);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_create_poll_watcher() {
        let config = WatcherConfig {
            mode: WatchMode::Poll,
            poll_interval: Duration::from_secs(60),
        };
        let (watcher, _channels) = create_watcher(&config).unwrap();
        assert_eq!(watcher.backend_name(), "poll");
    }
}
