// SPDX-License-Identifier: Apache-2.0

//! Incremental tailing of growing log files.
//!
//! The [`FileMonitor`] turns file system notifications into reads. Each read
//! goes through the [`RuleMatcher`], which evaluates newly appended lines
//! against regex rules and reports hits to a [`MetricsSink`]. Read progress
//! lives in the [`PositionStore`] and is snapshotted to disk periodically, so
//! a restart resumes where the previous run stopped.

pub mod config;
pub mod error;
pub mod matcher;
pub mod metrics;
pub mod monitor;
pub mod position;
pub mod reader;
pub mod status;
pub mod watcher;

pub use config::MonitorConfig;
pub use error::{Error, Result};
pub use matcher::{MatchRule, RuleMatcher, ScanSummary};
pub use metrics::{CounterSnapshot, MatchCounters, MetricsSink};
pub use monitor::{FileMonitor, file_key};
pub use position::PositionStore;
pub use status::{FileStatus, StatusBoard};
pub use watcher::{FileEvent, WatchMode, WatcherConfig};
