// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

use crate::tail::watcher::WatcherError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid rule pattern {pattern:?}: {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid glob pattern {pattern:?}: {message}")]
    InvalidGlob { pattern: String, message: String },

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),

    #[error("Watcher channel closed")]
    WatcherClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
