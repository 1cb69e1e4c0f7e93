// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use serde::Serialize;

/// Read progress of one watched file, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStatus {
    pub filename: String,
    pub offset: u64,
    pub size: u64,
    /// `offset / size`, 1.0 for an empty file
    pub progress: f64,
    /// Rule hits seen in this file since the process started
    pub matches: u64,
    pub last_modified: Option<SystemTime>,
}

impl FileStatus {
    fn progress(offset: u64, size: u64) -> f64 {
        if size == 0 {
            1.0
        } else {
            (offset as f64 / size as f64).min(1.0)
        }
    }
}

/// Per-file status kept by the monitor and read by reporting layers.
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    files: Arc<RwLock<BTreeMap<String, FileStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the result of a read. `matches` is added to the file's running
    /// count; `reset` starts the count over for a new file identity.
    pub fn record_scan(
        &self,
        filename: &str,
        offset: u64,
        size: u64,
        matches: u64,
        last_modified: Option<SystemTime>,
        reset: bool,
    ) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        let status = files
            .entry(filename.to_string())
            .or_insert_with(|| FileStatus {
                filename: filename.to_string(),
                offset: 0,
                size: 0,
                progress: 1.0,
                matches: 0,
                last_modified: None,
            });

        if reset {
            status.matches = 0;
        }
        status.offset = offset;
        status.size = size.max(offset);
        status.progress = FileStatus::progress(offset, status.size);
        status.matches += matches;
        status.last_modified = last_modified;
    }

    pub fn remove(&self, filename: &str) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(filename);
    }

    pub fn get(&self, filename: &str) -> Option<FileStatus> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(filename)
            .cloned()
    }

    /// All entries, ordered by file name
    pub fn snapshot(&self) -> Vec<FileStatus> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
