// SPDX-License-Identifier: Apache-2.0

//! Event-driven dispatch of file system changes to the rule matcher.
//!
//! A single task consumes watcher events in delivery order. Each `Write` reads
//! the appended lines from the file's stored offset, each `Create` starts the
//! file over from offset zero, and each `Remove` forgets it. Only one file is
//! read at a time.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use glob::Pattern;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::tail::config::MonitorConfig;
use crate::tail::error::{Error, Result};
use crate::tail::matcher::{RuleMatcher, ScanSummary};
use crate::tail::metrics::MetricsSink;
use crate::tail::position::PositionStore;
use crate::tail::status::StatusBoard;
use crate::tail::watcher::{FileEvent, FileWatcher, WatchChannels, create_watcher};

/// Key under which a file's offset and status are stored
pub fn file_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

struct Scan {
    summary: ScanSummary,
    size: u64,
    modified: Option<SystemTime>,
}

/// Stat the file and read it from `from_offset` on the blocking pool.
async fn scan(matcher: Arc<RuleMatcher>, path: &Path, from_offset: u64) -> Result<Scan> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let metadata = fs::metadata(&path).map_err(|source| Error::ReadFile {
            path: path.clone(),
            source,
        })?;
        let summary = matcher.process_file(&path, from_offset)?;
        Ok(Scan {
            summary,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    })
    .await
    .map_err(|e| Error::Io(io::Error::other(e)))?
}

/// Watches the configured directories and keeps every matching file's
/// offset current.
pub struct FileMonitor {
    handler: EventHandler,
    channels: WatchChannels,
}

/// Everything the dispatch loop mutates, kept apart from the channels it
/// reads from.
struct EventHandler {
    directories: Vec<PathBuf>,
    patterns: Vec<Pattern>,
    matcher: Arc<RuleMatcher>,
    positions: PositionStore,
    metrics: Arc<dyn MetricsSink>,
    status: StatusBoard,
    watcher: Box<dyn FileWatcher>,
    /// Files subscribed individually after a Create
    subscribed: HashSet<PathBuf>,
    /// Files read by the startup catch-up that have seen no event since
    caught_up: HashSet<PathBuf>,
}

impl FileMonitor {
    /// Build a monitor with the watcher backend selected by the configuration.
    pub fn new(
        config: &MonitorConfig,
        matcher: Arc<RuleMatcher>,
        positions: PositionStore,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        config.validate()?;
        let (watcher, channels) = create_watcher(&config.watcher)?;
        Self::with_watcher(config, matcher, positions, metrics, watcher, channels)
    }

    /// Build a monitor on an already constructed watcher backend.
    pub fn with_watcher(
        config: &MonitorConfig,
        matcher: Arc<RuleMatcher>,
        positions: PositionStore,
        metrics: Arc<dyn MetricsSink>,
        watcher: Box<dyn FileWatcher>,
        channels: WatchChannels,
    ) -> Result<Self> {
        let patterns = config.compile_patterns()?;
        if config.directories.is_empty() {
            return Err(Error::Config(
                "At least one directory to watch must be specified".to_string(),
            ));
        }

        Ok(Self {
            handler: EventHandler {
                directories: config.directories.clone(),
                patterns,
                matcher,
                positions,
                metrics,
                status: StatusBoard::new(),
                watcher,
                subscribed: HashSet::new(),
                caught_up: HashSet::new(),
            },
            channels,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.handler.watcher.backend_name()
    }

    /// Shared handle to the per-file status board
    pub fn status(&self) -> StatusBoard {
        self.handler.status.clone()
    }

    pub fn positions(&self) -> &PositionStore {
        &self.handler.positions
    }

    /// Subscribe every configured directory, then process whatever matching
    /// files already hold past their stored offsets.
    ///
    /// A directory that cannot be subscribed fails the whole start.
    pub async fn start(&mut self) -> Result<()> {
        let backend = self.handler.watcher.backend_name();
        for dir in &self.handler.directories {
            self.handler.watcher.watch(dir)?;
            info!(directory = %dir.display(), backend, "Watching directory");
        }

        self.handler.catch_up().await;
        Ok(())
    }

    /// Handle one event as the dispatch loop would.
    pub async fn handle_event(&mut self, event: FileEvent) {
        self.handler.handle_event(event).await
    }

    /// Run the dispatch loop until `cancel` fires or the watcher goes away.
    ///
    /// Watcher errors are logged and the loop keeps going. A closed channel
    /// means the backend is gone and ends the loop with
    /// [`Error::WatcherClosed`].
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let FileMonitor {
            mut handler,
            mut channels,
        } = self;

        info!(
            directories = handler.directories.len(),
            rules = handler.matcher.len(),
            "File monitor started"
        );

        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("File monitor cancelled, stopping");
                    return Ok(());
                }

                event = channels.events.recv() => match event {
                    Some(event) => handler.handle_event(event).await,
                    None => {
                        error!("File watcher event channel closed");
                        return Err(Error::WatcherClosed);
                    }
                },

                err = channels.errors.recv() => match err {
                    Some(e) => error!(error = %e, "File watcher error"),
                    None => {
                        error!("File watcher error channel closed");
                        return Err(Error::WatcherClosed);
                    }
                },
            }
        }
    }
}

impl EventHandler {
    fn matches_pattern(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&name))
    }

    async fn handle_event(&mut self, event: FileEvent) {
        if !self.matches_pattern(event.path()) {
            trace!(path = %event.path().display(), kind = event.kind(), "Ignoring event");
            return;
        }

        // A Create queued between subscription and catch-up names a file
        // whose content the catch-up already read
        let caught_up = self.caught_up.remove(event.path());

        match event {
            FileEvent::Write(path) => self.handle_write(&path).await,
            FileEvent::Create(path) => self.handle_create(&path, caught_up).await,
            FileEvent::Remove(path) => self.handle_remove(&path),
        }
    }

    async fn handle_write(&mut self, path: &Path) {
        let key = file_key(path);
        let offset = self.positions.get(&key);

        match scan(self.matcher.clone(), path, offset).await {
            Ok(scan) => self.record(&key, scan, false),
            Err(e) => {
                // Offset stays put, the next Write retries
                error!(path = %path.display(), offset, error = %e, "Failed to process file");
            }
        }
    }

    async fn handle_create(&mut self, path: &Path, caught_up: bool) {
        let key = file_key(path);

        match self.watcher.watch(path) {
            Ok(()) => {
                self.subscribed.insert(path.to_path_buf());
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to subscribe file"),
        }
        self.metrics.record_file_created();
        info!(path = %path.display(), "File created");

        if caught_up {
            debug!(
                path = %path.display(),
                "File already read at startup, continuing from its offset"
            );
            self.handle_write(path).await;
            return;
        }

        match scan(self.matcher.clone(), path, 0).await {
            Ok(scan) => self.record(&key, scan, true),
            Err(e) => {
                self.positions.set(&key, 0);
                error!(path = %path.display(), error = %e, "Failed to process new file");
            }
        }
    }

    fn handle_remove(&mut self, path: &Path) {
        let key = file_key(path);

        let subscribed = self.subscribed.remove(path);
        if subscribed {
            if let Err(e) = self.watcher.unwatch(path) {
                debug!(path = %path.display(), error = %e, "Failed to unsubscribe removed file");
            }
        }
        let previous = self.positions.remove(&key);
        self.status.remove(&key);

        // Backends may report one removal more than once
        if subscribed || previous.is_some() {
            self.metrics.record_file_removed();
            info!(path = %path.display(), offset = previous.unwrap_or(0), "File removed");
        }
    }

    fn record(&mut self, key: &str, scan: Scan, reset: bool) {
        let summary = scan.summary;
        self.positions.set(key, summary.offset);
        self.status.record_scan(
            key,
            summary.offset,
            scan.size,
            summary.matches,
            scan.modified,
            reset,
        );
        debug!(
            file = key,
            offset = summary.offset,
            lines = summary.lines,
            matches = summary.matches,
            "File processed"
        );
    }

    /// Process matching files that already exist, from their stored offsets.
    async fn catch_up(&mut self) {
        let mut files = Vec::new();
        for dir in &self.directories {
            match fs::read_dir(dir) {
                Ok(entries) => files.extend(
                    entries
                        .flatten()
                        .map(|entry| entry.path())
                        .filter(|path| path.is_file() && self.matches_pattern(path)),
                ),
                Err(e) => {
                    warn!(directory = %dir.display(), error = %e, "Failed to list directory")
                }
            }
        }
        files.sort();

        for path in &files {
            self.handle_write(path).await;
            self.caught_up.insert(path.clone());
        }
        info!(files = files.len(), "Processed existing files");
    }
}
