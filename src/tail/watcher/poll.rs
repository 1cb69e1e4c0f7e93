// SPDX-License-Identifier: Apache-2.0

//! Polling-based file watcher as a fallback for systems where native
//! file system notifications are unavailable or unreliable (e.g., NFS).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

use super::traits::{FileEvent, FileWatcher, WatchChannels, WatchSenders, WatcherError, watch_channels};

/// Device and inode number, stable across renames of the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn from_metadata(metadata: &fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    // No stable identity without the Unix metadata extension
    #[cfg(not(unix))]
    fn from_metadata(_metadata: &fs::Metadata) -> Option<Self> {
        None
    }
}

/// File metadata for change detection
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    /// Which file currently sits at the path
    identity: Option<FileIdentity>,
    /// Last modification time
    modified: Option<SystemTime>,
    /// File size in bytes
    size: u64,
}

impl FileState {
    fn from_metadata(metadata: &fs::Metadata) -> Self {
        Self {
            identity: FileIdentity::from_metadata(metadata),
            modified: metadata.modified().ok(),
            size: metadata.len(),
        }
    }

    /// True when a different file now occupies the same path.
    fn is_replaced_by(&self, other: &FileState) -> bool {
        self.identity != other.identity
    }
}

#[derive(Debug, Default)]
struct PollState {
    /// Directories being watched
    watched_dirs: Vec<PathBuf>,
    /// Known file states from last poll
    file_states: HashMap<PathBuf, FileState>,
}

impl PollState {
    fn add_directory(&mut self, dir: PathBuf) -> Result<(), WatcherError> {
        if self.watched_dirs.contains(&dir) {
            return Ok(());
        }
        // Files present at subscription time are the baseline, not news.
        for entry in fs::read_dir(&dir)?.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    self.file_states
                        .entry(entry.path())
                        .or_insert_with(|| FileState::from_metadata(&metadata));
                }
            }
        }
        self.watched_dirs.push(dir);
        Ok(())
    }

    fn remove_directory(&mut self, dir: &Path) {
        self.watched_dirs.retain(|p| p != dir);
        self.file_states.retain(|p, _| p.parent() != Some(dir));
    }

    /// Scan all watched directories and return what changed since the last scan.
    fn scan_all(&mut self) -> (Vec<FileEvent>, Vec<WatcherError>) {
        let mut events = Vec::new();
        let mut errors = Vec::new();
        let mut seen: HashMap<PathBuf, FileState> = HashMap::with_capacity(self.file_states.len());

        for dir in &self.watched_dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    errors.push(WatcherError::Watch {
                        path: dir.clone(),
                        message: e.to_string(),
                    });
                    // Keep what we knew so a transient failure does not look like removals
                    for (path, state) in &self.file_states {
                        if path.parent() == Some(dir.as_path()) {
                            seen.insert(path.clone(), state.clone());
                        }
                    }
                    continue;
                }
            };

            for entry in entries.flatten() {
                let metadata = match entry.metadata() {
                    Ok(m) if m.is_file() => m,
                    _ => continue,
                };
                seen.insert(entry.path(), FileState::from_metadata(&metadata));
            }
        }

        for (path, new_state) in &seen {
            match self.file_states.entry(path.clone()) {
                Entry::Vacant(entry) => {
                    events.push(FileEvent::Create(path.clone()));
                    entry.insert(new_state.clone());
                }
                Entry::Occupied(mut entry) => {
                    if entry.get().is_replaced_by(new_state) {
                        // Replaced between two scans, the old offset is meaningless
                        events.push(FileEvent::Remove(path.clone()));
                        events.push(FileEvent::Create(path.clone()));
                        entry.insert(new_state.clone());
                    } else if entry.get() != new_state {
                        events.push(FileEvent::Write(path.clone()));
                        entry.insert(new_state.clone());
                    }
                }
            }
        }

        self.file_states.retain(|path, _| {
            if seen.contains_key(path) {
                true
            } else {
                events.push(FileEvent::Remove(path.clone()));
                false
            }
        });

        (events, errors)
    }
}

/// Polling-based file watcher.
///
/// A background thread rescans the watched directories every poll interval
/// and reports differences in size or modification time. A file replaced
/// under the same name is reported as a removal followed by a creation.
pub struct PollWatcher {
    state: Arc<Mutex<PollState>>,
    stop: Arc<AtomicBool>,
}

impl PollWatcher {
    /// Create a new poll watcher and start its scanning thread.
    pub fn new(poll_interval: Duration) -> Result<(Self, WatchChannels), WatcherError> {
        let (senders, channels) = watch_channels();
        let state = Arc::new(Mutex::new(PollState::default()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_state = state.clone();
        let thread_stop = stop.clone();
        thread::Builder::new()
            .name("tailmatch-poll".into())
            .spawn(move || poll_loop(thread_state, thread_stop, senders, poll_interval))
            .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok((Self { state, stop }, channels))
    }
}

fn poll_loop(
    state: Arc<Mutex<PollState>>,
    stop: Arc<AtomicBool>,
    senders: WatchSenders,
    poll_interval: Duration,
) {
    loop {
        thread::sleep(poll_interval);
        if stop.load(Ordering::Acquire) {
            break;
        }

        let (events, errors) = state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .scan_all();

        for error in errors {
            if !senders.send_error(error) {
                return;
            }
        }
        for event in events {
            if !senders.send_event(event) {
                return;
            }
        }
    }
}

impl Drop for PollWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

impl FileWatcher for PollWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        let metadata = fs::metadata(path).map_err(|e| WatcherError::Watch {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let dir = if metadata.is_dir() {
            path.to_path_buf()
        } else {
            match path.parent() {
                Some(parent) => parent.to_path_buf(),
                None => return Ok(()),
            }
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.add_directory(dir)?;
        if metadata.is_file() {
            state
                .file_states
                .insert(path.to_path_buf(), FileState::from_metadata(&metadata));
        }
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.watched_dirs.iter().any(|d| d == path) {
            state.remove_directory(path);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}
