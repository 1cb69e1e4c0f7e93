// SPDX-License-Identifier: Apache-2.0

//! Native file system watcher using the `notify` crate.
//!
//! Uses OS-level file system notifications:
//! - Linux: inotify
//! - macOS: FSEvents
//! - Windows: ReadDirectoryChangesW

use std::path::Path;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::traits::{FileEvent, FileWatcher, WatchChannels, WatcherError, watch_channels};

/// Native file system watcher using OS-level notifications.
pub struct NativeWatcher {
    watcher: RecommendedWatcher,
}

impl NativeWatcher {
    /// Create a new native watcher along with the channels it delivers into.
    pub fn new() -> Result<(Self, WatchChannels), WatcherError> {
        let (senders, channels) = watch_channels();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for file_event in convert_event(event) {
                        let _ = senders.send_event(file_event);
                    }
                }
                Err(e) => {
                    let _ = senders.send_error(WatcherError::Backend(e.to_string()));
                }
            },
            Config::default(),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok((Self { watcher }, channels))
    }
}

/// Convert a notify event to the events the monitor acts on.
///
/// A rename is split into the removal of its source and the creation of its
/// destination. Access and metadata-only events are dropped.
fn convert_event(event: Event) -> Vec<FileEvent> {
    let Event { kind, paths, .. } = event;

    match kind {
        EventKind::Create(_) => paths.into_iter().map(FileEvent::Create).collect(),
        EventKind::Remove(_) => paths.into_iter().map(FileEvent::Remove).collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => paths.into_iter().map(FileEvent::Remove).collect(),
            RenameMode::To => paths.into_iter().map(FileEvent::Create).collect(),
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                let mut events = Vec::with_capacity(2);
                if let Some(from) = paths.next() {
                    events.push(FileEvent::Remove(from));
                }
                if let Some(to) = paths.next() {
                    events.push(FileEvent::Create(to));
                }
                events
            }
            // Backends that cannot tell the two halves apart (FSEvents)
            _ => paths
                .into_iter()
                .map(|p| {
                    if p.exists() {
                        FileEvent::Create(p)
                    } else {
                        FileEvent::Remove(p)
                    }
                })
                .collect(),
        },
        EventKind::Modify(_) => paths.into_iter().map(FileEvent::Write).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

impl FileWatcher for NativeWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.watcher.unwatch(path).map_err(|e| WatcherError::Watch {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}
