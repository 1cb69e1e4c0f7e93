// SPDX-License-Identifier: Apache-2.0

//! Traits and types shared by the file system watcher backends.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Error type for watcher operations
#[derive(Debug, Error)]
pub enum WatcherError {
    /// Failed to initialize the watcher
    #[error("watcher initialization failed: {0}")]
    Init(String),
    /// Failed to subscribe or unsubscribe a path
    #[error("watch failed for {path}: {message}")]
    Watch { path: PathBuf, message: String },
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error reported asynchronously by the notification backend
    #[error("backend error: {0}")]
    Backend(String),
}

/// A file system change, already narrowed to what the monitor acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Content was appended or otherwise modified
    Write(PathBuf),
    /// A file appeared under this name (new identity)
    Create(PathBuf),
    /// The name no longer refers to a file
    Remove(PathBuf),
}

impl FileEvent {
    /// Path the event refers to
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Write(p) | FileEvent::Create(p) | FileEvent::Remove(p) => p,
        }
    }

    /// Short name of the event kind for logging
    pub fn kind(&self) -> &'static str {
        match self {
            FileEvent::Write(_) => "write",
            FileEvent::Create(_) => "create",
            FileEvent::Remove(_) => "remove",
        }
    }
}

/// Receiving halves of the two channels a watcher backend feeds.
///
/// Both close once the backend is dropped or its delivery thread dies.
pub struct WatchChannels {
    pub events: UnboundedReceiver<FileEvent>,
    pub errors: UnboundedReceiver<WatcherError>,
}

/// Sending halves handed to a backend.
#[derive(Clone)]
pub struct WatchSenders {
    pub events: UnboundedSender<FileEvent>,
    pub errors: UnboundedSender<WatcherError>,
}

impl WatchSenders {
    /// Returns false once the receiving side is gone.
    pub fn send_event(&self, event: FileEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn send_error(&self, error: WatcherError) -> bool {
        self.errors.send(error).is_ok()
    }
}

/// Create a connected sender/receiver pair for a backend.
pub fn watch_channels() -> (WatchSenders, WatchChannels) {
    let (event_tx, event_rx) = unbounded_channel();
    let (error_tx, error_rx) = unbounded_channel();
    (
        WatchSenders {
            events: event_tx,
            errors: error_tx,
        },
        WatchChannels {
            events: event_rx,
            errors: error_rx,
        },
    )
}

/// Trait for file system watchers.
///
/// Implementations push events into the channels returned at construction;
/// this trait only manages subscriptions.
pub trait FileWatcher: Send {
    /// Add a path to watch. Directories report changes of their direct entries.
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Remove a path from watching.
    fn unwatch(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Get the name of the watcher backend for logging.
    fn backend_name(&self) -> &'static str;
}
