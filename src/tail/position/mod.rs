// SPDX-License-Identifier: Apache-2.0

//! Durable map from file name to the byte offset consumed so far.
//!
//! The map lives in memory behind a lock and is snapshotted to a JSON file
//! with atomic writes, on a fixed delay and once more at shutdown.

mod json_file;
mod store;

pub use json_file::{atomic_write, load_offsets};
pub use store::{DEFAULT_SNAPSHOT_INTERVAL, OffsetMap, PositionStore};
