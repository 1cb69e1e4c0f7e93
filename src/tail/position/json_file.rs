// SPDX-License-Identifier: Apache-2.0

//! JSON file persistence with atomic writes.
//!
//! The file holds a single object mapping file name to offset. Writes go to a
//! temporary sibling first and are renamed over the target.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use portable_atomic::{AtomicU64, Ordering};

use super::store::OffsetMap;
use crate::tail::error::{Error, Result};

/// Load the offset map from `path`.
///
/// A missing file yields an empty map. Any other read failure, or content
/// that is not a JSON object of non-negative integers, is an error.
pub fn load_offsets(path: &Path) -> Result<OffsetMap> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(OffsetMap::new()),
        Err(e) => {
            return Err(Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        Error::Persistence(format!(
            "position file {} is corrupted and cannot be loaded: {}. \
             To start fresh, delete the file and restart.",
            path.display(),
            e
        ))
    })
}

/// Write the map to file atomically (write to temp, then rename)
pub fn atomic_write(path: &Path, offsets: &OffsetMap) -> Result<()> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!("failed to create parent directory: {}", e))
            })?;
        }
    }

    // Unique per process and per call so overlapping writers never share a temp file
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let temp_path = path.with_extension(format!("tmp.{}.{}", std::process::id(), unique_id));

    let result = write_temp(&temp_path, offsets).and_then(|()| {
        fs::rename(&temp_path, path).map_err(|e| {
            Error::Persistence(format!("failed to rename position file: {}", e))
        })
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_temp(temp_path: &Path, offsets: &OffsetMap) -> Result<()> {
    let file = File::create(temp_path)
        .map_err(|e| Error::Persistence(format!("failed to create temp file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, offsets)
        .map_err(|e| Error::Persistence(format!("failed to write position file: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Persistence(format!("failed to flush position file: {}", e)))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| Error::Persistence(format!("failed to sync position file: {}", e)))?;
    Ok(())
}
