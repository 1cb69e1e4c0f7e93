// SPDX-License-Identifier: Apache-2.0

//! Regex rule evaluation over the newly appended lines of a file.

use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::metrics::MetricsSink;
use super::reader::LineReader;
use crate::tail::error::{Error, Result};

/// A rule as configured: a regular expression and the severity level its
/// matches are counted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    pub pattern: String,
    pub level: String,
}

impl MatchRule {
    pub fn new(pattern: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            level: level.into(),
        }
    }
}

struct CompiledRule {
    regex: Regex,
    level: String,
}

/// Outcome of one [`RuleMatcher::process_file`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Offset just past the last complete line consumed
    pub offset: u64,
    /// Complete lines read
    pub lines: u64,
    /// Rule hits; a line matching k rules adds k
    pub matches: u64,
    /// Lines longer than the buffer size whose prefix only was evaluated
    pub truncated: u64,
}

/// An immutable, ordered set of compiled rules.
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
    buffer_size: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for RuleMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleMatcher")
            .field("rules", &self.rules.iter().map(|r| (r.regex.as_str(), &r.level)).collect::<Vec<_>>())
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl RuleMatcher {
    /// Compile every rule. The first invalid pattern fails the whole set.
    pub fn new(
        rules: &[MatchRule],
        buffer_size: usize,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        if buffer_size == 0 {
            return Err(Error::Config("buffer size must be greater than zero".to_string()));
        }

        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| CompiledRule {
                        regex,
                        level: rule.level.clone(),
                    })
                    .map_err(|source| Error::InvalidRule {
                        pattern: rule.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            buffer_size,
            metrics,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Severity levels in rule order, duplicates kept
    pub fn levels(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.level.as_str())
    }

    /// Evaluate every complete line of `path` from `from_offset` to the current
    /// end of file.
    ///
    /// On error nothing is credited and the caller keeps `from_offset`. A file
    /// shorter than `from_offset` was truncated in place and is rescanned from
    /// the start.
    pub fn process_file(&self, path: &Path, from_offset: u64) -> Result<ScanSummary> {
        let read_err = |source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(read_err)?;
        let size = file.metadata().map_err(read_err)?.len();

        let start = if from_offset > size {
            warn!(
                path = %path.display(),
                offset = from_offset,
                size,
                "File is shorter than its stored offset, assuming truncation and reading from the start"
            );
            0
        } else {
            from_offset
        };
        file.seek(SeekFrom::Start(start)).map_err(read_err)?;

        let mut reader = LineReader::new(file, start, self.buffer_size);
        let mut summary = ScanSummary {
            offset: start,
            ..Default::default()
        };

        while let Some(line) = reader.next_line().map_err(read_err)? {
            if line.truncated {
                summary.truncated += 1;
                warn!(
                    path = %path.display(),
                    end_offset = line.end_offset,
                    buffer_size = self.buffer_size,
                    "Line exceeds the read buffer, only its first bytes are matched"
                );
            }
            summary.matches += self.match_line(&line.text()) as u64;
            summary.lines += 1;
            summary.offset = line.end_offset;
        }

        Ok(summary)
    }

    /// Check one line against every rule and record each hit.
    /// Returns the number of rules that matched.
    pub fn match_line(&self, line: &str) -> usize {
        let mut hits = 0;
        for rule in &self.rules {
            if rule.regex.is_match(line) {
                self.metrics.record_match(&rule.level);
                hits += 1;
            }
        }
        hits
    }
}
