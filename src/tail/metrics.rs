// SPDX-License-Identifier: Apache-2.0

//! Counters fed by the rule matcher and the file monitor.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// Receives counts from the core. Implementations must be cheap to call from
/// the dispatch loop.
pub trait MetricsSink: Send + Sync {
    /// One line matched one rule of the given severity level.
    fn record_match(&self, level: &str);

    /// A new file identity passed the pattern filter.
    fn record_file_created(&self);

    /// A watched file was removed.
    fn record_file_removed(&self);
}

/// Point-in-time copy of [`MatchCounters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub total_matches: u64,
    pub matches_by_level: BTreeMap<String, u64>,
    pub files_created: u64,
    pub files_removed: u64,
}

/// In-memory, monotonically increasing counters.
#[derive(Debug, Default)]
pub struct MatchCounters {
    total_matches: AtomicU64,
    files_created: AtomicU64,
    files_removed: AtomicU64,
    by_level: RwLock<BTreeMap<String, AtomicU64>>,
}

impl MatchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_matches(&self) -> u64 {
        self.total_matches.load(Ordering::Relaxed)
    }

    /// Matches recorded for one level, 0 if the level never matched
    pub fn level(&self, level: &str) -> u64 {
        self.by_level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(level)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let matches_by_level = self
            .by_level
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(level, count)| (level.clone(), count.load(Ordering::Relaxed)))
            .collect();

        CounterSnapshot {
            total_matches: self.total_matches.load(Ordering::Relaxed),
            matches_by_level,
            files_created: self.files_created.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for MatchCounters {
    fn record_match(&self, level: &str) {
        self.total_matches.fetch_add(1, Ordering::Relaxed);

        // Fast path: the level already has a counter
        {
            let levels = self.by_level.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = levels.get(level) {
                counter.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        self.by_level
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(level.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_file_created(&self) {
        self.files_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_file_removed(&self) {
        self.files_removed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counts_by_level() {
        let counters = MatchCounters::new();
        counters.record_match("critical");
        counters.record_match("critical");
        counters.record_match("warning");

        assert_eq!(counters.total_matches(), 3);
        assert_eq!(counters.level("critical"), 2);
        assert_eq!(counters.level("warning"), 1);
        assert_eq!(counters.level("info"), 0);
    }

    #[test]
    fn test_snapshot() {
        let counters = MatchCounters::new();
        counters.record_match("critical");
        counters.record_file_created();
        counters.record_file_created();
        counters.record_file_removed();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.total_matches, 1);
        assert_eq!(snapshot.matches_by_level.get("critical"), Some(&1));
        assert_eq!(snapshot.files_created, 2);
        assert_eq!(snapshot.files_removed, 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let counters = Arc::new(MatchCounters::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.record_match("error");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counters.total_matches(), 4000);
        assert_eq!(counters.level("error"), 4000);
    }
}
