// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::init::BoxError;
use crate::init::wait::{self, TaskSet};
use crate::tail::config::MonitorConfig;
use crate::tail::matcher::RuleMatcher;
use crate::tail::metrics::MatchCounters;
use crate::tail::monitor::FileMonitor;
use crate::tail::position::PositionStore;
use crate::tail::status::StatusBoard;

/// Wires the core together and supervises its tasks.
pub struct Agent {
    config: MonitorConfig,
    shutdown_timeout: Duration,
}

impl Agent {
    pub fn new(config: MonitorConfig, shutdown_timeout: Duration) -> Self {
        Self {
            config,
            shutdown_timeout,
        }
    }

    /// Run until `agent_cancel` fires or a task exits on its own.
    ///
    /// Construction failures (bad rule, unreadable position file, directory
    /// that cannot be watched) are returned before any task starts.
    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config;

        info!("Starting tailmatch.");
        if config.rules.is_empty() {
            warn!("No match rules configured, files are tracked but nothing is counted");
        }

        let counters = Arc::new(MatchCounters::new());
        let matcher = Arc::new(RuleMatcher::new(
            &config.rules,
            config.buffer_size,
            counters.clone(),
        )?);
        let positions = PositionStore::open(&config.positions_path)?;

        let mut monitor =
            FileMonitor::new(&config, matcher.clone(), positions.clone(), counters.clone())?;
        info!(
            backend = monitor.backend_name(),
            rules = matcher.len(),
            buffer_size = matcher.buffer_size(),
            patterns = ?config.patterns,
            positions = %positions.path().display(),
            "File monitor initialized"
        );
        monitor.start().await?;
        let status = monitor.status();

        let mut monitor_task_set = TaskSet::new();
        let mut snapshot_task_set = TaskSet::new();

        let monitor_cancel = CancellationToken::new();
        let snapshot_cancel = CancellationToken::new();

        {
            let monitor_cancel = monitor_cancel.clone();
            monitor_task_set
                .spawn(async move { monitor.run(monitor_cancel).await.map_err(BoxError::from) });
        }
        {
            let snapshot_cancel = snapshot_cancel.clone();
            let interval = config.snapshot_interval;
            snapshot_task_set.spawn(async move {
                positions.run_snapshots(interval, snapshot_cancel).await;
                Ok(())
            });
        }

        let mut result = Ok(());
        select! {
            _ = agent_cancel.cancelled() => {
                debug!("Agent cancellation signaled.");
            },
            e = wait::wait_for_any_task(&mut monitor_task_set) => {
                match e {
                    Ok(()) => info!("Unexpected early exit of file monitor."),
                    Err(e) => result = Err(e),
                }
            },
            e = wait::wait_for_any_task(&mut snapshot_task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of position snapshot task."),
                    Err(e) => result = Err(e),
                }
            },
        }

        // Stop the monitor first so the final snapshot holds its last offsets
        monitor_cancel.cancel();
        if let Err(e) =
            wait::wait_for_tasks_with_timeout(&mut monitor_task_set, self.shutdown_timeout).await
        {
            warn!(error = %e, "File monitor did not stop cleanly");
        }

        snapshot_cancel.cancel();
        if let Err(e) =
            wait::wait_for_tasks_with_timeout(&mut snapshot_task_set, self.shutdown_timeout).await
        {
            return Err(format!("timed out waiting for final position snapshot: {}", e).into());
        }

        log_summary(&counters, &status);
        result
    }
}

fn log_summary(counters: &MatchCounters, status: &StatusBoard) {
    let snapshot = counters.snapshot();
    info!(
        total_matches = snapshot.total_matches,
        files_created = snapshot.files_created,
        files_removed = snapshot.files_removed,
        "Final match counters"
    );
    for (level, count) in &snapshot.matches_by_level {
        info!(level = %level, matches = count, "Matches by level");
    }
    for file in status.snapshot() {
        info!(
            file = %file.filename,
            offset = file.offset,
            size = file.size,
            progress = %format!("{:.1}%", file.progress * 100.0),
            matches = file.matches,
            "File status"
        );
    }
}
