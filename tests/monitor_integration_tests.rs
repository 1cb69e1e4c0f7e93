// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests of the file monitor on real directories, using the poll
//! backend so they behave the same on every platform and file system.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tailmatch::init::agent::Agent;
use tailmatch::tail::position::load_offsets;
use tailmatch::tail::{
    FileMonitor, MatchCounters, MatchRule, MonitorConfig, PositionStore, RuleMatcher, WatchMode,
    WatcherConfig, file_key,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn poll_config(logs: &Path, state: &Path) -> MonitorConfig {
    MonitorConfig {
        directories: vec![logs.to_path_buf()],
        rules: vec![
            MatchRule::new("ERROR", "critical"),
            MatchRule::new("disk", "storage"),
        ],
        positions_path: state.join("positions.json"),
        snapshot_interval: Duration::from_millis(50),
        watcher: WatcherConfig {
            mode: WatchMode::Poll,
            poll_interval: Duration::from_millis(20),
        },
        ..Default::default()
    }
}

fn append(path: &Path, data: &str) {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    f.write_all(data.as_bytes()).unwrap();
    f.sync_all().unwrap();
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn build(config: &MonitorConfig) -> (FileMonitor, Arc<MatchCounters>, PositionStore) {
    let counters = Arc::new(MatchCounters::new());
    let matcher =
        Arc::new(RuleMatcher::new(&config.rules, config.buffer_size, counters.clone()).unwrap());
    let positions = PositionStore::open(&config.positions_path).unwrap();
    let monitor = FileMonitor::new(config, matcher, positions.clone(), counters.clone()).unwrap();
    (monitor, counters, positions)
}

#[tokio::test]
async fn test_tails_created_appended_and_removed_files() {
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let config = poll_config(logs.path(), state.path());

    let (mut monitor, counters, positions) = build(&config);
    assert_eq!(monitor.backend_name(), "poll");
    monitor.start().await.unwrap();
    let status = monitor.status();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(monitor.run(cancel.clone()));

    let log = logs.path().join("a.log");
    let key = file_key(&log);

    append(&log, "ERROR disk full\nINFO ok\n");
    wait_until("first read", || positions.get(&key) == 24).await;
    assert_eq!(counters.level("critical"), 1);
    assert_eq!(counters.level("storage"), 1);
    assert_eq!(counters.total_matches(), 2);

    append(&log, "ERROR again\n");
    wait_until("appended line", || positions.get(&key) == 36).await;
    assert_eq!(counters.level("critical"), 2);
    assert_eq!(status.get(&key).unwrap().matches, 3);

    // Files that do not match the pattern are never read
    append(&logs.path().join("notes.txt"), "ERROR elsewhere\n");

    fs::remove_file(&log).unwrap();
    wait_until("removal", || counters.snapshot().files_removed == 1).await;
    assert!(positions.is_empty());
    assert!(status.get(&key).is_none());

    append(&log, "ERROR reborn\n");
    wait_until("recreated file", || positions.get(&key) == 13).await;
    assert_eq!(counters.level("critical"), 3);
    assert_eq!(counters.snapshot().files_created, 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_file_replaced_in_place_is_read_from_start() {
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let config = poll_config(logs.path(), state.path());

    let (mut monitor, counters, positions) = build(&config);
    monitor.start().await.unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(monitor.run(cancel.clone()));

    let log = logs.path().join("a.log");
    let key = file_key(&log);
    append(&log, "ERROR disk full\nINFO ok\n");
    wait_until("first read", || positions.get(&key) == 24).await;

    // Rotated away and replaced by a longer file under the same name
    fs::rename(&log, logs.path().join("a.log.1")).unwrap();
    append(&log, "ERROR replaced\nERROR twice over here\n");

    wait_until("replacement read", || counters.level("critical") == 3).await;
    assert_eq!(positions.get(&key), 37);
    let snapshot = counters.snapshot();
    assert_eq!(snapshot.files_created, 2);
    assert_eq!(snapshot.files_removed, 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_offsets() {
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let config = poll_config(logs.path(), state.path());
    let log = logs.path().join("app.log");
    let key = file_key(&log);

    {
        let (mut monitor, counters, positions) = build(&config);
        monitor.start().await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        append(&log, "ERROR one\n");
        wait_until("first run", || positions.get(&key) == 10).await;
        assert_eq!(counters.level("critical"), 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        positions.snapshot().unwrap();
    }

    // Written while nothing was running
    append(&log, "INFO two\nERROR three\n");

    let (mut monitor, counters, positions) = build(&config);
    assert_eq!(positions.get(&key), 10);
    monitor.start().await.unwrap();

    assert_eq!(positions.get(&key), 10 + 9 + 12);
    assert_eq!(counters.level("critical"), 1);
    assert_eq!(counters.total_matches(), 1);
}

#[tokio::test]
async fn test_agent_takes_final_snapshot_on_shutdown() {
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let mut config = poll_config(logs.path(), state.path());
    config.snapshot_interval = Duration::from_secs(3600);

    let log = logs.path().join("a.log");
    append(&log, "ERROR disk full\nINFO ok\n");

    // Existing files are caught up during start, before cancellation is seen
    let cancel = CancellationToken::new();
    cancel.cancel();
    Agent::new(config.clone(), Duration::from_secs(5))
        .run(cancel)
        .await
        .unwrap();

    let offsets = load_offsets(&config.positions_path).unwrap();
    assert_eq!(offsets.get(&file_key(&log)), Some(&24));
}

#[tokio::test]
async fn test_agent_rejects_invalid_rule() {
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let mut config = poll_config(logs.path(), state.path());
    config.rules.push(MatchRule::new("(unclosed", "broken"));

    let result = Agent::new(config, Duration::from_secs(5))
        .run(CancellationToken::new())
        .await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("(unclosed"));
}

#[tokio::test]
async fn test_agent_rejects_corrupt_position_file() {
    let logs = TempDir::new().unwrap();
    let state = TempDir::new().unwrap();
    let config = poll_config(logs.path(), state.path());
    fs::write(&config.positions_path, "{ not json").unwrap();

    let result = Agent::new(config, Duration::from_secs(5))
        .run(CancellationToken::new())
        .await;
    assert!(result.unwrap_err().to_string().contains("corrupted"));
}
