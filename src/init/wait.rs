// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::error;

use crate::init::BoxError;

pub type TaskSet = JoinSet<Result<(), BoxError>>;

/// Wait for the first task of the set to finish and return its result.
/// An empty set never resolves, so it cannot win a `select!`.
pub async fn wait_for_any_task(tasks: &mut TaskSet) -> Result<(), BoxError> {
    match tasks.join_next().await {
        None => std::future::pending().await,
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut TaskSet,
    timeout: Duration,
) -> Result<(), BoxError> {
    wait_for_tasks_with_deadline(tasks, Instant::now() + timeout).await
}

/// Drain the set. The last task error wins; hitting the deadline is an error
/// of its own.
pub async fn wait_for_tasks_with_deadline(
    tasks: &mut TaskSet,
    stop_at: Instant,
) -> Result<(), BoxError> {
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(e)))) => result = Err(e),
            Ok(Some(Err(e))) => error!("Failed to join with task: {:?}", e),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_task_returns_first_result() {
        let mut tasks = TaskSet::new();
        tasks.spawn(async { Err("boom".into()) });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let err = wait_for_any_task(&mut tasks).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut tasks = TaskSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });

        let result = wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(20)).await;
        assert!(result.unwrap_err().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_set_completes() {
        let mut tasks = TaskSet::new();
        assert!(
            wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(20))
                .await
                .is_ok()
        );
    }
}
