//! Bounded-concurrency execution of independent async tasks.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Result of one task, correlated by the caller-supplied id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome<K, T> {
    /// Identifier supplied with the task.
    pub id: K,
    /// Task output, or the failure that replaced it.
    pub result: Result<T, String>,
}

impl<K, T> TaskOutcome<K, T> {
    fn failed(id: K, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(message.into()),
        }
    }
}

/// Run `tasks` with at most `concurrency` in flight.
///
/// Every task yields exactly one outcome: errors and panics become failed
/// outcomes instead of escaping. Outcomes arrive in completion order. A
/// `concurrency` of zero is treated as one. There is no implicit timeout.
pub async fn run_bounded<K, T, E, F>(tasks: Vec<(K, F)>, concurrency: usize) -> Vec<TaskOutcome<K, T>>
where
    K: Clone + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    if tasks.is_empty() {
        return Vec::new();
    }

    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let ids: Vec<K> = tasks.iter().map(|(id, _)| id.clone()).collect();
    let mut reported = vec![false; ids.len()];
    let mut outcomes = Vec::with_capacity(ids.len());
    let mut running = JoinSet::new();

    for (index, (id, task)) in tasks.into_iter().enumerate() {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        running.spawn(async move {
            let _permit = permit;
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err.to_string()),
                Err(panic) => Err(format!("task panicked: {}", panic_message(panic.as_ref()))),
            };
            (index, TaskOutcome { id, result })
        });
    }

    while let Some(joined) = running.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                reported[index] = true;
                outcomes.push(outcome);
            }
            Err(err) => log::warn!("task did not complete: {err}"),
        }
    }

    for (index, id) in ids.into_iter().enumerate() {
        if !reported[index] {
            outcomes.push(TaskOutcome::failed(id, "task was cancelled"));
        }
    }

    outcomes
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    type Task = std::pin::Pin<Box<dyn Future<Output = Result<usize, String>> + Send>>;

    fn tracked_task(value: usize, in_flight: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Task {
        Box::pin(async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(value)
        })
    }

    #[tokio::test]
    async fn empty_task_list_returns_immediately() {
        let tasks: Vec<(usize, Task)> = Vec::new();
        assert!(run_bounded(tasks, 4).await.is_empty());
    }

    #[tokio::test]
    async fn concurrency_one_runs_tasks_serially() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<(usize, Task)> = (0..6)
            .map(|i| (i, tracked_task(i * 10, in_flight.clone(), peak.clone())))
            .collect();

        let outcomes = run_bounded(tasks, 1).await;

        assert_eq!(outcomes.len(), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        for outcome in outcomes {
            assert_eq!(outcome.result, Ok(outcome.id * 10));
        }
    }

    #[tokio::test]
    async fn concurrency_bound_is_respected() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<(usize, Task)> = (0..12)
            .map(|i| (i, tracked_task(i, in_flight.clone(), peak.clone())))
            .collect();

        let outcomes = run_bounded(tasks, 3).await;

        assert_eq!(outcomes.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn wide_concurrency_starts_every_task() {
        let barrier = Arc::new(Barrier::new(4));
        let tasks: Vec<(usize, Task)> = (0..4)
            .map(|i| {
                let barrier = barrier.clone();
                let task: Task = Box::pin(async move {
                    barrier.wait().await;
                    Ok(i)
                });
                (i, task)
            })
            .collect();

        let outcomes = tokio::time::timeout(Duration::from_secs(5), run_bounded(tasks, 16))
            .await
            .expect("all tasks started together");
        assert_eq!(outcomes.len(), 4);
    }

    #[tokio::test]
    async fn failures_and_panics_become_outcomes() {
        let tasks: Vec<(&'static str, Task)> = vec![
            ("ok", Box::pin(async { Ok(1) })),
            ("err", Box::pin(async { Err("checker crashed".to_string()) })),
            (
                "panic",
                Box::pin(async {
                    if true {
                        panic!("boom");
                    }
                    Ok(0)
                }),
            ),
        ];

        let mut outcomes = run_bounded(tasks, 2).await;
        outcomes.sort_by_key(|outcome| outcome.id);

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].id, "err");
        assert_eq!(outcomes[0].result, Err("checker crashed".to_string()));
        assert_eq!(outcomes[1].id, "ok");
        assert_eq!(outcomes[1].result, Ok(1));
        assert_eq!(outcomes[2].id, "panic");
        assert_eq!(outcomes[2].result, Err("task panicked: boom".to_string()));
    }

    #[tokio::test]
    async fn zero_concurrency_is_treated_as_one() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<(usize, Task)> = (0..3)
            .map(|i| (i, tracked_task(i, in_flight.clone(), peak.clone())))
            .collect();

        assert_eq!(run_bounded(tasks, 0).await.len(), 3);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
