use crate::core::types::{EntryStatus, FanOutEntry, FanOutResult};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runs one task per target with a concurrency ceiling and a per-task
/// deadline. A failing, panicking or slow task only affects its own entry;
/// results come back in input order.
#[derive(Debug, Clone, Copy)]
pub struct FanOutExecutor {
    concurrency: usize,
    task_timeout: Duration,
}

impl FanOutExecutor {
    pub fn new(concurrency: usize, task_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            task_timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<T, P, F, Fut>(&self, targets: Vec<T>, task: F) -> FanOutResult<T, P>
    where
        T: Clone + Send + 'static,
        P: Send + 'static,
        F: Fn(T) -> Fut,
        Fut: Future<Output = anyhow::Result<P>> + Send + 'static,
    {
        let started = Instant::now();
        let total = targets.len();
        let deadline = self.task_timeout;

        let mut slots: Vec<Option<FanOutEntry<T, P>>> = (0..total).map(|_| None).collect();

        let mut pending = stream::iter(targets.into_iter().enumerate())
            .map(|(idx, target)| {
                let work = task(target.clone());
                async move {
                    let task_started = Instant::now();
                    // Spawned so a panic is caught by the join handle instead of unwinding here.
                    let joined = tokio::spawn(tokio::time::timeout(deadline, work)).await;
                    let (payload, error_detail) = match joined {
                        Ok(Ok(Ok(payload))) => (Some(payload), None),
                        Ok(Ok(Err(e))) => (None, Some(format!("{:#}", e))),
                        Ok(Err(_)) => (None, Some(format!("task timed out after {:?}", deadline))),
                        Err(e) if e.is_panic() => (None, Some("task panicked".to_string())),
                        Err(e) => (None, Some(format!("task aborted: {}", e))),
                    };
                    let entry = FanOutEntry {
                        target,
                        status: if payload.is_some() {
                            EntryStatus::Success
                        } else {
                            EntryStatus::Error
                        },
                        payload,
                        error_detail,
                        duration_ms: task_started.elapsed().as_millis() as u64,
                    };
                    (idx, entry)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((idx, entry)) = pending.next().await {
            if let Some(detail) = &entry.error_detail {
                warn!("fan-out task {} failed: {}", idx, detail);
            }
            if let Some(slot) = slots.get_mut(idx) {
                *slot = Some(entry);
            }
        }

        let results: Vec<FanOutEntry<T, P>> = slots.into_iter().flatten().collect();
        let result = FanOutResult::from_entries(results, started.elapsed().as_millis() as u64);
        info!(
            "fan-out finished: {}/{} successful, {}ms",
            result.successful, result.total, result.total_duration_ms
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_order_is_preserved_when_middle_is_slow() {
        let executor = FanOutExecutor::new(5, Duration::from_secs(5));
        let result = executor
            .run(vec![1u64, 2, 3], |n| async move {
                let delay = if n == 2 { 150 } else { 5 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(n * 10)
            })
            .await;

        let targets: Vec<u64> = result.results.iter().map(|e| e.target).collect();
        assert_eq!(targets, vec![1, 2, 3]);
        let payloads: Vec<u64> = result.results.iter().filter_map(|e| e.payload).collect();
        assert_eq!(payloads, vec![10, 20, 30]);
        assert_eq!(result.successful, 3);
    }

    #[tokio::test]
    async fn test_one_failure_is_isolated() {
        let executor = FanOutExecutor::new(5, Duration::from_secs(5));
        let result = executor
            .run(
                vec!["a".to_string(), "bad".to_string(), "c".to_string()],
                |t| async move {
                    if t == "bad" {
                        Err(anyhow!("connection refused"))
                    } else {
                        Ok(t.len())
                    }
                },
            )
            .await;

        assert_eq!(result.total, 3);
        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.results[1].status, EntryStatus::Error);
        assert_eq!(
            result.results[1].error_detail.as_deref(),
            Some("connection refused")
        );
        assert!(result.results[1].payload.is_none());
    }

    #[tokio::test]
    async fn test_panic_and_timeout_become_entries() {
        let executor = FanOutExecutor::new(3, Duration::from_millis(100));
        let result = executor
            .run(vec![0u8, 1, 2], |n| async move {
                match n {
                    0 => panic!("boom"),
                    1 => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(1u8)
                    }
                    _ => Ok(2u8),
                }
            })
            .await;

        assert_eq!(result.successful, 1);
        assert_eq!(result.results[0].error_detail.as_deref(), Some("task panicked"));
        assert!(result.results[1]
            .error_detail
            .as_deref()
            .unwrap()
            .contains("timed out"));
        assert_eq!(result.results[2].payload, Some(2));
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let executor = FanOutExecutor::new(2, Duration::from_secs(5));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let result = executor
            .run((0..8).collect::<Vec<u32>>(), |n| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.successful, 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let executor = FanOutExecutor::new(0, Duration::from_secs(1));
        assert_eq!(executor.concurrency(), 1);
        let result = executor
            .run(Vec::<String>::new(), |_| async { Ok(()) })
            .await;
        assert_eq!(result.total, 0);
        assert_eq!(result.successful, 0);
    }
}
