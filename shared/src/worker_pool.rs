/// Bounded worker pool for release and track jobs.
///
/// Jobs go through an explicit bounded queue consumed by a fixed number of
/// worker tasks. The producer waits while the queue is full. Every job runs in
/// its own task, so an error or panic is confined to that job and the batch
/// always drains.
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Default number of concurrent workers.
pub const DEFAULT_POOL_WIDTH: usize = 5;

/// Outcome of one [`WorkerPool::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
}

struct QueuedJob<J> {
    index: usize,
    label: String,
    payload: J,
}

/// Fixed-width pool of worker tasks fed from a bounded queue.
pub struct WorkerPool {
    width: usize,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool with `width` workers and a queue twice that size.
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self {
            width,
            capacity: width * 2,
        }
    }

    /// Run `handler` once per job, at most `width` at a time.
    ///
    /// Jobs are submitted in order and `handler` receives each job's 0-based
    /// submission index. Completion order is unconstrained.
    pub async fn run<J, F, Fut>(
        &self,
        jobs: impl IntoIterator<Item = (String, J)>,
        handler: F,
    ) -> PoolReport
    where
        J: Send + 'static,
        F: Fn(usize, J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<QueuedJob<J>>(self.capacity);
        let rx = Arc::new(Mutex::new(rx));
        let handler = Arc::new(handler);
        let completed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(self.width);
        for worker_id in 0..self.width {
            let rx = rx.clone();
            let handler = handler.clone();
            let completed = completed.clone();
            let failed = failed.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    let Some(job) = next else { break };

                    debug!("Worker {} picked job #{} ({})", worker_id, job.index, job.label);

                    let outcome = tokio::spawn(handler(job.index, job.payload)).await;
                    match outcome {
                        Ok(Ok(())) => {
                            completed.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(Err(e)) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                            warn!("Job #{} ({}) failed: {:#}", job.index, job.label, e);
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                            error!("Job #{} ({}) aborted: {}", job.index, job.label, e);
                        }
                    }
                }
                debug!("Worker {} finished", worker_id);
            }));
        }

        let mut dispatched = 0;
        for (index, (label, payload)) in jobs.into_iter().enumerate() {
            let job = QueuedJob { index, label, payload };
            if tx.send(job).await.is_err() {
                error!("All workers stopped, job #{} not dispatched", index);
                break;
            }
            dispatched += 1;
        }
        drop(tx);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        let report = PoolReport {
            dispatched,
            completed: completed.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
        };
        info!(
            "Pool drained: {} dispatched, {} completed, {} failed",
            report.dispatched, report.completed, report.failed
        );
        report
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn labelled(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("job-{}", i), i)).collect()
    }

    #[tokio::test]
    async fn test_all_jobs_complete() {
        let pool = WorkerPool::new(3);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();

        let report = pool
            .run(labelled(10), move |index, payload| {
                let sink = sink.clone();
                async move {
                    assert_eq!(index, payload);
                    sink.lock().unwrap().push(index);
                    Ok(())
                }
            })
            .await;

        assert_eq!(report, PoolReport { dispatched: 10, completed: 10, failed: 0 });
        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_width_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());

        pool.run(labelled(8), move |_, _| {
            let (active, peak) = (a.clone(), p.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_failures_and_panics_do_not_stop_batch() {
        let pool = WorkerPool::new(2);
        let report = pool
            .run(labelled(6), |index, _| async move {
                match index {
                    1 => anyhow::bail!("bad release"),
                    4 => panic!("worker bug"),
                    _ => Ok(()),
                }
            })
            .await;

        assert_eq!(report, PoolReport { dispatched: 6, completed: 4, failed: 2 });
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let pool = WorkerPool::default();
        let report = pool.run(Vec::<(String, ())>::new(), |_, _| async { Ok(()) }).await;
        assert_eq!(report, PoolReport::default());
    }
}
