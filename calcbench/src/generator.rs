//! Splits a fixed transaction budget across paced workers.
use async_channel::{bounded, Receiver};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

/// Transaction IDs are `i32` on the wire.
pub const MAX_BUDGET: u32 = i32::MAX as u32;

#[derive(Debug, Clone)]
pub struct WorkGenerator {
    budget: u32,
    workers: usize,
    interval: Duration,
}

impl WorkGenerator {
    pub fn new(budget: u32, workers: usize, interval: Duration) -> Self {
        let budget = if budget > MAX_BUDGET {
            warn!("Transaction budget {budget} exceeds the ID space, capping at {MAX_BUDGET}");
            MAX_BUDGET
        } else {
            budget
        };
        Self {
            budget,
            workers: workers.max(1),
            interval,
        }
    }

    /// One sender pacing every transaction itself.
    pub fn single(budget: u32, interval: Duration) -> Self {
        Self::new(budget, 1, interval)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Feed every transaction ID of the run into a small queue that closes
    /// once the budget is spent, `stop` fires or every worker has gone.
    fn work_queue(&self, stop: &CancellationToken) -> Receiver<i32> {
        let (tx, rx) = bounded(self.workers * 2);
        let ids = 0..i32::try_from(self.budget).unwrap_or(i32::MAX);
        let stop = stop.clone();

        tokio::spawn(
            async move {
                for id in ids {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        res = tx.send(id) => if res.is_err() {
                            break;
                        },
                    }
                }
            }
            .in_current_span(),
        );
        rx
    }

    /// Drive `send` once per transaction ID and wait for every worker to
    /// exit. Each worker sleeps `interval` after every send. Cancelling
    /// `stop` ends the run early, between sends.
    pub async fn run<F, Fut>(&self, send: F, stop: CancellationToken) -> u64
    where
        F: Fn(usize, i32) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let queue = self.work_queue(&stop);
        let mut workers = JoinSet::new();

        for worker in 0..self.workers {
            let queue = queue.clone();
            let send = send.clone();
            let stop = stop.clone();
            let interval = self.interval;

            workers.spawn(
                async move {
                    let mut completed = 0;
                    loop {
                        let id = tokio::select! {
                            _ = stop.cancelled() => break,
                            id = queue.recv() => match id {
                                Ok(id) => id,
                                Err(_) => break,
                            },
                        };

                        send(worker, id).await;
                        completed += 1;

                        tokio::select! {
                            _ = stop.cancelled() => break,
                            _ = tokio::time::sleep(interval) => {}
                        }
                    }
                    trace!("Worker {worker} done after {completed} transactions");
                    completed
                }
                .in_current_span(),
            );
        }

        let mut total = 0;
        while let Some(res) = workers.join_next().await {
            match res {
                Ok(completed) => total += completed,
                Err(err) => error!("Worker task failed: {err}"),
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn every_id_sent_once() {
        let seen = Arc::new(Mutex::new(vec![]));
        let generator = WorkGenerator::new(25, 4, Duration::from_millis(1));

        let total = generator
            .run(
                {
                    let seen = seen.clone();
                    move |worker, id| {
                        let seen = seen.clone();
                        async move { seen.lock().unwrap().push((worker, id)) }
                    }
                },
                CancellationToken::new(),
            )
            .await;

        assert_eq!(total, 25);
        let seen = seen.lock().unwrap();
        let ids: HashSet<i32> = seen.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, (0..25).collect());
        assert!(seen.iter().all(|(worker, _)| *worker < 4));
    }

    #[tokio::test(start_paused = true)]
    async fn workers_pace_their_sends() {
        let generator = WorkGenerator::single(3, Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let stamps = Arc::new(Mutex::new(vec![]));

        generator
            .run(
                {
                    let stamps = stamps.clone();
                    move |_, _| {
                        let stamps = stamps.clone();
                        async move { stamps.lock().unwrap().push(start.elapsed()) }
                    }
                },
                CancellationToken::new(),
            )
            .await;

        let stamps = stamps.lock().unwrap();
        assert_eq!(
            *stamps,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn stop_ends_run_early() {
        let generator = WorkGenerator::new(1_000, 2, Duration::from_secs(60));
        let stop = CancellationToken::new();
        let handle = tokio::spawn({
            let stop = stop.clone();
            async move { generator.run(|_, _| async {}, stop).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.cancel();
        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test]
    #[ntest::timeout(5_000)]
    async fn oversized_budget_is_capped_and_ids_stay_positive() {
        let generator = WorkGenerator::new(u32::MAX, 2, Duration::from_millis(1));
        assert_eq!(generator.budget(), i32::MAX as u32);

        let seen = Arc::new(Mutex::new(vec![]));
        let stop = CancellationToken::new();
        let handle = tokio::spawn({
            let seen = seen.clone();
            let stop = stop.clone();
            async move {
                generator
                    .run(
                        move |_, id| {
                            let seen = seen.clone();
                            async move { seen.lock().unwrap().push(id) }
                        },
                        stop,
                    )
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.cancel();
        let total = handle.await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(total as usize, seen.len());
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|id| *id >= 0));
    }

    #[tokio::test]
    async fn empty_budget() {
        let generator = WorkGenerator::new(0, 3, Duration::from_millis(1));
        assert_eq!(generator.run(|_, _| async {}, CancellationToken::new()).await, 0);
    }
}
