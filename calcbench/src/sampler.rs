use calcbench_core::{ThroughputStats, SAMPLE_INTERVAL};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

mod counters;
mod timer;

pub use counters::{Counters, WindowSample};
use timer::Timer;

/// Folds per-window send/receive counts into run totals.
pub struct ThroughputSampler {
    counters: Arc<Counters>,
    stats: ThroughputStats,
}

impl Default for ThroughputSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputSampler {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::new()),
            stats: ThroughputStats::default(),
        }
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Close the current window and fold it in.
    pub fn tick(&mut self) -> WindowSample {
        let sample = self.counters.collect();
        self.fold(sample);
        sample
    }

    pub fn stats(&self) -> ThroughputStats {
        self.stats
    }

    /// Fold whatever the last, partial window holds. An empty final window
    /// is not counted as a tick.
    pub fn finish(mut self) -> ThroughputStats {
        let sample = self.counters.collect();
        if !sample.is_empty() {
            self.fold(sample);
        }
        self.stats
    }

    /// Sample every `period` on a background task until the returned handle
    /// is stopped.
    pub fn spawn(self, period: Duration) -> SamplerHandle {
        let stop = CancellationToken::new();
        let counters = self.counters();
        let task = tokio::spawn(self.run(period, stop.clone()).in_current_span());
        SamplerHandle {
            counters,
            stop,
            task,
        }
    }

    async fn run(mut self, period: Duration, stop: CancellationToken) -> ThroughputStats {
        let mut timer = Timer::new(period).await;
        debug!("Sampling throughput every {timer}");

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                elapsed = timer.tick() => {
                    let sample = self.tick();
                    debug!(
                        "Request TPS: {}, Response TPS: {} (window {})",
                        sample.sent,
                        sample.received,
                        humantime::format_duration(elapsed)
                    );
                }
            }
        }

        self.finish()
    }

    fn fold(&mut self, sample: WindowSample) {
        let stats = &mut self.stats;
        stats.ticks += 1;
        stats.sent_total += sample.sent;
        stats.received_total += sample.received;
        stats.max_sent = stats.max_sent.max(sample.sent);
        stats.max_received = stats.max_received.max(sample.received);
    }
}

pub struct SamplerHandle {
    counters: Arc<Counters>,
    stop: CancellationToken,
    task: JoinHandle<ThroughputStats>,
}

impl SamplerHandle {
    pub fn start() -> Self {
        ThroughputSampler::new().spawn(SAMPLE_INTERVAL)
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Stop sampling and return the totals. Only call once nothing will
    /// touch the counters again.
    pub async fn stop(self) -> Result<ThroughputStats, tokio::task::JoinError> {
        self.stop.cancel();
        self.task.await
    }
}
