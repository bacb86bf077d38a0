use calcbench_core::labels;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hot-path send/receive counters shared by every task of a run.
#[derive(Debug, Default)]
pub struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(labels::SENT).increment(1);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(labels::RECEIVED).increment(1);
    }

    /// Read-and-reset both counters. Each increment lands in exactly one
    /// window.
    pub fn collect(&self) -> WindowSample {
        WindowSample {
            sent: self.sent.swap(0, Ordering::Relaxed),
            received: self.received.swap(0, Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WindowSample {
    pub sent: u64,
    pub received: u64,
}

impl WindowSample {
    pub fn is_empty(&self) -> bool {
        self.sent == 0 && self.received == 0
    }
}
