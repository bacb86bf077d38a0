//! Correlates sent transactions with their responses.
//!
//! Many senders record concurrently while one receive loop matches
//! responses; both go through the same mutex. Entries are never removed
//! before the ledger itself is dropped.
use calcbench_core::{labels, Calculation, LatencyStats};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// The request as sent. `result` and `is_prime` are filled in from the
    /// response once it arrives.
    pub calculation: Calculation,
    pub received: bool,
    pub sent_at: Instant,
    pub latency: Option<Duration>,
}

impl LedgerEntry {
    fn new(calculation: Calculation, sent_at: Instant) -> Self {
        Self {
            calculation,
            received: false,
            sent_at,
            latency: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Matched(Duration),
    /// No transaction with this ID was recorded as sent.
    Unknown,
    /// Already matched once; the first response stands.
    Duplicate,
}

#[derive(Default)]
struct RunClock {
    start: Option<Instant>,
    stop: Option<Instant>,
}

#[derive(Default)]
pub struct TransactionLedger {
    entries: Mutex<HashMap<i32, LedgerEntry>>,
    clock: Mutex<RunClock>,
    unknown: AtomicU64,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        let mut clock = lock(&self.clock);
        clock.start = Some(Instant::now());
        clock.stop = None;
    }

    pub fn stop(&self) {
        lock(&self.clock).stop = Some(Instant::now());
    }

    /// Time between `start` and `stop`, or up to now while still running.
    pub fn duration(&self) -> Duration {
        let clock = lock(&self.clock);
        match (clock.start, clock.stop) {
            (Some(start), Some(stop)) => stop.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn record_sent(&self, calculation: Calculation) {
        self.record_sent_at(calculation, Instant::now())
    }

    /// Store `calculation` as sent at `sent_at`. A prior entry with the same
    /// ID is overwritten.
    pub fn record_sent_at(&self, calculation: Calculation, sent_at: Instant) {
        let id = calculation.id;
        let replaced = lock(&self.entries).insert(id, LedgerEntry::new(calculation, sent_at));
        if replaced.is_some() {
            warn!("Transaction {id} recorded twice, keeping the latest");
        }
    }

    pub fn record_response(&self, response: &Calculation) -> ResponseOutcome {
        self.record_response_at(response, Instant::now())
    }

    pub fn record_response_at(&self, response: &Calculation, received_at: Instant) -> ResponseOutcome {
        let outcome = {
            let mut entries = lock(&self.entries);
            match entries.get_mut(&response.id) {
                None => ResponseOutcome::Unknown,
                Some(entry) if entry.received => ResponseOutcome::Duplicate,
                Some(entry) => {
                    let latency = received_at.saturating_duration_since(entry.sent_at);
                    entry.calculation.result = response.result;
                    entry.calculation.is_prime = response.is_prime;
                    entry.received = true;
                    entry.latency = Some(latency);
                    ResponseOutcome::Matched(latency)
                }
            }
        };

        match outcome {
            ResponseOutcome::Matched(latency) => {
                debug!(
                    "Received response for ID={}, Latency={}ms, Response: {response}",
                    response.id,
                    latency.as_millis()
                );
            }
            ResponseOutcome::Unknown => {
                self.unknown.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(labels::UNKNOWN_RESPONSE).increment(1);
                warn!("Received response for unknown ID={}", response.id);
            }
            ResponseOutcome::Duplicate => {
                debug!("Ignoring duplicate response for ID={}", response.id);
            }
        }
        outcome
    }

    pub fn get(&self, id: i32) -> Option<LedgerEntry> {
        lock(&self.entries).get(&id).cloned()
    }

    /// Independent copy of every entry, ordered by ID.
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = lock(&self.entries).values().cloned().collect();
        entries.sort_by_key(|entry| entry.calculation.id);
        entries
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn received_count(&self) -> usize {
        lock(&self.entries)
            .values()
            .filter(|entry| entry.received)
            .count()
    }

    pub fn unknown_responses(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }

    pub fn summarize(&self) -> LatencyStats {
        let latencies: Vec<Duration> = lock(&self.entries)
            .values()
            .filter(|entry| entry.received)
            .filter_map(|entry| entry.latency)
            .collect();
        LatencyStats::from_latencies(&latencies)
    }

    /// Received entries slower than `threshold`, ordered by ID.
    pub fn entries_over(&self, threshold: Duration) -> Vec<LedgerEntry> {
        self.snapshot()
            .into_iter()
            .filter(|entry| entry.latency.is_some_and(|latency| latency > threshold))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
