use crate::ledger::{LedgerEntry, TransactionLedger};
use calcbench_core::{BenchConfig, Calculation, RunStatistics, ThroughputStats};
use serde::Serialize;
use std::fmt;

/// A transaction that took longer than the configured threshold.
#[derive(Debug, Clone, Serialize)]
pub struct SlowEntry {
    pub id: i32,
    pub calculation: Calculation,
    pub received: bool,
    pub latency_ms: u128,
}

impl From<LedgerEntry> for SlowEntry {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.calculation.id,
            latency_ms: entry.latency.map(|l| l.as_millis()).unwrap_or_default(),
            received: entry.received,
            calculation: entry.calculation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub config: BenchConfig,
    pub statistics: RunStatistics,
    pub slow_entries: Vec<SlowEntry>,
}

#[derive(Debug, Copy, Clone, Default)]
pub(crate) struct Tallies {
    pub send_errors: u64,
    pub rejected: u64,
}

impl Report {
    pub(crate) fn new(
        config: &BenchConfig,
        ledger: &TransactionLedger,
        throughput: ThroughputStats,
        tallies: Tallies,
    ) -> Self {
        let statistics = RunStatistics {
            duration: ledger.duration(),
            total_entries: ledger.len(),
            received: ledger.received_count(),
            send_errors: tallies.send_errors,
            unknown_responses: ledger.unknown_responses(),
            rejected: tallies.rejected,
            throughput,
            latency: ledger.summarize(),
        };
        let slow_entries = ledger
            .entries_over(config.latency_threshold)
            .into_iter()
            .map(SlowEntry::from)
            .collect();

        Self {
            config: config.clone(),
            statistics,
            slow_entries,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.statistics)?;
        write!(
            f,
            "Tracking summary (only entries with latency > {}ms):",
            self.config.latency_threshold.as_millis()
        )?;
        for entry in &self.slow_entries {
            write!(
                f,
                "\nID={}, Sent={}, Received={}, Latency={}ms",
                entry.id, entry.calculation, entry.received, entry.latency_ms
            )?;
        }
        Ok(())
    }
}
