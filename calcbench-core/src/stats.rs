use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Latency summary over completed transactions, in milliseconds.
///
/// An empty sample set yields all zeroes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl LatencyStats {
    pub fn from_latencies(latencies: &[Duration]) -> Self {
        let millis: Vec<f64> = latencies
            .iter()
            .map(|dur| dur.as_secs_f64() * 1_000.)
            .collect();
        Self::from_millis(millis)
    }

    pub fn from_millis(mut samples: Vec<f64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_by(f64::total_cmp);

        let std_dev = if samples.len() > 1 {
            statistical::standard_deviation(&samples, None)
        } else {
            0.
        };

        Self {
            count: samples.len(),
            mean: statistical::mean(&samples),
            median: empirical_quantile(&samples, 0.5),
            p90: empirical_quantile(&samples, 0.90),
            p95: empirical_quantile(&samples, 0.95),
            min: samples[0],
            max: samples[samples.len() - 1],
            std_dev,
        }
    }
}

/// Value at position `ceil(f * n) - 1` of an ascending slice, clamped to the
/// slice bounds. Returns 0 for an empty slice.
pub fn empirical_quantile(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.;
    }
    let rank = (fraction * sorted.len() as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Latency Summary:")?;
        writeln!(f, "  Average Latency: {:.2} ms", self.mean)?;
        writeln!(f, "  Median Latency: {:.2} ms", self.median)?;
        writeln!(f, "  90th Percentile: {:.2} ms", self.p90)?;
        writeln!(f, "  95th Percentile: {:.2} ms", self.p95)?;
        writeln!(f, "  Minimum Latency: {:.2} ms", self.min)?;
        writeln!(f, "  Maximum Latency: {:.2} ms", self.max)?;
        write!(f, "  Standard Deviation: {:.2} ms", self.std_dev)
    }
}

/// Send/receive rates folded over every sample window of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ThroughputStats {
    pub ticks: u64,
    pub sent_total: u64,
    pub received_total: u64,
    pub max_sent: u64,
    pub max_received: u64,
}

impl ThroughputStats {
    pub fn avg_sent(&self) -> f64 {
        average(self.sent_total, self.ticks)
    }

    pub fn avg_received(&self) -> f64 {
        average(self.received_total, self.ticks)
    }
}

fn average(sum: u64, ticks: u64) -> f64 {
    if ticks == 0 {
        0.
    } else {
        sum as f64 / ticks as f64
    }
}

impl fmt::Display for ThroughputStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Average Request TPS: {:.2}, Max Request TPS: {}",
            self.avg_sent(),
            self.max_sent
        )?;
        write!(
            f,
            "Average Response TPS: {:.2}, Max Response TPS: {}",
            self.avg_received(),
            self.max_received
        )
    }
}

/// Everything a finished benchmark run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    #[serde(with = "duration_str")]
    pub duration: Duration,
    pub total_entries: usize,
    pub received: usize,
    pub send_errors: u64,
    pub unknown_responses: u64,
    pub rejected: u64,
    pub throughput: ThroughputStats,
    pub latency: LatencyStats,
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== SUMMARY ====")?;
        writeln!(f, "Duration: {:.2}s", self.duration.as_secs_f64())?;
        writeln!(
            f,
            "Total Entries: {}, Received: {}",
            self.total_entries, self.received
        )?;
        writeln!(
            f,
            "Send errors: {}, Unknown responses: {}, Rejected: {}",
            self.send_errors, self.unknown_responses, self.rejected
        )?;
        writeln!(f, "{}", self.throughput)?;
        write!(f, "{}", self.latency)
    }
}

mod duration_str {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*dur))
    }
}
