use crate::{
    auth::TokenMode, calculation::Calculation, DEFAULT_DRAIN_GRACE, DEFAULT_PORT,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Fire-and-forget calls, results come back on a separate stream.
    #[default]
    Unary,
    /// One full-duplex stream carries requests and results.
    Bidirectional,
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unary" => Ok(RunMode::Unary),
            "bidirectional" | "bidi" => Ok(RunMode::Bidirectional),
            other => Err(format!("Unknown mode: {other}")),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Unary => f.write_str("unary"),
            RunMode::Bidirectional => f.write_str("bidirectional"),
        }
    }
}

/// Parameters of one benchmark run.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    pub host: String,
    pub mode: RunMode,
    pub client_id: String,
    /// Concurrent senders. Only used in unary mode.
    pub workers: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    /// Total transaction budget for the run.
    pub transactions: u32,
    pub x: i64,
    pub y: i64,
    pub operation: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub latency_threshold: Duration,
    pub token_mode: TokenMode,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub drain_grace: Duration,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            host: format!("localhost:{DEFAULT_PORT}"),
            mode: RunMode::Unary,
            client_id: "default-client".to_string(),
            workers: 1,
            interval: Duration::from_millis(1000),
            transactions: 10,
            x: 3,
            y: 1,
            operation: "ADD".to_string(),
            latency_threshold: Duration::from_millis(5),
            token_mode: TokenMode::Once,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }
}

impl BenchConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_string();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn transactions(mut self, transactions: u32) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn calculation(mut self, x: i64, y: i64, operation: &str) -> Self {
        self.x = x;
        self.y = y;
        self.operation = operation.to_string();
        self
    }

    pub fn token_mode(mut self, token_mode: TokenMode) -> Self {
        self.token_mode = token_mode;
        self
    }

    pub fn drain_grace(mut self, drain_grace: Duration) -> Self {
        self.drain_grace = drain_grace;
        self
    }

    /// The request sent for transaction `id`.
    pub fn transaction(&self, id: i32) -> Calculation {
        Calculation::new(id, self.x, self.y, self.operation.as_str())
    }
}
