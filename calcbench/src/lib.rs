//! Benchmark client for the calcbench calculator service.
//!
//! A run drives a fixed budget of transactions at the server over either
//! unary calls with a separate result stream or one bidirectional stream,
//! correlates every response with its request and reports latency and
//! throughput.
pub mod cli;
pub mod generator;
pub mod ledger;
pub mod orchestrator;
pub mod report;
pub mod sampler;
pub mod transport;

mod error;

pub use crate::error::{RunError, TransportError};
pub use crate::generator::WorkGenerator;
pub use crate::ledger::{LedgerEntry, ResponseOutcome, TransactionLedger};
pub use crate::orchestrator::{Benchmark, StreamState};
pub use crate::report::{Report, SlowEntry};
pub use crate::sampler::{SamplerHandle, ThroughputSampler};

pub mod prelude {
    pub use crate::{Benchmark, Report};
    pub use calcbench_core::{BenchConfig, Ed25519Signer, JwtAuthority, RunMode, TokenMode};
}
