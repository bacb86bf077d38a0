//! Run lifecycle: open the streams, drive the senders, drain, report.
//!
//! Shutdown is staged. Senders stop first, then the send direction is
//! closed, then in-flight responses get a bounded grace period before the
//! receive side is torn down and the sampler stopped.
use crate::{
    error::RunError,
    ledger::{ResponseOutcome, TransactionLedger},
    report::{Report, Tallies},
    sampler::{Counters, SamplerHandle},
    transport::{Codec, Credentials},
};
use calcbench_core::{
    BenchConfig, Calculation, MessageSigner, Reply, RunMode, TokenIssuer,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

mod bidi;
mod unary;

/// Lifecycle of one client-side stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
    Opening,
    Open,
    Delivering,
    Closed,
}

impl StreamState {
    pub(crate) fn advance(&mut self, next: StreamState, stream: &str) {
        if *self != next {
            debug!("{stream} stream {self} -> {next}");
            *self = next;
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

type Plan = Arc<dyn Fn(i32) -> Calculation + Send + Sync>;

/// Accepted requests versus answers seen, for the drain.
#[derive(Default)]
pub(crate) struct InFlight {
    accepted: AtomicU64,
    answered: AtomicU64,
    notify: Notify,
}

impl InFlight {
    pub fn accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn answer(&self) {
        self.answered.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn pending(&self) -> u64 {
        self.accepted
            .load(Ordering::Relaxed)
            .saturating_sub(self.answered.load(Ordering::Relaxed))
    }

    async fn settled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait until every accepted request is answered or `deadline` passes.
    pub async fn drain(&self, deadline: Instant) -> bool {
        match tokio::time::timeout_at(deadline, self.settled()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "{} responses still pending after grace period",
                    self.pending()
                );
                false
            }
        }
    }
}

/// State shared by every task of one run.
pub(crate) struct Shared {
    pub config: BenchConfig,
    pub ledger: Arc<TransactionLedger>,
    pub codec: Codec,
    pub counters: Arc<Counters>,
    pub inflight: InFlight,
    plan: Plan,
    send_errors: AtomicU64,
    rejected: AtomicU64,
}

impl Shared {
    pub fn transaction(&self, id: i32) -> Calculation {
        (self.plan)(id)
    }

    pub fn send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(calcbench_core::labels::SEND_ERROR).increment(1);
    }

    pub fn rejected(&self, id: Option<i32>, reason: &str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(calcbench_core::labels::REJECTED).increment(1);
        match id {
            Some(id) => warn!("Transaction {id} rejected: {reason}"),
            None => warn!("Request rejected: {reason}"),
        }
    }

    /// Account for one frame off a result stream.
    pub fn handle_reply(&self, reply: Reply) {
        match reply {
            Reply::Result(envelope) => match self.codec.open(&envelope) {
                Ok(response) => {
                    if let ResponseOutcome::Matched(_) = self.ledger.record_response(&response) {
                        self.counters.record_received();
                    }
                }
                Err(err) => warn!("Failed to read response: {err}"),
            },
            Reply::Rejected { id, reason } => self.rejected(id, &reason),
        }
        self.inflight.answer();
    }

    fn tallies(&self) -> Tallies {
        Tallies {
            send_errors: self.send_errors.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn for_tests(config: BenchConfig) -> Arc<Self> {
        let plan: Plan = {
            let config = config.clone();
            Arc::new(move |id| config.transaction(id))
        };
        Arc::new(Self {
            config,
            ledger: Arc::new(TransactionLedger::new()),
            codec: Codec::new(Arc::new(calcbench_core::Ed25519Signer::from_passphrase(
                "orchestrator-tests",
            ))),
            counters: Arc::new(Counters::new()),
            inflight: InFlight::default(),
            plan,
            send_errors: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }
}

/// One benchmark run against a calculator server.
///
/// # Example
///
/// ```ignore
/// let report = Benchmark::new(config, signer, issuer).run().await?;
/// println!("{report}");
/// ```
pub struct Benchmark {
    config: BenchConfig,
    ledger: Arc<TransactionLedger>,
    signer: Arc<dyn MessageSigner>,
    issuer: Arc<dyn TokenIssuer>,
    plan: Plan,
}

impl Benchmark {
    pub fn new(
        config: BenchConfig,
        signer: Arc<dyn MessageSigner>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        let plan: Plan = {
            let config = config.clone();
            Arc::new(move |id| config.transaction(id))
        };
        Self {
            config,
            ledger: Arc::new(TransactionLedger::new()),
            signer,
            issuer,
            plan,
        }
    }

    /// Replace the request built for each transaction ID. By default every
    /// transaction carries the configured operands and operation.
    pub fn plan<F>(mut self, plan: F) -> Self
    where
        F: Fn(i32) -> Calculation + Send + Sync + 'static,
    {
        self.plan = Arc::new(plan);
        self
    }

    pub fn ledger(&self) -> Arc<TransactionLedger> {
        self.ledger.clone()
    }

    #[instrument(name = "calcbench", skip_all, fields(mode = %self.config.mode, client_id = %self.config.client_id))]
    pub async fn run(&self) -> Result<Report, RunError> {
        let credentials = Arc::new(
            Credentials::new(self.issuer.clone(), &self.config.client_id, self.config.token_mode)
                .map_err(crate::error::TransportError::from)?,
        );

        let sampler = SamplerHandle::start();
        let shared = Arc::new(Shared {
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            codec: Codec::new(self.signer.clone()),
            counters: sampler.counters(),
            inflight: InFlight::default(),
            plan: self.plan.clone(),
            send_errors: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        let res = match self.config.mode {
            RunMode::Unary => unary::run(shared.clone(), credentials).await,
            RunMode::Bidirectional => bidi::run(shared.clone(), credentials).await,
        };
        let throughput = sampler.stop().await?;
        res?;

        let report = Report::new(&shared.config, &shared.ledger, throughput, shared.tallies());
        info!("{report}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    #[ntest::timeout(2_000)]
    async fn drain_returns_once_answered() {
        let inflight = Arc::new(InFlight::default());
        inflight.accept();
        inflight.accept();

        let answerer = {
            let inflight = inflight.clone();
            tokio::spawn(async move {
                for _ in 0..2 {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    inflight.answer();
                }
            })
        };

        assert!(inflight.drain(Instant::now() + Duration::from_secs(1)).await);
        assert_eq!(inflight.pending(), 0);
        answerer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn drain_gives_up_after_grace() {
        let inflight = InFlight::default();
        inflight.accept();

        assert!(!inflight.drain(Instant::now() + Duration::from_secs(2)).await);
        assert!(logs_contain("1 responses still pending"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn bidirectional_run_closes_cleanly() {
        use calcbench_core::{Ed25519Signer, JwtAuthority};

        let server = calcbench_server::CalcServer::new()
            .ip("127.0.0.1")
            .port(0)
            .jwt_secret("orchestrator-tests")
            .signing_passphrase("orchestrator-tests")
            .bind()
            .await
            .unwrap();

        let config = BenchConfig::new(&server.local_addr().to_string())
            .mode(RunMode::Bidirectional)
            .transactions(3)
            .interval(Duration::from_millis(1))
            .drain_grace(Duration::from_secs(2));
        let report = Benchmark::new(
            config,
            Arc::new(Ed25519Signer::from_passphrase("orchestrator-tests")),
            Arc::new(JwtAuthority::new(b"orchestrator-tests")),
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.statistics.received, 3);
        assert!(logs_contain("Server closed bidirectional stream"));
        assert!(!logs_contain("Bidirectional receive error"));

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[test]
    #[tracing_test::traced_test]
    fn stream_state_logs_transitions() {
        let mut state = StreamState::Opening;
        state.advance(StreamState::Open, "results");
        state.advance(StreamState::Open, "results");
        assert_eq!(state, StreamState::Open);
        assert!(logs_contain("results stream Opening -> Open"));
    }
}
