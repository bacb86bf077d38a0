use calcbench::prelude::*;
use calcbench_core::Calculation;
use calcbench_server::{CalcServer, RunningServer};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

pub const JWT_SECRET: &str = "e2e-secret";
pub const PASSPHRASE: &str = "e2e-passphrase";

#[allow(unused)]
pub fn init() -> &'static PrometheusHandle {
    static ONCE_LOCK: OnceLock<PrometheusHandle> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("calcbench=debug,calcbench_server=debug,axum::rejection=trace")
            .try_init();

        PrometheusBuilder::new().install_recorder().unwrap()
    })
}

#[allow(unused)]
pub async fn spawn_server(queue_capacity: usize) -> RunningServer {
    CalcServer::new()
        .ip("127.0.0.1")
        .port(0)
        .jwt_secret(JWT_SECRET)
        .signing_passphrase(PASSPHRASE)
        .queue_capacity(queue_capacity)
        .bind()
        .await
        .unwrap()
}

#[allow(unused)]
pub fn config(server: &RunningServer, mode: RunMode, client_id: &str) -> BenchConfig {
    BenchConfig::new(&server.local_addr().to_string())
        .mode(mode)
        .client_id(client_id)
        .interval(Duration::from_millis(1))
        .drain_grace(Duration::from_secs(2))
}

#[allow(unused)]
pub fn benchmark(config: BenchConfig) -> Benchmark {
    Benchmark::new(
        config,
        Arc::new(Ed25519Signer::from_passphrase(PASSPHRASE)),
        Arc::new(JwtAuthority::new(JWT_SECRET.as_bytes())),
    )
}

/// IDs 1 through 4: a prime check, an addition, a subtraction and an
/// operation the server does not know.
#[allow(unused)]
pub fn mixed_plan(id: i32) -> Calculation {
    match id {
        0 => Calculation::new(1, 7, 0, "ISPRIME"),
        1 => Calculation::new(2, 3, 5, "ADD"),
        2 => Calculation::new(3, 5, 9, "SUBTRACT"),
        _ => Calculation::new(4, 2, 2, "MULTIPLY"),
    }
}

/// Poll `check` until it holds or a second has passed.
#[allow(unused)]
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
