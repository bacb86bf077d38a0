mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use calcbench::prelude::*;
    use calcbench::RunError;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(15_000)]
    async fn concurrent_clients_only_see_their_results() {
        init();
        let server = spawn_server(32).await;

        let left = benchmark(
            config(&server, RunMode::Unary, "left")
                .transactions(50)
                .workers(4)
                .calculation(1, 1, "ADD"),
        );
        let right = benchmark(
            config(&server, RunMode::Unary, "right")
                .transactions(50)
                .workers(4)
                .calculation(10, 1, "SUBTRACT"),
        );

        let (left_report, right_report) = tokio::join!(left.run(), right.run());
        let (left_report, right_report) = (left_report.unwrap(), right_report.unwrap());

        assert_eq!(left_report.statistics.received, 50);
        assert_eq!(right_report.statistics.received, 50);
        assert_eq!(left_report.statistics.unknown_responses, 0);
        assert!(left.ledger().snapshot().iter().all(|e| e.calculation.result == 2));
        assert!(right.ledger().snapshot().iter().all(|e| e.calculation.result == 9));

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(10_000)]
    async fn wrong_secret_fails_setup() {
        init();
        let server = spawn_server(10).await;

        let bench = Benchmark::new(
            config(&server, RunMode::Unary, "intruder").transactions(1),
            Arc::new(Ed25519Signer::from_passphrase(PASSPHRASE)),
            Arc::new(JwtAuthority::new(b"not-the-secret")),
        );
        let err = bench.run().await.unwrap_err();
        assert!(matches!(err, RunError::Setup(_)), "{err:?}");
        assert!(bench.ledger().is_empty());
        assert!(server.registry().is_empty());

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(10_000)]
    async fn wrong_signing_key_drops_every_request() {
        init();
        let server = spawn_server(10).await;

        let bench = Benchmark::new(
            config(&server, RunMode::Bidirectional, "forger")
                .transactions(3)
                .drain_grace(std::time::Duration::from_millis(300)),
            Arc::new(Ed25519Signer::from_passphrase("forged")),
            Arc::new(JwtAuthority::new(JWT_SECRET.as_bytes())),
        );
        let report = bench.run().await.unwrap();

        // The stream survives every bad message; nothing comes back.
        assert_eq!(report.statistics.total_entries, 3);
        assert_eq!(report.statistics.received, 0);
        assert_eq!(report.statistics.latency, Default::default());

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ntest::timeout(10_000)]
    async fn results_without_subscriber_are_dropped() {
        use calcbench_core::{
            bearer_header, Calculation, MessageSigner, TokenIssuer, AUTHORIZATION_HEADER,
            CALCULATE_PATH, CLIENT_ID_HEADER,
        };

        let metrics = init();
        let server = spawn_server(10).await;

        let signer = Ed25519Signer::from_passphrase(PASSPHRASE);
        let token = JwtAuthority::new(JWT_SECRET.as_bytes())
            .issue("nobody", std::time::Duration::from_secs(60))
            .unwrap();
        let body = signer
            .sign(&Calculation::new(1, 1, 1, "ADD").to_bytes().unwrap())
            .unwrap();

        let status = reqwest::Client::new()
            .post(format!("http://{}{CALCULATE_PATH}", server.local_addr()))
            .header(AUTHORIZATION_HEADER, bearer_header(&token))
            .header(CLIENT_ID_HEADER, "nobody")
            .body(body)
            .send()
            .await
            .unwrap()
            .status();

        // Best effort: the call itself still succeeds.
        assert_eq!(status, reqwest::StatusCode::OK);
        assert_eq!(server.registry().stats().dropped_no_subscriber, 1);
        assert!(metrics.render().contains("calcbench_dispatch_dropped"));

        server.shutdown();
        server.wait().await.unwrap();
    }
}
