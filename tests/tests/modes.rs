mod utils;
#[allow(unused)]
use utils::*;

mod tests {
    use super::*;
    use calcbench::prelude::*;
    use calcbench::TransactionLedger;

    fn assert_mixed_results(ledger: &TransactionLedger, report: &Report) {
        let prime = ledger.get(1).unwrap();
        assert!(prime.received);
        assert!(prime.calculation.is_prime);
        assert_eq!(prime.calculation.result, 0);

        let sum = ledger.get(2).unwrap();
        assert!(sum.received);
        assert_eq!(sum.calculation.result, 8);

        let difference = ledger.get(3).unwrap();
        assert!(difference.received);
        assert_eq!(difference.calculation.result, -4);

        let unknown = ledger.get(4).unwrap();
        assert!(!unknown.received);
        assert_eq!(unknown.latency, None);
        assert_eq!(unknown.calculation.result, 0);

        for entry in ledger.snapshot().iter().filter(|e| e.received) {
            assert!(entry.latency.is_some());
        }

        let stats = &report.statistics;
        assert_eq!(stats.total_entries, 4);
        assert_eq!(stats.received, 3);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.send_errors, 0);
        assert_eq!(stats.unknown_responses, 0);
        assert_eq!(stats.latency.count, 3);
        assert_eq!(stats.throughput.received_total, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn unary_mixed_operations() {
        init();
        let server = spawn_server(10).await;

        let bench = benchmark(
            config(&server, RunMode::Unary, "unary-mixed")
                .transactions(4)
                .workers(2),
        )
        .plan(mixed_plan);
        let report = bench.run().await.unwrap();

        assert_mixed_results(&bench.ledger(), &report);
        // Only accepted sends count towards request throughput.
        assert_eq!(report.statistics.throughput.sent_total, 3);

        let registry = server.registry().clone();
        assert!(eventually(|| registry.is_empty()).await);
        assert_eq!(registry.stats().delivered, 3);

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn bidirectional_mixed_operations() {
        init();
        let server = spawn_server(10).await;

        let bench = benchmark(
            config(&server, RunMode::Bidirectional, "bidi-mixed").transactions(4),
        )
        .plan(mixed_plan);
        let report = bench.run().await.unwrap();

        assert_mixed_results(&bench.ledger(), &report);
        assert_eq!(report.statistics.throughput.sent_total, 4);

        // Direct replies never touch the registry.
        assert_eq!(server.registry().stats().delivered, 0);

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(20_000)]
    async fn unary_many_workers() {
        init();
        let server = spawn_server(64).await;

        let bench = benchmark(
            config(&server, RunMode::Unary, "unary-load")
                .transactions(200)
                .workers(8)
                .calculation(20, 22, "add"),
        );
        let report = bench.run().await.unwrap();

        assert_eq!(report.statistics.total_entries, 200);
        assert_eq!(report.statistics.received, 200);
        assert!(bench
            .ledger()
            .snapshot()
            .iter()
            .all(|e| e.calculation.result == 42));
        assert_eq!(report.config.workers, 8);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["statistics"]["received"], 200);
        assert_eq!(json["config"]["mode"], "unary");

        server.shutdown();
        server.wait().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ntest::timeout(10_000)]
    async fn fresh_token_per_call() {
        init();
        let server = spawn_server(10).await;

        let report = benchmark(
            config(&server, RunMode::Unary, "every-token")
                .transactions(5)
                .token_mode(TokenMode::Every),
        )
        .run()
        .await
        .unwrap();
        assert_eq!(report.statistics.received, 5);

        server.shutdown();
        server.wait().await.unwrap();
    }
}
