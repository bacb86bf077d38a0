use calcbench_core::{
    BenchConfig, RunMode, TokenMode, DEFAULT_JWT_SECRET, DEFAULT_PORT, DEFAULT_SIGNING_PASSPHRASE,
};
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Latency and throughput benchmark for the calcbench service")]
pub struct ClientCli {
    /// Server host:port
    #[arg(long, default_value_t = format!("localhost:{DEFAULT_PORT}"))]
    pub host: String,

    /// unary or bidirectional
    #[arg(long, default_value = "unary")]
    pub mode: RunMode,

    /// Concurrent senders (unary mode only)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    /// Pause after each send, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval: u64,

    #[arg(short, long, default_value_t = 3, allow_hyphen_values = true)]
    pub x: i64,

    #[arg(short, long, default_value_t = 1, allow_hyphen_values = true)]
    pub y: i64,

    /// ADD, SUBTRACT or ISPRIME
    #[arg(long, default_value = "ADD")]
    pub operation: String,

    /// Total transactions for the run
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(0..=i32::MAX as i64))]
    pub transactions: u32,

    #[arg(long, default_value = "default-client")]
    pub client_id: String,

    /// Only list entries slower than this, in milliseconds
    #[arg(long, default_value_t = 5)]
    pub latency_gt: u64,

    /// once or every
    #[arg(long, default_value = "once")]
    pub jwt_gen: TokenMode,

    #[arg(long, default_value = DEFAULT_JWT_SECRET)]
    pub jwt_secret: String,

    #[arg(long, default_value = DEFAULT_SIGNING_PASSPHRASE)]
    pub signing_passphrase: String,

    /// How long to wait for in-flight responses, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub grace: u64,

    #[arg(short, long)]
    pub verbose: bool,

    /// Also print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl ClientCli {
    pub fn bench_config(&self) -> BenchConfig {
        let mut config = BenchConfig::new(&self.host)
            .mode(self.mode)
            .client_id(&self.client_id)
            .workers(self.workers as usize)
            .interval(Duration::from_millis(self.interval))
            .transactions(self.transactions)
            .calculation(self.x, self.y, &self.operation)
            .token_mode(self.jwt_gen)
            .drain_grace(Duration::from_millis(self.grace));
        config.latency_threshold = Duration::from_millis(self.latency_gt);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let cli = ClientCli::parse_from(["calcbench"]);
        assert_eq!(cli.bench_config(), BenchConfig::default());
    }

    #[test]
    fn flags() {
        let cli = ClientCli::parse_from([
            "calcbench",
            "--mode",
            "bidirectional",
            "-x",
            "-5",
            "-y",
            "9",
            "--operation",
            "subtract",
            "--jwt-gen",
            "every",
            "--latency-gt",
            "20",
        ]);
        let config = cli.bench_config();
        assert_eq!(config.mode, RunMode::Bidirectional);
        assert_eq!(config.x, -5);
        assert_eq!(config.token_mode, TokenMode::Every);
        assert_eq!(config.latency_threshold, Duration::from_millis(20));
        assert_eq!(config.transaction(1).op().unwrap().to_string(), "SUBTRACT");
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(ClientCli::try_parse_from(["calcbench", "--workers", "0"]).is_err());
        assert!(ClientCli::try_parse_from(["calcbench", "--jwt-gen", "sometimes"]).is_err());
    }

    #[test]
    fn transactions_limited_to_id_space() {
        let max = i32::MAX.to_string();
        let cli = ClientCli::parse_from(["calcbench", "--transactions", max.as_str()]);
        assert_eq!(cli.transactions, i32::MAX as u32);

        let over = (i32::MAX as u64 + 1).to_string();
        assert!(ClientCli::try_parse_from(["calcbench", "--transactions", over.as_str()]).is_err());
    }
}
