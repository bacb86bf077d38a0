use calcbench::{cli::ClientCli, Benchmark};
use calcbench_core::{Ed25519Signer, JwtAuthority};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientCli::parse();

    let default_filter = if args.verbose {
        "calcbench=debug"
    } else {
        "calcbench=info"
    };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let signer = Arc::new(Ed25519Signer::from_passphrase(&args.signing_passphrase));
    let issuer = Arc::new(JwtAuthority::new(args.jwt_secret.as_bytes()));

    let report = Benchmark::new(args.bench_config(), signer, issuer)
        .run()
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
