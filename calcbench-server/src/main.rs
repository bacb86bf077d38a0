use calcbench_server::{CalcServer, ServerCli};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerCli::parse();

    let default_filter = if args.verbose {
        "calcbench_server=debug,tower_http=debug"
    } else {
        "calcbench_server=info"
    };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Serving metrics on {addr}");
    }

    let server = CalcServer::new().with_args(&args).bind().await?;

    let cancel = server.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received ctrl-c, shutting down");
            cancel.cancel();
        }
    });

    server.wait().await?;
    Ok(())
}
