use anyhow::Result;
use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;

use tally_common::TransferStore;
use tally_indexer::{telemetry, Config, SyncLoop};
use tally_server::{router, AppState};

/// Index ERC-20 Transfer events and serve them over HTTP
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[arg(long, env = "API_HOST", default_value = "0.0.0.0")]
    api_host: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init("tally_server=info,tally_indexer=info,tower_http=debug,sqlx=warn");

    tracing::info!("Starting Tally Server");

    let cli = Cli::parse();
    let config = cli.config;
    config.validate()?;

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let store = TransferStore::open(&config.db_path).await?;
    tracing::info!("Using database {}", config.db_path.display());

    let sync = Arc::new(SyncLoop::new(&config, store.clone())?);
    let state = Arc::new(AppState {
        store,
        token: config.token_address,
        sync_status: sync.subscribe(),
    });

    let sync_handle = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.run().await })
    };

    let app = router(state).route("/metrics", get(move || std::future::ready(metrics.render())));

    let addr = format!("{}:{}", cli.api_host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        "Listening on {}. Token {}. Polling every {}ms.",
        addr,
        config.token_address.to_checksum(None),
        config.poll_interval_ms
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await?;

    sync_handle.abort();
    Ok(())
}
