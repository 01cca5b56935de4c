use anyhow::Result;
use clap::Parser;

use tally_common::TransferStore;
use tally_indexer::{telemetry, Config, SyncLoop};

/// Index ERC-20 Transfer events of one token into a local SQLite file
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init("tally_indexer=info,sqlx=warn");

    tracing::info!("Starting Tally Indexer");

    let config = Cli::parse().config;
    config.validate()?;

    let store = TransferStore::open(&config.db_path).await?;
    tracing::info!("Using database {}", config.db_path.display());

    let sync = SyncLoop::new(&config, store)?;

    tokio::select! {
        _ = sync.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received, stopping indexer");
        }
    }

    Ok(())
}
