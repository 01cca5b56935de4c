use alloy::primitives::Address;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use tally_common::TallyError;

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// JSON-RPC endpoint of the chain to index
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: String,

    /// ERC-20 contract whose Transfer events are indexed
    #[arg(long, env = "TOKEN_ADDRESS")]
    pub token_address: Address,

    /// First block to scan on a cold store
    #[arg(long, env = "START_BLOCK", default_value_t = 0)]
    pub start_block: u64,

    /// Delay between sync cycles, in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 15_000)]
    pub poll_interval_ms: u64,

    /// Blocks fetched and committed per step
    #[arg(
        long,
        env = "BLOCK_BATCH_SIZE",
        default_value_t = 2_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub block_batch_size: u64,

    /// SQLite database file
    #[arg(long, env = "DB_PATH", default_value = "./data/erc20-indexer.db")]
    pub db_path: PathBuf,

    #[arg(
        long,
        env = "RPC_REQUESTS_PER_SECOND",
        default_value_t = 100,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rpc_requests_per_second: u32,

    /// Block timestamp lookups per JSON-RPC batch request
    #[arg(
        long,
        env = "RPC_BATCH_SIZE",
        default_value_t = 50,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rpc_batch_size: u32,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Checks clap cannot express. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<(), TallyError> {
        let url = self.rpc_url.trim();
        if url.is_empty() {
            return Err(TallyError::Config("RPC_URL is required".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TallyError::Config(format!(
                "RPC_URL must be an http(s) endpoint, got {}",
                url
            )));
        }
        if self.token_address == Address::ZERO {
            return Err(TallyError::Config(
                "TOKEN_ADDRESS must not be the zero address".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: Config,
    }

    const TOKEN: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    #[test]
    fn defaults_apply() {
        let cli = Cli::try_parse_from([
            "tally",
            "--rpc-url",
            "http://localhost:8545",
            "--token-address",
            TOKEN,
        ])
        .unwrap();
        let config = cli.config;

        assert_eq!(config.start_block, 0);
        assert_eq!(config.poll_interval(), Duration::from_millis(15_000));
        assert_eq!(config.block_batch_size, 2_000);
        assert_eq!(config.db_path, PathBuf::from("./data/erc20-indexer.db"));
        assert_eq!(config.token_address, TOKEN.parse::<Address>().unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let result = Cli::try_parse_from([
            "tally",
            "--rpc-url",
            "http://localhost:8545",
            "--token-address",
            TOKEN,
            "--block-batch-size",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_token_is_rejected() {
        let result = Cli::try_parse_from([
            "tally",
            "--rpc-url",
            "http://localhost:8545",
            "--token-address",
            "0x1234",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn non_http_rpc_url_fails_validation() {
        let cli = Cli::try_parse_from([
            "tally",
            "--rpc-url",
            "ws://localhost:8546",
            "--token-address",
            TOKEN,
        ])
        .unwrap();
        assert!(matches!(cli.config.validate(), Err(TallyError::Config(_))));
    }
}
