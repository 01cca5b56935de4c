use alloy::primitives::Address;
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use governor::{Quota, RateLimiter};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::num::NonZeroU32;
use std::sync::Arc;

use tally_common::{TallyError, TransferRecord};

use crate::config::Config;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

pub(crate) type HttpProvider = RootProvider;
pub(crate) type SharedRateLimiter = Arc<RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>>;

/// Pulls Transfer logs of one token contract and resolves block timestamps.
///
/// No retries happen here: every failure is returned to the caller, which
/// owns the retry policy.
pub struct LogFetcher {
    provider: HttpProvider,
    client: reqwest::Client,
    rpc_url: String,
    token: Address,
    rpc_batch_size: usize,
    rate_limiter: SharedRateLimiter,
}

impl LogFetcher {
    pub fn new(config: &Config) -> Result<Self, TallyError> {
        let url: reqwest::Url = config
            .rpc_url
            .trim()
            .parse()
            .map_err(|e| TallyError::Config(format!("Invalid RPC_URL {}: {}", config.rpc_url, e)))?;
        let provider = RootProvider::new_http(url);

        let rps = NonZeroU32::new(config.rpc_requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter: SharedRateLimiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        tracing::info!("Rate limiting RPC requests to {} req/sec", rps);

        Ok(Self {
            provider,
            client: reqwest::Client::new(),
            rpc_url: config.rpc_url.trim().to_string(),
            token: config.token_address,
            rpc_batch_size: config.rpc_batch_size.max(1) as usize,
            rate_limiter,
        })
    }

    pub fn token(&self) -> Address {
        self.token
    }

    /// Current chain head height
    pub async fn chain_head(&self) -> Result<u64, TallyError> {
        self.rate_limiter.until_ready().await;
        self.provider
            .get_block_number()
            .await
            .map_err(|e| TallyError::Provider(format!("eth_blockNumber failed: {}", e)))
    }

    /// Every Transfer of the token in `[from_block, to_block]`, with block
    /// timestamps filled in. An inverted range yields an empty result.
    pub async fn fetch_transfers(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<TransferRecord>, TallyError> {
        if to_block < from_block {
            return Ok(Vec::new());
        }

        let filter = Filter::new()
            .address(self.token)
            .event_signature(Transfer::SIGNATURE_HASH)
            .from_block(from_block)
            .to_block(to_block);

        self.rate_limiter.until_ready().await;
        let logs = self.provider.get_logs(&filter).await.map_err(|e| {
            TallyError::Provider(format!(
                "eth_getLogs {} to {} failed: {}",
                from_block, to_block, e
            ))
        })?;

        let total = logs.len();
        let mut transfers: Vec<TransferRecord> = logs.iter().filter_map(decode_transfer).collect();
        if transfers.len() < total {
            tracing::debug!(
                "Dropped {} malformed logs in blocks {} to {}",
                total - transfers.len(),
                from_block,
                to_block
            );
        }
        if transfers.is_empty() {
            return Ok(transfers);
        }

        let blocks: BTreeSet<u64> = transfers.iter().map(|t| t.block_number as u64).collect();
        let timestamps = self.block_timestamps(&blocks).await?;

        for transfer in &mut transfers {
            let block = transfer.block_number as u64;
            let ts = timestamps.get(&block).copied().ok_or_else(|| {
                TallyError::Provider(format!("No timestamp resolved for block {}", block))
            })?;
            transfer.block_time = ts as i64;
        }

        tracing::debug!(
            "Fetched {} transfers across {} blocks ({} to {})",
            transfers.len(),
            blocks.len(),
            from_block,
            to_block
        );
        Ok(transfers)
    }

    /// One `eth_getBlockByNumber` per distinct block, grouped into JSON-RPC
    /// batch requests of `rpc_batch_size` calls.
    async fn block_timestamps(&self, blocks: &BTreeSet<u64>) -> Result<HashMap<u64, u64>, TallyError> {
        let blocks: Vec<u64> = blocks.iter().copied().collect();
        let batches = blocks
            .chunks(self.rpc_batch_size)
            .map(|chunk| self.fetch_timestamps_batch(chunk));

        let mut timestamps = HashMap::with_capacity(blocks.len());
        for batch in futures::future::try_join_all(batches).await? {
            timestamps.extend(batch);
        }
        Ok(timestamps)
    }

    async fn fetch_timestamps_batch(&self, blocks: &[u64]) -> Result<Vec<(u64, u64)>, TallyError> {
        // One permit per call carried in the batch
        for _ in blocks {
            self.rate_limiter.until_ready().await;
        }

        let batch_request: Vec<serde_json::Value> = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                serde_json::json!({
                    "jsonrpc": "2.0",
                    "method": "eth_getBlockByNumber",
                    "params": [format!("0x{:x}", block), false],
                    "id": i
                })
            })
            .collect();

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&batch_request)
            .send()
            .await
            .map_err(|e| TallyError::Provider(format!("HTTP request failed: {}", e)))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TallyError::Provider(format!("Failed to parse response: {}", e)))?;

        let responses = match body {
            serde_json::Value::Array(items) => items,
            other => {
                return Err(TallyError::Provider(format!(
                    "Expected batch response, got: {}",
                    other
                )))
            }
        };

        let mut response_map: BTreeMap<u64, &serde_json::Value> = BTreeMap::new();
        for resp in &responses {
            if let Some(id) = resp.get("id").and_then(|v| v.as_u64()) {
                response_map.insert(id, resp);
            }
        }

        blocks
            .iter()
            .enumerate()
            .map(|(i, &block)| {
                let resp = response_map
                    .get(&(i as u64))
                    .ok_or_else(|| TallyError::Provider(format!("Missing response for block {}", block)))?;
                if let Some(error) = resp.get("error") {
                    return Err(TallyError::Provider(format!("RPC error for block {}: {}", block, error)));
                }
                let timestamp = resp
                    .get("result")
                    .filter(|r| !r.is_null())
                    .ok_or_else(|| TallyError::Provider(format!("Block {} not found", block)))?
                    .get("timestamp")
                    .and_then(|t| t.as_str())
                    .and_then(parse_quantity)
                    .ok_or_else(|| {
                        TallyError::Provider(format!("Block {} has no valid timestamp", block))
                    })?;
                Ok((block, timestamp))
            })
            .collect()
    }
}

/// Turn a raw log into a transfer with `block_time` still unset.
/// Logs missing chain position or failing to decode are skipped.
fn decode_transfer(log: &Log) -> Option<TransferRecord> {
    let tx_hash = log.transaction_hash?;
    let block_number = log.block_number?;
    let log_index = log.log_index?;
    let decoded = log.log_decode::<Transfer>().ok()?;
    let event = decoded.inner.data;

    Some(TransferRecord {
        tx_hash: format!("{:#x}", tx_hash),
        log_index: log_index as i64,
        block_number: block_number as i64,
        block_time: 0,
        from: format!("{:#x}", event.from),
        to: format!("{:#x}", event.to),
        value: event.value.to_string(),
    })
}

fn parse_quantity(hex: &str) -> Option<u64> {
    let digits = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}
