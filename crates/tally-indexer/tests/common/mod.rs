//! In-process JSON-RPC node for driving the fetcher and sync loop.

#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use tally_indexer::Config;

alloy::sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

pub const TOKEN: Address = Address::repeat_byte(0x77);
pub const GENESIS_TIME: u64 = 1_600_000_000;

pub fn block_time(block: u64) -> u64 {
    GENESIS_TIME + block * 12
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn addr_hex(byte: u8) -> String {
    format!("{:#x}", addr(byte))
}

#[derive(Debug, Clone)]
pub struct ChainTransfer {
    pub block: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl ChainTransfer {
    pub fn new(block: u64, tx: u8, log_index: u64, from: u8, to: u8, value: u64) -> Self {
        let mut hash = [0u8; 32];
        hash[0] = tx;
        hash[24..].copy_from_slice(&block.to_be_bytes());
        Self {
            block,
            tx_hash: B256::from(hash),
            log_index,
            from: addr(from),
            to: addr(to),
            value: U256::from(value),
        }
    }

    pub fn tx_hex(&self) -> String {
        format!("{:#x}", self.tx_hash)
    }

    fn to_rpc_log(&self) -> Log {
        let data = LogData::new_unchecked(
            vec![
                Transfer::SIGNATURE_HASH,
                B256::left_padding_from(self.from.as_slice()),
                B256::left_padding_from(self.to.as_slice()),
            ],
            Bytes::from(self.value.to_be_bytes::<32>().to_vec()),
        );
        Log {
            inner: alloy::primitives::Log { address: TOKEN, data },
            block_hash: Some(B256::left_padding_from(&self.block.to_be_bytes())),
            block_number: Some(self.block),
            block_timestamp: None,
            transaction_hash: Some(self.tx_hash),
            transaction_index: Some(0),
            log_index: Some(self.log_index),
            removed: false,
        }
    }
}

#[derive(Default)]
struct NodeState {
    transfers: Mutex<Vec<ChainTransfer>>,
    get_logs_ranges: Mutex<Vec<(u64, u64)>>,
    block_lookups: Mutex<Vec<u64>>,
    fail_get_logs_from: Mutex<Option<u64>>,
}

/// Mock chain served over wiremock. Clones share state.
#[derive(Clone)]
pub struct MockNode {
    head: Arc<AtomicU64>,
    delay: Duration,
    state: Arc<NodeState>,
}

impl MockNode {
    pub fn new(head: u64, transfers: Vec<ChainTransfer>) -> Self {
        let state = NodeState::default();
        *state.transfers.lock().unwrap() = transfers;
        Self {
            head: Arc::new(AtomicU64::new(head)),
            delay: Duration::ZERO,
            state: Arc::new(state),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub async fn start(&self) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(self.clone())
            .mount(&server)
            .await;
        server
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn push(&self, transfer: ChainTransfer) {
        self.state.transfers.lock().unwrap().push(transfer);
    }

    /// Fail the next eth_getLogs whose range starts at or after `block`.
    pub fn fail_get_logs_from(&self, block: u64) {
        *self.state.fail_get_logs_from.lock().unwrap() = Some(block);
    }

    pub fn get_logs_ranges(&self) -> Vec<(u64, u64)> {
        self.state.get_logs_ranges.lock().unwrap().clone()
    }

    pub fn block_lookups(&self) -> Vec<u64> {
        self.state.block_lookups.lock().unwrap().clone()
    }

    fn handle(&self, call: &Value) -> Value {
        let id = call.get("id").cloned().unwrap_or(Value::Null);
        let params = call.get("params").cloned().unwrap_or(Value::Null);
        let head = self.head.load(Ordering::SeqCst);

        let result = match call.get("method").and_then(Value::as_str) {
            Some("eth_blockNumber") => json!(format!("0x{:x}", head)),
            Some("eth_chainId") => json!("0x1"),
            Some("eth_getLogs") => {
                let filter = &params[0];
                let from = quantity(&filter["fromBlock"]);
                let to = quantity(&filter["toBlock"]);
                self.state.get_logs_ranges.lock().unwrap().push((from, to));

                let mut fail = self.state.fail_get_logs_from.lock().unwrap();
                if fail.is_some_and(|b| from >= b) {
                    *fail = None;
                    return json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32005, "message": "query timeout exceeded" }
                    });
                }

                let logs: Vec<Log> = self
                    .state
                    .transfers
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|t| t.block >= from && t.block <= to)
                    .map(ChainTransfer::to_rpc_log)
                    .collect();
                serde_json::to_value(logs).unwrap()
            }
            Some("eth_getBlockByNumber") => {
                let block = quantity(&params[0]);
                self.state.block_lookups.lock().unwrap().push(block);
                if block > head {
                    Value::Null
                } else {
                    json!({
                        "number": format!("0x{:x}", block),
                        "timestamp": format!("0x{:x}", block_time(block)),
                    })
                }
            }
            other => {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("method not found: {:?}", other) }
                })
            }
        };

        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }
}

impl Respond for MockNode {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let reply = match &body {
            Value::Array(calls) => Value::Array(calls.iter().map(|c| self.handle(c)).collect()),
            call => self.handle(call),
        };
        ResponseTemplate::new(200)
            .set_body_json(reply)
            .set_delay(self.delay)
    }
}

fn quantity(value: &Value) -> u64 {
    value
        .as_str()
        .and_then(|s| s.strip_prefix("0x"))
        .and_then(|s| u64::from_str_radix(s, 16).ok())
        .unwrap_or(0)
}

pub fn config(rpc_url: &str, start_block: u64, batch_size: u64) -> Config {
    Config {
        rpc_url: rpc_url.to_string(),
        token_address: TOKEN,
        start_block,
        poll_interval_ms: 20,
        block_batch_size: batch_size,
        db_path: PathBuf::from("unused.db"),
        rpc_requests_per_second: 10_000,
        rpc_batch_size: 4,
    }
}
