use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Upper bound on rows returned by a single address query
pub const MAX_QUERY_LIMIT: i64 = 500;

/// ERC-20 Transfer event occurrence as stored in the database.
///
/// `(tx_hash, log_index)` is the natural key. Addresses are lowercase and
/// `value` is the uint256 amount rendered as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub block_time: i64,
    #[sqlx(rename = "from_address")]
    pub from: String,
    #[sqlx(rename = "to_address")]
    pub to: String,
    pub value: String,
}

/// Response body for `GET /transfers/{address}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransfersResponse {
    pub address: String,
    pub token: String,
    pub count: usize,
    pub transfers: Vec<TransferRecord>,
}

/// Paging parameters for address queries. Values arrive as raw strings so
/// that garbage input falls back to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

fn default_limit() -> i64 {
    100
}

/// A present but blank value counts as 0; anything else non-numeric is ignored.
fn parse_param(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(0);
    }
    raw.parse().ok()
}

impl TransferQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(parse_param)
            .map(|v| v.clamp(1, MAX_QUERY_LIMIT))
            .unwrap_or_else(default_limit)
    }

    pub fn offset(&self) -> i64 {
        self.offset
            .as_deref()
            .and_then(parse_param)
            .map(|v| v.max(0))
            .unwrap_or(0)
    }
}
