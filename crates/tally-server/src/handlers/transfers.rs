use alloy::primitives::Address;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use tally_common::{TallyError, TransferQuery, TransfersResponse};
use crate::error::ApiResult;
use crate::AppState;

/// GET /transfers/{address} - Transfers sent or received by an address, newest first
pub async fn get_address_transfers(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<TransferQuery>,
) -> ApiResult<Json<TransfersResponse>> {
    let address = parse_address(&address)
        .ok_or_else(|| TallyError::Validation("invalid address".to_string()))?;
    let address = format!("{:#x}", address);

    let transfers = state
        .store
        .transfers_by_address(&address, query.limit(), query.offset())
        .await?;

    Ok(Json(TransfersResponse {
        address,
        token: state.token.to_checksum(None),
        count: transfers.len(),
        transfers,
    }))
}

/// `0x` followed by 40 hex digits. All-lowercase and all-uppercase forms are
/// accepted as is; mixed case must be a valid EIP-55 checksum.
fn parse_address(raw: &str) -> Option<Address> {
    let hex = raw.strip_prefix("0x")?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let has_lower = hex.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(raw, None).ok();
    }

    hex.parse().ok()
}
