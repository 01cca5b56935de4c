use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use tally_indexer::SyncStatus;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub token: String,
    pub highest_block: Option<u64>,
    pub total_transfers: i64,
    #[serde(flatten)]
    pub sync: SyncStatus,
}

/// GET /health - Liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// GET /status - Stored progress plus the live sync state
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let highest_block = state.store.highest_block().await?;
    let total_transfers = state.store.count().await?;
    let sync = state.sync_status.borrow().clone();

    Ok(Json(StatusResponse {
        token: state.token.to_checksum(None),
        highest_block,
        total_transfers,
        sync,
    }))
}
