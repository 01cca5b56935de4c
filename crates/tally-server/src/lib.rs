use alloy::primitives::Address;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tally_common::TransferStore;
use tally_indexer::SyncStatus;

pub mod error;
pub mod handlers;

pub struct AppState {
    pub store: TransferStore,
    pub token: Address,
    pub sync_status: watch::Receiver<SyncStatus>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/transfers/{address}", get(handlers::transfers::get_address_transfers))
        .route("/status", get(handlers::status::get_status))
        .route("/health", get(handlers::status::health))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
