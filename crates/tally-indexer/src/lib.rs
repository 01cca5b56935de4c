pub mod config;
pub mod fetcher;
pub mod sync;
pub mod telemetry;

pub use config::Config;
pub use fetcher::LogFetcher;
pub use sync::{SyncLoop, SyncOutcome, SyncPhase, SyncStatus};
