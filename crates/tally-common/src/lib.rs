pub mod types;
pub mod db;
pub mod error;
pub mod store;

pub use types::*;
pub use error::TallyError;
pub use store::TransferStore;
