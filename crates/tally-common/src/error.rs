use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RPC error: {0}")]
    Provider(String),

    /// Rendered verbatim, clients match on the message.
    #[error("{0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TallyError {
    pub fn status_code(&self) -> u16 {
        match self {
            TallyError::Validation(_) => 400,
            TallyError::Storage(_) | TallyError::Migration(_) | TallyError::Io(_) => 500,
            TallyError::Provider(_) => 502,
            TallyError::Config(_) => 500,
        }
    }

    /// True for failures of the durable store, as opposed to the chain side.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            TallyError::Storage(_) | TallyError::Migration(_) | TallyError::Io(_)
        )
    }
}
