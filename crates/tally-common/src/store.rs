use sqlx::SqlitePool;
use std::path::Path;

use crate::types::{TransferRecord, MAX_QUERY_LIMIT};
use crate::{db, TallyError};

const STORE_MAX_CONNECTIONS: u32 = 8;

/// Durable, deduplicated record of observed transfers.
///
/// The store owns its pool; clones share it. All writes go through
/// [`TransferStore::add_transfers`], one transaction per batch, so readers
/// never see half of a batch.
#[derive(Clone)]
pub struct TransferStore {
    pool: SqlitePool,
}

impl TransferStore {
    /// Open (or create) the store at `path` and bring the schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TallyError> {
        let path = path.as_ref();
        let pool = db::create_pool(path, STORE_MAX_CONNECTIONS).await?;

        tracing::debug!("Running database migrations on {}", path.display());
        db::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Insert a batch atomically. Rows whose `(tx_hash, log_index)` already
    /// exists are skipped. Returns the number of rows actually inserted.
    pub async fn add_transfers(&self, rows: &[TransferRecord]) -> Result<u64, TallyError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for row in rows {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO transfers
                    (tx_hash, log_index, block_number, block_time, from_address, to_address, value)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&row.tx_hash)
            .bind(row.log_index)
            .bind(row.block_number)
            .bind(row.block_time)
            .bind(row.from.to_lowercase())
            .bind(row.to.to_lowercase())
            .bind(&row.value)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;

        tracing::debug!("Committed {} of {} transfers", inserted, rows.len());
        Ok(inserted)
    }

    /// Highest block number present, or `None` for an empty store.
    pub async fn highest_block(&self) -> Result<Option<u64>, TallyError> {
        let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(block_number) FROM transfers")
            .fetch_one(&self.pool)
            .await?;

        Ok(max.map(|b| b.max(0) as u64))
    }

    /// Transfers where `address` is sender or recipient, most recent first.
    /// `limit` is clamped to `0..=MAX_QUERY_LIMIT` and a negative `offset` to 0.
    pub async fn transfers_by_address(
        &self,
        address: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransferRecord>, TallyError> {
        let address = address.trim().to_lowercase();
        let limit = limit.clamp(0, MAX_QUERY_LIMIT);
        let offset = offset.max(0);

        let transfers: Vec<TransferRecord> = sqlx::query_as(
            "SELECT tx_hash, log_index, block_number, block_time, from_address, to_address, value
             FROM transfers
             WHERE from_address = ?1 OR to_address = ?1
             ORDER BY block_number DESC, log_index DESC
             LIMIT ?2 OFFSET ?3",
        )
        .bind(&address)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(transfers)
    }

    /// Total number of stored transfers
    pub async fn count(&self) -> Result<i64, TallyError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transfers")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
