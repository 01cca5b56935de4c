use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use tally_common::{TallyError, TransferStore};

use crate::config::Config;
use crate::fetcher::LogFetcher;

/// Where the sync worker currently is in its cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SyncPhase {
    #[default]
    Idle,
    DeterminingStart,
    FetchingHead,
    FetchingBatch { from: u64, to: u64 },
    Waiting,
}

/// Snapshot published to observers after every transition
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub chain_head: Option<u64>,
    /// Last block of the most recently committed batch in this process
    pub scanned_through: Option<u64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle was active; nothing was done.
    Skipped,
    CaughtUp { head: u64, batches: u64, inserted: u64 },
}

/// Drives the fetcher from the last persisted block to the chain head.
///
/// At most one cycle runs at a time. Each cycle recomputes its start from
/// the store, so a batch lost to a crash or error is simply fetched again.
pub struct SyncLoop {
    fetcher: LogFetcher,
    store: TransferStore,
    start_block: u64,
    batch_size: u64,
    poll_interval: Duration,
    cycle: Mutex<()>,
    status: watch::Sender<SyncStatus>,
    warned_start_gap: AtomicBool,
}

impl SyncLoop {
    pub fn new(config: &Config, store: TransferStore) -> Result<Self, TallyError> {
        let fetcher = LogFetcher::new(config)?;
        let (status, _) = watch::channel(SyncStatus::default());

        Ok(Self {
            fetcher,
            store,
            start_block: config.start_block,
            batch_size: config.block_batch_size.max(1),
            poll_interval: config.poll_interval(),
            cycle: Mutex::new(()),
            status,
            warned_start_gap: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Run sync cycles forever, sleeping `poll_interval` after each one.
    /// Errors end the current cycle only.
    pub async fn run(&self) {
        tracing::info!(
            "Sync loop started: token {}, start block {}, batch size {}, poll every {:?}",
            self.fetcher.token(),
            self.start_block,
            self.batch_size,
            self.poll_interval
        );

        loop {
            match self.sync_once().await {
                Ok(SyncOutcome::CaughtUp { head, batches, inserted }) => {
                    self.status.send_modify(|s| s.last_error = None);
                    if batches > 0 {
                        tracing::info!(
                            "Caught up to block {} ({} batches, {} new transfers)",
                            head,
                            batches,
                            inserted
                        );
                    } else {
                        tracing::debug!("Already at chain head {}", head);
                    }
                }
                Ok(SyncOutcome::Skipped) => {
                    // The active cycle owns the published phase
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    let kind = if e.is_storage() { "storage" } else { "provider" };
                    metrics::counter!("tally_sync_errors_total", "kind" => kind).increment(1);
                    tracing::error!(
                        kind,
                        "Sync cycle failed: {}. Retrying in {:?}",
                        e,
                        self.poll_interval
                    );
                    self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                }
            }

            self.set_phase(SyncPhase::Waiting);
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One cycle: determine start, query head, then fetch and commit batches
    /// in increasing block order until the head is reached.
    pub async fn sync_once(&self) -> Result<SyncOutcome, TallyError> {
        let Ok(_cycle) = self.cycle.try_lock() else {
            tracing::debug!("Sync cycle already in progress, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        let result = self.sync_to_head().await;
        self.set_phase(SyncPhase::Idle);
        result
    }

    async fn sync_to_head(&self) -> Result<SyncOutcome, TallyError> {
        self.set_phase(SyncPhase::DeterminingStart);
        let mut from = self.next_from_block().await?;

        self.set_phase(SyncPhase::FetchingHead);
        let head = self.fetcher.chain_head().await?;
        self.status.send_modify(|s| s.chain_head = Some(head));
        tracing::debug!("Chain head: {}, next block: {}", head, from);

        let mut batches = 0;
        let mut inserted = 0;

        while from <= head {
            let to = from.saturating_add(self.batch_size - 1).min(head);
            self.set_phase(SyncPhase::FetchingBatch { from, to });

            let started = std::time::Instant::now();
            let transfers = self.fetcher.fetch_transfers(from, to).await?;
            let new_rows = self.store.add_transfers(&transfers).await?;

            batches += 1;
            inserted += new_rows;
            metrics::counter!("tally_sync_batches_total").increment(1);
            metrics::counter!("tally_transfers_inserted_total").increment(new_rows);
            metrics::gauge!("tally_last_synced_block").set(to as f64);
            self.status.send_modify(|s| s.scanned_through = Some(to));

            tracing::info!(
                "Batch committed: {} to {} ({} transfers, {} new, {:.2}s) | head {}",
                from,
                to,
                transfers.len(),
                new_rows,
                started.elapsed().as_secs_f64(),
                head
            );

            from = to + 1;
        }

        Ok(SyncOutcome::CaughtUp { head, batches, inserted })
    }

    /// `max(start_block, highest + 1)`, or `start_block` on an empty store.
    async fn next_from_block(&self) -> Result<u64, TallyError> {
        let Some(highest) = self.store.highest_block().await? else {
            return Ok(self.start_block);
        };

        let next = highest.saturating_add(1);
        if next < self.start_block && !self.warned_start_gap.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "Stored data ends at block {} but START_BLOCK is {}; blocks in between are not scanned",
                highest,
                self.start_block
            );
        }

        Ok(next.max(self.start_block))
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.status.send_modify(|s| s.phase = phase);
    }
}
