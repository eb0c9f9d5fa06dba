use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::config::SyncConfig;
use crate::learn::source::RecordStore;
use crate::learn::sync::SyncBatch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub batches: u64,
    pub records: u64,
    pub failed_batches: u64,
}

/// 消费会话发出的记录批次并写入存储；失败按线性退避重试，最终放弃时只记日志
pub struct RecordSyncWorker<S> {
    store: Arc<S>,
    rx: mpsc::Receiver<SyncBatch>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl<S> RecordSyncWorker<S>
where
    S: RecordStore + Send + Sync + 'static,
{
    pub fn new(store: Arc<S>, rx: mpsc::Receiver<SyncBatch>, config: &SyncConfig) -> Self {
        Self {
            store,
            rx,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Runs until every sender is dropped or `stop` fires. On `stop` the
    /// channel is closed and whatever is already queued is still written.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> SyncStats {
        let mut stats = SyncStats::default();
        tracing::info!("Record sync worker started");

        loop {
            tokio::select! {
                biased;
                maybe_batch = self.rx.recv() => match maybe_batch {
                    Some(batch) => self.persist(batch, &mut stats).await,
                    None => break,
                },
                _ = &mut stop => {
                    self.rx.close();
                    while let Some(batch) = self.rx.recv().await {
                        self.persist(batch, &mut stats).await;
                    }
                    break;
                }
            }
        }

        tracing::info!(
            batches = stats.batches,
            records = stats.records,
            failed = stats.failed_batches,
            "Record sync worker stopped"
        );
        stats
    }

    async fn persist(&self, batch: SyncBatch, stats: &mut SyncStats) {
        for attempt in 0..=self.max_retries {
            match self.write(&batch) {
                Ok(()) => {
                    stats.batches += 1;
                    stats.records += batch.records.len() as u64;
                    return;
                }
                Err(e) if attempt < self.max_retries => {
                    tracing::warn!(
                        user_id = %batch.user_id,
                        set_id = %batch.set_id,
                        attempt = attempt + 1,
                        error = %e,
                        "Record sync failed, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * (attempt + 1)).await;
                }
                Err(e) => {
                    stats.failed_batches += 1;
                    tracing::error!(
                        user_id = %batch.user_id,
                        set_id = %batch.set_id,
                        records = batch.records.len(),
                        round = ?batch.round,
                        error = %e,
                        "Record sync gave up, batch dropped"
                    );
                }
            }
        }
    }

    fn write(&self, batch: &SyncBatch) -> Result<(), S::Error> {
        write_batch(self.store.as_ref(), batch)
    }
}

/// Writes one batch straight to the store. The set's learn round is only
/// touched when the batch carries one.
pub fn write_batch<S: RecordStore + ?Sized>(store: &S, batch: &SyncBatch) -> Result<(), S::Error> {
    if !batch.records.is_empty() {
        store.upsert_learn_records(&batch.user_id, &batch.set_id, &batch.records)?;
    }
    if let Some(round) = batch.round {
        store.save_learn_round(&batch.user_id, &batch.set_id, round)?;
    }
    Ok(())
}
