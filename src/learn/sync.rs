//! Persistence sync adapter: hands mutated record snapshots to the record store
//! without ever blocking the scheduler.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::learn::types::TermRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    pub user_id: String,
    pub set_id: String,
    /// Learn round to store on the set; `None` for review passes.
    pub round: Option<u32>,
    pub records: Vec<TermRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sync channel is full")]
    Full,
    #[error("sync channel is closed")]
    Closed,
}

pub trait RecordSink: Send + Sync {
    /// Must return immediately; a rejected batch stays pending in the session.
    fn submit(&self, batch: SyncBatch) -> Result<(), SinkError>;
}

/// Bounded channel in front of the record-sync worker.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SyncBatch>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SyncBatch>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Waits for channel capacity. Used off the scheduler's path (teardown),
    /// where keeping batch order matters more than returning immediately.
    pub async fn deliver(&self, batch: SyncBatch) -> Result<(), SinkError> {
        self.tx.send(batch).await.map_err(|_| SinkError::Closed)
    }
}

impl RecordSink for ChannelSink {
    fn submit(&self, batch: SyncBatch) -> Result<(), SinkError> {
        self.tx.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Discards everything; for sessions that are not backed by a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn submit(&self, _batch: SyncBatch) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(round: u32) -> SyncBatch {
        SyncBatch {
            user_id: "u1".to_string(),
            set_id: "s1".to_string(),
            round: Some(round),
            records: vec![TermRecord::fresh("t1")],
        }
    }

    #[test]
    fn full_channel_rejects_without_blocking() {
        let (sink, _rx) = ChannelSink::new(1);
        sink.submit(batch(1)).unwrap();
        assert_eq!(sink.submit(batch(2)), Err(SinkError::Full));
    }

    #[test]
    fn closed_channel_is_reported() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);
        assert_eq!(sink.submit(batch(1)), Err(SinkError::Closed));
    }

    #[test]
    fn deliver_waits_for_capacity() {
        let (sink, mut rx) = ChannelSink::new(1);
        sink.submit(batch(1)).unwrap();
        let waiting = sink.clone();
        tokio_test::block_on(async move {
            let pending = tokio::spawn(async move { waiting.deliver(batch(2)).await });
            assert_eq!(rx.recv().await.unwrap().round, Some(1));
            pending.await.unwrap().unwrap();
            assert_eq!(rx.recv().await.unwrap().round, Some(2));
        });
    }

    #[test]
    fn delivered_batches_arrive_in_order() {
        let (sink, mut rx) = ChannelSink::new(4);
        sink.submit(batch(1)).unwrap();
        sink.submit(batch(2)).unwrap();

        let first = tokio_test::block_on(rx.recv()).unwrap();
        let second = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(first.round, Some(1));
        assert_eq!(second.round, Some(2));
    }
}
