use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::learn::registry::SessionRegistry;
use crate::learn::session::LearnSession;
use crate::learn::sync::{ChannelSink, RecordSink};
use crate::learn::SchedulerConfig;
use crate::store::Store;
use crate::workers::record_sync::write_batch;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    registry: Arc<SessionRegistry>,
    sink: ChannelSink,
    scheduler: Arc<SchedulerConfig>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        config: &Config,
        sink: ChannelSink,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            store,
            registry: Arc::new(SessionRegistry::new()),
            sink,
            scheduler: Arc::new(SchedulerConfig::from_env(&config.learn)),
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn record_sink(&self) -> Arc<dyn RecordSink> {
        Arc::new(self.sink.clone())
    }

    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Tears sessions down and makes sure their last records reach the store.
    /// A batch the sink refused is queued behind earlier ones; if the sync
    /// worker is gone it is written directly.
    pub async fn retire_sessions(&self, sessions: Vec<LearnSession>) -> usize {
        let count = sessions.len();
        for session in sessions {
            let report = session.teardown();
            let Some(batch) = report.undelivered else {
                continue;
            };
            if self.sink.deliver(batch.clone()).await.is_ok() {
                continue;
            }

            if let Err(e) = write_batch(self.store.as_ref(), &batch) {
                tracing::error!(
                    user_id = %batch.user_id,
                    set_id = %batch.set_id,
                    records = batch.records.len(),
                    error = %e,
                    "Failed to persist records of retired session"
                );
            }
        }
        count
    }
}
