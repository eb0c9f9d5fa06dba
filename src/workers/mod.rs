pub mod record_sync;
pub mod session_cleanup;
pub mod store_flush;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::WorkerConfig;
use crate::state::AppState;

/// Upper bound for one job run.
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// How long shutdown waits for in-flight job runs.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const DRAIN_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    SessionCleanup,
    StoreFlush,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCleanup => "session_cleanup",
            Self::StoreFlush => "store_flush",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

/// Marks one job as running; dropping it frees the job for its next tick.
struct RunGuard {
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
}

impl RunGuard {
    fn try_acquire(running: &Arc<AtomicBool>, in_flight: &Arc<AtomicUsize>) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        in_flight.fetch_add(1, Ordering::SeqCst);
        Some(Self {
            running: running.clone(),
            in_flight: in_flight.clone(),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

pub struct WorkerManager {
    state: AppState,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerManager {
    pub fn new(
        state: AppState,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            state,
            shutdown_rx,
            config: config.clone(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::SessionCleanup,
                cron: "0 * * * * *",
                // 0 表示不回收空闲会话
                enabled: self.config.session_idle_minutes > 0,
            },
            JobSpec {
                name: WorkerName::StoreFlush,
                cron: "0 */5 * * * *",
                enabled: true,
            },
        ]
    }

    /// Runs the cron scheduler until the shutdown broadcast fires.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Not the worker leader; cron jobs stay off");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        let registered = self.register_jobs(&scheduler).await;
        scheduler.start().await?;
        tracing::info!(jobs = registered, "Worker manager started");

        let _ = self.shutdown_rx.recv().await;

        let drained = self.wait_for_in_flight().await;
        if !drained {
            tracing::warn!(
                in_flight = self.in_flight.load(Ordering::SeqCst),
                "Stopping scheduler with job runs still in flight"
            );
        }
        let _ = scheduler.shutdown().await;
        tracing::info!("Worker manager stopped");
        Ok(())
    }

    async fn wait_for_in_flight(&self) -> bool {
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        true
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) -> usize {
        let max_idle = Duration::from_secs(self.config.session_idle_minutes * 60);
        let mut registered = 0;

        for spec in self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(worker = spec.name.as_str(), "Worker disabled by config");
                continue;
            }

            let state = self.state.clone();
            let job = match spec.name {
                WorkerName::SessionCleanup => self.cron_job(&spec, move || {
                    let state = state.clone();
                    async move {
                        session_cleanup::run(&state, max_idle).await;
                    }
                }),
                WorkerName::StoreFlush => self.cron_job(&spec, move || {
                    let state = state.clone();
                    async move {
                        store_flush::run(state.store()).await;
                    }
                }),
            };

            let added = match job {
                Ok(job) => scheduler.add(job).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match added {
                Ok(()) => {
                    registered += 1;
                    tracing::info!(worker = spec.name.as_str(), cron = spec.cron, "Registered worker");
                }
                Err(e) => tracing::error!(
                    worker = spec.name.as_str(),
                    cron = spec.cron,
                    error = %e,
                    "Failed to register worker"
                ),
            }
        }
        registered
    }

    /// Wraps `run` so a tick is skipped while the previous run is still going
    /// and every run is bounded by [`WORKER_TIMEOUT`].
    fn cron_job<Fut, F>(&self, spec: &JobSpec, mut run: F) -> Result<Job, JobSchedulerError>
    where
        F: FnMut() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = spec.name.as_str();
        let running = Arc::new(AtomicBool::new(false));
        let in_flight = self.in_flight.clone();

        Job::new_async(spec.cron, move |_uuid, _lock| {
            let Some(guard) = RunGuard::try_acquire(&running, &in_flight) else {
                tracing::warn!(worker = name, "Previous run still in progress, tick skipped");
                return Box::pin(async {});
            };

            let fut = run();
            Box::pin(async move {
                let started = std::time::Instant::now();
                match tokio::time::timeout(WORKER_TIMEOUT, fut).await {
                    Ok(()) => tracing::debug!(
                        worker = name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Worker run finished"
                    ),
                    Err(_) => tracing::error!(
                        worker = name,
                        timeout_secs = WORKER_TIMEOUT.as_secs(),
                        "Worker timed out"
                    ),
                }
                drop(guard);
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use crate::config::Config;
    use crate::learn::sync::ChannelSink;
    use crate::store::Store;

    use super::*;

    fn test_state(tmp: &tempfile::TempDir) -> (AppState, broadcast::Sender<()>) {
        let cfg = Config::from_env();
        let store =
            Arc::new(Store::open(tmp.path().join("worker_test.sled").to_str().unwrap()).unwrap());
        let (sink, _rx) = ChannelSink::new(8);
        let (tx, _) = broadcast::channel(2);
        (AppState::new(store, &cfg, sink, tx.clone()), tx)
    }

    #[tokio::test]
    async fn leader_switch_controls_job_registration() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (state, tx) = test_state(&tmp);

        let mut worker_cfg = state.config().worker.clone();
        worker_cfg.is_leader = false;

        let manager = WorkerManager::new(state, tx.subscribe(), &worker_cfg);
        assert!(manager.planned_jobs().is_empty());
        manager
            .start()
            .await
            .expect("non-leader start should succeed");
    }

    #[tokio::test]
    async fn zero_idle_minutes_disables_cleanup() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (state, tx) = test_state(&tmp);

        let mut worker_cfg = state.config().worker.clone();
        worker_cfg.is_leader = true;
        worker_cfg.session_idle_minutes = 0;

        let manager = WorkerManager::new(state, tx.subscribe(), &worker_cfg);
        let cleanup = manager
            .planned_jobs()
            .into_iter()
            .find(|j| j.name == WorkerName::SessionCleanup)
            .unwrap();
        assert!(!cleanup.enabled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn leader_starts_and_stops_on_shutdown() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (state, tx) = test_state(&tmp);

        let mut worker_cfg = state.config().worker.clone();
        worker_cfg.is_leader = true;

        let manager = WorkerManager::new(state, tx.subscribe(), &worker_cfg);
        let handle = tokio::spawn(manager.start());
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker manager should stop")
            .expect("join");
        assert!(result.is_ok());
    }

    #[test]
    fn run_guard_blocks_overlap_until_dropped() {
        let running = Arc::new(AtomicBool::new(false));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let guard = RunGuard::try_acquire(&running, &in_flight).expect("first run");
        assert!(RunGuard::try_acquire(&running, &in_flight).is_none());
        assert_eq!(in_flight.load(Ordering::SeqCst), 1);

        drop(guard);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        assert!(RunGuard::try_acquire(&running, &in_flight).is_some());
    }

    #[test]
    fn worker_names_are_distinct() {
        assert_ne!(
            WorkerName::SessionCleanup.as_str(),
            WorkerName::StoreFlush.as_str()
        );
    }
}
