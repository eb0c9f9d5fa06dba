use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use learn_backend::config::{Config, LearnEnvConfig, SyncConfig, WorkerConfig};
use learn_backend::learn::sync::ChannelSink;
use learn_backend::routes::build_router;
use learn_backend::state::AppState;
use learn_backend::store::Store;
use learn_backend::workers::record_sync::{RecordSyncWorker, SyncStats};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    sync_stop: Option<oneshot::Sender<()>>,
    sync_handle: Option<JoinHandle<SyncStats>>,
    _temp_dir: TempDir,
}

impl TestApp {
    /// Stops the sync worker after it has written everything queued so far.
    pub async fn drain_sync(&mut self) -> SyncStats {
        if let Some(stop) = self.sync_stop.take() {
            let _ = stop.send(());
        }
        match self.sync_handle.take() {
            Some(handle) => handle.await.expect("sync worker join"),
            None => SyncStats::default(),
        }
    }
}

pub fn test_config(sled_path: String) -> Config {
    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_json: false,
        log_dir: "./logs".to_string(),
        sled_path,
        cors_origin: "http://localhost:5173".to_string(),
        learn: LearnEnvConfig {
            mc_mastery_threshold: 2,
            written_mastery_threshold: 3,
            reinsert_offset: 2,
        },
        sync: SyncConfig {
            channel_capacity: 64,
            max_retries: 1,
            retry_backoff_ms: 1,
        },
        worker: WorkerConfig {
            is_leader: false,
            session_idle_minutes: 30,
        },
    }
}

pub async fn spawn_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("learn-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (sink, batch_rx) = ChannelSink::new(config.sync.channel_capacity);
    let (stop_tx, stop_rx) = oneshot::channel();
    let sync_handle =
        tokio::spawn(RecordSyncWorker::new(store.clone(), batch_rx, &config.sync).run(stop_rx));

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(store, &config, sink, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        sync_stop: Some(stop_tx),
        sync_handle: Some(sync_handle),
        _temp_dir: temp_dir,
    }
}
