use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue};
use learn_backend::auth::USER_ID_HEADER;
use learn_backend::config::Config;
use learn_backend::learn::sync::ChannelSink;
use learn_backend::logging::{init_tracing, LogConfig};
use learn_backend::routes::build_router;
use learn_backend::state::AppState;
use learn_backend::store::Store;
use learn_backend::workers::record_sync::RecordSyncWorker;
use learn_backend::workers::WorkerManager;
use tokio::sync::{broadcast, oneshot};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// How long shutdown waits for the record sync worker to drain its queue.
const SYNC_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    if let Err(e) = init_tracing(&LogConfig::from(&config)) {
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
    tracing::info!("Starting learn-backend");

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));
    store.run_migrations().expect("Failed to run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let (sink, batch_rx) = ChannelSink::new(config.sync.channel_capacity);
    let (sync_stop_tx, sync_stop_rx) = oneshot::channel();
    let sync_handle = tokio::spawn(
        RecordSyncWorker::new(store.clone(), batch_rx, &config.sync).run(sync_stop_rx),
    );

    let state = AppState::new(store.clone(), &config, sink, shutdown_tx.clone());

    let worker_handle = if config.worker.is_leader {
        let worker_manager =
            WorkerManager::new(state.clone(), shutdown_tx.subscribe(), &config.worker);
        Some(tokio::spawn(async move {
            if let Err(e) = worker_manager.start().await {
                tracing::error!(error = %e, "Worker manager failed");
            }
        }))
    } else {
        None
    };

    let cors_layer = build_cors_layer(&config);

    let app = build_router(state.clone())
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    let addr = SocketAddr::new(config.host, config.port);
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");

    let server_future = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

    if let Err(e) = server_future.await {
        tracing::error!(error = %e, "HTTP server crashed");
    }

    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }

    // 先把活跃会话的记录交给同步队列，再让同步任务排空
    let live = state.registry().drain().await;
    let retired = state.retire_sessions(live).await;
    tracing::info!(sessions = retired, "Retired live learn sessions");

    let _ = sync_stop_tx.send(());
    match tokio::time::timeout(SYNC_DRAIN_TIMEOUT, sync_handle).await {
        Ok(Ok(stats)) => tracing::info!(
            batches = stats.batches,
            failed = stats.failed_batches,
            "Record sync drained"
        ),
        Ok(Err(e)) => tracing::error!(error = %e, "Record sync task panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = SYNC_DRAIN_TIMEOUT.as_secs(),
            "Record sync did not drain in time"
        ),
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let allowed_headers = [
        header::CONTENT_TYPE,
        header::ACCEPT,
        HeaderName::from_static(USER_ID_HEADER),
    ];

    if config.cors_origin.trim() == "*" {
        // 通配符模式仅用于开发环境
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_credentials(false)
            .allow_headers(allowed_headers)
            .allow_methods(Any);
    }

    match config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_headers(allowed_headers)
            .allow_methods(Any),
        Err(e) => {
            panic!(
                "FATAL: Invalid CORS_ORIGIN '{}': {}. \
                 Fix the CORS_ORIGIN environment variable.",
                config.cors_origin, e
            );
        }
    }
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
