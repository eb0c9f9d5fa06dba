use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "learn-backend";
const MAX_LOG_FILES: usize = 30;

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_level: String,
    /// stdout 输出 JSON，便于日志采集
    pub json: bool,
    pub enable_file_logs: bool,
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            enable_file_logs: false,
            log_dir: "./logs".to_string(),
        }
    }
}

impl From<&Config> for LogConfig {
    fn from(config: &Config) -> Self {
        Self {
            log_level: config.log_level.clone(),
            json: config.log_json,
            enable_file_logs: config.enable_file_logs,
            log_dir: config.log_dir.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create log file appender in {dir}: {source}")]
    Appender {
        dir: String,
        #[source]
        source: tracing_appender::rolling::InitError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Installs the global subscriber. Calling it again after a subscriber is set
/// is a no-op, which keeps tests that share a process happy.
pub fn init_tracing(config: &LogConfig) -> Result<(), LoggingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout_layer = if config.json {
        fmt::layer().with_target(true).json().boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .boxed()
    };

    let file_layer = if config.enable_file_logs {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(&config.log_dir)
            .map_err(|source| LoggingError::Appender {
                dir: config.log_dir.clone(),
                source,
            })?;
        Some(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .json()
                .boxed(),
        )
    } else {
        None
    };

    let result = Registry::default()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(LoggingError::Subscriber(e.to_string())),
    }
}
