use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::constants::{
    DEFAULT_MC_MASTERY_THRESHOLD, DEFAULT_REINSERT_OFFSET, DEFAULT_SESSION_IDLE_MINUTES,
    DEFAULT_SYNC_CHANNEL_CAPACITY, DEFAULT_SYNC_MAX_RETRIES, DEFAULT_SYNC_RETRY_BACKOFF_MS,
    DEFAULT_WRITTEN_MASTERY_THRESHOLD,
};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_json: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub learn: LearnEnvConfig,
    pub sync: SyncConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct LearnEnvConfig {
    pub mc_mastery_threshold: u32,
    pub written_mastery_threshold: u32,
    pub reinsert_offset: usize,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub channel_capacity: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub session_idle_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_SYNC_CHANNEL_CAPACITY,
            max_retries: DEFAULT_SYNC_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_SYNC_RETRY_BACKOFF_MS,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_json: env_or_bool("LOG_JSON", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/learn.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            learn: LearnEnvConfig {
                mc_mastery_threshold: env_or_parse(
                    "LEARN_MC_MASTERY_THRESHOLD",
                    DEFAULT_MC_MASTERY_THRESHOLD,
                ),
                written_mastery_threshold: env_or_parse(
                    "LEARN_WRITTEN_MASTERY_THRESHOLD",
                    DEFAULT_WRITTEN_MASTERY_THRESHOLD,
                ),
                reinsert_offset: env_or_parse("LEARN_REINSERT_OFFSET", DEFAULT_REINSERT_OFFSET),
            },
            sync: SyncConfig {
                channel_capacity: env_or_parse(
                    "SYNC_CHANNEL_CAPACITY",
                    DEFAULT_SYNC_CHANNEL_CAPACITY,
                ),
                max_retries: env_or_parse("SYNC_MAX_RETRIES", DEFAULT_SYNC_MAX_RETRIES),
                retry_backoff_ms: env_or_parse(
                    "SYNC_RETRY_BACKOFF_MS",
                    DEFAULT_SYNC_RETRY_BACKOFF_MS,
                ),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                session_idle_minutes: env_or_parse(
                    "SESSION_IDLE_MINUTES",
                    DEFAULT_SESSION_IDLE_MINUTES,
                ),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
