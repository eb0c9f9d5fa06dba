use std::time::Duration;

use crate::state::AppState;

/// 回收空闲会话：先从注册表摘除，再 teardown 并落盘剩余记录
pub async fn run(state: &AppState, max_idle: Duration) -> usize {
    tracing::debug!("session_cleanup: start");
    let idle = state.registry().evict_idle(max_idle).await;
    if idle.is_empty() {
        return 0;
    }
    let cleaned = state.retire_sessions(idle).await;
    tracing::info!(cleaned, "session_cleanup: done");
    cleaned
}
