use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::learn::session::LearnSession;

/// Holds one live session. The slot is emptied on teardown so that requests
/// still holding the handle observe the session as gone.
#[derive(Debug)]
pub struct SessionSlot {
    session: Option<LearnSession>,
    last_touched: Instant,
}

impl SessionSlot {
    pub fn session(&self) -> Option<&LearnSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut LearnSession> {
        self.last_touched = Instant::now();
        self.session.as_mut()
    }

    fn take(&mut self) -> Option<LearnSession> {
        self.session.take()
    }
}

#[derive(Debug, Clone)]
struct Handle {
    user_id: String,
    set_id: String,
    slot: Arc<Mutex<SessionSlot>>,
}

/// 进程内活跃会话表；每个会话独占一把锁，保证单写者
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Handle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `session` and detaches any other live session of the same
    /// user on the same set. Detached sessions are returned for teardown.
    pub async fn insert(&self, session: LearnSession) -> Vec<LearnSession> {
        let id = session.id().to_string();
        let handle = Handle {
            user_id: session.user_id().to_string(),
            set_id: session.set_id().to_string(),
            slot: Arc::new(Mutex::new(SessionSlot {
                session: Some(session),
                last_touched: Instant::now(),
            })),
        };

        let replaced: Vec<Handle> = {
            let mut sessions = self.sessions.write().await;
            let stale_ids: Vec<String> = sessions
                .iter()
                .filter(|(_, h)| h.user_id == handle.user_id && h.set_id == handle.set_id)
                .map(|(k, _)| k.clone())
                .collect();
            let replaced = stale_ids
                .iter()
                .filter_map(|k| sessions.remove(k))
                .collect();
            sessions.insert(id, handle);
            replaced
        };

        take_all(replaced).await
    }

    /// Returns the slot if the session exists and belongs to `user_id`.
    pub async fn get(&self, session_id: &str, user_id: &str) -> Option<Arc<Mutex<SessionSlot>>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|h| h.user_id == user_id)
            .map(|h| h.slot.clone())
    }

    pub async fn remove(&self, session_id: &str, user_id: &str) -> Option<LearnSession> {
        let handle = {
            let mut sessions = self.sessions.write().await;
            let owned = sessions
                .get(session_id)
                .is_some_and(|h| h.user_id == user_id);
            if owned {
                sessions.remove(session_id)
            } else {
                None
            }
        }?;
        let mut slot = handle.slot.lock().await;
        slot.take()
    }

    /// Detaches the live sessions of `user_id` on `set_id`, if any.
    pub async fn remove_for_set(&self, user_id: &str, set_id: &str) -> Vec<LearnSession> {
        let handles: Vec<Handle> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, h)| h.user_id == user_id && h.set_id == set_id)
                .map(|(k, _)| k.clone())
                .collect();
            ids.iter().filter_map(|k| sessions.remove(k)).collect()
        };
        take_all(handles).await
    }

    /// Detaches every session untouched for longer than `max_idle`.
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<LearnSession> {
        let handles: Vec<(String, Handle)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(k, h)| (k.clone(), h.clone()))
                .collect()
        };

        let mut idle_ids = Vec::new();
        for (id, handle) in handles {
            // Sessions busy with a request are not idle.
            if let Ok(slot) = handle.slot.try_lock() {
                if slot.last_touched.elapsed() > max_idle {
                    idle_ids.push(id);
                }
            }
        }
        if idle_ids.is_empty() {
            return Vec::new();
        }

        let evicted: Vec<Handle> = {
            let mut sessions = self.sessions.write().await;
            idle_ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        take_all(evicted).await
    }

    /// Detaches all sessions; used on shutdown.
    pub async fn drain(&self) -> Vec<LearnSession> {
        let handles: Vec<Handle> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, h)| h).collect()
        };
        take_all(handles).await
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

async fn take_all(handles: Vec<Handle>) -> Vec<LearnSession> {
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Some(session) = handle.slot.lock().await.take() {
            out.push(session);
        }
    }
    out
}
