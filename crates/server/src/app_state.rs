use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use server_api::{ApiContext, SessionState};
use shared::domain::SessionId;
use tokio::sync::{Mutex, RwLock};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) sessions: SessionRegistry,
}

struct SessionEntry {
    state: Arc<Mutex<SessionState>>,
    last_seen: Instant,
}

/// One controller state per browser session. Requests for the same session
/// are serialized by the per-session mutex. Sessions untouched for longer
/// than `idle_timeout` are dropped, and at most `max_sessions` live at once.
#[derive(Clone)]
pub(crate) struct SessionRegistry {
    inner: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    pub(crate) fn new(idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            inner: Arc::default(),
            idle_timeout,
            max_sessions,
        }
    }

    /// Returns `None` when the registry is still full after idle sessions
    /// have been evicted.
    pub(crate) async fn create(&self) -> Option<SessionId> {
        let now = Instant::now();
        let mut sessions = self.inner.write().await;
        evict_idle(&mut sessions, now, self.idle_timeout);
        if sessions.len() >= self.max_sessions {
            return None;
        }

        let session_id = SessionId::new();
        sessions.insert(
            session_id,
            SessionEntry {
                state: Arc::new(Mutex::new(SessionState::new())),
                last_seen: now,
            },
        );
        Some(session_id)
    }

    /// Looks a session up and marks it as used. Expired sessions are removed
    /// and reported as missing.
    pub(crate) async fn get(&self, session_id: SessionId) -> Option<Arc<Mutex<SessionState>>> {
        let now = Instant::now();
        let mut sessions = self.inner.write().await;
        let entry = sessions.get_mut(&session_id)?;
        if now.saturating_duration_since(entry.last_seen) > self.idle_timeout {
            sessions.remove(&session_id);
            return None;
        }
        entry.last_seen = now;
        Some(entry.state.clone())
    }

    pub(crate) async fn remove(&self, session_id: SessionId) -> bool {
        self.inner.write().await.remove(&session_id).is_some()
    }

    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Drops every session idle at `now`; returns how many were removed.
    pub(crate) async fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.inner.write().await;
        evict_idle(&mut sessions, now, self.idle_timeout)
    }
}

fn evict_idle(
    sessions: &mut HashMap<SessionId, SessionEntry>,
    now: Instant,
    idle_timeout: Duration,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle_timeout);
    before - sessions.len()
}

#[cfg(test)]
#[path = "tests/app_state_tests.rs"]
mod tests;
