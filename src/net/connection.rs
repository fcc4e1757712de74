//! Session registry and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique session IDs for tracing
//! - Track each live session's state (Upgrading → Dialing → Bridging)
//! - Let shutdown wait until every session has drained
//! - Keep the active-sessions gauge current

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::observability::metrics;

/// Global atomic counter for session IDs.
/// Relaxed ordering is enough; only uniqueness matters.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// 101 sent, waiting for the connection to be handed over.
    Upgrading,
    /// Connecting to the backend.
    Dialing,
    /// Copying in both directions.
    Bridging,
}

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    state: SessionState,
    started: Instant,
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: u64,
    pub state: SessionState,
    pub age_ms: u64,
}

/// Tracks live sessions for status reporting and graceful shutdown.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    sessions: DashMap<SessionId, SessionEntry>,
    /// Live session count, watched by `wait_for_drain`.
    active: watch::Sender<usize>,
}

impl SessionTracker {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            inner: Arc::new(TrackerInner {
                sessions: DashMap::new(),
                active,
            }),
        }
    }

    /// Register a new session. Returns a guard that unregisters it on drop.
    pub fn track(&self) -> SessionGuard {
        let id = SessionId::new();
        self.inner.sessions.insert(
            id,
            SessionEntry {
                state: SessionState::Upgrading,
                started: Instant::now(),
            },
        );
        self.inner.active.send_modify(|n| *n += 1);
        metrics::record_session_opened();
        metrics::set_active_sessions(self.active_count());
        SessionGuard {
            inner: Arc::clone(&self.inner),
            id,
        }
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        *self.inner.active.borrow()
    }

    /// Every live session, oldest first.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let now = Instant::now();
        let mut sessions: Vec<SessionSnapshot> = self
            .inner
            .sessions
            .iter()
            .map(|entry| SessionSnapshot {
                id: entry.key().as_u64(),
                state: entry.value().state,
                age_ms: now.duration_since(entry.value().started).as_millis() as u64,
            })
            .collect();
        sessions.sort_by_key(|s| s.id);
        sessions
    }

    /// Wait until no sessions remain. Returns false if `timeout` elapsed first.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let mut rx = self.inner.active.subscribe();
        let drained = tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0))
            .await
            .is_ok();
        drained
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a session's lifetime.
#[derive(Debug)]
pub struct SessionGuard {
    inner: Arc<TrackerInner>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Record the session's progress.
    pub fn set_state(&self, state: SessionState) {
        if let Some(mut entry) = self.inner.sessions.get_mut(&self.id) {
            entry.state = state;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.inner.sessions.remove(&self.id);
        self.inner.active.send_modify(|n| *n = n.saturating_sub(1));
        metrics::set_active_sessions(*self.inner.active.borrow());
        tracing::trace!(session_id = %self.id, "Session unregistered");
    }
}
