//! Connection context pool.
//!
//! # Responsibilities
//! - Hand out `ConnectionContext` objects, reusing released ones
//! - Reset metadata on acquire, clear the socket handle on release
//! - Enforce the live session limit
//!
//! # Design Decisions
//! - Free list behind a mutex; acquire/release are O(1)
//! - Release happens in the guard's `Drop`, so early returns and panics
//!   in a session still give the context back
//! - Idle list is capped so a burst does not pin memory forever

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::relay::context::ConnectionContext;
use crate::relay::error::RelayError;

/// Idle contexts kept when no explicit cap is given.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// A pool of reusable connection contexts.
#[derive(Debug)]
pub struct ContextPool {
    state: Mutex<PoolState>,
    /// Maximum contexts out at once (0 = unlimited).
    max_live: AtomicUsize,
    /// Maximum contexts kept for reuse.
    max_idle: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<Box<ConnectionContext>>,
    live: usize,
}

impl ContextPool {
    /// Create a pool allowing `max_live` concurrent contexts (0 = unlimited).
    pub fn new(max_live: usize) -> Self {
        Self::with_idle_limit(max_live, DEFAULT_MAX_IDLE)
    }

    pub fn with_idle_limit(max_live: usize, max_idle: usize) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            max_live: AtomicUsize::new(max_live),
            max_idle,
        }
    }

    /// Take a context with empty metadata and no socket.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledContext, RelayError> {
        let reused = {
            let limit = self.max_live();
            let mut state = self.lock();
            if limit > 0 && state.live >= limit {
                return Err(RelayError::PoolExhausted { limit });
            }
            state.live += 1;
            state.idle.pop()
        };

        let mut ctx = reused.unwrap_or_default();
        ctx.reset();

        Ok(PooledContext {
            ctx: Some(ctx),
            pool: Arc::clone(self),
        })
    }

    /// Give a context back. The socket handle is cleared before the context becomes reusable.
    fn release(&self, mut ctx: Box<ConnectionContext>) {
        ctx.clear_conn();
        let mut state = self.lock();
        state.live = state.live.saturating_sub(1);
        if state.idle.len() < self.max_idle {
            state.idle.push(ctx);
        }
    }

    /// Change the live limit. Contexts already out are not revoked.
    pub fn set_max_live(&self, max_live: usize) {
        self.max_live.store(max_live, Ordering::Relaxed);
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::Relaxed)
    }

    /// Contexts currently handed out.
    pub fn live(&self) -> usize {
        self.lock().live
    }

    /// Contexts waiting for reuse.
    pub fn idle(&self) -> usize {
        self.lock().idle.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(0)
    }
}

/// A context on loan from the pool. Returned when dropped.
#[derive(Debug)]
pub struct PooledContext {
    ctx: Option<Box<ConnectionContext>>,
    pool: Arc<ContextPool>,
}

impl PooledContext {
    /// Return the context to the pool now.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledContext {
    type Target = ConnectionContext;

    fn deref(&self) -> &ConnectionContext {
        match self.ctx.as_deref() {
            Some(ctx) => ctx,
            None => unreachable!("context accessed after release"),
        }
    }
}

impl DerefMut for PooledContext {
    fn deref_mut(&mut self) -> &mut ConnectionContext {
        match self.ctx.as_deref_mut() {
            Some(ctx) => ctx,
            None => unreachable!("context accessed after release"),
        }
    }
}

impl Drop for PooledContext {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_does_not_leak_metadata() {
        let pool = Arc::new(ContextPool::default());

        let mut ctx = pool.acquire().unwrap();
        ctx.insert_param("room".into(), "a".into());
        ctx.insert_query("q".into(), "1".into());
        ctx.insert_cookie("sid".into(), "secret".into());
        ctx.insert_header("origin".into(), "https://a.test".into());
        ctx.insert_local("user".into(), Arc::new(7u32));
        ctx.release();
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire().unwrap();
        assert_eq!(pool.idle(), 0, "released context is reused");
        assert!(ctx.is_empty());
        assert!(ctx.param("room").is_none());
        assert!(ctx.cookie("sid").is_none());
        assert!(!ctx.has_conn());
    }

    #[test]
    fn live_count_tracks_guards() {
        let pool = Arc::new(ContextPool::default());
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.live(), 2);
        drop(a);
        assert_eq!(pool.live(), 1);
        drop(b);
        assert_eq!(pool.live(), 0);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn limit_reports_exhaustion() {
        let pool = Arc::new(ContextPool::new(1));
        let held = pool.acquire().unwrap();
        match pool.acquire() {
            Err(RelayError::PoolExhausted { limit }) => assert_eq!(limit, 1),
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
        drop(held);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn limit_can_be_raised() {
        let pool = Arc::new(ContextPool::new(1));
        let _held = pool.acquire().unwrap();
        assert!(pool.acquire().is_err());
        pool.set_max_live(2);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn idle_list_is_capped() {
        let pool = Arc::new(ContextPool::with_idle_limit(0, 1));
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn concurrent_acquire_release() {
        let pool = Arc::new(ContextPool::new(64));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for n in 0..200 {
                        let mut ctx = pool.acquire().unwrap();
                        assert!(ctx.is_empty());
                        ctx.insert_param("worker".into(), format!("{}-{}", i, n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(pool.live(), 0);
    }
}
