/*
 * pool.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Mailsweep, a bulk mailbox retrieval tool.
 *
 * Mailsweep is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Mailsweep is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Mailsweep.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Fixed-size pool of authenticated sessions with lease/release.
//!
//! Available sessions sit in a mutex-guarded stack. `acquire` moves one out into a
//! `SessionLease`, which owns it exclusively until it is released or dropped, so a
//! session can never be in the stack and leased at the same time. The mutex is held
//! only for the push or pop, never while a session does I/O.
//!
//! After `close`, a lease dropped late (a worker still finishing its call when a run failed)
//! does not go back to the stack; its session is logged out on a spawned task instead.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;

use crate::error::{Result, ScrapeError};
use crate::session::{MailSession, SessionConnector, SessionId};

pub struct SessionPool<S: MailSession> {
    available: Mutex<Vec<S>>,
    capacity: usize,
    /// Only written with `available` locked.
    closed: AtomicBool,
}

impl<S: MailSession> SessionPool<S> {
    /// Open `size` sessions concurrently, ids 0..size. If any fails, the ones that
    /// succeeded are logged out and the first failure (by id) is returned.
    pub async fn connect<C>(size: usize, connector: &C) -> Result<Self>
    where
        C: SessionConnector<Session = S>,
    {
        if size == 0 {
            return Err(ScrapeError::Config("pool size must be at least 1".into()));
        }
        let results = join_all((0..size).map(|id| connector.connect(id))).await;
        let mut sessions = Vec::with_capacity(size);
        let mut first_error = None;
        for result in results {
            match result {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            for mut session in sessions {
                let _ = session.logout().await;
            }
            return Err(e);
        }
        tracing::debug!(size, "session pool ready");
        Self::from_sessions(sessions)
    }

    /// Pool over sessions that are already connected.
    pub fn from_sessions(sessions: Vec<S>) -> Result<Self> {
        if sessions.is_empty() {
            return Err(ScrapeError::Config("pool size must be at least 1".into()));
        }
        let capacity = sessions.len();
        Ok(Self {
            available: Mutex::new(sessions),
            capacity,
            closed: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<S>> {
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease one session. Never waits: with every session out, this is `PoolExhausted`.
    pub fn acquire(self: &Arc<Self>) -> Result<SessionLease<S>> {
        let session = self.lock().pop().ok_or(ScrapeError::PoolExhausted {
            capacity: self.capacity,
        })?;
        tracing::trace!(session = session.id(), "leased");
        Ok(SessionLease {
            session: Some(session),
            pool: Arc::clone(self),
        })
    }

    /// Return a lease. Dropping it has the same effect.
    pub fn release(&self, lease: SessionLease<S>) {
        drop(lease);
    }

    fn put_back(&self, session: S) {
        let mut available = self.lock();
        if self.closed.load(Ordering::Acquire) {
            drop(available);
            logout_detached(session);
            return;
        }
        tracing::trace!(session = session.id(), "released");
        available.push(session);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.lock().len()
    }

    pub fn leased(&self) -> usize {
        self.capacity - self.available()
    }

    /// Ids of the sessions currently in the pool, in no particular order.
    pub fn available_ids(&self) -> Vec<SessionId> {
        self.lock().iter().map(|s| s.id()).collect()
    }

    /// Log out every available session. Logout failures are logged, not returned.
    /// Leases still out are logged out when they are dropped. Returns how many sessions
    /// were closed here.
    pub async fn close(&self) -> usize {
        let sessions = {
            let mut available = self.lock();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *available)
        };
        let closed = sessions.len();
        for mut session in sessions {
            if let Err(e) = session.logout().await {
                tracing::warn!(session = session.id(), error = %e, "logout failed");
            }
        }
        tracing::debug!(closed, leased = self.capacity - closed, "session pool closed");
        closed
    }
}

fn logout_detached<S: MailSession>(mut session: S) {
    let id = session.id();
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            tracing::debug!(session = id, "pool closed, logging out returned session");
            handle.spawn(async move {
                if let Err(e) = session.logout().await {
                    tracing::warn!(session = id, error = %e, "logout failed");
                }
            });
        }
        Err(_) => tracing::warn!(session = id, "pool closed outside a runtime, session dropped"),
    }
}

/// Exclusive use of one pooled session. Goes back to the pool when dropped.
pub struct SessionLease<S: MailSession> {
    session: Option<S>,
    pool: Arc<SessionPool<S>>,
}

impl<S: MailSession> SessionLease<S> {
    pub fn id(&self) -> SessionId {
        self.session.as_ref().map(|s| s.id()).unwrap_or_default()
    }
}

impl<S: MailSession> Deref for SessionLease<S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session.as_ref().expect("lease holds its session until drop")
    }
}

impl<S: MailSession> DerefMut for SessionLease<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().expect("lease holds its session until drop")
    }
}

impl<S: MailSession> Drop for SessionLease<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.put_back(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeConnector, FakeServer};
    use std::collections::HashSet;

    async fn pool(size: usize) -> Arc<SessionPool<crate::testing::FakeSession>> {
        let connector = FakeConnector::new(FakeServer::new());
        Arc::new(SessionPool::connect(size, &connector).await.unwrap())
    }

    #[tokio::test]
    async fn all_sessions_start_available() {
        let pool = pool(4).await;
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.leased(), 0);
        let ids: HashSet<_> = pool.available_ids().into_iter().collect();
        assert_eq!(ids, (0..4).collect());
    }

    #[tokio::test]
    async fn acquire_release_restores_membership() {
        let pool = pool(3).await;
        let before: HashSet<_> = pool.available_ids().into_iter().collect();
        let lease = pool.acquire().unwrap();
        assert_eq!(pool.available() + pool.leased(), 3);
        assert_eq!(pool.leased(), 1);
        assert!(!pool.available_ids().contains(&lease.id()));
        pool.release(lease);
        let after: HashSet<_> = pool.available_ids().into_iter().collect();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn exhausted_pool_fails_fast() {
        let pool = pool(2).await;
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.id(), b.id());
        assert!(matches!(pool.acquire(), Err(ScrapeError::PoolExhausted { capacity: 2 })));
        drop(a);
        assert!(pool.acquire().is_ok());
        assert_eq!(pool.available() + pool.leased(), 2);
    }

    #[tokio::test]
    async fn zero_size_is_rejected() {
        let connector = FakeConnector::new(FakeServer::new());
        let result = SessionPool::connect(0, &connector).await;
        assert!(matches!(result, Err(ScrapeError::Config(_))));
    }

    #[tokio::test]
    async fn failed_connect_logs_out_the_rest() {
        let server = FakeServer::new();
        let connector = FakeConnector::new(server.clone()).fail_connect(2);
        let result = SessionPool::connect(4, &connector).await;
        assert!(matches!(result, Err(ScrapeError::Connection { .. })));
        assert_eq!(server.logouts(), 3);
    }

    #[tokio::test]
    async fn close_logs_out_available_sessions() {
        let server = FakeServer::new();
        let connector = FakeConnector::new(server.clone());
        let pool = Arc::new(SessionPool::connect(3, &connector).await.unwrap());
        let lease = pool.acquire().unwrap();
        assert_eq!(pool.close().await, 2);
        assert_eq!(server.logouts(), 2);
        assert!(pool.is_closed());
        drop(lease);
        assert_eq!(pool.available(), 0);
        assert!(matches!(pool.acquire(), Err(ScrapeError::PoolExhausted { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lease_dropped_after_close_is_logged_out() {
        let server = FakeServer::new();
        let connector = FakeConnector::new(server.clone());
        let pool = Arc::new(SessionPool::connect(2, &connector).await.unwrap());
        let lease = pool.acquire().unwrap();
        pool.close().await;
        assert_eq!(server.logouts(), 1);
        drop(lease);
        for _ in 0..200 {
            if server.logouts() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(server.logouts(), 2);
    }
}
