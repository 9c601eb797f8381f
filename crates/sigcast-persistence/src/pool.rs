//! Bounded session pool.
//!
//! Lends clones of a template session, at most `size` at a time. A
//! `PooledSession` gives its slot back on `close()` or on drop, whichever
//! comes first; closing twice is a no-op.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::trace;

use crate::error::{PersistenceError, PersistenceResult};

/// Pool of cloned sessions with an upper bound.
pub struct SessionPool<T: Clone> {
    template: T,
    permits: Arc<Semaphore>,
    size: usize,
}

impl<T: Clone> SessionPool<T> {
    pub fn new(template: T, size: usize) -> Self {
        Self {
            template,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Borrow a session, waiting for a free slot.
    pub async fn session(&self) -> PersistenceResult<PooledSession<T>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PersistenceError::PoolClosed)?;
        Ok(self.lend(permit))
    }

    /// Borrow a session without waiting.
    pub fn try_session(&self) -> PersistenceResult<PooledSession<T>> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => Ok(self.lend(permit)),
            Err(TryAcquireError::NoPermits) => Err(PersistenceError::PoolExhausted(self.size)),
            Err(TryAcquireError::Closed) => Err(PersistenceError::PoolClosed),
        }
    }

    /// Sessions currently lent out.
    pub fn in_use(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Refuse further sessions. Lent sessions stay valid.
    pub fn close(&self) {
        self.permits.close();
    }

    fn lend(&self, permit: OwnedSemaphorePermit) -> PooledSession<T> {
        trace!(in_use = self.in_use(), "Session lent");
        PooledSession {
            session: self.template.clone(),
            permit: Some(permit),
        }
    }
}

/// A session borrowed from a `SessionPool`.
#[derive(Debug)]
pub struct PooledSession<T> {
    session: T,
    permit: Option<OwnedSemaphorePermit>,
}

impl<T> PooledSession<T> {
    /// Return the slot to the pool. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        self.permit.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.permit.is_none()
    }
}

impl<T> Deref for PooledSession<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.session
    }
}

impl<T> Drop for PooledSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_pending, assert_ready_ok, task};

    use super::*;

    #[tokio::test]
    async fn test_pool_is_bounded() {
        let pool = SessionPool::new(String::from("db"), 2);

        let a = pool.session().await.unwrap();
        let _b = pool.try_session().unwrap();
        assert_eq!(pool.in_use(), 2);
        assert_eq!(*a, "db");

        assert!(matches!(
            pool.try_session(),
            Err(PersistenceError::PoolExhausted(2))
        ));

        drop(a);
        assert_eq!(pool.in_use(), 1);
        assert!(pool.try_session().is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let pool = SessionPool::new(7u32, 1);
        let mut session = pool.session().await.unwrap();

        assert!(session.close());
        assert!(!session.close());
        assert!(session.is_closed());
        assert_eq!(pool.in_use(), 0);

        // Dropping a closed session does not release a second slot.
        drop(session);
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn test_waiter_gets_released_slot() {
        let pool = SessionPool::new(1u8, 1);
        let held = pool.try_session().unwrap();

        let mut waiter = task::spawn(pool.session());
        assert_pending!(waiter.poll());

        drop(held);
        assert!(waiter.is_woken());
        let session = assert_ready_ok!(waiter.poll());
        assert_eq!(*session, 1);
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_sessions() {
        let pool = SessionPool::new((), 3);
        pool.close();
        assert!(matches!(pool.session().await, Err(PersistenceError::PoolClosed)));
        assert!(matches!(pool.try_session(), Err(PersistenceError::PoolClosed)));
    }
}
