//! Bounded connection pool shared by every worker.
//!
//! `acquire` hands out an idle connection, opens a new one while fewer than
//! `max_size` exist, or waits for a release. Connections go back to the pool
//! when the guard drops; connections that report themselves closed are
//! discarded so the slot can be reopened.

use crate::client::{Connector, StoreConnection};
use crate::StoreError;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_size: usize,
    /// `None` waits indefinitely for a free connection.
    pub acquire_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub open: usize,
    pub idle: usize,
}

struct PoolState {
    idle: Vec<Box<dyn StoreConnection>>,
    open: usize,
}

pub struct ConnectionPool {
    connector: Box<dyn Connector>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ConnectionPool {
    /// Build the pool and open one connection up front, so an unreachable
    /// store fails here rather than inside a worker.
    pub fn connect(connector: Box<dyn Connector>, config: PoolConfig) -> Result<Self, StoreError> {
        if config.max_size == 0 {
            return Err(StoreError::InvalidPool(
                "max_size must be at least 1".to_owned(),
            ));
        }
        let first = connector.connect()?;
        info!(
            "connected to {} (pool of {} connections)",
            connector.describe(),
            config.max_size
        );
        Ok(Self {
            connector,
            config,
            state: Mutex::new(PoolState {
                idle: vec![first],
                open: 1,
            }),
            available: Condvar::new(),
        })
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    pub fn acquire(&self) -> Result<PooledConnection<'_>, StoreError> {
        let started = Instant::now();
        let mut state = self.lock_state()?;
        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(self, conn));
            }
            if state.open < self.config.max_size {
                state.open += 1;
                drop(state);
                return match self.connector.connect() {
                    Ok(conn) => Ok(PooledConnection::new(self, conn)),
                    Err(e) => {
                        self.forget_slot();
                        Err(e)
                    }
                };
            }
            state = match self.config.acquire_timeout {
                None => self
                    .available
                    .wait(state)
                    .map_err(|e| StoreError::Connectivity(format!("pool mutex poisoned: {e}")))?,
                Some(limit) => {
                    let waited = started.elapsed();
                    if waited >= limit {
                        return Err(StoreError::PoolExhausted {
                            waited,
                            max_size: self.config.max_size,
                        });
                    }
                    self.available
                        .wait_timeout(state, limit - waited)
                        .map_err(|e| {
                            StoreError::Connectivity(format!("pool mutex poisoned: {e}"))
                        })?
                        .0
                }
            };
        }
    }

    pub fn status(&self) -> PoolStatus {
        match self.state.lock() {
            Ok(state) => PoolStatus {
                max_size: self.config.max_size,
                open: state.open,
                idle: state.idle.len(),
            },
            Err(_) => PoolStatus {
                max_size: self.config.max_size,
                open: 0,
                idle: 0,
            },
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, PoolState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Connectivity(format!("pool mutex poisoned: {e}")))
    }

    fn release(&self, conn: Box<dyn StoreConnection>) {
        if let Ok(mut state) = self.state.lock() {
            if conn.is_open() {
                state.idle.push(conn);
            } else {
                debug!("discarding closed connection");
                state.open = state.open.saturating_sub(1);
            }
        }
        self.available.notify_one();
    }

    fn forget_slot(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.open = state.open.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

/// A checked-out connection; returns itself to the pool on drop.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Box<dyn StoreConnection>>,
}

impl<'a> PooledConnection<'a> {
    fn new(pool: &'a ConnectionPool, conn: Box<dyn StoreConnection>) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }
}

impl Deref for PooledConnection<'_> {
    type Target = dyn StoreConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryConnector, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn memory_pool(max_size: usize, timeout: Option<Duration>) -> (Arc<MemoryStore>, ConnectionPool) {
        let store = Arc::new(MemoryStore::new());
        let pool = ConnectionPool::connect(
            Box::new(MemoryConnector::new(Arc::clone(&store))),
            PoolConfig {
                max_size,
                acquire_timeout: timeout,
            },
        )
        .unwrap();
        (store, pool)
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        let result = ConnectionPool::connect(
            Box::new(MemoryConnector::default()),
            PoolConfig {
                max_size: 0,
                acquire_timeout: None,
            },
        );
        assert!(matches!(result, Err(StoreError::InvalidPool(_))));
    }

    #[test]
    fn unreachable_store_fails_construction() {
        let store = Arc::new(MemoryStore::new());
        store.faults().set_unreachable(true);
        let result = ConnectionPool::connect(
            Box::new(MemoryConnector::new(store)),
            PoolConfig::default(),
        );
        assert!(matches!(result, Err(StoreError::Connectivity(_))));
    }

    #[test]
    fn connections_are_reused() {
        let (_store, pool) = memory_pool(4, None);
        {
            let _a = pool.acquire().unwrap();
        }
        {
            let _b = pool.acquire().unwrap();
        }
        let status = pool.status();
        assert_eq!(status.open, 1);
        assert_eq!(status.idle, 1);
    }

    #[test]
    fn exhausted_pool_times_out() {
        let (_store, pool) = memory_pool(2, Some(Duration::from_millis(30)));
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        let err = pool.acquire().err().unwrap();
        assert!(err.is_connectivity());
        assert!(matches!(err, StoreError::PoolExhausted { max_size: 2, .. }));
    }

    #[test]
    fn waiter_wakes_on_release() {
        let (_store, pool) = memory_pool(1, Some(Duration::from_secs(5)));
        let pool = Arc::new(pool);
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.acquire().map(|_| ()).is_ok())
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn closed_connections_are_discarded() {
        let (store, pool) = memory_pool(2, None);
        {
            let conn = pool.acquire().unwrap();
            store.faults().set_unreachable(true);
            assert!(!conn.is_open());
        }
        assert_eq!(pool.status().open, 0);
        store.faults().set_unreachable(false);
        let conn = pool.acquire().unwrap();
        assert!(conn.is_open());
        assert_eq!(pool.status().open, 1);
    }

    #[test]
    fn pool_bounds_concurrent_checkouts() {
        let (_store, pool) = memory_pool(3, None);
        let pool = Arc::new(pool);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        let _conn = pool.acquire().unwrap();
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(pool.status().open <= 3);
    }
}
