//! Generic async connection pool
//!
//! LIFO reuse, bounded capacity with an acquire timeout, and a background
//! health sweep that evicts idle-expired or unhealthy connections and
//! replenishes to the configured minimum.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Errors & Config
// =============================================================================

/// Pool failures
#[derive(Debug, Error)]
pub enum PoolError {
    /// No connection became available within the acquire timeout
    #[error("Connection pool exhausted: no connection within {0:?}")]
    Exhausted(Duration),

    /// The underlying factory failed to open a connection
    #[error("Failed to open connection: {0}")]
    Connect(String),

    /// The pool was shut down
    #[error("Connection pool is closed")]
    Closed,
}

/// Pool sizing and timing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections the health sweep keeps ready
    pub min_conns: usize,

    /// Hard capacity; acquire blocks at this many live connections
    pub max_conns: usize,

    /// Idle connections older than this are evicted by the sweep
    pub idle_timeout: Duration,

    /// Interval between health sweeps
    pub health_check_interval: Duration,

    /// How long `acquire` waits before failing with `Exhausted`
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_conns: 2,
            max_conns: 10,
            idle_timeout: Duration::from_secs(600),
            health_check_interval: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Factory Trait
// =============================================================================

/// Opens and checks connections for one backend
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The pooled connection type
    type Conn: Send + 'static;

    /// Open a fresh connection
    async fn connect(&self) -> Result<Self::Conn, PoolError>;

    /// Whether an idle connection is still usable
    async fn is_healthy(&self, conn: &Self::Conn) -> bool {
        let _ = conn;
        true
    }
}

// =============================================================================
// Pool
// =============================================================================

struct IdleConn<C> {
    conn: C,
    idle_since: Instant,
}

struct PoolInner<F: ConnectionFactory> {
    factory: F,
    config: PoolConfig,
    /// LIFO stack: the most recently returned connection is reused first
    idle: Mutex<Vec<IdleConn<F::Conn>>>,
    capacity: Arc<Semaphore>,
    shutdown: CancellationToken,
}

/// Connection pool over a [`ConnectionFactory`]
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool and spawn its health sweep
    #[must_use]
    pub fn new(factory: F, config: PoolConfig) -> Self {
        let max_conns = config.max_conns.max(1);
        let inner = Arc::new(PoolInner {
            factory,
            config,
            idle: Mutex::new(Vec::new()),
            capacity: Arc::new(Semaphore::new(max_conns)),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(run_health_sweep(inner.clone()));
        Self { inner }
    }

    /// Check out a connection, waiting up to the acquire timeout
    pub async fn acquire(&self) -> Result<PooledConnection<F>, PoolError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(PoolError::Closed);
        }

        let timeout = self.inner.config.acquire_timeout;
        let permit = tokio::time::timeout(timeout, self.inner.capacity.clone().acquire_owned())
            .await
            .map_err(|_| PoolError::Exhausted(timeout))?
            .map_err(|_| PoolError::Closed)?;

        let reused = {
            let mut idle = self.inner.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop().map(|entry| entry.conn)
        };

        let conn = match reused {
            Some(conn) => conn,
            None => self.inner.factory.connect().await?,
        };

        Ok(PooledConnection {
            conn: Some(conn),
            permit: Some(permit),
            pool: Arc::downgrade(&self.inner),
            closed: false,
        })
    }

    /// Idle and in-use connection counts
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let idle = {
            let idle = self.inner.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.len()
        };
        let max = self.inner.config.max_conns.max(1);
        PoolStatus {
            idle,
            in_use: max - self.inner.capacity.available_permits(),
        }
    }

    /// Stop the health sweep and drop idle connections
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut idle = self.inner.idle.lock().unwrap_or_else(|e| e.into_inner());
        idle.clear();
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub idle: usize,
    pub in_use: usize,
}

// =============================================================================
// Pooled Connection
// =============================================================================

/// A checked-out connection
///
/// Dropping the guard returns the connection to the pool. `close` discards
/// it instead; a second `close` is a no-op.
#[derive(Debug)]
pub struct PooledConnection<F: ConnectionFactory> {
    conn: Option<F::Conn>,
    permit: Option<OwnedSemaphorePermit>,
    pool: std::sync::Weak<PoolInner<F>>,
    closed: bool,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    /// Discard the connection instead of returning it to the pool
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.conn = None;
        self.permit = None;
    }
}

impl<F: ConnectionFactory> std::ops::Deref for PooledConnection<F> {
    type Target = F::Conn;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already closed")
    }
}

impl<F: ConnectionFactory> std::ops::DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already closed")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let (Some(conn), Some(pool)) = (self.conn.take(), self.pool.upgrade()) {
            let mut idle = pool.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.push(IdleConn {
                conn,
                idle_since: Instant::now(),
            });
        }
        // The permit drops afterwards, releasing capacity.
    }
}

// =============================================================================
// Health Sweep
// =============================================================================

async fn run_health_sweep<F: ConnectionFactory>(inner: Arc<PoolInner<F>>) {
    let mut ticker = tokio::time::interval(inner.config.health_check_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Evict idle-expired and unhealthy connections.
        let candidates: Vec<IdleConn<F::Conn>> = {
            let mut idle = inner.idle.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *idle)
        };

        let now = Instant::now();
        let mut kept = Vec::new();
        for entry in candidates {
            if now.duration_since(entry.idle_since) >= inner.config.idle_timeout {
                continue;
            }
            if inner.factory.is_healthy(&entry.conn).await {
                kept.push(entry);
            }
        }

        {
            let mut idle = inner.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.extend(kept);
        }

        // Replenish to min_conns.
        loop {
            let live = {
                let idle = inner.idle.lock().unwrap_or_else(|e| e.into_inner());
                let max = inner.config.max_conns.max(1);
                idle.len() + (max - inner.capacity.available_permits())
            };
            if live >= inner.config.min_conns {
                break;
            }
            match inner.factory.connect().await {
                Ok(conn) => {
                    let mut idle = inner.idle.lock().unwrap_or_else(|e| e.into_inner());
                    idle.push(IdleConn {
                        conn,
                        idle_since: Instant::now(),
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "pool replenish failed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct CountingFactory {
        opened: AtomicU32,
    }

    #[async_trait]
    impl ConnectionFactory for CountingFactory {
        type Conn = u32;

        async fn connect(&self) -> Result<u32, PoolError> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn small_pool(max_conns: usize, acquire_timeout: Duration) -> Pool<CountingFactory> {
        Pool::new(
            CountingFactory {
                opened: AtomicU32::new(0),
            },
            PoolConfig {
                min_conns: 0,
                max_conns,
                idle_timeout: Duration::from_secs(600),
                health_check_interval: Duration::from_secs(3600),
                acquire_timeout,
            },
        )
    }

    #[tokio::test]
    async fn test_lifo_reuse() {
        let pool = small_pool(4, Duration::from_secs(1));

        let first = pool.acquire().await.unwrap();
        let first_id = *first;
        drop(first);

        let again = pool.acquire().await.unwrap();
        assert_eq!(*again, first_id);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let pool = small_pool(1, Duration::from_millis(50));

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted(_)));
        drop(held);
    }

    #[tokio::test]
    async fn test_release_unblocks_waiter() {
        let pool = small_pool(1, Duration::from_secs(2));

        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|c| *c) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let reused = waiter.await.unwrap().unwrap();
        assert_eq!(reused, 0);
    }

    #[tokio::test]
    async fn test_double_close_is_noop() {
        let pool = small_pool(2, Duration::from_secs(1));

        let mut conn = pool.acquire().await.unwrap();
        conn.close();
        conn.close();
        drop(conn);

        // The closed connection was discarded, not returned.
        assert_eq!(pool.status().idle, 0);
        // Capacity was released exactly once; a new acquire opens a fresh conn.
        let fresh = pool.acquire().await.unwrap();
        assert_eq!(*fresh, 1);
    }

    #[tokio::test]
    async fn test_health_sweep_replenishes_to_min() {
        let pool = Pool::new(
            CountingFactory {
                opened: AtomicU32::new(0),
            },
            PoolConfig {
                min_conns: 2,
                max_conns: 4,
                idle_timeout: Duration::from_secs(600),
                health_check_interval: Duration::from_millis(10),
                acquire_timeout: Duration::from_secs(1),
            },
        );

        let mut replenished = false;
        for _ in 0..50 {
            if pool.status().idle >= 2 {
                replenished = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(replenished, "sweep never replenished to min_conns");
    }
}
