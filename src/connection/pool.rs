use super::{ClientFactory, Connection, config::EventLogConfig};
use crate::core::{EventLogError, Result};
use crate::storage::KvStore;
use std::collections::VecDeque;
use std::future::Future;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Connection pool
///
/// A fixed set of store client handles created up front. Callers check a
/// handle out with [`get_connection`](Self::get_connection) and it goes back
/// to the pool when the returned guard is dropped.
pub struct ConnectionPool {
    /// Idle handles
    available: Arc<Mutex<VecDeque<Connection>>>,
    /// One permit per idle handle
    permits: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Option<Duration>,
}

impl ConnectionPool {
    /// Creates `config.pool_size` clients through `factory`.
    pub fn new<F: ClientFactory + ?Sized>(config: &EventLogConfig, factory: &F) -> Result<Self> {
        config.validate()?;
        let clients = (0..config.pool_size)
            .map(|_| factory.create(&config.transport))
            .collect::<Result<Vec<_>>>()?;
        Self::from_clients(clients, config.acquire_timeout_duration())
    }

    /// Pools the given handles as-is.
    pub fn from_clients(
        clients: Vec<Arc<dyn KvStore>>,
        acquire_timeout: Option<Duration>,
    ) -> Result<Self> {
        if clients.is_empty() {
            return Err(EventLogError::Config(
                "connection pool needs at least one client".into(),
            ));
        }
        let size = clients.len();
        let available = clients
            .into_iter()
            .enumerate()
            .map(|(i, client)| Connection::new(i as u64 + 1, client))
            .collect();

        Ok(Self {
            available: Arc::new(Mutex::new(available)),
            permits: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout,
        })
    }

    /// `size` handles that all share one client, for stores that are safe to
    /// use concurrently (the in-memory store, most SDK clients).
    pub fn shared(
        client: Arc<dyn KvStore>,
        size: usize,
        acquire_timeout: Option<Duration>,
    ) -> Result<Self> {
        Self::from_clients(vec![client; size], acquire_timeout)
    }

    /// Waits for a free handle.
    ///
    /// Fails with [`EventLogError::PoolTimeout`] when an acquire timeout is
    /// configured and elapses first.
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = match self.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire)
                .await
                .map_err(|_| EventLogError::PoolTimeout(timeout))?,
            None => acquire.await,
        }
        .map_err(|_| EventLogError::Execution("connection pool closed".into()))?;

        let connection = lock(&self.available).pop_front().ok_or_else(|| {
            EventLogError::Execution("connection pool permit without an idle handle".into())
        })?;

        Ok(PoolGuard {
            client: Arc::clone(connection.client()),
            connection: Some(connection),
            pool: Arc::clone(&self.available),
            _permit: permit,
        })
    }

    /// Runs `f` with an exclusively checked-out client.
    pub async fn with_connection<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn KvStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.get_connection().await?;
        f(guard.client()).await
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> PoolStats {
        let available = lock(&self.available).len();
        PoolStats {
            size: self.size,
            available,
            in_use: self.size.saturating_sub(available),
        }
    }
}

fn lock(queue: &Mutex<VecDeque<Connection>>) -> MutexGuard<'_, VecDeque<Connection>> {
    // The queue is only pushed to and popped from, so a poisoned lock still
    // holds a consistent deque.
    queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connection pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub available: usize,
    pub in_use: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} in use, {} available",
            self.in_use, self.size, self.available
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the handle to the pool when dropped, including during unwinding.
pub struct PoolGuard {
    client: Arc<dyn KvStore>,
    connection: Option<Connection>,
    pool: Arc<Mutex<VecDeque<Connection>>>,
    // Declared last so it is released after `drop` has pushed the handle back.
    _permit: OwnedSemaphorePermit,
}

impl PoolGuard {
    pub fn client(&self) -> Arc<dyn KvStore> {
        Arc::clone(&self.client)
    }

    pub fn connection_id(&self) -> Option<u64> {
        self.connection.as_ref().map(Connection::id)
    }
}

impl Deref for PoolGuard {
    type Target = dyn KvStore;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            lock(&self.pool).push_back(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKvStore;

    fn store() -> Arc<dyn KvStore> {
        Arc::new(InMemoryKvStore::new())
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = ConnectionPool::shared(store(), 3, None).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.size, 3);
        assert_eq!(stats.available, 3);
        assert_eq!(stats.in_use, 0);
        assert!(ConnectionPool::from_clients(Vec::new(), None).is_err());
    }

    #[tokio::test]
    async fn test_connection_return_to_pool() {
        let pool = ConnectionPool::shared(store(), 2, None).unwrap();
        {
            let _conn = pool.get_connection().await.unwrap();
            let stats = pool.stats();
            assert_eq!(stats.in_use, 1);
            assert_eq!(stats.available, 1);
        }
        assert_eq!(pool.stats().available, 2);
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let pool = ConnectionPool::shared(store(), 1, Some(Duration::from_millis(20))).unwrap();
        let held = pool.get_connection().await.unwrap();
        let err = pool.get_connection().await.err().unwrap();
        assert!(matches!(err, EventLogError::PoolTimeout(_)));

        drop(held);
        assert!(pool.get_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_released_handle() {
        let pool = Arc::new(ConnectionPool::shared(store(), 1, None).unwrap());
        let held = pool.get_connection().await.unwrap();
        let first_id = held.connection_id();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.get_connection().await.map(|g| g.connection_id()) })
        };
        tokio::task::yield_now().await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), first_id);
    }

    #[tokio::test]
    async fn test_with_connection_returns_handle_on_error() {
        let pool = ConnectionPool::shared(store(), 1, None).unwrap();
        let result: Result<()> = pool
            .with_connection(|_client| async { Err(EventLogError::store("boom")) })
            .await;
        assert!(result.is_err());
        assert_eq!(pool.stats().available, 1);
    }

    #[tokio::test]
    async fn test_new_uses_factory_per_handle() {
        let config = EventLogConfig::new("ns").pool_size(3);
        let created = std::sync::atomic::AtomicUsize::new(0);
        let factory = |_: &crate::connection::TransportConfig| -> Result<Arc<dyn KvStore>> {
            created.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(store())
        };
        let pool = ConnectionPool::new(&config, &factory).unwrap();
        assert_eq!(pool.size(), 3);
        assert_eq!(created.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
