pub mod config;
pub mod pool;

pub use config::{EventLogConfig, RetryPolicy, TransportConfig};
pub use pool::{ConnectionPool, PoolGuard, PoolStats};

use crate::core::Result;
use crate::storage::KvStore;
use std::fmt;
use std::sync::Arc;

/// A store client handle owned by the pool.
#[derive(Clone)]
pub struct Connection {
    id: u64,
    client: Arc<dyn KvStore>,
}

impl Connection {
    pub(crate) fn new(id: u64, client: Arc<dyn KvStore>) -> Self {
        Self { id, client }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client(&self) -> &Arc<dyn KvStore> {
        &self.client
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

/// Builds store clients from the opaque transport settings.
///
/// Called once per pooled handle. Any `Fn(&TransportConfig) -> Result<Arc<dyn KvStore>>`
/// closure qualifies.
pub trait ClientFactory {
    fn create(&self, transport: &TransportConfig) -> Result<Arc<dyn KvStore>>;
}

impl<F> ClientFactory for F
where
    F: Fn(&TransportConfig) -> Result<Arc<dyn KvStore>>,
{
    fn create(&self, transport: &TransportConfig) -> Result<Arc<dyn KvStore>> {
        self(transport)
    }
}
