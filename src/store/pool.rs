//! Store connection pool.
//!
//! Serialises writes through an exclusive lease and parallelises reads
//! through shared leases, both bounded by a timeout and a cancellation
//! token. The pool is the only component permitted to touch the underlying
//! store; everything else treats it as opaque.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::ports::VectorStore;

#[derive(Debug, Clone)]
pub struct StorePoolConfig {
    /// Concurrent shared read leases.
    pub read_concurrency: usize,
    /// Lease acquisition timeout.
    pub lease_timeout: Duration,
}

impl Default for StorePoolConfig {
    fn default() -> Self {
        Self {
            read_concurrency: constants::DEFAULT_POOL_SIZE,
            lease_timeout: Duration::from_millis(constants::DEFAULT_LEASE_TIMEOUT_MS),
        }
    }
}

/// Shared read lease; releases its permit on drop.
pub struct ReadLease {
    _permit: OwnedSemaphorePermit,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for ReadLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadLease").finish()
    }
}

impl ReadLease {
    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }
}

/// Exclusive write lease; releases the write lock on drop.
pub struct WriteLease {
    _guard: OwnedMutexGuard<()>,
    store: Arc<dyn VectorStore>,
}

impl std::fmt::Debug for WriteLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLease").finish()
    }
}

impl WriteLease {
    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }
}

pub struct StorePool {
    store: RwLock<Arc<dyn VectorStore>>,
    reads: Arc<Semaphore>,
    write: Arc<Mutex<()>>,
    lease_timeout: Duration,
}

impl StorePool {
    pub fn new(store: Arc<dyn VectorStore>, config: StorePoolConfig) -> Self {
        Self {
            store: RwLock::new(store),
            reads: Arc::new(Semaphore::new(config.read_concurrency.max(1))),
            write: Arc::new(Mutex::new(())),
            lease_timeout: config.lease_timeout,
        }
    }

    /// Swap the backing store after recovery rebuilt it. In-flight leases
    /// keep their handle to the old store and drain naturally.
    pub async fn replace_store(&self, store: Arc<dyn VectorStore>) {
        *self.store.write().await = store;
    }

    async fn current_store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&*self.store.read().await)
    }

    /// Acquire a shared read lease.
    pub async fn read(&self, cancel: &CancellationToken) -> Result<ReadLease> {
        let semaphore = Arc::clone(&self.reads);
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            acquired = tokio::time::timeout(self.lease_timeout, semaphore.acquire_owned()) => {
                match acquired {
                    Ok(Ok(permit)) => Ok(ReadLease {
                        _permit: permit,
                        store: self.current_store().await,
                    }),
                    Ok(Err(_)) => Err(Error::internal("read semaphore closed")),
                    Err(_) => Err(Error::DeadlineExceeded),
                }
            }
        }
    }

    /// Acquire the exclusive write lease.
    pub async fn write(&self, cancel: &CancellationToken) -> Result<WriteLease> {
        let lock = Arc::clone(&self.write);
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            acquired = tokio::time::timeout(self.lease_timeout, lock.lock_owned()) => {
                match acquired {
                    Ok(guard) => Ok(WriteLease {
                        _guard: guard,
                        store: self.current_store().await,
                    }),
                    Err(_) => Err(Error::DeadlineExceeded),
                }
            }
        }
    }
}
