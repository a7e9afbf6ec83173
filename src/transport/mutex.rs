use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Named locks, used to serialise read-modify-write cycles on a shared remote object
#[derive(Debug, Default)]
pub struct MutexKv {
    store: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MutexKv {
    /// Process-wide store
    pub fn global() -> &'static MutexKv {
        static STORE: OnceLock<MutexKv> = OnceLock::new();
        STORE.get_or_init(MutexKv::default)
    }

    /// Lock `key`, waiting for the current holder to release it
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
            // Locks nobody holds or waits for are only referenced by the store
            store.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            store.entry(key.to_owned()).or_default().clone()
        };
        debug!(key, "Locking");
        let guard = mutex.lock_owned().await;
        debug!(key, "Locked");
        guard
    }
}
