//! Shared fakes for unit tests

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::CredentialStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryCredentialStore {
    storage: Arc<Mutex<HashMap<String, String>>>,
    fail_writes: AtomicBool,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn insert(&self, key: &str, value: &str) {
        self.storage
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
    }

    pub async fn value(&self, key: &str) -> Option<String> {
        self.storage.lock().await.get(key).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.storage.lock().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn set_secret(&self, key: &str, value: &str) -> BridgeResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::NotAvailable("keychain locked".to_string()));
        }
        self.insert(key, value).await;
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<String>> {
        Ok(self.value(key).await)
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.storage.lock().await.remove(key);
        Ok(())
    }
}
