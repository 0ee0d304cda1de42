//! In-memory certificate store, used for tests and for non-Vault
//! deployments (§4.5).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{CertificateStore, StoreResult};

/// A `domain → bundle` map guarded by a single lock, so reads and writes
/// are serialised with each other.
#[derive(Default)]
pub struct InMemoryStore {
    bundles: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CertificateStore for InMemoryStore {
    async fn get(&self, name: &str) -> StoreResult<Option<String>> {
        Ok(self.bundles.read().await.get(name).cloned())
    }

    async fn store(&self, name: &str, bundle: String) -> StoreResult<()> {
        self.bundles.write().await.insert(name.to_string(), bundle);
        Ok(())
    }

    async fn as_map(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self.bundles.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_none_for_an_absent_domain() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_then_get_round_trips_the_bundle() {
        let store = InMemoryStore::new();
        store.store("example.com", "pem-bundle".to_string()).await.unwrap();
        assert_eq!(
            store.get("example.com").await.unwrap(),
            Some("pem-bundle".to_string())
        );
    }

    #[tokio::test]
    async fn store_overwrites_last_writer_wins() {
        let store = InMemoryStore::new();
        store.store("example.com", "first".to_string()).await.unwrap();
        store.store("example.com", "second".to_string()).await.unwrap();
        assert_eq!(
            store.get("example.com").await.unwrap(),
            Some("second".to_string())
        );
    }

    #[tokio::test]
    async fn as_map_reflects_all_stored_domains() {
        let store = InMemoryStore::new();
        store.store("a.example.com", "a".to_string()).await.unwrap();
        store.store("b.example.com", "b".to_string()).await.unwrap();
        let map = store.as_map().await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a.example.com"), Some(&"a".to_string()));
    }
}
