//! Certificate store: a `domain → PEM bundle` mapping with two
//! back-ends (§4.5).

mod error;
mod memory;
mod vault;

pub use error::{StoreError, StoreResult, VaultError};
pub use memory::InMemoryStore;
pub use vault::VaultStore;

use std::collections::HashMap;

use async_trait::async_trait;

/// The interface the reconciler drives: read a domain's bundle, write a
/// new one, or dump the whole store.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// Returns the stored bundle for `name`, or `None` if absent.
    async fn get(&self, name: &str) -> StoreResult<Option<String>>;

    /// Writes `bundle` for `name`, last-writer-wins (the Vault backend
    /// additionally enforces CAS on the version it last read).
    async fn store(&self, name: &str, bundle: String) -> StoreResult<()>;

    /// Returns every domain currently in the store.
    async fn as_map(&self) -> StoreResult<HashMap<String, String>>;

    /// Whether the store already holds a bundle for `name`.
    async fn has(&self, name: &str) -> StoreResult<bool> {
        Ok(self.get(name).await?.is_some())
    }
}
