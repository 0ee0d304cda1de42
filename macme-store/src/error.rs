use macme_core::CoreError;
use thiserror::Error;

/// Vault response errors, roughly mirroring hvac's `VaultError`.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{message}")]
    Generic {
        message: String,
        errors: Option<Vec<String>>,
    },

    /// A check-and-set version mismatch on write.
    #[error("check-and-set mismatch: {message}")]
    Cas {
        message: String,
        errors: Option<Vec<String>>,
    },
}

/// Errors surfaced by the certificate store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Http(#[from] CoreError),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

pub type StoreResult<T> = Result<T, StoreError>;
