//! Shared error kinds and the environment abstraction used across the
//! marathon-acme workspace.

pub mod env;

pub use env::{EnvSource, MapEnv, ProcessEnv};

use thiserror::Error;

/// Error kinds shared by every HTTP-speaking client in this workspace:
/// configuration, non-2xx responses, and transient transport failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid inputs at construction, or a request with no URL and no base
    /// URL to resolve it against.
    #[error("configuration error: {0}")]
    Config(String),

    /// A non-2xx response the caller opted into checking, carrying the body.
    #[error("{status} {label} for url: {url}")]
    Http {
        status: u16,
        label: &'static str,
        url: String,
        body: String,
    },

    /// A lower-level transport failure (connection refused, timeout, DNS).
    #[error("transient network error: {0}")]
    Transient(String),
}

impl CoreError {
    /// Builds the `HTTPError` variant from a status code, classifying it as
    /// a client or server error per §4.2.
    pub fn from_status(status: u16, url: String, body: String) -> Self {
        let label = if (400..500).contains(&status) {
            "Client Error"
        } else {
            "Server Error"
        };
        CoreError::Http {
            status,
            label,
            url,
            body,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
