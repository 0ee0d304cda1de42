//! Environment abstraction.
//!
//! `from_env`-style constructors coupled directly to `std::env` make tests
//! depend on process state. This trait lets every consumer (currently
//! `macme-store`'s Vault client) take an injected environment instead, so
//! tests can supply a plain map.

use std::collections::HashMap;
use std::env;

/// A source of environment variables.
pub trait EnvSource: Send + Sync {
    /// Returns the value of `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

/// A fixed map of variables, for tests.
#[derive(Debug, Default, Clone)]
pub struct MapEnv(pub HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl EnvSource for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}
