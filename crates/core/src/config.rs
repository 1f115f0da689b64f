//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core
//! services. Request handling never reads process-wide environment variables,
//! which keeps behaviour consistent across multi-threaded runtimes and test
//! harnesses.

use crate::{EncounterError, EncounterResult};

/// Default connection pool size when the embedding application does not care.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_url: String,
    max_connections: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`EncounterError::Validation`] if `database_url` is empty.
    pub fn new(database_url: impl Into<String>) -> EncounterResult<Self> {
        let database_url = database_url.into();
        if database_url.trim().is_empty() {
            return Err(EncounterError::Validation(
                "database_url cannot be empty".into(),
            ));
        }

        Ok(Self {
            database_url,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        })
    }

    /// Override the connection pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_database_url() {
        assert!(CoreConfig::new("").is_err());
        assert!(CoreConfig::new("   ").is_err());
    }

    #[test]
    fn pool_size_never_drops_below_one() {
        let cfg = CoreConfig::new("sqlite::memory:")
            .expect("config should build")
            .with_max_connections(0);
        assert_eq!(cfg.max_connections(), 1);
    }
}
