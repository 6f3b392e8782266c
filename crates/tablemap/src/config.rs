//! Engine configuration.

use serde::{Deserialize, Serialize};
use tablemap_core::IsolationLevel;

/// Configuration for an [`Engine`](crate::Engine).
///
/// Deserializes from partial documents; absent keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Create the tables of every mapped type on `connect` when missing.
    pub create_missing_tables: bool,
    /// Rendered statements kept per operation (0 disables caching).
    pub statement_cache_size: usize,
    /// Check member constraints before create and update.
    pub validate_on_write: bool,
    /// Isolation of the transactions wrapping each write.
    pub isolation: IsolationLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_missing_tables: true,
            statement_cache_size: 1024,
            validate_on_write: true,
            isolation: IsolationLevel::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn create_missing_tables(mut self, value: bool) -> Self {
        self.create_missing_tables = value;
        self
    }

    #[must_use]
    pub fn statement_cache_size(mut self, size: usize) -> Self {
        self.statement_cache_size = size;
        self
    }

    #[must_use]
    pub fn validate_on_write(mut self, value: bool) -> Self {
        self.validate_on_write = value;
        self
    }

    #[must_use]
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = level;
        self
    }
}
