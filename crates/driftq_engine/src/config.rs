//! Configuration for the sync engine.

use driftq_core::DEFAULT_MAX_RETRIES;

/// Configuration for a [`crate::SyncService`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry budget given to operations that do not set their own.
    pub default_max_retries: u32,
    /// Maximum history entries retained per device pair.
    pub history_limit: usize,
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            history_limit: 100,
        }
    }

    /// Sets the default retry budget.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the per-device history cap.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = EngineConfig::new()
            .with_default_max_retries(5)
            .with_history_limit(10);

        assert_eq!(config.default_max_retries, 5);
        assert_eq!(config.history_limit, 10);
    }

    #[test]
    fn config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.history_limit, 100);
    }
}
