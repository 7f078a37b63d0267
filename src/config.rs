//! Configuration types for connpool

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{PoolError, Result};

/// Pool sizing and timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections opened eagerly at construction and kept warm on release
    #[serde(default)]
    pub min_open: usize,
    /// Ceiling on open connections (idle + checked out)
    pub max_open: usize,
    /// Maximum connection age in milliseconds (reserved, not enforced)
    #[serde(default)]
    pub max_lifetime_ms: Option<u64>,
    /// Default deadline for `acquire()` in milliseconds; unbounded when absent
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

impl PoolConfig {
    /// Create a configuration with the given floor and ceiling
    #[must_use]
    pub fn new(min_open: usize, max_open: usize) -> Self {
        Self {
            min_open,
            max_open,
            max_lifetime_ms: None,
            acquire_timeout_ms: None,
        }
    }

    /// Set the maximum connection lifetime
    #[must_use]
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_ms = Some(duration_to_ms(lifetime));
        self
    }

    /// Set the default acquire deadline
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    /// Maximum connection lifetime, if configured
    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    /// Default acquire deadline, if configured
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be parsed or validated
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PoolError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate pool limits
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `max_open` is zero or `min_open` exceeds it
    pub fn validate(&self) -> Result<()> {
        if self.max_open == 0 {
            return Err(PoolError::InvalidConfig(
                "max_open must be > 0".to_string(),
            ));
        }

        if self.min_open > self.max_open {
            return Err(PoolError::InvalidConfig(format!(
                "min_open ({}) cannot exceed max_open ({})",
                self.min_open, self.max_open
            )));
        }

        Ok(())
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r"
            min_open = 2
            max_open = 8
            acquire_timeout_ms = 250
        ";

        let config = PoolConfig::from_toml_str(config_toml).unwrap();
        assert_eq!(config.min_open, 2);
        assert_eq!(config.max_open, 8);
        assert_eq!(config.acquire_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.max_lifetime(), None);
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r"
            max_open = 4
            max_lifetime_ms = 60000
        ";
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = PoolConfig::from_file(file.path()).unwrap();
        assert_eq!(config.min_open, 0);
        assert_eq!(config.max_lifetime(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_invalid_config_min_above_max() {
        let err = PoolConfig::new(5, 3).validate().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_config_zero_max() {
        let err = PoolConfig::from_toml_str("max_open = 0").unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let path = std::path::Path::new("/nonexistent/pool.toml");
        let err = PoolConfig::from_file(path).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[test]
    fn test_builder_durations() {
        let config = PoolConfig::new(1, 2)
            .with_max_lifetime(Duration::from_secs(30))
            .with_acquire_timeout(Duration::from_millis(10));

        assert_eq!(config.max_lifetime_ms, Some(30_000));
        assert_eq!(config.acquire_timeout_ms, Some(10));
        assert!(config.validate().is_ok());
    }
}
