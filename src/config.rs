//! Isolate configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! heap_limit = 65536
//! handle_capacity = 256
//! ```
//!
//! Missing keys take their defaults; unknown keys are an error.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default number of managed heap slots
pub const DEFAULT_HEAP_LIMIT: usize = 64 * 1024;

/// Default initial handle table capacity
pub const DEFAULT_HANDLE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IsolateConfig {
    /// Maximum number of live objects in the managed heap
    pub heap_limit: usize,
    /// Initial capacity of the handle table
    pub handle_capacity: usize,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        IsolateConfig {
            heap_limit: DEFAULT_HEAP_LIMIT,
            handle_capacity: DEFAULT_HANDLE_CAPACITY,
        }
    }
}

impl IsolateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_heap_limit(mut self, heap_limit: usize) -> Self {
        self.heap_limit = heap_limit;
        self
    }

    pub fn with_handle_capacity(mut self, handle_capacity: usize) -> Self {
        self.handle_capacity = handle_capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heap_limit == 0 {
            return Err(ConfigError::Invalid("heap_limit must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: IsolateConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(?path, heap_limit = config.heap_limit, "loaded isolate config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = IsolateConfig::default();
        assert_eq!(config.heap_limit, DEFAULT_HEAP_LIMIT);
        assert_eq!(config.handle_capacity, DEFAULT_HANDLE_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = IsolateConfig::new().with_heap_limit(16).with_handle_capacity(4);
        assert_eq!(config.heap_limit, 16);
        assert_eq!(config.handle_capacity, 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = IsolateConfig::from_toml_str("heap_limit = 128").unwrap();
        assert_eq!(config.heap_limit, 128);
        assert_eq!(config.handle_capacity, DEFAULT_HANDLE_CAPACITY);

        let config = IsolateConfig::from_toml_str("").unwrap();
        assert_eq!(config, IsolateConfig::default());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = IsolateConfig::from_toml_str("heap_size = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_rejects_zero_heap() {
        let err = IsolateConfig::from_toml_str("heap_limit = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("heap_limit"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "heap_limit = 32\nhandle_capacity = 8").unwrap();
        let config = IsolateConfig::load(file.path()).unwrap();
        assert_eq!(config, IsolateConfig::new().with_heap_limit(32).with_handle_capacity(8));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IsolateConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
