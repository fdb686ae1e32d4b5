use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bufferpool::PoolError;

const DEFAULT_BACKING_FILE: &str = "bytebufferpool.dat";

/// Construction parameters for a [`ByteBufferPool`](crate::bufferpool::ByteBufferPool).
///
/// Capacities are in bytes and are rounded down to whole blocks. A capacity
/// of zero leaves that tier empty.
///
/// ```rust
/// use bytebufferpool::config::PoolConfig;
///
/// let config = PoolConfig::from_json_str(r#"{ "memory_capacity": 65536 }"#).unwrap();
/// assert_eq!(config.memory_capacity, 65536);
/// assert_eq!(config.file_capacity, 0);
/// assert!(!config.blocking_mode);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub memory_capacity: usize,
    pub file_capacity: usize,
    pub backing_file: PathBuf,
    // initial value of the blocking-mode flag
    pub blocking_mode: bool,
    // flush the file mapping when the pool is dropped
    pub sync_on_drop: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            memory_capacity: 0,
            file_capacity: 0,
            backing_file: PathBuf::from(DEFAULT_BACKING_FILE),
            blocking_mode: false,
            sync_on_drop: false,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory_capacity(mut self, bytes: usize) -> Self {
        self.memory_capacity = bytes;
        self
    }

    pub fn file_capacity(mut self, bytes: usize) -> Self {
        self.file_capacity = bytes;
        self
    }

    pub fn backing_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.backing_file = path.into();
        self
    }

    pub fn blocking_mode(mut self, enabled: bool) -> Self {
        self.blocking_mode = enabled;
        self
    }

    pub fn sync_on_drop(mut self, enabled: bool) -> Self {
        self.sync_on_drop = enabled;
        self
    }

    pub fn from_json_str(s: &str) -> Result<Self, PoolError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PoolError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
