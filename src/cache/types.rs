//! Core types for the cache chain.

use std::path::PathBuf;
use thiserror::Error;

/// Default file-cache budget: 100 MB, matching the classic slippy-map
/// cache default.
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 100_000_000;

/// Default memory-cache capacity, counted in entries.
pub const DEFAULT_MEMORY_SIZE_LIMIT: usize = 100;

/// Cache-related errors.
///
/// These surface only from explicit maintenance entry points (construction
/// of the chain, `purge`); the per-tile operations log and degrade instead
/// of propagating.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistent index (SQLite) error
    #[error("cache index error: {0}")]
    Index(#[from] rusqlite::Error),

    /// Invalid cache configuration
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Memory cache configuration.
///
/// The limit is an entry count, not a byte budget; see DESIGN.md for why
/// this deviation from the documented byte semantics is kept.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of cached byte buffers (default: 100)
    pub size_limit: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            size_limit: DEFAULT_MEMORY_SIZE_LIMIT,
        }
    }
}

/// File cache configuration.
#[derive(Debug, Clone)]
pub struct FileCacheConfig {
    /// Cache directory root. `None` selects the platform cache dir for
    /// persistent caches and the system temp dir for ephemeral ones.
    pub cache_dir: Option<PathBuf>,
    /// Maximum total size of indexed tiles in bytes (default: 100 MB)
    pub size_limit: u64,
    /// Persistent caches keep their directory across instances; ephemeral
    /// caches create a randomized directory and delete it on teardown.
    pub persistent: bool,
    /// Deferred-purge daemon interval in seconds; 0 disables the daemon.
    pub purge_interval_secs: u64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            size_limit: DEFAULT_FILE_SIZE_LIMIT,
            persistent: true,
            purge_interval_secs: 0,
        }
    }
}

/// Complete cache chain configuration.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Memory cache configuration
    pub memory: MemoryCacheConfig,
    /// File cache configuration
    pub file: FileCacheConfig,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory cache capacity in entries.
    pub fn with_memory_limit(mut self, entries: usize) -> Self {
        self.memory.size_limit = entries;
        self
    }

    /// Set the file cache budget in bytes.
    pub fn with_file_limit(mut self, bytes: u64) -> Self {
        self.file.size_limit = bytes;
        self
    }

    /// Set the file cache directory.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.file.cache_dir = Some(dir);
        self
    }

    /// Select persistent or ephemeral file-cache storage.
    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.file.persistent = persistent;
        self
    }

    /// Set the deferred-purge interval; 0 disables the background daemon.
    pub fn with_purge_interval(mut self, secs: u64) -> Self {
        self.file.purge_interval_secs = secs;
        self
    }
}
