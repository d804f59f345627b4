//! Two-tier tile cache: an in-memory LRU stage chained in front of a
//! file-backed stage with a persistent SQLite index and popularity-based
//! eviction.

pub mod chain;
pub mod daemon;
pub mod file;
pub mod index;
pub mod memory;
pub mod path;
pub mod source;
pub mod stats;
pub mod types;

pub use chain::CacheChain;
pub use daemon::PurgeDaemon;
pub use file::FileCache;
pub use index::{IndexEntry, TileIndex};
pub use memory::MemoryCache;
pub use path::{index_path, tile_path};
pub use source::{NextSource, TileCache, TileSource};
pub use stats::CacheStats;
pub use types::{
    CacheConfig, CacheError, FileCacheConfig, MemoryCacheConfig, DEFAULT_FILE_SIZE_LIMIT,
    DEFAULT_MEMORY_SIZE_LIMIT,
};
