//! tilecache - Two-tier map tile caching
//!
//! This library provides a chained tile cache for slippy-map tile sources:
//! an in-memory LRU stage in front of a file-backed stage with a persistent
//! SQLite index and popularity-based eviction.
//!
//! # High-Level API
//!
//! For most use cases, the [`cache::CacheChain`] facade assembles the whole
//! chain:
//!
//! ```no_run
//! use tilecache::cache::{CacheChain, CacheConfig};
//! use tilecache::coord::TileCoord;
//! use tilecache::render::ImageRenderer;
//! use tilecache::tile::Tile;
//!
//! let config = CacheConfig::new().with_file_limit(50_000_000);
//! let chain = CacheChain::new(config, Box::new(ImageRenderer), None);
//!
//! let mut tile = Tile::new("osm", TileCoord::new(3, 1, 2));
//! chain.fill_tile(&mut tile);
//! ```

pub mod cache;
pub mod coord;
pub mod logging;
pub mod render;
pub mod tile;

/// Version of the tilecache library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
