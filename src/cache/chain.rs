//! Assembly of the full cache chain.
//!
//! Wires a memory stage in front of a file stage in front of an optional
//! remote fetcher, and owns the background purge daemon when one is
//! configured. Callers talk to the chain head; propagation between stages
//! is the stages' own business.

use crate::cache::daemon::PurgeDaemon;
use crate::cache::file::FileCache;
use crate::cache::memory::MemoryCache;
use crate::cache::source::{NextSource, TileCache, TileSource};
use crate::cache::stats::CacheStats;
use crate::cache::types::{CacheConfig, CacheError};
use crate::render::Renderer;
use crate::tile::Tile;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct CacheChain {
    memory: MemoryCache,
    file: Arc<FileCache>,
    daemon: Option<PurgeDaemon>,
}

impl CacheChain {
    /// Build the chain: memory → file → `fetcher` (if any).
    ///
    /// A zero purge interval leaves purging entirely to explicit
    /// [`CacheChain::purge`] calls.
    pub fn new(
        config: CacheConfig,
        renderer: Box<dyn Renderer>,
        fetcher: Option<Arc<dyn TileSource>>,
    ) -> Self {
        let tail = match fetcher {
            Some(source) => NextSource::Source(source),
            None => NextSource::None,
        };

        let file = Arc::new(FileCache::new(config.file.clone(), tail));
        let memory = MemoryCache::new(
            config.memory.size_limit,
            renderer,
            NextSource::Cache(file.clone()),
        );

        let daemon = (config.file.purge_interval_secs > 0)
            .then(|| PurgeDaemon::start(file.clone(), config.file.purge_interval_secs));

        info!(
            memory_limit = config.memory.size_limit,
            file_limit = config.file.size_limit,
            persistent = config.file.persistent,
            "cache chain assembled"
        );

        Self {
            memory,
            file,
            daemon,
        }
    }

    /// Serve a tile from the nearest stage that has it, falling through to
    /// the fetcher on a chain-wide miss.
    pub fn fill_tile(&self, tile: &mut Tile) {
        self.memory.fill_tile(tile);
    }

    /// Store encoded tile bytes in every cache stage.
    pub fn store_tile(&self, tile: &Tile, contents: &[u8]) {
        self.memory.store_tile(tile, contents);
    }

    /// Mark a tile as revalidated now in every stage that tracks time.
    pub fn refresh_tile_time(&self, tile: &Tile) {
        self.memory.refresh_tile_time(tile);
    }

    /// Credit a display of `tile` to every stage's popularity tracking.
    pub fn on_tile_filled(&self, tile: &Tile) {
        self.memory.on_tile_filled(tile);
    }

    /// Drop all cached entries from the non-persistent stages.
    pub fn clean(&self) {
        self.memory.clean();
        if !self.file.persistent() {
            self.file.clean();
        }
    }

    /// Run a file-cache purge pass immediately.
    pub fn purge(&self) -> Result<(), CacheError> {
        self.file.purge()
    }

    /// Whether the deferred-purge daemon is active.
    pub fn purge_daemon_running(&self) -> bool {
        self.daemon.as_ref().is_some_and(PurgeDaemon::is_running)
    }

    /// The file stage's on-disk root, if its storage came up.
    pub fn cache_root(&self) -> Option<PathBuf> {
        self.file.cache_root()
    }

    /// Combined counters across both cache stages.
    pub fn stats(&self) -> CacheStats {
        CacheStats::merged(&self.memory.stats(), &self.file.stats())
    }
}

impl Drop for CacheChain {
    fn drop(&mut self) {
        if let Some(daemon) = self.daemon.as_mut() {
            daemon.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileCoord;
    use crate::render::ImageRenderer;
    use tempfile::TempDir;

    fn chain(dir: &TempDir) -> CacheChain {
        let config = CacheConfig::new().with_cache_dir(dir.path().to_path_buf());
        CacheChain::new(config, Box::new(ImageRenderer), None)
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::new(2, 2);
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_chain_store_and_fill() {
        let temp = TempDir::new().unwrap();
        let chain = chain(&temp);

        let tile = Tile::new("osm", TileCoord::new(3, 1, 2));
        chain.store_tile(&tile, &png_bytes());

        let mut filled = Tile::new("osm", TileCoord::new(3, 1, 2));
        chain.fill_tile(&mut filled);

        assert!(filled.content().is_some());
        assert_eq!(chain.stats().memory_hits, 1);
    }

    #[test]
    fn test_daemon_started_only_when_configured() {
        let temp = TempDir::new().unwrap();
        assert!(!chain(&temp).purge_daemon_running());

        let config = CacheConfig::new()
            .with_cache_dir(temp.path().to_path_buf())
            .with_purge_interval(3600);
        let with_daemon = CacheChain::new(config, Box::new(ImageRenderer), None);
        assert!(with_daemon.purge_daemon_running());
    }

    #[test]
    fn test_clean_spares_persistent_file_stage() {
        let temp = TempDir::new().unwrap();
        let chain = chain(&temp);

        let tile = Tile::new("osm", TileCoord::new(3, 1, 2));
        chain.store_tile(&tile, &png_bytes());

        chain.clean();

        // Memory dropped it, the persistent file stage still serves it.
        let mut filled = Tile::new("osm", TileCoord::new(3, 1, 2));
        chain.fill_tile(&mut filled);
        assert!(filled.content().is_some());
        assert_eq!(chain.stats().file_hits, 1);
    }
}
