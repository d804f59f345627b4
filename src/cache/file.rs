//! File-backed tile cache with popularity-based eviction.
//!
//! Stores tile images under `<root>/<source>/<zoom>/<x>/<y>.png` with a
//! SQLite index (`cache.db`) tracking etag, popularity and size per file.
//! The cache can be permanent or ephemeral; an ephemeral root lives in a
//! randomized temp directory and is deleted in full on teardown.
//!
//! Every failure local to this stage degrades to a miss: the chain is never
//! blocked by a broken directory, index or file.

use crate::cache::index::TileIndex;
use crate::cache::path::{index_path, tile_path};
use crate::cache::source::{NextSource, TileCache, TileSource};
use crate::cache::stats::CacheStats;
use crate::cache::types::{CacheError, FileCacheConfig};
use crate::tile::{Tile, TileState};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Cached tiles older than this must be revalidated remotely.
const EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// The backing storage of a healthy file cache.
///
/// Field order matters for teardown: the index connection must close
/// before an ephemeral root directory is deleted.
struct Store {
    index: TileIndex,
    root: CacheRoot,
}

enum CacheRoot {
    Permanent(PathBuf),
    Ephemeral(TempDir),
}

impl CacheRoot {
    fn path(&self) -> &Path {
        match self {
            CacheRoot::Permanent(path) => path,
            CacheRoot::Ephemeral(dir) => dir.path(),
        }
    }
}

/// File-system tile cache stage.
///
/// Construction never fails: when the directory or index cannot be set up
/// the stage logs a warning and runs in delegate-only mode for the session.
pub struct FileCache {
    config: FileCacheConfig,
    next: NextSource,
    store: Mutex<Option<Store>>,
    stats: Mutex<CacheStats>,
}

impl FileCache {
    /// Create a file cache with the given configuration, delegating misses
    /// and revalidation to `next`.
    pub fn new(config: FileCacheConfig, next: NextSource) -> Self {
        let store = match init_store(&config) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "file cache storage unavailable, running delegate-only");
                None
            }
        };

        Self {
            config,
            next,
            store: Mutex::new(store),
            stats: Mutex::new(CacheStats::new()),
        }
    }

    /// The active cache root, if storage came up.
    pub fn cache_root(&self) -> Option<PathBuf> {
        let store = self.store.lock().unwrap();
        store.as_ref().map(|s| s.root.path().to_path_buf())
    }

    /// Configured byte budget for `purge`.
    pub fn size_limit(&self) -> u64 {
        self.config.size_limit
    }

    /// Total byte size of all indexed tiles; 0 when degraded.
    pub fn total_size(&self) -> u64 {
        let store = self.store.lock().unwrap();
        store
            .as_ref()
            .and_then(|s| s.index.total_size().ok())
            .unwrap_or(0)
    }

    /// Stage-local statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap().clone()
    }

    /// Purge the least popular tiles until the indexed total drops to the
    /// configured byte budget, then rebase the popularity scale.
    ///
    /// Per-tile deletion is best-effort: a failed file or row delete is
    /// logged and does not stop the pass.
    pub fn purge(&self) -> Result<(), CacheError> {
        let store_guard = self.store.lock().unwrap();
        let Some(store) = store_guard.as_ref() else {
            return Ok(());
        };

        let mut current = store.index.total_size()?;
        if current < self.config.size_limit {
            debug!(current, "cache within budget, purge skipped");
            return Ok(());
        }

        let entries = store.index.entries_by_popularity()?;
        let mut purged: u64 = 0;
        let mut last_popularity: i64 = 0;

        for entry in entries {
            if current <= self.config.size_limit {
                break;
            }

            last_popularity = entry.popularity;
            debug!(
                filename = entry.filename,
                size = entry.size,
                popularity = entry.popularity,
                "purging tile"
            );

            if let Err(e) = store.index.remove(&entry.filename) {
                debug!(filename = entry.filename, error = %e, "index delete failed");
            }
            if let Err(e) = fs::remove_file(&entry.filename) {
                debug!(filename = entry.filename, error = %e, "file delete failed");
            }

            current = current.saturating_sub(entry.size);
            purged += 1;
        }

        if purged > 0 {
            if let Err(e) = store.index.rebase_popularity(last_popularity) {
                debug!(error = %e, "popularity rebase failed");
            }
        }

        self.stats.lock().unwrap().purged_tiles += purged;
        info!(purged, remaining = current, "cache purged");
        Ok(())
    }

    /// Attempt the local part of a fill.
    ///
    /// Returns `true` when the tile was served fresh and the chain walk
    /// should stop; `false` when the next stage must be consulted (miss,
    /// degraded storage, or an expired tile awaiting revalidation).
    fn try_local_fill(&self, tile: &mut Tile) -> bool {
        let store_guard = self.store.lock().unwrap();
        let Some(store) = store_guard.as_ref() else {
            return false;
        };

        let path = tile_path(store.root.path(), tile.source_id(), tile.coord());

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "tile not on disk");
                self.stats.lock().unwrap().file_misses += 1;
                return false;
            }
        };

        let content = match image::load_from_memory(&bytes) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cached tile failed to decode");
                self.stats.lock().unwrap().file_misses += 1;
                return false;
            }
        };

        tile.set_content(content);
        tile.set_size(bytes.len() as u64);

        if let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) {
            tile.set_modified_time(modified);
        }

        self.stats.lock().unwrap().file_hits += 1;

        // Popularity credit is independent of the staleness outcome, so
        // notify downstream caches before the freshness check.
        self.next.on_tile_filled(tile);

        if !tile_is_expired(tile) {
            tile.set_state(TileState::Done);
            return true;
        }

        // Expired: attach the stored etag so the next stage can revalidate
        // conditionally. Lookup failure just means revalidating from scratch.
        match store.index.etag(&index_key(&path)) {
            Ok(Some(etag)) => tile.set_etag(etag),
            Ok(None) => debug!(path = %path.display(), "no etag for expired tile"),
            Err(e) => warn!(path = %path.display(), error = %e, "etag lookup failed"),
        }

        false
    }
}

impl TileSource for FileCache {
    fn fill_tile(&self, tile: &mut Tile) {
        // Content already present means an earlier stage is mid-validation;
        // go straight to delegation.
        if tile.content().is_none() && self.try_local_fill(tile) {
            return;
        }

        self.next.fill_tile(tile);

        // Stale-but-present beats nothing when the next stage could not help.
        if tile.content().is_some() && tile.state() != TileState::Done {
            tile.set_state(TileState::Done);
        }
    }
}

impl TileCache for FileCache {
    fn store_tile(&self, tile: &Tile, contents: &[u8]) {
        {
            let store_guard = self.store.lock().unwrap();
            if let Some(store) = store_guard.as_ref() {
                let path = tile_path(store.root.path(), tile.source_id(), tile.coord());

                // Replace any stale copy outright.
                let _ = fs::remove_file(&path);

                let written = match path.parent().map(fs::create_dir_all) {
                    Some(Err(e)) => {
                        warn!(path = %path.display(), error = %e, "cannot create tile directory");
                        false
                    }
                    _ => match fs::write(&path, contents) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "tile write failed");
                            false
                        }
                    },
                };

                let mut stats = self.stats.lock().unwrap();
                if written {
                    stats.file_writes += 1;
                    if let Err(e) =
                        store
                            .index
                            .record(&index_key(&path), tile.etag(), contents.len() as u64)
                    {
                        warn!(path = %path.display(), error = %e, "index update failed");
                    }
                } else {
                    stats.file_write_failures += 1;
                }
            }
        }

        // Local failure never blocks the stages below.
        self.next.store_tile(tile, contents);
    }

    fn refresh_tile_time(&self, tile: &Tile) {
        {
            let store_guard = self.store.lock().unwrap();
            if let Some(store) = store_guard.as_ref() {
                let path = tile_path(store.root.path(), tile.source_id(), tile.coord());
                match fs::File::options().write(true).open(&path) {
                    Ok(file) => {
                        if let Err(e) = file.set_modified(SystemTime::now()) {
                            debug!(path = %path.display(), error = %e, "mtime refresh failed");
                        }
                    }
                    Err(e) => debug!(path = %path.display(), error = %e, "mtime refresh failed"),
                }
            }
        }

        self.next.refresh_tile_time(tile);
    }

    fn on_tile_filled(&self, tile: &Tile) {
        {
            let store_guard = self.store.lock().unwrap();
            if let Some(store) = store_guard.as_ref() {
                let path = tile_path(store.root.path(), tile.source_id(), tile.coord());
                // Absent rows are fine; the tile may not be in this cache.
                if let Err(e) = store.index.bump_popularity(&index_key(&path)) {
                    debug!(path = %path.display(), error = %e, "popularity bump failed");
                }
            }
        }

        self.next.on_tile_filled(tile);
    }

    fn clean(&self) {
        assert!(
            !self.config.persistent,
            "clean() called on a persistent file cache"
        );

        let mut store_guard = self.store.lock().unwrap();

        if let Some(store) = store_guard.take() {
            let Store { index, root } = store;
            drop(index);
            if let CacheRoot::Ephemeral(dir) = root {
                let path = dir.path().to_path_buf();
                if let Err(e) = dir.close() {
                    warn!(path = %path.display(), error = %e, "ephemeral cache removal failed");
                }
            }
        }

        // Re-initialize so the cache stays usable after a clean.
        *store_guard = match init_store(&self.config) {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "file cache re-initialization failed, running delegate-only");
                None
            }
        };
    }

    fn persistent(&self) -> bool {
        self.config.persistent
    }
}

/// Create the cache directory (permanent or randomized ephemeral) and open
/// the index inside it.
fn init_store(config: &FileCacheConfig) -> Result<Store, CacheError> {
    let root = if config.persistent {
        let dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tilecache"),
        };
        fs::create_dir_all(&dir)?;
        CacheRoot::Permanent(dir)
    } else {
        let base = match &config.cache_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => std::env::temp_dir(),
        };
        let dir = tempfile::Builder::new()
            .prefix("tilecache-")
            .tempdir_in(base)?;
        CacheRoot::Ephemeral(dir)
    };

    let index = TileIndex::open(&index_path(root.path()))?;
    debug!(root = %root.path().display(), "file cache initialized");

    Ok(Store { index, root })
}

/// The index key for a tile file: its full derived path.
fn index_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// A tile is expired once its last validation lies more than seven days in
/// the past; a tile that was never validated is always expired.
fn tile_is_expired(tile: &Tile) -> bool {
    match tile.modified_time() {
        Some(modified) => modified < SystemTime::now() - EXPIRY,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileCoord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::new(2, 2);
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn tile(x: u32) -> Tile {
        Tile::new("osm", TileCoord::new(3, x, 2))
    }

    fn permanent_cache(dir: &Path) -> FileCache {
        let config = FileCacheConfig {
            cache_dir: Some(dir.to_path_buf()),
            ..Default::default()
        };
        FileCache::new(config, NextSource::None)
    }

    /// Next stage that counts fills without producing content.
    #[derive(Default)]
    struct CountingSource {
        fills: AtomicUsize,
    }

    impl TileSource for CountingSource {
        fn fill_tile(&self, _tile: &mut Tile) {
            self.fills.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_store_then_fill_round_trip() {
        let temp = TempDir::new().unwrap();
        let cache = permanent_cache(temp.path());
        let data = png_bytes();

        let mut stored = tile(1);
        stored.set_size(data.len() as u64);
        cache.store_tile(&stored, &data);

        // Fresh instance over the same directory sees the stored tile.
        let cache = permanent_cache(temp.path());
        let mut t = tile(1);
        cache.fill_tile(&mut t);

        assert_eq!(t.state(), TileState::Done);
        assert!(t.content().is_some());
        assert_eq!(t.size(), data.len() as u64);
        assert!(t.modified_time().is_some());
        assert_eq!(cache.stats().file_hits, 1);
    }

    #[test]
    fn test_fresh_fill_does_not_delegate() {
        let temp = TempDir::new().unwrap();
        let next = Arc::new(CountingSource::default());
        let config = FileCacheConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::Source(next.clone()));

        cache.store_tile(&tile(1), &png_bytes());

        let mut t = tile(1);
        cache.fill_tile(&mut t);

        assert_eq!(t.state(), TileState::Done);
        assert_eq!(next.fills.load(Ordering::SeqCst), 0, "fresh hit must not delegate");
    }

    #[test]
    fn test_miss_delegates_exactly_once() {
        let temp = TempDir::new().unwrap();
        let next = Arc::new(CountingSource::default());
        let config = FileCacheConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::Source(next.clone()));

        let mut t = tile(1);
        cache.fill_tile(&mut t);

        assert_eq!(next.fills.load(Ordering::SeqCst), 1);
        assert_eq!(t.state(), TileState::None);
        assert_eq!(cache.stats().file_misses, 1);
    }

    #[test]
    fn test_corrupt_file_is_a_miss() {
        let temp = TempDir::new().unwrap();
        let cache = permanent_cache(temp.path());
        let root = cache.cache_root().unwrap();

        let path = tile_path(&root, "osm", TileCoord::new(3, 1, 2));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not a png").unwrap();

        let mut t = tile(1);
        cache.fill_tile(&mut t);

        assert!(t.content().is_none());
        assert_eq!(cache.stats().file_misses, 1);
    }

    #[test]
    fn test_expired_tile_gets_etag_and_delegates() {
        let temp = TempDir::new().unwrap();
        let next = Arc::new(CountingSource::default());
        let config = FileCacheConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::Source(next.clone()));

        let mut stored = tile(1);
        stored.set_etag("v1");
        cache.store_tile(&stored, &png_bytes());

        // Age the file past the seven-day expiry.
        let root = cache.cache_root().unwrap();
        let path = tile_path(&root, "osm", TileCoord::new(3, 1, 2));
        let old = SystemTime::now() - Duration::from_secs(8 * 24 * 60 * 60);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let mut t = tile(1);
        cache.fill_tile(&mut t);

        assert_eq!(t.etag(), Some("v1"), "stored etag attached for revalidation");
        assert_eq!(next.fills.load(Ordering::SeqCst), 1, "stale tile delegates");
        // The next stage had no answer, so stale content is still used.
        assert_eq!(t.state(), TileState::Done);
        assert!(t.content().is_some());
    }

    #[test]
    fn test_tile_with_content_skips_local_load() {
        let temp = TempDir::new().unwrap();
        let next = Arc::new(CountingSource::default());
        let config = FileCacheConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::Source(next.clone()));

        let mut t = tile(1);
        t.set_content(image::DynamicImage::new_rgba8(2, 2));
        cache.fill_tile(&mut t);

        assert_eq!(next.fills.load(Ordering::SeqCst), 1);
        assert_eq!(t.state(), TileState::Done, "content without validation is still used");
        assert_eq!(cache.stats().file_hits, 0);
    }

    #[test]
    fn test_expiry_boundary() {
        let mut t = tile(1);

        t.set_modified_time(SystemTime::now() - EXPIRY - Duration::from_secs(1));
        assert!(tile_is_expired(&t));

        t.set_modified_time(SystemTime::now() - Duration::from_secs((6 * 24 + 23) * 60 * 60));
        assert!(!tile_is_expired(&t));
    }

    #[test]
    fn test_tile_without_mtime_is_expired() {
        assert!(tile_is_expired(&tile(1)));
    }

    #[test]
    fn test_on_tile_filled_bumps_popularity() {
        let temp = TempDir::new().unwrap();
        let cache = permanent_cache(temp.path());

        cache.store_tile(&tile(1), &png_bytes());

        cache.on_tile_filled(&tile(1));
        cache.on_tile_filled(&tile(1));

        let root = cache.cache_root().unwrap();
        let key = index_key(&tile_path(&root, "osm", TileCoord::new(3, 1, 2)));
        let store = cache.store.lock().unwrap();
        let popularity = store.as_ref().unwrap().index.popularity(&key).unwrap();
        assert_eq!(popularity, Some(3));
    }

    #[test]
    fn test_refresh_tile_time_stamps_now() {
        let temp = TempDir::new().unwrap();
        let cache = permanent_cache(temp.path());

        cache.store_tile(&tile(1), &png_bytes());

        let root = cache.cache_root().unwrap();
        let path = tile_path(&root, "osm", TileCoord::new(3, 1, 2));
        let old = SystemTime::now() - Duration::from_secs(8 * 24 * 60 * 60);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        cache.refresh_tile_time(&tile(1));

        let refreshed = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(refreshed > SystemTime::now() - Duration::from_secs(60));
    }

    #[test]
    fn test_purge_respects_budget_and_popularity_order() {
        let temp = TempDir::new().unwrap();
        let config = FileCacheConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            size_limit: 2500,
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::None);

        // Three 1000-byte tiles; make tiles 2 and 3 popular.
        let data = vec![0u8; 1000];
        for x in 1..=3 {
            cache.store_tile(&tile(x), &data);
        }
        for _ in 0..2 {
            cache.on_tile_filled(&tile(2));
            cache.on_tile_filled(&tile(3));
        }

        assert_eq!(cache.total_size(), 3000);
        cache.purge().unwrap();

        assert!(cache.total_size() <= 2500);
        let root = cache.cache_root().unwrap();
        assert!(!tile_path(&root, "osm", TileCoord::new(3, 1, 2)).exists());
        assert!(tile_path(&root, "osm", TileCoord::new(3, 2, 2)).exists());
        assert!(tile_path(&root, "osm", TileCoord::new(3, 3, 2)).exists());
        assert_eq!(cache.stats().purged_tiles, 1);
    }

    #[test]
    fn test_purge_under_budget_is_noop() {
        let temp = TempDir::new().unwrap();
        let cache = permanent_cache(temp.path());

        cache.store_tile(&tile(1), &png_bytes());
        let before = cache.total_size();

        cache.purge().unwrap();

        assert_eq!(cache.total_size(), before);
    }

    #[test]
    fn test_purge_rebases_popularity() {
        let temp = TempDir::new().unwrap();
        let config = FileCacheConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            size_limit: 1500,
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::None);

        let data = vec![0u8; 1000];
        cache.store_tile(&tile(1), &data);
        cache.store_tile(&tile(2), &data);
        for _ in 0..3 {
            cache.on_tile_filled(&tile(2));
        }

        cache.purge().unwrap();

        // Tile 1 (popularity 1) was purged; the survivor's popularity is
        // rebased by the last examined value.
        let root = cache.cache_root().unwrap();
        let key = index_key(&tile_path(&root, "osm", TileCoord::new(3, 2, 2)));
        let store = cache.store.lock().unwrap();
        let popularity = store.as_ref().unwrap().index.popularity(&key).unwrap();
        assert_eq!(popularity, Some(3));
    }

    #[test]
    fn test_purge_survives_missing_file() {
        let temp = TempDir::new().unwrap();
        let config = FileCacheConfig {
            cache_dir: Some(temp.path().to_path_buf()),
            size_limit: 1500,
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::None);

        let data = vec![0u8; 1000];
        cache.store_tile(&tile(1), &data);
        cache.store_tile(&tile(2), &data);

        // Remove a file behind the index's back.
        let root = cache.cache_root().unwrap();
        fs::remove_file(tile_path(&root, "osm", TileCoord::new(3, 1, 2))).unwrap();

        cache.purge().unwrap();
        assert!(cache.total_size() <= 1500);
    }

    #[test]
    fn test_ephemeral_clean_reinitializes() {
        let config = FileCacheConfig {
            persistent: false,
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::None);

        cache.store_tile(&tile(1), &png_bytes());
        let old_root = cache.cache_root().unwrap();
        assert!(old_root.exists());

        cache.clean();

        assert!(!old_root.exists(), "old ephemeral root fully removed");
        let new_root = cache.cache_root().unwrap();
        assert_ne!(old_root, new_root);
        assert!(new_root.join("cache.db").exists(), "fresh index in place");

        // Still usable after a clean.
        let mut t = tile(1);
        cache.fill_tile(&mut t);
        assert!(t.content().is_none());
        cache.store_tile(&tile(1), &png_bytes());
        let mut t = tile(1);
        cache.fill_tile(&mut t);
        assert_eq!(t.state(), TileState::Done);
    }

    #[test]
    fn test_drop_removes_ephemeral_root() {
        let config = FileCacheConfig {
            persistent: false,
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::None);

        cache.store_tile(&tile(1), &png_bytes());
        let root = cache.cache_root().unwrap();
        assert!(root.exists());

        drop(cache);

        assert!(!root.exists(), "ephemeral root deleted on drop");
    }

    #[test]
    #[should_panic(expected = "persistent")]
    fn test_clean_on_persistent_cache_panics() {
        let temp = TempDir::new().unwrap();
        let cache = permanent_cache(temp.path());
        cache.clean();
    }

    #[test]
    fn test_degraded_cache_delegates_only() {
        // A file as cache_dir makes directory creation fail.
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("occupied");
        fs::write(&bogus, b"file, not a directory").unwrap();

        let next = Arc::new(CountingSource::default());
        let config = FileCacheConfig {
            cache_dir: Some(bogus),
            ..Default::default()
        };
        let cache = FileCache::new(config, NextSource::Source(next.clone()));

        assert!(cache.cache_root().is_none());

        // Operations degrade to pure delegation without panicking.
        let mut t = tile(1);
        cache.fill_tile(&mut t);
        cache.store_tile(&t, &png_bytes());
        cache.on_tile_filled(&t);
        cache.refresh_tile_time(&t);
        cache.purge().unwrap();

        assert_eq!(next.fills.load(Ordering::SeqCst), 1);
    }
}
