//! Background purge daemon for the file cache.
//!
//! Runs on a dedicated thread and triggers [`FileCache::purge`] at a fixed
//! interval, so eviction cost is paid off the tile-serving path. The thread
//! wakes every second to honor shutdown promptly even with long intervals.

use crate::cache::file::FileCache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// How often the daemon thread checks for shutdown.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub struct PurgeDaemon {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PurgeDaemon {
    /// Spawn the daemon, purging `cache` every `interval_secs` seconds.
    pub fn start(cache: Arc<FileCache>, interval_secs: u64) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("cache-purge".into())
            .spawn(move || run_loop(cache, thread_shutdown, interval_secs))
            .expect("failed to spawn cache-purge thread");

        info!(interval_secs, "purge daemon started");

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the daemon to stop after its current pass.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Signal shutdown and wait for the thread to exit.
    pub fn join(&mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("purge daemon thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for PurgeDaemon {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_loop(cache: Arc<FileCache>, shutdown: Arc<AtomicBool>, interval_secs: u64) {
    let mut elapsed_secs: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(SHUTDOWN_CHECK_INTERVAL);
        elapsed_secs += 1;

        if elapsed_secs < interval_secs {
            continue;
        }
        elapsed_secs = 0;

        debug!("purge daemon pass");
        if let Err(e) = cache.purge() {
            error!(error = %e, "scheduled purge failed");
        }
    }

    info!("purge daemon stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::source::NextSource;
    use crate::cache::types::FileCacheConfig;
    use crate::coord::TileCoord;
    use crate::tile::Tile;
    use crate::cache::TileCache;
    use tempfile::TempDir;

    fn over_budget_cache(dir: &TempDir) -> Arc<FileCache> {
        let config = FileCacheConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            size_limit: 1500,
            ..Default::default()
        };
        let cache = Arc::new(FileCache::new(config, NextSource::None));

        let data = vec![0u8; 1000];
        cache.store_tile(&Tile::new("osm", TileCoord::new(3, 1, 2)), &data);
        cache.store_tile(&Tile::new("osm", TileCoord::new(3, 2, 2)), &data);
        cache
    }

    #[test]
    fn test_daemon_purges_on_interval() {
        let temp = TempDir::new().unwrap();
        let cache = over_budget_cache(&temp);
        assert_eq!(cache.total_size(), 2000);

        let mut daemon = PurgeDaemon::start(cache.clone(), 1);

        // One pass lands within a couple of check intervals.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while cache.total_size() > 1500 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
        }

        daemon.join();
        assert!(cache.total_size() <= 1500);
    }

    #[test]
    fn test_daemon_shutdown_is_prompt() {
        let temp = TempDir::new().unwrap();
        let cache = over_budget_cache(&temp);

        // Long interval: shutdown must not wait for a purge pass.
        let mut daemon = PurgeDaemon::start(cache, 3600);
        assert!(daemon.is_running());

        let start = std::time::Instant::now();
        daemon.join();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!daemon.is_running());
    }
}
