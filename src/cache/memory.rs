//! In-memory LRU cache of raw tile byte buffers.
//!
//! Sits in front of the file cache to avoid disk I/O and re-decoding for
//! recently used tiles. The queue keeps the most-recently-used entry at the
//! head and evicts from the tail; the bound is an entry count rather than a
//! byte budget (see DESIGN.md).

use crate::cache::path::queue_key;
use crate::cache::source::{NextSource, TileCache, TileSource};
use crate::cache::stats::CacheStats;
use crate::render::Renderer;
use crate::tile::{Tile, TileState};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

struct QueueMember {
    key: String,
    data: Vec<u8>,
    #[allow(dead_code)]
    size: usize,
}

/// Bounded LRU cache of raw tile bytes, keyed by `"{zoom}/{x}/{y}/{source}"`.
pub struct MemoryCache {
    size_limit: usize,
    queue: Mutex<VecDeque<QueueMember>>,
    renderer: Box<dyn Renderer>,
    next: NextSource,
    stats: Mutex<CacheStats>,
}

impl MemoryCache {
    /// Create a memory cache holding at most `size_limit` entries,
    /// decoding hits with `renderer` and delegating misses to `next`.
    pub fn new(size_limit: usize, renderer: Box<dyn Renderer>, next: NextSource) -> Self {
        Self {
            size_limit,
            queue: Mutex::new(VecDeque::new()),
            renderer,
            next,
            stats: Mutex::new(CacheStats::new()),
        }
    }

    /// Maximum number of entries.
    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Current number of entries.
    pub fn entry_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Whether a key is currently cached.
    pub fn contains(&self, source_id: &str, coord: crate::coord::TileCoord) -> bool {
        let key = queue_key(source_id, coord);
        self.queue.lock().unwrap().iter().any(|m| m.key == key)
    }

    /// Stage-local statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap().clone()
    }

    /// Promote the entry for `key` to the head, returning a copy of its
    /// bytes on a hit.
    fn lookup_and_promote(&self, key: &str) -> Option<Vec<u8>> {
        let mut queue = self.queue.lock().unwrap();
        let pos = queue.iter().position(|m| m.key == key)?;
        let member = queue.remove(pos).unwrap();
        let data = member.data.clone();
        queue.push_front(member);
        Some(data)
    }

    /// Promote the entry for `key` to the head if present.
    fn promote(&self, key: &str) -> bool {
        let mut queue = self.queue.lock().unwrap();
        if let Some(pos) = queue.iter().position(|m| m.key == key) {
            let member = queue.remove(pos).unwrap();
            queue.push_front(member);
            true
        } else {
            false
        }
    }
}

impl TileSource for MemoryCache {
    fn fill_tile(&self, tile: &mut Tile) {
        if tile.state() != TileState::Loaded {
            let key = queue_key(tile.source_id(), tile.coord());

            if let Some(data) = self.lookup_and_promote(&key) {
                self.stats.lock().unwrap().memory_hits += 1;

                match self.renderer.render(&data, tile) {
                    Ok(()) => {
                        self.next.on_tile_filled(tile);
                        tile.set_fade_in(true);
                        tile.set_state(TileState::Done);
                        tile.request_display();
                    }
                    Err(e) => {
                        debug!(key, error = %e, "cached bytes failed to render, delegating");
                        self.next.fill_tile(tile);
                    }
                }
                return;
            }

            self.stats.lock().unwrap().memory_misses += 1;
        }

        if !self.next.is_none() {
            self.next.fill_tile(tile);
        } else if tile.state() == TileState::Loaded {
            // End of the chain: use what was already loaded even though it
            // could not be validated.
            tile.set_state(TileState::Done);
            tile.request_display();
        }
    }
}

impl TileCache for MemoryCache {
    fn store_tile(&self, tile: &Tile, contents: &[u8]) {
        let key = queue_key(tile.source_id(), tile.coord());

        if !self.promote(&key) {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() >= self.size_limit {
                if let Some(evicted) = queue.pop_back() {
                    debug!(key = evicted.key, "evicted least recently used entry");
                    self.stats.lock().unwrap().memory_evictions += 1;
                }
            }
            queue.push_front(QueueMember {
                key,
                data: contents.to_vec(),
                size: contents.len(),
            });
        }

        self.next.store_tile(tile, contents);
    }

    fn refresh_tile_time(&self, tile: &Tile) {
        // Byte buffers carry no modification time; the stamp only matters
        // further down the chain.
        self.next.refresh_tile_time(tile);
    }

    fn on_tile_filled(&self, tile: &Tile) {
        let key = queue_key(tile.source_id(), tile.coord());
        self.promote(&key);
        self.next.on_tile_filled(tile);
    }

    fn clean(&self) {
        self.queue.lock().unwrap().clear();
    }

    fn persistent(&self) -> bool {
        false
    }
}
