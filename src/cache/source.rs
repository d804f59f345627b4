//! The shared tile-cache capability and the chain link between stages.
//!
//! Every stage exposes [`TileSource::fill_tile`]; cache stages additionally
//! implement [`TileCache`]. Stages are linked singly via [`NextSource`]:
//! a straight forward walk with no cycles. Operations that only make sense
//! on caches (store, refresh, popularity) are forwarded only when the next
//! stage is a cache; `fill_tile` is forwarded to any kind of stage.

use crate::tile::Tile;
use std::sync::Arc;

/// Anything that can attempt to satisfy a tile's content: a cache stage or
/// the ultimate fetcher at the end of the chain.
pub trait TileSource: Send + Sync {
    /// Attempt to fill the tile from this stage, delegating down the chain
    /// on a miss or when freshness must be confirmed remotely.
    fn fill_tile(&self, tile: &mut Tile);
}

/// The shared capability of a cache stage in the chain.
///
/// All operations forward down the chain after (or regardless of) their
/// local effect, so every configured stage observes every call exactly once.
pub trait TileCache: TileSource {
    /// Persist freshly fetched bytes for the tile at this stage, then
    /// forward the same store down the chain.
    fn store_tile(&self, tile: &Tile, contents: &[u8]);

    /// Stamp the tile's validation time as "now" at this stage (after a
    /// conditional fetch confirmed the cached copy), then forward.
    fn refresh_tile_time(&self, tile: &Tile);

    /// Notify this stage that the tile was filled somewhere in the chain,
    /// bumping popularity/recency, then forward.
    fn on_tile_filled(&self, tile: &Tile);

    /// Purge this stage's storage.
    ///
    /// # Panics
    ///
    /// Panics when called on a persistent stage; purging persistent storage
    /// is a caller error.
    fn clean(&self);

    /// Whether this stage's storage survives the instance.
    fn persistent(&self) -> bool;
}

/// Link to the next stage in the chain, if any.
///
/// The distinction between `Source` and `Cache` mirrors the runtime type
/// check the chain needs: a plain source only participates in `fill_tile`,
/// while a cache also receives stores and notifications.
#[derive(Clone, Default)]
pub enum NextSource {
    /// End of the chain.
    #[default]
    None,
    /// A non-cache stage, typically the network fetcher.
    Source(Arc<dyn TileSource>),
    /// Another cache stage.
    Cache(Arc<dyn TileCache>),
}

impl NextSource {
    pub fn is_none(&self) -> bool {
        matches!(self, NextSource::None)
    }

    /// Forward a fill to the next stage of either kind.
    pub fn fill_tile(&self, tile: &mut Tile) {
        match self {
            NextSource::None => {}
            NextSource::Source(source) => source.fill_tile(tile),
            NextSource::Cache(cache) => cache.fill_tile(tile),
        }
    }

    /// Forward a store; only cache stages store.
    pub fn store_tile(&self, tile: &Tile, contents: &[u8]) {
        if let NextSource::Cache(cache) = self {
            cache.store_tile(tile, contents);
        }
    }

    /// Forward a refresh; only cache stages track validation time.
    pub fn refresh_tile_time(&self, tile: &Tile) {
        if let NextSource::Cache(cache) = self {
            cache.refresh_tile_time(tile);
        }
    }

    /// Forward a fill notification; only cache stages track popularity.
    pub fn on_tile_filled(&self, tile: &Tile) {
        if let NextSource::Cache(cache) = self {
            cache.on_tile_filled(tile);
        }
    }
}

impl std::fmt::Debug for NextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NextSource::None => f.write_str("NextSource::None"),
            NextSource::Source(_) => f.write_str("NextSource::Source"),
            NextSource::Cache(_) => f.write_str("NextSource::Cache"),
        }
    }
}
