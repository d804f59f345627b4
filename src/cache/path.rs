//! On-disk tile path construction.

use crate::coord::TileCoord;
use std::path::{Path, PathBuf};

/// Filename of the persistent index inside the cache root.
pub const INDEX_FILENAME: &str = "cache.db";

/// Construct the full path for a cached tile image.
///
/// The layout is hierarchical:
/// ```text
/// <cache_root>/<source_id>/<zoom>/<x>/<y>.png
/// ```
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use tilecache::cache::tile_path;
/// use tilecache::coord::TileCoord;
///
/// let root = PathBuf::from("/cache");
/// let coord = TileCoord::new(15, 12754, 5279);
/// assert_eq!(
///     tile_path(&root, "osm", coord),
///     PathBuf::from("/cache/osm/15/12754/5279.png")
/// );
/// ```
pub fn tile_path(cache_root: &Path, source_id: &str, coord: TileCoord) -> PathBuf {
    cache_root
        .join(source_id)
        .join(coord.zoom.to_string())
        .join(coord.x.to_string())
        .join(format!("{}.png", coord.y))
}

/// Path of the persistent index database inside the cache root.
pub fn index_path(cache_root: &Path) -> PathBuf {
    cache_root.join(INDEX_FILENAME)
}

/// The in-memory queue key for a tile: `"{zoom}/{x}/{y}/{source_id}"`.
pub fn queue_key(source_id: &str, coord: TileCoord) -> String {
    format!("{}/{}/{}/{}", coord.zoom, coord.x, coord.y, source_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_path_layout() {
        let root = PathBuf::from("/home/user/.cache/tilecache");
        let path = tile_path(&root, "osm", TileCoord::new(15, 12754, 5279));

        assert_eq!(
            path,
            PathBuf::from("/home/user/.cache/tilecache/osm/15/12754/5279.png")
        );
    }

    #[test]
    fn test_tile_path_distinguishes_sources() {
        let root = PathBuf::from("/cache");
        let coord = TileCoord::new(15, 100, 200);

        assert_ne!(
            tile_path(&root, "osm", coord),
            tile_path(&root, "cycle", coord)
        );
    }

    #[test]
    fn test_tile_path_zero_coordinates() {
        let root = PathBuf::from("/cache");
        let path = tile_path(&root, "osm", TileCoord::new(1, 0, 0));

        assert_eq!(path, PathBuf::from("/cache/osm/1/0/0.png"));
    }

    #[test]
    fn test_index_path() {
        let root = PathBuf::from("/cache");
        assert_eq!(index_path(&root), PathBuf::from("/cache/cache.db"));
    }

    #[test]
    fn test_queue_key_format() {
        let key = queue_key("osm", TileCoord::new(3, 1, 2));
        assert_eq!(key, "3/1/2/osm");
    }
}
