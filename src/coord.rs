//! Tile grid coordinates.

/// Coordinates of a single slippy-map tile.
///
/// `x` grows eastward, `y` grows southward, following the usual
/// OpenStreetMap tile numbering for the given zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Column index at this zoom level.
    pub x: u32,
    /// Row index at this zoom level.
    pub y: u32,
    /// Zoom level (0 = whole world in one tile).
    pub zoom: u8,
}

impl TileCoord {
    /// Create a new tile coordinate.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { x, y, zoom }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_equality() {
        assert_eq!(TileCoord::new(15, 100, 200), TileCoord::new(15, 100, 200));
        assert_ne!(TileCoord::new(15, 100, 200), TileCoord::new(15, 100, 201));
        assert_ne!(TileCoord::new(15, 100, 200), TileCoord::new(16, 100, 200));
    }

    #[test]
    fn test_coord_display() {
        let coord = TileCoord::new(3, 1, 2);
        assert_eq!(coord.to_string(), "3/1/2");
    }
}
