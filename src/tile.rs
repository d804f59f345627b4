//! The tile entity mutated by the cache chain.
//!
//! A [`Tile`] is created by the map-source pipeline and handed down the
//! cache chain by mutable reference. Cache stages fill in content, state
//! and validation metadata in place; they never own the tile itself.

use crate::coord::TileCoord;
use image::DynamicImage;
use std::time::SystemTime;

/// Loading state of a tile, advanced by the pipeline and the caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileState {
    /// Initial state, no fill attempted yet.
    #[default]
    None,
    /// A fill is in flight somewhere down the chain.
    Loading,
    /// Content bytes have been obtained but not yet finalized.
    Loaded,
    /// Content is final and ready for display.
    Done,
}

/// A single square map image unit at a given zoom level and grid coordinate.
///
/// Carries the mutable fill state shared across the cache chain: decoded
/// content, validation token (etag), last validated timestamp and byte size.
#[derive(Debug, Clone)]
pub struct Tile {
    source_id: String,
    coord: TileCoord,
    state: TileState,
    content: Option<DynamicImage>,
    etag: Option<String>,
    modified_time: Option<SystemTime>,
    size: u64,
    fade_in: bool,
    display_pending: bool,
}

impl Tile {
    /// Create a tile for the given map source and coordinate.
    pub fn new(source_id: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            source_id: source_id.into(),
            coord,
            state: TileState::None,
            content: None,
            etag: None,
            modified_time: None,
            size: 0,
            fade_in: false,
            display_pending: false,
        }
    }

    /// Identifier of the map source this tile belongs to.
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Grid coordinate of this tile.
    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn set_state(&mut self, state: TileState) {
        self.state = state;
    }

    /// Decoded image content, if any stage has produced it.
    pub fn content(&self) -> Option<&DynamicImage> {
        self.content.as_ref()
    }

    pub fn set_content(&mut self, content: DynamicImage) {
        self.content = Some(content);
    }

    /// Opaque server validation token for conditional re-fetch.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn set_etag(&mut self, etag: impl Into<String>) {
        self.etag = Some(etag.into());
    }

    /// Timestamp at which the content was last validated.
    pub fn modified_time(&self) -> Option<SystemTime> {
        self.modified_time
    }

    pub fn set_modified_time(&mut self, time: SystemTime) {
        self.modified_time = Some(time);
    }

    /// Byte size of the encoded content.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    /// Whether the presentation layer should fade this tile in.
    pub fn fade_in(&self) -> bool {
        self.fade_in
    }

    pub fn set_fade_in(&mut self, fade_in: bool) {
        self.fade_in = fade_in;
    }

    /// Ask the presentation layer to show the current content.
    pub fn request_display(&mut self) {
        self.display_pending = true;
    }

    /// Consume a pending display request, if one was raised.
    pub fn take_display_request(&mut self) -> bool {
        std::mem::take(&mut self.display_pending)
    }
}
