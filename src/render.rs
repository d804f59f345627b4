//! Renderer capability: decoding raw tile bytes into displayable content.
//!
//! The memory cache stores raw byte buffers and hands them to a renderer
//! on a hit; the renderer decodes them into the tile's content. The default
//! [`ImageRenderer`] decodes PNG/JPEG payloads with the `image` crate.

use crate::tile::Tile;
use thiserror::Error;

/// Errors produced while decoding tile bytes.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The payload could not be decoded as an image.
    #[error("tile image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// The payload was empty.
    #[error("empty tile payload")]
    Empty,
}

/// Decodes raw tile bytes into displayable tile content.
///
/// Implementations must set the tile's content (and size) on success. The
/// chain treats a render failure as a miss and falls through to the next
/// stage, so implementations should not mutate the tile when they fail.
pub trait Renderer: Send + Sync {
    fn render(&self, data: &[u8], tile: &mut Tile) -> Result<(), RenderError>;
}

/// Default renderer backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRenderer;

impl Renderer for ImageRenderer {
    fn render(&self, data: &[u8], tile: &mut Tile) -> Result<(), RenderError> {
        if data.is_empty() {
            return Err(RenderError::Empty);
        }

        let content = image::load_from_memory(data)?;
        tile.set_content(content);
        tile.set_size(data.len() as u64);
        Ok(())
    }
}
