//! Texture boundary consumed by sprites.
//!
//! The renderer never packs atlases or loads images. It only reads placement and
//! state from a [`TextureSource`] and binds GPU views registered under the same id.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Identifier shared between a [`TextureSource`] and the view registered with the backend.
///
/// Id 0 is reserved for "no texture" and binds a white texel.
pub type TextureId = u32;

/// UV rectangle covering a whole texture, `(u0, v0, u1, v1)`.
pub const FULL_UV_RECT: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// A texture, or a region of an atlas, as seen by the batcher.
pub trait TextureSource: Send + Sync + fmt::Debug {
    fn id(&self) -> TextureId;

    /// Placement inside the bound texture as `(u0, v0, u1, v1)`.
    fn uv_rect(&self) -> [f32; 4];

    /// Whether every texel is fully opaque.
    fn is_opaque(&self) -> bool;

    /// Whether pixel data has reached the GPU. Unloaded textures hide their sprites.
    fn is_loaded(&self) -> bool;

    /// Changes whenever `uv_rect` or `is_loaded` change, e.g. after an atlas repack.
    fn generation(&self) -> u64 {
        0
    }
}

pub type TextureRef = Arc<dyn TextureSource>;

#[derive(Debug)]
struct RegionState {
    uv_rect: [f32; 4],
    loaded: bool,
    generation: u64,
}

/// A [`TextureSource`] whose placement can be updated from any thread.
///
/// Asset loaders hand these to sprites up front and fill them in once the upload
/// finishes; every update bumps the generation so sprites refresh their UVs.
#[derive(Debug)]
pub struct TextureRegion {
    id: TextureId,
    opaque: bool,
    state: RwLock<RegionState>,
}

impl TextureRegion {
    /// A region that is not loaded yet.
    pub fn new(id: TextureId, opaque: bool) -> Self {
        Self {
            id,
            opaque,
            state: RwLock::new(RegionState {
                uv_rect: FULL_UV_RECT,
                loaded: false,
                generation: 0,
            }),
        }
    }

    /// A loaded region covering `uv_rect`.
    pub fn loaded(id: TextureId, opaque: bool, uv_rect: [f32; 4]) -> Self {
        let region = Self::new(id, opaque);
        region.set_uv_rect(uv_rect);
        region.set_loaded(true);
        region
    }

    pub fn set_uv_rect(&self, uv_rect: [f32; 4]) {
        let mut state = self.state.write();
        state.uv_rect = uv_rect;
        state.generation += 1;
    }

    pub fn set_loaded(&self, loaded: bool) {
        let mut state = self.state.write();
        if state.loaded != loaded {
            state.loaded = loaded;
            state.generation += 1;
        }
    }
}

impl TextureSource for TextureRegion {
    fn id(&self) -> TextureId {
        self.id
    }

    fn uv_rect(&self) -> [f32; 4] {
        self.state.read().uv_rect
    }

    fn is_opaque(&self) -> bool {
        self.opaque
    }

    fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    fn generation(&self) -> u64 {
        self.state.read().generation
    }
}
