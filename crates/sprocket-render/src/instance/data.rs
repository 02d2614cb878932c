//! CPU-side instance storage.
//!
//! Two growable arrays back every drawable: a fixed-stride array of
//! [`StaticInstanceRecord`]s and a flat `f32` array holding variable-length dynamic
//! payloads. Both only ever grow at the tail, so offsets handed out earlier stay valid.

use bytemuck::{Pod, Zeroable};

/// Kind tag stored in [`StaticInstanceRecord::kind`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKind {
    /// Not drawn. The shader discards the whole quad.
    Hidden = 0,
    /// Textured quad tinted by an RGB payload.
    Sprite = 1,
    /// Distance-field glyph, RGB payload plus edge smoothness.
    Glyph = 2,
}

/// Per-instance record read by the vertex shader.
///
/// 96 bytes, a multiple of 16 so the array stride matches WGSL storage layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticInstanceRecord {
    /// Column-major model matrix.
    pub model: [[f32; 4]; 4],
    /// Texture coordinates as `(u0, v0, u1, v1)`.
    pub uv_rect: [f32; 4],
    /// An [`InstanceKind`] discriminant.
    pub kind: u32,
    /// Offset of this instance's payload in the dynamic array, in floats.
    pub data_offset: u32,
    /// Mask id written by this instance in the mask pass, 0 for none.
    pub writing_mask: u32,
    /// Mask id this instance is clipped against, 0 for none.
    pub reading_mask: u32,
}

// SAFETY: repr(C) with only f32 and u32 fields, 96 bytes, no padding
unsafe impl Pod for StaticInstanceRecord {}
unsafe impl Zeroable for StaticInstanceRecord {}

impl Default for StaticInstanceRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Size of one static record in bytes.
pub const STATIC_RECORD_SIZE: usize = std::mem::size_of::<StaticInstanceRecord>();

/// Size of one dynamic payload element in bytes.
pub const DYNAMIC_ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// Backing arrays for all instance data.
#[derive(Debug, Default)]
pub struct InstanceData {
    statics: Vec<StaticInstanceRecord>,
    dynamics: Vec<f32>,
}

impl InstanceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows the static array to at least `len` records.
    pub fn ensure_static_len(&mut self, len: usize) {
        if self.statics.len() < len {
            self.statics.resize(len, StaticInstanceRecord::zeroed());
        }
    }

    /// Grows the dynamic array to at least `len` floats.
    pub fn ensure_dynamic_len(&mut self, len: usize) {
        if self.dynamics.len() < len {
            self.dynamics.resize(len, 0.0);
        }
    }

    pub fn static_len(&self) -> usize {
        self.statics.len()
    }

    pub fn dynamic_len(&self) -> usize {
        self.dynamics.len()
    }

    pub fn static_record(&self, cursor: usize) -> &StaticInstanceRecord {
        &self.statics[cursor]
    }

    pub fn static_record_mut(&mut self, cursor: usize) -> &mut StaticInstanceRecord {
        &mut self.statics[cursor]
    }

    pub fn dynamic(&self, cursor: usize, len: usize) -> &[f32] {
        &self.dynamics[cursor..cursor + len]
    }

    pub fn dynamic_mut(&mut self, cursor: usize, len: usize) -> &mut [f32] {
        &mut self.dynamics[cursor..cursor + len]
    }

    /// The record at `static_cursor` and the payload at `dynamic_cursor`, borrowed together.
    pub fn instance_mut(
        &mut self,
        static_cursor: usize,
        dynamic_cursor: usize,
        dynamic_len: usize,
    ) -> (&mut StaticInstanceRecord, &mut [f32]) {
        (
            &mut self.statics[static_cursor],
            &mut self.dynamics[dynamic_cursor..dynamic_cursor + dynamic_len],
        )
    }

    pub fn static_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.statics)
    }

    pub fn dynamic_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.dynamics)
    }
}
