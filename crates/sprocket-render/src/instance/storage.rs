//! GPU-side destinations for instance data and order indices.
//!
//! A target is either a storage buffer or, where the adapter cannot bind storage
//! buffers in the vertex stage, a fixed-width data texture. Both grow geometrically
//! and lose their contents when they do; the owner re-marks everything dirty.

use std::borrow::Cow;
use std::ops::Range;

use sprocket_core::profiling::profile_function;
use sprocket_test_utils::{GpuBuffer, GpuTexture, RenderContext};

use super::{
    InstanceUploader,
    data::InstanceData,
    texel::{rows_for, texel_writes},
};

/// Smallest buffer ever created, so bindings are never zero-sized.
const MIN_BUFFER_BYTES: u64 = 4096;

/// How instance data reaches the shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceTransport {
    /// Read-only storage buffers indexed directly.
    StorageBuffers,
    /// Data textures `row_width` texels wide, fetched with `textureLoad`.
    DataTexture { row_width: u32 },
}

/// Texel layout used when a target is a data texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexelLayout {
    /// Four 32-bit words per texel. Floats are stored as raw bits and bitcast in the shader.
    Uint4,
    /// One unsigned integer per texel.
    Uint,
}

impl TexelLayout {
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            Self::Uint4 => wgpu::TextureFormat::Rgba32Uint,
            Self::Uint => wgpu::TextureFormat::R32Uint,
        }
    }

    pub fn texel_size(self) -> usize {
        match self {
            Self::Uint4 => 16,
            Self::Uint => 4,
        }
    }
}

#[derive(Debug)]
enum TargetResource {
    Buffer(GpuBuffer),
    Texture(GpuTexture),
}

/// A growable GPU destination for one CPU-side byte array.
#[derive(Debug)]
pub struct InstanceTarget {
    label: &'static str,
    transport: InstanceTransport,
    layout: TexelLayout,
    resource: Option<TargetResource>,
    generation: u64,
}

impl InstanceTarget {
    pub fn new(label: &'static str, transport: InstanceTransport, layout: TexelLayout) -> Self {
        Self {
            label,
            transport,
            layout,
            resource: None,
            generation: 0,
        }
    }

    /// Bytes the current resource can hold, 0 before the first allocation.
    pub fn capacity_bytes(&self) -> usize {
        match &self.resource {
            None => 0,
            Some(TargetResource::Buffer(buffer)) => buffer.size() as usize,
            Some(TargetResource::Texture(texture)) => {
                texture.width() as usize * texture.height() as usize * self.layout.texel_size()
            }
        }
    }

    /// Makes room for `bytes` bytes. Returns true if a new resource was created.
    pub fn ensure(&mut self, ctx: &dyn RenderContext, bytes: usize) -> bool {
        if self.resource.is_some() && bytes <= self.capacity_bytes() {
            return false;
        }
        profile_function!();

        let resource = match self.transport {
            InstanceTransport::StorageBuffers => {
                let size = (bytes as u64).max(MIN_BUFFER_BYTES).next_power_of_two();
                TargetResource::Buffer(ctx.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(self.label),
                    size,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }))
            }
            InstanceTransport::DataTexture { row_width } => {
                let texels = bytes.div_ceil(self.layout.texel_size());
                let height = rows_for(texels, row_width).next_power_of_two();
                TargetResource::Texture(ctx.create_texture(&wgpu::TextureDescriptor {
                    label: Some(self.label),
                    size: wgpu::Extent3d {
                        width: row_width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: self.layout.format(),
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                }))
            }
        };

        // The old resource is dropped here, which destroys it.
        self.resource = Some(resource);
        self.generation += 1;
        tracing::debug!(
            target = self.label,
            capacity = self.capacity_bytes(),
            "instance target reallocated"
        );
        true
    }

    /// Copies `src[range]` to the same byte offsets on the GPU.
    ///
    /// Returns the number of transfer calls issued: one for a buffer, up to three for a
    /// data texture when the range wraps across rows.
    pub fn write(&self, ctx: &dyn RenderContext, src: &[u8], range: Range<usize>) -> usize {
        if range.is_empty() {
            return 0;
        }
        match (&self.resource, self.transport) {
            (None, _) => {
                tracing::warn!(target = self.label, "write to unallocated instance target");
                0
            }
            (Some(TargetResource::Buffer(buffer)), _) => {
                ctx.write_buffer(buffer, range.start as u64, &src[range]);
                1
            }
            (Some(TargetResource::Texture(texture)), InstanceTransport::DataTexture { row_width }) => {
                let texel_size = self.layout.texel_size();
                let first = range.start / texel_size;
                let last = range.end.div_ceil(texel_size);

                let mut calls = 0;
                for part in texel_writes(first, last, row_width) {
                    let start = part.first * texel_size;
                    let end = start + part.texel_count() * texel_size;
                    ctx.write_texture(
                        texture,
                        [part.x, part.y],
                        [part.width, part.height],
                        part.width * texel_size as u32,
                        &padded(src, start..end),
                    );
                    calls += 1;
                }
                calls
            }
            (Some(TargetResource::Texture(_)), InstanceTransport::StorageBuffers) => {
                unreachable!("texture target created for buffer transport")
            }
        }
    }

    /// Bumped every time the underlying resource is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_allocated(&self) -> bool {
        self.resource.is_some()
    }

    pub fn buffer(&self) -> Option<&GpuBuffer> {
        match &self.resource {
            Some(TargetResource::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }

    pub fn texture(&self) -> Option<&GpuTexture> {
        match &self.resource {
            Some(TargetResource::Texture(texture)) => Some(texture),
            _ => None,
        }
    }
}

/// `src[range]`, zero-extended when the last texel runs past the end of `src`.
fn padded(src: &[u8], range: Range<usize>) -> Cow<'_, [u8]> {
    if range.end <= src.len() {
        return Cow::Borrowed(&src[range]);
    }
    let mut bytes = vec![0u8; range.len()];
    if range.start < src.len() {
        let available = src.len() - range.start;
        bytes[..available].copy_from_slice(&src[range.start..]);
    }
    Cow::Owned(bytes)
}

/// GPU copies of the static and dynamic instance arrays.
#[derive(Debug)]
pub struct InstanceStorage {
    statics: InstanceTarget,
    dynamics: InstanceTarget,
    generation: u64,
}

impl InstanceStorage {
    pub fn new(transport: InstanceTransport) -> Self {
        Self {
            statics: InstanceTarget::new("static_instance_data", transport, TexelLayout::Uint4),
            dynamics: InstanceTarget::new("dynamic_instance_data", transport, TexelLayout::Uint4),
            generation: 0,
        }
    }

    /// Grows GPU targets to fit `data`, marking everything dirty after a reallocation.
    pub fn sync(&mut self, ctx: &dyn RenderContext, data: &InstanceData, uploader: &mut InstanceUploader) {
        let statics = self.statics.ensure(ctx, data.static_bytes().len());
        let dynamics = self.dynamics.ensure(ctx, data.dynamic_bytes().len());
        if statics {
            uploader.mark_static_data_dirty(0, data.static_len());
        }
        if dynamics {
            uploader.mark_dynamic_data_dirty(0, data.dynamic_len());
        }
        if statics || dynamics {
            self.generation += 1;
        }
    }

    pub fn statics(&self) -> &InstanceTarget {
        &self.statics
    }

    pub fn dynamics(&self) -> &InstanceTarget {
        &self.dynamics
    }

    /// Bumped whenever either target is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
