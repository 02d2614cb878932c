//! Trait abstracting the GPU transfer operations used by the instance upload path.
//!
//! The `RenderContext` trait covers resource creation and CPU-to-GPU writes,
//! allowing both real GPU usage and mock implementations for testing.

use crate::gpu_types::*;
use wgpu::{BufferDescriptor, TextureDescriptor};

/// Trait abstracting GPU resource creation and partial writes.
///
/// # Ownership
///
/// Every creation method returns an owning handle. Dropping the handle destroys the
/// resource. The context itself is shared (`&self`) so mock implementations record
/// calls through interior mutability.
///
/// # Example
///
/// ```rust,no_run
/// use sprocket_test_utils::RenderContext;
/// use wgpu::{BufferDescriptor, BufferUsages};
///
/// fn upload(ctx: &dyn RenderContext, data: &[u8]) {
///     let buffer = ctx.create_buffer(&BufferDescriptor {
///         label: None,
///         size: data.len() as u64,
///         usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
///         mapped_at_creation: false,
///     });
///     ctx.write_buffer(&buffer, 0, data);
/// }
/// ```
pub trait RenderContext: Send + Sync {
    /// Create a GPU buffer.
    fn create_buffer(&self, desc: &BufferDescriptor) -> GpuBuffer;

    /// Write `data` into `buffer` starting at byte `offset`.
    ///
    /// For real buffers this maps to `queue.write_buffer()`.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]);

    /// Create a GPU texture.
    fn create_texture(&self, desc: &TextureDescriptor) -> GpuTexture;

    /// Write a `size[0] x size[1]` texel rectangle at `origin` of mip level 0.
    ///
    /// `data` is tightly packed rows of `bytes_per_row` bytes each.
    fn write_texture(
        &self,
        texture: &GpuTexture,
        origin: [u32; 2],
        size: [u32; 2],
        bytes_per_row: u32,
        data: &[u8],
    );
}
