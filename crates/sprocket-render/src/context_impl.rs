//! Implementation of the RenderContext trait for GraphicsContext.
//!
//! Instance uploads go through this trait so the batching code runs unchanged
//! against a MockRenderContext in tests.

use crate::context::GraphicsContext;
use sprocket_test_utils::{GpuBuffer, GpuTexture, RenderContext};
use wgpu::{BufferDescriptor, TextureDescriptor};

impl RenderContext for GraphicsContext {
    fn create_buffer(&self, desc: &BufferDescriptor) -> GpuBuffer {
        let buffer = self.device.create_buffer(desc);
        GpuBuffer::from_wgpu(buffer)
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer.as_wgpu(), offset, data);
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> GpuTexture {
        let texture = self.device.create_texture(desc);
        GpuTexture::from_wgpu(texture)
    }

    fn write_texture(
        &self,
        texture: &GpuTexture,
        origin: [u32; 2],
        size: [u32; 2],
        bytes_per_row: u32,
        data: &[u8],
    ) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: texture.as_wgpu(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin[0],
                    y: origin[1],
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(size[1]),
            },
            wgpu::Extent3d {
                width: size[0],
                height: size[1],
                depth_or_array_layers: 1,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "mock")]
    use sprocket_test_utils::MockRenderContext;

    #[test]
    #[cfg(feature = "mock")]
    fn test_render_context_trait_object() {
        let mock_ctx = MockRenderContext::new();

        fn uses_render_context(ctx: &dyn RenderContext) {
            let buffer = ctx.create_buffer(&BufferDescriptor {
                label: Some("Test Buffer"),
                size: 256,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            ctx.write_buffer(&buffer, 0, &[0u8; 256]);
        }

        uses_render_context(&mock_ctx);

        // create_buffer + write_buffer; the drop is recorded after the closure returns
        assert_eq!(mock_ctx.count_buffer_creates(), 1);
        assert_eq!(mock_ctx.count_buffer_writes(), 1);
    }
}
