//! Owning GPU resource handles that can be real or mock.
//!
//! Each handle has exactly one owner. Handles are not `Clone`; ownership moves with
//! the value, and dropping the handle destroys the GPU object once. Mock handles
//! report their destruction to the [`MockRenderContext`](crate::MockRenderContext)
//! that created them so tests can assert on resource lifetimes.

#[cfg(feature = "mock")]
use crate::mock_render::{CallLog, RenderCall};

/// Owning wrapper around a GPU buffer.
///
/// # Design Pattern: Opaque Wrapper
///
/// This type hides whether it contains a real `wgpu::Buffer` or a mock. Code that
/// only creates, writes and drops buffers never needs to know which one it holds.
#[derive(Debug)]
pub struct GpuBuffer {
    inner: GpuBufferInner,
}

#[derive(Debug)]
enum GpuBufferInner {
    Real(wgpu::Buffer),
    #[cfg(feature = "mock")]
    Mock { id: usize, size: u64, log: CallLog },
}

impl GpuBuffer {
    /// Take ownership of a real WGPU buffer.
    pub fn from_wgpu(buffer: wgpu::Buffer) -> Self {
        Self {
            inner: GpuBufferInner::Real(buffer),
        }
    }

    #[cfg(feature = "mock")]
    pub(crate) fn mock(id: usize, size: u64, log: CallLog) -> Self {
        Self {
            inner: GpuBufferInner::Mock { id, size, log },
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        match &self.inner {
            GpuBufferInner::Real(buffer) => buffer.size(),
            #[cfg(feature = "mock")]
            GpuBufferInner::Mock { size, .. } => *size,
        }
    }

    /// Get the underlying wgpu::Buffer (if real)
    ///
    /// # Panics
    /// Panics if this is a mock buffer (test code should never call this)
    pub fn as_wgpu(&self) -> &wgpu::Buffer {
        match &self.inner {
            GpuBufferInner::Real(buffer) => buffer,
            #[cfg(feature = "mock")]
            GpuBufferInner::Mock { .. } => {
                panic!("Attempted to get wgpu::Buffer from mock buffer - this is a test-only buffer")
            }
        }
    }

    /// Check if this is a mock (useful in tests)
    #[cfg(feature = "mock")]
    pub fn is_mock(&self) -> bool {
        matches!(self.inner, GpuBufferInner::Mock { .. })
    }

    /// Get mock ID (for test assertions)
    pub fn mock_id(&self) -> Option<usize> {
        match &self.inner {
            #[cfg(feature = "mock")]
            GpuBufferInner::Mock { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        match &self.inner {
            GpuBufferInner::Real(buffer) => buffer.destroy(),
            #[cfg(feature = "mock")]
            GpuBufferInner::Mock { id, log, .. } => {
                log.lock().push(RenderCall::DestroyBuffer { buffer_id: *id });
            }
        }
    }
}

/// Owning wrapper around a 2D GPU texture.
#[derive(Debug)]
pub struct GpuTexture {
    inner: GpuTextureInner,
}

#[derive(Debug)]
enum GpuTextureInner {
    Real(wgpu::Texture),
    #[cfg(feature = "mock")]
    Mock {
        id: usize,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        log: CallLog,
    },
}

impl GpuTexture {
    /// Take ownership of a real WGPU texture.
    pub fn from_wgpu(texture: wgpu::Texture) -> Self {
        Self {
            inner: GpuTextureInner::Real(texture),
        }
    }

    #[cfg(feature = "mock")]
    pub(crate) fn mock(
        id: usize,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        log: CallLog,
    ) -> Self {
        Self {
            inner: GpuTextureInner::Mock {
                id,
                width,
                height,
                format,
                log,
            },
        }
    }

    pub fn width(&self) -> u32 {
        match &self.inner {
            GpuTextureInner::Real(texture) => texture.width(),
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match &self.inner {
            GpuTextureInner::Real(texture) => texture.height(),
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock { height, .. } => *height,
        }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        match &self.inner {
            GpuTextureInner::Real(texture) => texture.format(),
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock { format, .. } => *format,
        }
    }

    /// Get the underlying wgpu::Texture (if real)
    ///
    /// # Panics
    /// Panics if this is a mock texture
    pub fn as_wgpu(&self) -> &wgpu::Texture {
        match &self.inner {
            GpuTextureInner::Real(texture) => texture,
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock { .. } => {
                panic!("Attempted to get wgpu::Texture from mock texture")
            }
        }
    }

    /// Check if this is a mock
    #[cfg(feature = "mock")]
    pub fn is_mock(&self) -> bool {
        matches!(self.inner, GpuTextureInner::Mock { .. })
    }

    /// Get mock ID (for test assertions)
    pub fn mock_id(&self) -> Option<usize> {
        match &self.inner {
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock { id, .. } => Some(*id),
            _ => None,
        }
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        match &self.inner {
            GpuTextureInner::Real(texture) => texture.destroy(),
            #[cfg(feature = "mock")]
            GpuTextureInner::Mock { id, log, .. } => {
                log.lock().push(RenderCall::DestroyTexture { texture_id: *id });
            }
        }
    }
}
