//! Mock implementation of RenderContext for testing.
//!
//! This module provides a mock GPU context that records operations
//! without touching a GPU.

use std::sync::Arc;

use crate::{gpu_types::*, render_context::RenderContext};
use parking_lot::Mutex;
use wgpu::*;

/// Shared call log. Mock handles keep a clone so they can report their own drop.
pub(crate) type CallLog = Arc<Mutex<Vec<RenderCall>>>;

/// Records a GPU operation call for verification in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    CreateBuffer {
        buffer_id: usize,
        size: u64,
        usage: BufferUsages,
    },
    WriteBuffer {
        buffer_id: usize,
        offset: u64,
        size: usize,
    },
    DestroyBuffer {
        buffer_id: usize,
    },
    CreateTexture {
        texture_id: usize,
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    WriteTexture {
        texture_id: usize,
        origin: [u32; 2],
        size: [u32; 2],
        bytes_per_row: u32,
        len: usize,
    },
    DestroyTexture {
        texture_id: usize,
    },
}

/// Mock implementation of RenderContext for testing.
///
/// # Borrow Checking Pattern: Interior Mutability
///
/// Methods take `&self` but record every call. The log is an
/// `Arc<Mutex<Vec<RenderCall>>>` shared with the handles the context hands out, so a
/// handle dropped anywhere still lands in the same log.
///
/// # Example
///
/// ```rust
/// use sprocket_test_utils::{MockRenderContext, RenderContext};
/// use wgpu::*;
///
/// let mock = MockRenderContext::new();
///
/// let buffer = mock.create_buffer(&BufferDescriptor {
///     label: None,
///     size: 1024,
///     usage: BufferUsages::STORAGE,
///     mapped_at_creation: false,
/// });
/// assert!(buffer.is_mock());
///
/// drop(buffer);
/// assert_eq!(mock.count_buffer_creates(), 1);
/// assert_eq!(mock.count_buffer_destroys(), 1);
/// ```
pub struct MockRenderContext {
    calls: CallLog,
    next_buffer_id: Mutex<usize>,
    next_texture_id: Mutex<usize>,
}

impl MockRenderContext {
    /// Create a new mock render context.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            next_buffer_id: Mutex::new(0),
            next_texture_id: Mutex::new(0),
        }
    }

    /// Get a copy of all recorded calls (for test assertions).
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    fn count(&self, predicate: impl Fn(&RenderCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn count_buffer_creates(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::CreateBuffer { .. }))
    }

    pub fn count_buffer_writes(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::WriteBuffer { .. }))
    }

    pub fn count_buffer_destroys(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::DestroyBuffer { .. }))
    }

    pub fn count_texture_creates(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::CreateTexture { .. }))
    }

    pub fn count_texture_writes(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::WriteTexture { .. }))
    }

    pub fn count_texture_destroys(&self) -> usize {
        self.count(|call| matches!(call, RenderCall::DestroyTexture { .. }))
    }

    /// Byte ranges written to one buffer, in call order.
    pub fn buffer_writes(&self, buffer_id: usize) -> Vec<(u64, usize)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::WriteBuffer {
                    buffer_id: id,
                    offset,
                    size,
                } if *id == buffer_id => Some((*offset, *size)),
                _ => None,
            })
            .collect()
    }

    /// Clear recorded calls (useful between test steps).
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Get total number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for MockRenderContext {
    fn default() -> Self {
        Self::new()
    }
}

fn next_id(counter: &Mutex<usize>) -> usize {
    let mut next = counter.lock();
    let id = *next;
    *next += 1;
    id
}

impl RenderContext for MockRenderContext {
    fn create_buffer(&self, desc: &BufferDescriptor) -> GpuBuffer {
        let buffer_id = next_id(&self.next_buffer_id);
        self.calls.lock().push(RenderCall::CreateBuffer {
            buffer_id,
            size: desc.size,
            usage: desc.usage,
        });
        GpuBuffer::mock(buffer_id, desc.size, Arc::clone(&self.calls))
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        if let Some(buffer_id) = buffer.mock_id() {
            assert!(
                offset + data.len() as u64 <= buffer.size(),
                "write of {} bytes at {} overruns mock buffer {} of {} bytes",
                data.len(),
                offset,
                buffer_id,
                buffer.size()
            );
            self.calls.lock().push(RenderCall::WriteBuffer {
                buffer_id,
                offset,
                size: data.len(),
            });
        }
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> GpuTexture {
        let texture_id = next_id(&self.next_texture_id);
        self.calls.lock().push(RenderCall::CreateTexture {
            texture_id,
            width: desc.size.width,
            height: desc.size.height,
            format: desc.format,
        });
        GpuTexture::mock(
            texture_id,
            desc.size.width,
            desc.size.height,
            desc.format,
            Arc::clone(&self.calls),
        )
    }

    fn write_texture(
        &self,
        texture: &GpuTexture,
        origin: [u32; 2],
        size: [u32; 2],
        bytes_per_row: u32,
        data: &[u8],
    ) {
        if let Some(texture_id) = texture.mock_id() {
            assert!(
                origin[0] + size[0] <= texture.width() && origin[1] + size[1] <= texture.height(),
                "texture write {:?}+{:?} outside mock texture {}",
                origin,
                size,
                texture_id
            );
            self.calls.lock().push(RenderCall::WriteTexture {
                texture_id,
                origin,
                size,
                bytes_per_row,
                len: data.len(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_buffer(mock: &MockRenderContext, size: u64) -> GpuBuffer {
        mock.create_buffer(&BufferDescriptor {
            label: Some("test_buffer"),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    #[test]
    fn test_mock_buffer_creation() {
        let mock = MockRenderContext::new();
        let buffer = storage_buffer(&mock, 1024);

        assert!(buffer.is_mock());
        assert_eq!(buffer.size(), 1024);
        assert_eq!(mock.count_buffer_creates(), 1);
    }

    #[test]
    fn test_mock_buffer_write() {
        let mock = MockRenderContext::new();
        let buffer = storage_buffer(&mock, 1024);

        mock.write_buffer(&buffer, 256, &[0u8; 128]);

        assert_eq!(mock.count_buffer_writes(), 1);
        assert_eq!(mock.buffer_writes(0), vec![(256, 128)]);
    }

    #[test]
    #[should_panic(expected = "overruns")]
    fn test_mock_buffer_write_out_of_bounds() {
        let mock = MockRenderContext::new();
        let buffer = storage_buffer(&mock, 64);
        mock.write_buffer(&buffer, 32, &[0u8; 64]);
    }

    #[test]
    fn test_drop_destroys_exactly_once() {
        let mock = MockRenderContext::new();
        let buffer = storage_buffer(&mock, 64);
        let moved = buffer;
        assert_eq!(mock.count_buffer_destroys(), 0);

        drop(moved);
        assert_eq!(mock.count_buffer_destroys(), 1);
        assert_eq!(mock.calls().last(), Some(&RenderCall::DestroyBuffer { buffer_id: 0 }));
    }

    #[test]
    fn test_mock_texture_write() {
        let mock = MockRenderContext::new();

        let texture = mock.create_texture(&TextureDescriptor {
            label: Some("test_texture"),
            size: Extent3d {
                width: 16,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba32Float,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });
        mock.write_texture(&texture, [2, 1], [4, 1], 64, &[0u8; 64]);

        assert!(texture.is_mock());
        assert_eq!(mock.count_texture_creates(), 1);
        assert_eq!(mock.count_texture_writes(), 1);

        drop(texture);
        assert_eq!(mock.count_texture_destroys(), 1);
    }

    #[test]
    fn test_clear_calls() {
        let mock = MockRenderContext::new();
        let _buffer = storage_buffer(&mock, 16);
        assert_eq!(mock.call_count(), 1);

        mock.clear_calls();
        assert_eq!(mock.call_count(), 0);
    }
}
