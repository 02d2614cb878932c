//! Test utilities for sprocket.
//!
//! This crate provides the GPU seam of the renderer: a small [`RenderContext`] trait
//! covering resource creation and partial writes, owning handles for the resources it
//! creates, and (with the `mock` feature) a recording mock.
//!
//! # Overview
//!
//! - [`RenderContext`] - Trait abstracting GPU creation and transfer calls
//! - `MockRenderContext` - Recording implementation for tests (requires `mock` feature)
//! - [`GpuBuffer`], [`GpuTexture`] - Move-only handles, real or mock
//!
//! # Example
//!
//! ```rust
//! # #[cfg(feature = "mock")]
//! # {
//! use sprocket_test_utils::{MockRenderContext, RenderContext};
//! use wgpu::*;
//!
//! let mock = MockRenderContext::new();
//! let buffer = mock.create_buffer(&BufferDescriptor {
//!     label: Some("instances"),
//!     size: 1024,
//!     usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
//!     mapped_at_creation: false,
//! });
//! mock.write_buffer(&buffer, 0, &[0u8; 96]);
//!
//! assert_eq!(mock.count_buffer_writes(), 1);
//! # }
//! ```

pub mod gpu_types;
#[cfg(feature = "mock")]
pub mod mock_render;
pub mod render_context;

// Re-export main types at crate root
pub use gpu_types::*;
#[cfg(feature = "mock")]
pub use mock_render::*;
pub use render_context::*;
