//! Sprocket Render - Batched 2D rendering on wgpu
//!
//! This crate draws large numbers of sprites and text glyphs with very few draw calls:
//! - Per-instance data kept CPU-side and uploaded only where it changed
//! - Graphics grouped into batches by z-index, opacity, texture and masks
//! - Storage buffers, or data textures where the GPU lacks vertex storage
//! - A mask pass with pointer hit-testing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sprocket_render::{
//!     Graphic, GraphicsContext, Renderer2D, RendererDescriptor, TextureRegion, WgpuBackend,
//!     WindowContext, WindowContextDescriptor,
//! };
//! # fn run(window: Arc<winit::window::Window>) -> Result<(), Box<dyn std::error::Error>> {
//! let context = GraphicsContext::new_owned_sync()?;
//! let window = WindowContext::new(context.clone(), window, WindowContextDescriptor::default())?;
//! let mut renderer = Renderer2D::new(WgpuBackend::new(context, window), RendererDescriptor::default());
//!
//! let texture = Arc::new(TextureRegion::new(1, false));
//! let sprite = renderer.add(Graphic::sprite(Some(texture)).with_size(glam::Vec2::splat(64.0)));
//!
//! // Per frame
//! renderer.graphic_mut(sprite).unwrap().set_rotation(0.5);
//! renderer.render(None, None)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod camera;
pub mod context;
mod context_impl;
pub mod frame;
pub mod graphic;
pub mod instance;
pub mod pipeline;
pub mod render_list;
pub mod renderer;
pub mod text;
pub mod texture;
pub mod window;

pub use backend::{BackendConfig, BackendError, GpuFrame, OverlayRenderer, PassKind, RendererBackend, WgpuBackend};
pub use camera::{Camera2D, CameraFlags};
pub use context::{GraphicsBackend, GraphicsContext, GraphicsContextDescriptor, GraphicsError};
pub use frame::{FrameUniforms, Viewport};
pub use graphic::{Graphic, GraphicFlags, GraphicId, GraphicKind, TextData, Transform2D};
pub use instance::{InstanceAllocator, InstanceTransport, InstanceUploader};
pub use pipeline::{Pointer, RenderPipeline};
pub use render_list::{BatchKey, DrawBatch, RenderList};
pub use renderer::{RenderError, Renderer2D, RendererDescriptor, TransportPreference};
pub use text::{Font, FontRef, GlyphMetrics, GlyphTable, TextAlign, TextStyle, TextWrap};
pub use texture::{TextureId, TextureRef, TextureRegion, TextureSource};
pub use window::{WindowContext, WindowContextDescriptor};

pub use sprocket_test_utils::RenderContext;
#[cfg(feature = "mock")]
pub use backend::{BackendCall, RecordingBackend, RecordingFrame};
