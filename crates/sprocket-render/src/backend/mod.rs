//! The seam between the batching pipeline and a GPU API.
//!
//! The pipeline decides what to draw and uploads instance data through
//! [`RendererBackend::render_context`]; the backend owns everything else on the GPU
//! side (surfaces, shaders, texture bindings, mask targets) and turns passes and
//! batches into commands.

mod gpu;
#[cfg(any(test, feature = "mock"))]
mod recording;

pub use gpu::{GpuFrame, WgpuBackend};
#[cfg(any(test, feature = "mock"))]
pub use recording::{BackendCall, RecordingBackend, RecordingFrame};

use sprocket_test_utils::RenderContext;

use crate::{
    frame::{FrameUniforms, Viewport},
    instance::{InstanceTarget, InstanceTransport},
    render_list::DrawBatch,
};

/// Which render list a pass draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Color pass into the frame's surface.
    Normal,
    /// Mask ids into the ping-pong mask targets.
    Mask,
}

/// GPU copies of instance data and order indices bound for one pass.
#[derive(Debug, Clone, Copy)]
pub struct PassResources<'a> {
    pub statics: &'a InstanceTarget,
    pub dynamics: &'a InstanceTarget,
    pub order: &'a InstanceTarget,
}

impl PassResources<'_> {
    /// Changes whenever any bound resource was replaced.
    pub fn binding_key(&self) -> (u64, u64, u64) {
        (
            self.statics.generation(),
            self.dynamics.generation(),
            self.order.generation(),
        )
    }

    pub fn is_complete(&self) -> bool {
        self.statics.is_allocated() && self.dynamics.is_allocated() && self.order.is_allocated()
    }
}

/// Backend setup chosen by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendConfig {
    pub transport: InstanceTransport,
    pub clear_color: [f32; 4],
}

/// Draws onto the frame after all passes, before it is presented.
///
/// Stands in for UI overlays. `F` is the backend's frame type, which exposes whatever
/// the overlay needs to encode its own commands.
pub trait OverlayRenderer<F> {
    fn render_overlay(&mut self, frame: &mut F);
}

/// Frame acquisition failures. All of them skip the frame; none are fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The surface was lost and has been recreated.
    Lost,
    /// The surface no longer matches the window and has been reconfigured.
    Outdated,
    Timeout,
    OutOfMemory,
    /// `begin_frame` was called while a frame was in flight.
    FrameInProgress,
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lost => write!(f, "Surface lost"),
            Self::Outdated => write!(f, "Surface outdated"),
            Self::Timeout => write!(f, "Timed out acquiring the next surface texture"),
            Self::OutOfMemory => write!(f, "Out of memory acquiring the next surface texture"),
            Self::FrameInProgress => write!(f, "A frame is already in progress"),
            Self::Other(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

/// A GPU API behind the render pipeline.
pub trait RendererBackend {
    /// Frame handed to overlays in [`end_frame`](Self::end_frame).
    type Frame;

    /// Where instance data and order indices are created and written.
    fn render_context(&self) -> &dyn RenderContext;

    /// Whether storage buffers can be read in the vertex stage.
    fn supports_storage_buffers(&self) -> bool;

    /// Largest width or height of a 2D texture.
    fn max_texture_dimension(&self) -> u32;

    /// Builds shaders and pipelines for `config`. Called once before the first frame.
    fn configure(&mut self, config: &BackendConfig);

    /// Size of the surface being drawn, in physical pixels.
    fn surface_size(&self) -> (u32, u32);

    fn begin_frame(&mut self) -> Result<(), BackendError>;

    /// Starts drawing `kind` into `viewport` with `resources` bound.
    ///
    /// Every pass gets its own uniform block, so passes in the same frame may use
    /// different viewports and cameras.
    ///
    /// Returns false if the pass cannot run this frame, e.g. an incomplete mask target.
    /// The caller then skips its draws and does not call [`end_pass`](Self::end_pass).
    fn begin_pass(
        &mut self,
        kind: PassKind,
        viewport: Viewport,
        uniforms: &FrameUniforms,
        resources: PassResources<'_>,
    ) -> bool;

    /// One instanced draw. In a mask pass the read target is refreshed afterwards, so
    /// the next batch tests against every mask drawn so far.
    fn draw_batch(&mut self, batch: &DrawBatch);

    fn end_pass(&mut self);

    /// Mask id at pixel `(x, y)` after the mask pass, 0 where no mask was drawn.
    fn read_mask_pixel(&mut self, x: u32, y: u32) -> Option<u32>;

    /// Runs `overlay`, submits the frame and presents it.
    fn end_frame(&mut self, overlay: Option<&mut dyn OverlayRenderer<Self::Frame>>);
}
