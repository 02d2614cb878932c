use sprocket_test_utils::{MockRenderContext, RenderContext};

use super::{BackendConfig, BackendError, OverlayRenderer, PassKind, PassResources, RendererBackend};
use crate::{
    frame::{FrameUniforms, Viewport},
    render_list::DrawBatch,
};

/// A backend call as seen by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Configure(BackendConfig),
    BeginFrame,
    BeginPass {
        kind: PassKind,
        viewport: Viewport,
        viewport_size: [f32; 2],
        /// Camera view matrix the pass was given.
        view: [[f32; 4]; 4],
    },
    /// A pass that was refused.
    SkipPass { kind: PassKind },
    Draw { kind: PassKind, batch: DrawBatch },
    EndPass { kind: PassKind },
    ReadMaskPixel { x: u32, y: u32 },
    EndFrame { overlay: bool },
}

/// Frame type handed to overlays by [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingFrame {
    pub index: u64,
}

/// Backend that records every call instead of touching a GPU.
///
/// Instance data still goes through a [`MockRenderContext`], so tests can assert on
/// both the draw sequence and the transfers behind it.
pub struct RecordingBackend {
    context: MockRenderContext,
    calls: Vec<BackendCall>,
    storage_buffers: bool,
    max_texture_dimension: u32,
    surface_size: (u32, u32),
    mask_value: u32,
    refuse_mask_pass: bool,
    next_frame_error: Option<BackendError>,
    active_pass: Option<PassKind>,
    frames: u64,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            context: MockRenderContext::new(),
            calls: Vec::new(),
            storage_buffers: true,
            max_texture_dimension: 8192,
            surface_size: (width, height),
            mask_value: 0,
            refuse_mask_pass: false,
            next_frame_error: None,
            active_pass: None,
            frames: 0,
        }
    }

    /// Reports that vertex-stage storage buffers are unavailable.
    pub fn without_storage_buffers(mut self) -> Self {
        self.storage_buffers = false;
        self
    }

    /// Caps the texture size reported to the renderer.
    pub fn with_max_texture_dimension(mut self, dimension: u32) -> Self {
        self.max_texture_dimension = dimension;
        self
    }

    pub fn mock(&self) -> &MockRenderContext {
        &self.context
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
        self.context.clear_calls();
    }

    /// Draws recorded for `kind`, in order.
    pub fn draws(&self, kind: PassKind) -> Vec<DrawBatch> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Draw { kind: k, batch } if *k == kind => Some(*batch),
                _ => None,
            })
            .collect()
    }

    /// Value returned by every [`read_mask_pixel`](RendererBackend::read_mask_pixel).
    pub fn set_mask_value(&mut self, value: u32) {
        self.mask_value = value;
    }

    /// Makes mask passes fail as if the mask targets were incomplete.
    pub fn set_refuse_mask_pass(&mut self, refuse: bool) {
        self.refuse_mask_pass = refuse;
    }

    /// Makes the next `begin_frame` fail with `error`.
    pub fn fail_next_frame(&mut self, error: BackendError) {
        self.next_frame_error = Some(error);
    }
}

impl RendererBackend for RecordingBackend {
    type Frame = RecordingFrame;

    fn render_context(&self) -> &dyn RenderContext {
        &self.context
    }

    fn supports_storage_buffers(&self) -> bool {
        self.storage_buffers
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn configure(&mut self, config: &BackendConfig) {
        self.calls.push(BackendCall::Configure(*config));
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        if let Some(error) = self.next_frame_error.take() {
            return Err(error);
        }
        self.calls.push(BackendCall::BeginFrame);
        Ok(())
    }

    fn begin_pass(
        &mut self,
        kind: PassKind,
        viewport: Viewport,
        uniforms: &FrameUniforms,
        resources: PassResources<'_>,
    ) -> bool {
        if (kind == PassKind::Mask && self.refuse_mask_pass) || !resources.is_complete() {
            self.calls.push(BackendCall::SkipPass { kind });
            return false;
        }
        self.active_pass = Some(kind);
        self.calls.push(BackendCall::BeginPass {
            kind,
            viewport,
            viewport_size: uniforms.viewport_size,
            view: uniforms.view,
        });
        true
    }

    fn draw_batch(&mut self, batch: &DrawBatch) {
        let kind = self.active_pass.expect("draw outside of a pass");
        self.calls.push(BackendCall::Draw { kind, batch: *batch });
    }

    fn end_pass(&mut self) {
        let kind = self.active_pass.take().expect("end_pass without begin_pass");
        self.calls.push(BackendCall::EndPass { kind });
    }

    fn read_mask_pixel(&mut self, x: u32, y: u32) -> Option<u32> {
        self.calls.push(BackendCall::ReadMaskPixel { x, y });
        Some(self.mask_value)
    }

    fn end_frame(&mut self, overlay: Option<&mut dyn OverlayRenderer<RecordingFrame>>) {
        let has_overlay = overlay.is_some();
        if let Some(overlay) = overlay {
            overlay.render_overlay(&mut RecordingFrame { index: self.frames });
        }
        self.frames += 1;
        self.calls.push(BackendCall::EndFrame { overlay: has_overlay });
    }
}
