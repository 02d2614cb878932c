//! Frame orchestration: compute instance data, upload it, and draw batches in key order.

use std::time::Instant;

use sprocket_core::{
    alloc::sparse_set::SparseSet,
    profiling::{profile_function, profile_scope},
};
use sprocket_test_utils::RenderContext;

use crate::{
    backend::{OverlayRenderer, PassKind, PassResources, RendererBackend},
    camera::Camera2D,
    frame::{FrameUniforms, Viewport},
    graphic::{ComputeMode, Graphic},
    instance::{InstanceAllocator, InstanceStorage, InstanceTarget, InstanceTransport, InstanceUploader, TexelLayout},
    render_list::{DrawBatch, RenderList},
};

/// Pointer state consumed by the mask hit-test.
pub trait Pointer {
    /// Position in physical pixels of the render target, if the pointer is over it.
    fn position(&self) -> Option<(f32, f32)>;

    /// Receives the mask id under the pointer, 0 for none.
    fn set_hovered(&mut self, mask_id: u32);
}

#[derive(Debug)]
struct PassState {
    list: RenderList,
    order: InstanceTarget,
    draws: Vec<DrawBatch>,
}

impl PassState {
    fn new(label: &'static str, transport: InstanceTransport) -> Self {
        // An empty list still needs an order target before its first pass.
        let mut list = RenderList::new();
        list.set_reordered();
        Self {
            list,
            order: InstanceTarget::new(label, transport, TexelLayout::Uint),
            draws: Vec::new(),
        }
    }
}

/// Per-pass render lists, the GPU instance store and the frame clock.
#[derive(Debug)]
pub struct RenderPipeline {
    normal: PassState,
    mask: PassState,
    storage: InstanceStorage,
    camera: Camera2D,
    started: Instant,
    in_frame: bool,
}

impl RenderPipeline {
    pub fn new(transport: InstanceTransport) -> Self {
        Self {
            normal: PassState::new("order_indices", transport),
            mask: PassState::new("mask_order_indices", transport),
            storage: InstanceStorage::new(transport),
            camera: Camera2D::new(),
            started: Instant::now(),
            in_frame: false,
        }
    }

    fn state(&self, kind: PassKind) -> &PassState {
        match kind {
            PassKind::Normal => &self.normal,
            PassKind::Mask => &self.mask,
        }
    }

    fn state_mut(&mut self, kind: PassKind) -> &mut PassState {
        match kind {
            PassKind::Normal => &mut self.normal,
            PassKind::Mask => &mut self.mask,
        }
    }

    pub fn list(&self, kind: PassKind) -> &RenderList {
        &self.state(kind).list
    }

    pub fn list_mut(&mut self, kind: PassKind) -> &mut RenderList {
        &mut self.state_mut(kind).list
    }

    pub fn storage(&self) -> &InstanceStorage {
        &self.storage
    }

    pub fn camera(&self) -> &Camera2D {
        &self.camera
    }

    /// Camera applied after the model matrix. Its matrices rebuild on the next pass.
    pub fn camera_mut(&mut self) -> &mut Camera2D {
        &mut self.camera
    }

    pub fn is_in_frame(&self) -> bool {
        self.in_frame
    }

    pub fn begin_frame<B: RendererBackend>(&mut self, backend: &mut B) -> Result<(), crate::backend::BackendError> {
        profile_function!();
        if self.in_frame {
            return Err(crate::backend::BackendError::FrameInProgress);
        }
        backend.begin_frame()?;
        self.in_frame = true;
        Ok(())
    }

    /// Presents the frame, giving `overlay` the last word.
    pub fn end_frame<B: RendererBackend>(
        &mut self,
        backend: &mut B,
        overlay: Option<&mut dyn OverlayRenderer<B::Frame>>,
    ) {
        profile_function!();
        if !self.in_frame {
            tracing::warn!("end_frame without begin_frame");
            return;
        }
        backend.end_frame(overlay);
        self.in_frame = false;
    }

    /// Brings the GPU copies of `kind`'s instance data and order indices up to date.
    ///
    /// Dirty graphics are recomputed (texture placement is refreshed where the texture
    /// changed), every dirty range is uploaded once, and the order indices are rebuilt
    /// only if the list was reordered.
    pub fn prepare(
        &mut self,
        kind: PassKind,
        ctx: &dyn RenderContext,
        graphics: &mut SparseSet<Graphic>,
        allocator: &mut InstanceAllocator,
        uploader: &mut InstanceUploader,
    ) {
        profile_function!();
        let state = match kind {
            PassKind::Normal => &mut self.normal,
            PassKind::Mask => &mut self.mask,
        };

        {
            profile_scope!("compute_instance_data");
            for id in state.list.iter() {
                let Some(graphic) = graphics.try_get_mut(id.0) else {
                    continue;
                };
                let mode = if graphic.needs_texture_rebuild() {
                    ComputeMode::RebuildTexture
                } else {
                    ComputeMode::Normal
                };
                if graphic.compute_instance_data(allocator, mode)
                    && let Some(handler) = graphic.handler()
                {
                    uploader.mark_static_data_dirty(handler.static_cursor, 1);
                    uploader.mark_dynamic_data_dirty(handler.dynamic_cursor, handler.dynamic_size);
                }
            }
        }

        self.storage.sync(ctx, allocator.data(), uploader);
        uploader.upload(ctx, allocator.data(), &self.storage);

        if state.list.was_reordered() {
            profile_scope!("upload_order_indices");
            let (order, draws) = state.list.build_order(|id| {
                graphics
                    .try_get(id.0)
                    .and_then(|graphic| graphic.handler())
                    .map(|handler| handler.static_cursor as u32)
            });
            let bytes: &[u8] = bytemuck::cast_slice(&order);
            state.order.ensure(ctx, bytes.len());
            state.order.write(ctx, bytes, 0..bytes.len());
            tracing::trace!(?kind, instances = order.len(), batches = draws.len(), "rebuilt order indices");
            state.draws = draws;
            state.list.clear_reordered();
        }
    }

    /// Draws every batch of `kind` in key order. Returns false if the backend refused the pass.
    pub fn draw<B: RendererBackend>(&mut self, backend: &mut B, kind: PassKind, viewport: Viewport) -> bool {
        profile_function!();
        let uniforms = FrameUniforms::new(&viewport, &mut self.camera, self.started.elapsed().as_secs_f32());
        let state = self.state(kind);
        let resources = PassResources {
            statics: self.storage.statics(),
            dynamics: self.storage.dynamics(),
            order: &state.order,
        };

        if !backend.begin_pass(kind, viewport, &uniforms, resources) {
            tracing::debug!(?kind, "pass skipped");
            return false;
        }
        for batch in &state.draws {
            backend.draw_batch(batch);
        }
        backend.end_pass();
        true
    }

    /// Reports the mask id under `pointer` after a mask pass.
    pub fn hit_test<B: RendererBackend>(
        &self,
        backend: &mut B,
        viewport: Viewport,
        mask_drawn: bool,
        pointer: &mut dyn Pointer,
    ) {
        profile_function!();
        let Some((x, y)) = pointer.position() else {
            return;
        };
        if !viewport.contains(x, y) {
            return;
        }
        let hovered = if mask_drawn {
            backend.read_mask_pixel(x as u32, y as u32).unwrap_or(0)
        } else {
            0
        };
        tracing::trace!(x, y, hovered, "mask hit-test");
        pointer.set_hovered(hovered);
    }
}
