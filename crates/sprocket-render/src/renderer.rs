//! The renderer context object.
//!
//! [`Renderer2D`] owns every graphic, the instance allocator and uploader, and the
//! render pipeline. Graphics are added once and then mutated through their id; each
//! frame recomputes only what changed.

use sprocket_core::{alloc::sparse_set::SparseSet, profiling::profile_function};

use crate::{
    backend::{BackendConfig, BackendError, OverlayRenderer, PassKind, RendererBackend},
    camera::Camera2D,
    frame::Viewport,
    graphic::{ComputeMode, Graphic, GraphicFlags, GraphicId, GraphicKind, TextData, Transform2D},
    instance::{GraphicBatchHandler, InstanceAllocator, InstanceTransport, InstanceUploader},
    pipeline::{Pointer, RenderPipeline},
    render_list::RenderList,
    text::layout_text,
    texture::TextureRef,
};

/// Width of data textures when storage buffers are unavailable.
pub const DEFAULT_DATA_TEXTURE_WIDTH: u32 = 2048;

/// How instance data should reach the shaders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportPreference {
    /// Storage buffers where the backend supports them, data textures otherwise.
    #[default]
    Auto,
    StorageBuffers,
    DataTexture,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererDescriptor {
    /// Static records reserved up front.
    pub static_capacity: usize,
    /// Dynamic payload floats reserved up front.
    pub dynamic_capacity: usize,
    pub transport: TransportPreference,
    /// Texels per row of each data texture.
    pub data_texture_width: u32,
    pub clear_color: [f32; 4],
}

impl Default for RendererDescriptor {
    fn default() -> Self {
        Self {
            static_capacity: 0,
            dynamic_capacity: 0,
            transport: TransportPreference::Auto,
            data_texture_width: DEFAULT_DATA_TEXTURE_WIDTH,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RendererDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, statics: usize, dynamics: usize) -> Self {
        self.static_capacity = statics;
        self.dynamic_capacity = dynamics;
        self
    }

    pub fn with_transport(mut self, transport: TransportPreference) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_data_texture_width(mut self, width: u32) -> Self {
        self.data_texture_width = width;
        self
    }

    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }
}

/// Misuse of a graphic id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    /// The id was never issued or its graphic has been removed.
    UnknownGraphic(GraphicId),
    /// The operation does not apply to this kind of graphic.
    KindMismatch(GraphicId),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownGraphic(id) => write!(f, "Unknown graphic {:?}", id),
            Self::KindMismatch(id) => write!(f, "Graphic {:?} does not support this operation", id),
        }
    }
}

impl std::error::Error for RenderError {}

fn pass_kind(graphic: &Graphic) -> PassKind {
    if graphic.writing_mask() != 0 {
        PassKind::Mask
    } else {
        PassKind::Normal
    }
}

fn mark_dirty(uploader: &mut InstanceUploader, handler: &GraphicBatchHandler) {
    uploader.mark_static_data_dirty(handler.static_cursor, 1);
    uploader.mark_dynamic_data_dirty(handler.dynamic_cursor, handler.dynamic_size);
}

/// Batches graphics and draws them through a [`RendererBackend`].
pub struct Renderer2D<B: RendererBackend> {
    backend: B,
    graphics: SparseSet<Graphic>,
    allocator: InstanceAllocator,
    uploader: InstanceUploader,
    pipeline: RenderPipeline,
    texts: Vec<GraphicId>,
    transport: InstanceTransport,
}

impl<B: RendererBackend> Renderer2D<B> {
    pub fn new(mut backend: B, descriptor: RendererDescriptor) -> Self {
        let max_width = backend.max_texture_dimension().max(1);
        if descriptor.data_texture_width > max_width {
            tracing::warn!(
                requested = descriptor.data_texture_width,
                max_width,
                "Data texture width exceeds the device limit, clamping"
            );
        }
        let data_texture = InstanceTransport::DataTexture {
            row_width: descriptor.data_texture_width.clamp(1, max_width),
        };
        let transport = match descriptor.transport {
            TransportPreference::DataTexture => data_texture,
            TransportPreference::Auto if !backend.supports_storage_buffers() => data_texture,
            TransportPreference::StorageBuffers if !backend.supports_storage_buffers() => {
                tracing::warn!("Storage buffers are not supported in the vertex stage, using data textures");
                data_texture
            }
            _ => InstanceTransport::StorageBuffers,
        };
        tracing::info!(?transport, "Creating 2D renderer");

        backend.configure(&BackendConfig {
            transport,
            clear_color: descriptor.clear_color,
        });

        Self {
            backend,
            graphics: SparseSet::new(),
            allocator: InstanceAllocator::with_capacity(descriptor.static_capacity, descriptor.dynamic_capacity),
            uploader: InstanceUploader::new(),
            pipeline: RenderPipeline::new(transport),
            texts: Vec::new(),
            transport,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn transport(&self) -> InstanceTransport {
        self.transport
    }

    pub fn allocator(&self) -> &InstanceAllocator {
        &self.allocator
    }

    pub fn uploader(&self) -> &InstanceUploader {
        &self.uploader
    }

    pub fn list(&self, kind: PassKind) -> &RenderList {
        self.pipeline.list(kind)
    }

    pub fn camera(&self) -> &Camera2D {
        self.pipeline.camera()
    }

    /// Camera applied to every graphic from the next pass on.
    pub fn camera_mut(&mut self) -> &mut Camera2D {
        self.pipeline.camera_mut()
    }

    /// Number of graphics, glyphs of text included.
    pub fn len(&self) -> usize {
        self.graphics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphics.is_empty()
    }

    pub fn contains(&self, id: GraphicId) -> bool {
        self.graphics.contains(id.0)
    }

    pub fn get(&self, id: GraphicId) -> Option<&Graphic> {
        self.graphics.try_get(id.0)
    }

    /// Mutable access for transform, color and visibility changes.
    ///
    /// Changes that move a graphic between batches go through [`set_texture`](Self::set_texture),
    /// [`set_z_index`](Self::set_z_index) and [`set_masks`](Self::set_masks) instead.
    pub fn graphic_mut(&mut self, id: GraphicId) -> Option<&mut Graphic> {
        self.graphics.try_get_mut(id.0)
    }

    /// Takes ownership of `graphic` and allocates its instance data.
    pub fn add(&mut self, graphic: Graphic) -> GraphicId {
        profile_function!();
        let is_text = matches!(graphic.kind(), GraphicKind::Text(_));
        let id = GraphicId(self.graphics.push(graphic));
        if is_text {
            self.texts.push(id);
            self.relayout(id);
        } else {
            self.attach(id);
        }
        id
    }

    fn attach(&mut self, id: GraphicId) {
        let graphic = self.graphics.get_mut(id.0);
        if graphic.compute_instance_data(&mut self.allocator, ComputeMode::ForceRebuild)
            && let Some(handler) = graphic.handler()
        {
            mark_dirty(&mut self.uploader, handler);
        }
        let key = graphic.batch_key();
        let kind = pass_kind(graphic);
        self.pipeline.list_mut(kind).insert(id, key);
    }

    fn detach(&mut self, id: GraphicId, graphic: &mut Graphic) {
        self.pipeline.list_mut(PassKind::Normal).remove(id);
        self.pipeline.list_mut(PassKind::Mask).remove(id);
        if let Some(handler) = graphic.take_handler() {
            self.allocator.free(&handler);
        }
    }

    /// Removes a graphic and frees its instance data. Removing text removes its glyphs.
    ///
    /// Glyphs belong to their text and cannot be removed on their own; edit the text instead.
    pub fn remove(&mut self, id: GraphicId) -> Result<Graphic, RenderError> {
        profile_function!();
        if let Some(graphic) = self.graphics.try_get(id.0)
            && let GraphicKind::Glyph(glyph) = graphic.kind()
        {
            tracing::warn!(?id, text = ?glyph.text(), "Refusing to remove a glyph owned by text");
            return Err(RenderError::KindMismatch(id));
        }
        let mut graphic = self.graphics.try_remove(id.0).ok_or(RenderError::UnknownGraphic(id))?;
        self.detach(id, &mut graphic);

        if let GraphicKind::Text(text) = graphic.kind_mut() {
            let glyphs = std::mem::take(&mut text.glyphs);
            for glyph in glyphs {
                self.remove_glyph(glyph);
            }
            self.texts.retain(|text| *text != id);
        }
        Ok(graphic)
    }

    fn remove_glyph(&mut self, id: GraphicId) {
        if let Some(mut glyph) = self.graphics.try_remove(id.0) {
            self.detach(id, &mut glyph);
        }
    }

    /// Moves `id` to the list and batch matching its current state.
    fn rekey(&mut self, id: GraphicId) {
        let Some(graphic) = self.graphics.try_get(id.0) else {
            return;
        };
        if graphic.flags().contains(GraphicFlags::NO_BATCHING) {
            return;
        }
        let key = graphic.batch_key();
        let kind = pass_kind(graphic);
        let other = match kind {
            PassKind::Normal => PassKind::Mask,
            PassKind::Mask => PassKind::Normal,
        };

        if self.pipeline.list_mut(other).remove(id).is_some() {
            self.pipeline.list_mut(kind).insert(id, key);
        } else if !self.pipeline.list_mut(kind).rekey(id, key) && !self.pipeline.list(kind).contains(id) {
            self.pipeline.list_mut(kind).insert(id, key);
        }
    }

    /// Swaps a sprite's texture, moving it to the batch for the new texture.
    pub fn set_texture(&mut self, id: GraphicId, texture: Option<TextureRef>) -> Result<(), RenderError> {
        let graphic = self.graphics.try_get_mut(id.0).ok_or(RenderError::UnknownGraphic(id))?;
        if !graphic.set_texture(texture) {
            return Err(RenderError::KindMismatch(id));
        }
        self.rekey(id);
        Ok(())
    }

    pub fn set_z_index(&mut self, id: GraphicId, z_index: i32) -> Result<(), RenderError> {
        let graphic = self.graphics.try_get_mut(id.0).ok_or(RenderError::UnknownGraphic(id))?;
        graphic.set_z_index(z_index);
        self.rekey(id);
        Ok(())
    }

    /// Sets the mask a graphic is clipped against and the mask it writes.
    ///
    /// A non-zero `writing` mask moves the graphic into the mask pass.
    pub fn set_masks(&mut self, id: GraphicId, reading: u32, writing: u32) -> Result<(), RenderError> {
        let graphic = self.graphics.try_get_mut(id.0).ok_or(RenderError::UnknownGraphic(id))?;
        graphic.set_masks(reading, writing);
        self.rekey(id);
        Ok(())
    }

    /// Edits the content, font or style of a text graphic. Glyphs are laid out again
    /// before the next pass.
    pub fn edit_text(&mut self, id: GraphicId, edit: impl FnOnce(&mut TextData)) -> Result<(), RenderError> {
        let graphic = self.graphics.try_get_mut(id.0).ok_or(RenderError::UnknownGraphic(id))?;
        let GraphicKind::Text(text) = graphic.kind_mut() else {
            return Err(RenderError::KindMismatch(id));
        };
        edit(text);
        graphic.touch();
        Ok(())
    }

    /// Lays out text again, reusing its glyph graphics where possible.
    fn relayout(&mut self, id: GraphicId) {
        profile_function!();
        let Some(graphic) = self.graphics.try_get(id.0) else {
            return;
        };
        let GraphicKind::Text(text) = graphic.kind() else {
            return;
        };
        // Keep the text dirty until its atlas has glyph metrics.
        if !text.font.is_loaded() {
            return;
        }

        let font = text.font.clone();
        let text_size = text.style.text_size;
        let placed = layout_text(font.as_ref(), &text.content, &text.style, graphic.transform().anchor);
        let existing = text.glyphs.clone();
        let parent = graphic.transform().parent_matrix();
        let color = graphic.color();
        let visible = graphic.flags().contains(GraphicFlags::VISIBLE);
        let z_index = graphic.z_index();
        let (reading, writing) = (graphic.reading_mask(), graphic.writing_mask());

        let mut glyphs = Vec::with_capacity(placed.len());
        for (index, place) in placed.iter().enumerate() {
            let transform = Transform2D {
                position: place.position,
                size: place.size,
                ..Transform2D::default()
            };
            match existing.get(index) {
                Some(&glyph_id) if self.graphics.contains(glyph_id.0) => {
                    let glyph = self.graphics.get_mut(glyph_id.0);
                    if let GraphicKind::Glyph(data) = glyph.kind_mut() {
                        data.character = place.character;
                        data.font = font.clone();
                        data.text_size = text_size;
                    }
                    glyph.set_transform(transform);
                    glyph.set_parent(parent);
                    glyph.set_color(color);
                    glyph.set_visible(visible);
                    glyph.set_z_index(z_index);
                    glyph.set_masks(reading, writing);
                    self.rekey(glyph_id);
                    glyphs.push(glyph_id);
                }
                _ => {
                    let mut glyph = Graphic::glyph(font.clone(), place.character, text_size, id)
                        .with_color(color)
                        .with_z_index(z_index)
                        .with_masks(reading, writing);
                    glyph.set_transform(transform);
                    glyph.set_parent(parent);
                    glyph.set_visible(visible);
                    let glyph_id = GraphicId(self.graphics.push(glyph));
                    self.attach(glyph_id);
                    glyphs.push(glyph_id);
                }
            }
        }
        for &glyph_id in existing.iter().skip(placed.len()) {
            self.remove_glyph(glyph_id);
        }

        tracing::trace!(?id, glyphs = glyphs.len(), "laid out text");
        let graphic = self.graphics.get_mut(id.0);
        if let GraphicKind::Text(text) = graphic.kind_mut() {
            text.glyphs = glyphs;
        }
        graphic.clear_text_dirty();
    }

    fn refresh_texts(&mut self) {
        let dirty: Vec<GraphicId> = self
            .texts
            .iter()
            .copied()
            .filter(|id| {
                self.graphics.try_get(id.0).is_some_and(|graphic| {
                    graphic
                        .flags()
                        .intersects(GraphicFlags::TEXT_DIRTY | GraphicFlags::DATA_DIRTY)
                })
            })
            .collect();
        for id in dirty {
            self.relayout(id);
        }
    }

    pub fn begin_frame(&mut self) -> Result<(), BackendError> {
        self.pipeline.begin_frame(&mut self.backend)
    }

    fn prepare(&mut self, kind: PassKind) {
        self.refresh_texts();
        let ctx = self.backend.render_context();
        self.pipeline
            .prepare(kind, ctx, &mut self.graphics, &mut self.allocator, &mut self.uploader);
    }

    /// Draws the mask list into the mask targets, then reports the mask under `pointer`.
    ///
    /// Returns false if the pass could not run; `pointer` is then told nothing is hovered.
    pub fn render_mask(&mut self, viewport: Viewport, pointer: Option<&mut dyn Pointer>) -> bool {
        profile_function!();
        if !self.pipeline.is_in_frame() {
            tracing::warn!("render_mask outside of a frame");
            return false;
        }
        self.prepare(PassKind::Mask);
        let drawn = self.pipeline.draw(&mut self.backend, PassKind::Mask, viewport);
        if let Some(pointer) = pointer {
            self.pipeline.hit_test(&mut self.backend, viewport, drawn, pointer);
        }
        drawn
    }

    /// Draws the normal list into `viewport`.
    pub fn render_pass(&mut self, viewport: Viewport) -> bool {
        profile_function!();
        if !self.pipeline.is_in_frame() {
            tracing::warn!("render_pass outside of a frame");
            return false;
        }
        self.prepare(PassKind::Normal);
        self.pipeline.draw(&mut self.backend, PassKind::Normal, viewport)
    }

    /// Runs `overlay`, submits and presents.
    pub fn end_frame(&mut self, overlay: Option<&mut dyn OverlayRenderer<B::Frame>>) {
        self.pipeline.end_frame(&mut self.backend, overlay);
    }

    /// One full frame over the whole surface: masks, hit-test, normal pass, present.
    pub fn render(
        &mut self,
        pointer: Option<&mut dyn Pointer>,
        overlay: Option<&mut dyn OverlayRenderer<B::Frame>>,
    ) -> Result<(), BackendError> {
        let (width, height) = self.backend.surface_size();
        let viewport = Viewport::full(width, height);
        self.begin_frame()?;
        self.render_mask(viewport, pointer);
        self.render_pass(viewport);
        self.end_frame(overlay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Mat4, Vec2, Vec3};

    use super::*;
    use crate::{
        backend::{BackendCall, RecordingBackend, RecordingFrame},
        instance::InstanceKind,
        render_list::DrawBatch,
        text::{FontRef, GlyphMetrics, GlyphTable, TextStyle},
        texture::{FULL_UV_RECT, TextureRegion},
    };

    fn renderer() -> Renderer2D<RecordingBackend> {
        Renderer2D::new(RecordingBackend::new(800, 600), RendererDescriptor::default())
    }

    fn texture(id: u32) -> TextureRef {
        Arc::new(TextureRegion::loaded(id, false, FULL_UV_RECT))
    }

    fn font() -> FontRef {
        let metrics = GlyphMetrics {
            size: Vec2::new(16.0, 32.0),
            offset: Vec2::ZERO,
            x_advance: 16.0,
            uv_rect: FULL_UV_RECT,
        };
        Arc::new(
            GlyphTable::new(7, 32.0)
                .with_glyph('h', metrics)
                .with_glyph('i', metrics)
                .with_glyph(' ', metrics),
        )
    }

    #[derive(Default)]
    struct TestPointer {
        position: Option<(f32, f32)>,
        hovered: Option<u32>,
    }

    impl Pointer for TestPointer {
        fn position(&self) -> Option<(f32, f32)> {
            self.position
        }

        fn set_hovered(&mut self, mask_id: u32) {
            self.hovered = Some(mask_id);
        }
    }

    fn full() -> Viewport {
        Viewport::full(800, 600)
    }

    #[test]
    fn test_same_key_shares_batch() {
        let mut renderer = renderer();
        let shared = texture(3);
        renderer.add(Graphic::sprite(Some(shared.clone())));
        renderer.add(Graphic::sprite(Some(shared)));

        assert_eq!(renderer.list(PassKind::Normal).batch_count(), 1);

        renderer.begin_frame().unwrap();
        assert!(renderer.render_pass(full()));
        renderer.end_frame(None);

        assert_eq!(
            renderer.backend().draws(PassKind::Normal),
            vec![DrawBatch { texture_id: 3, writing_mask: 0, first: 0, count: 2 }]
        );
    }

    #[test]
    fn test_texture_change_reorders_until_next_pass() {
        let mut renderer = renderer();
        let a = renderer.add(Graphic::sprite(Some(texture(3))));
        let b = renderer.add(Graphic::sprite(Some(texture(3))));

        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);
        assert!(!renderer.list(PassKind::Normal).was_reordered());

        renderer.set_texture(b, Some(texture(5))).unwrap();
        assert!(renderer.list(PassKind::Normal).was_reordered());
        assert_eq!(renderer.list(PassKind::Normal).batch_count(), 2);
        assert_ne!(
            renderer.list(PassKind::Normal).key_of(a),
            renderer.list(PassKind::Normal).key_of(b)
        );

        renderer.backend_mut().clear_calls();
        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);
        assert!(!renderer.list(PassKind::Normal).was_reordered());
        assert_eq!(renderer.backend().draws(PassKind::Normal).len(), 2);
    }

    #[test]
    fn test_clean_frame_uploads_nothing() {
        let mut renderer = renderer();
        let id = renderer.add(Graphic::sprite(None));

        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);

        renderer.backend_mut().clear_calls();
        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);
        assert_eq!(renderer.backend().mock().count_buffer_writes(), 0);

        renderer.graphic_mut(id).unwrap().set_color(Vec3::new(1.0, 0.0, 0.0));
        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);
        // one static record and one dynamic payload
        assert_eq!(renderer.backend().mock().count_buffer_writes(), 2);
        assert!(!renderer.get(id).unwrap().is_data_dirty());
    }

    #[test]
    fn test_masks_route_to_mask_pass_and_hover() {
        let mut renderer = renderer();
        let mask = renderer.add(Graphic::sprite(None).with_masks(0, 4));
        renderer.add(Graphic::sprite(None).with_masks(4, 0));

        assert!(renderer.list(PassKind::Mask).contains(mask));
        assert_eq!(renderer.list(PassKind::Normal).len(), 1);

        renderer.backend_mut().set_mask_value(4);
        let mut pointer = TestPointer {
            position: Some((10.0, 10.0)),
            hovered: None,
        };
        renderer.begin_frame().unwrap();
        assert!(renderer.render_mask(full(), Some(&mut pointer)));
        renderer.render_pass(full());
        renderer.end_frame(None);

        assert_eq!(pointer.hovered, Some(4));
        assert_eq!(
            renderer.backend().draws(PassKind::Mask),
            vec![DrawBatch { texture_id: 0, writing_mask: 4, first: 0, count: 1 }]
        );
        assert!(renderer
            .backend()
            .calls()
            .contains(&BackendCall::ReadMaskPixel { x: 10, y: 10 }));
    }

    #[test]
    fn test_refused_mask_pass_clears_hover() {
        let mut renderer = renderer();
        renderer.add(Graphic::sprite(None).with_masks(0, 2));
        renderer.backend_mut().set_refuse_mask_pass(true);
        renderer.backend_mut().set_mask_value(2);

        let mut pointer = TestPointer {
            position: Some((1.0, 1.0)),
            hovered: Some(2),
        };
        renderer.begin_frame().unwrap();
        assert!(!renderer.render_mask(full(), Some(&mut pointer)));
        assert!(renderer.render_pass(full()));
        renderer.end_frame(None);

        assert_eq!(pointer.hovered, Some(0));
        assert!(renderer.backend().draws(PassKind::Mask).is_empty());
    }

    #[test]
    fn test_pointer_outside_viewport_is_ignored() {
        let mut renderer = renderer();
        renderer.add(Graphic::sprite(None).with_masks(0, 2));
        let mut pointer = TestPointer {
            position: Some((900.0, 10.0)),
            hovered: None,
        };
        renderer.begin_frame().unwrap();
        renderer.render_mask(full(), Some(&mut pointer));
        renderer.end_frame(None);
        assert_eq!(pointer.hovered, None);
    }

    #[test]
    fn test_set_masks_moves_between_lists() {
        let mut renderer = renderer();
        let id = renderer.add(Graphic::sprite(None));
        renderer.set_masks(id, 0, 9).unwrap();
        assert!(renderer.list(PassKind::Mask).contains(id));
        assert!(!renderer.list(PassKind::Normal).contains(id));

        renderer.set_masks(id, 9, 0).unwrap();
        assert!(renderer.list(PassKind::Normal).contains(id));
        assert!(renderer.list(PassKind::Mask).is_empty());
    }

    #[test]
    fn test_text_creates_glyph_graphics() {
        let mut renderer = renderer();
        let text = renderer.add(Graphic::text(font(), "hi hi", TextStyle::default()));

        let GraphicKind::Text(data) = renderer.get(text).unwrap().kind() else {
            panic!("expected text");
        };
        assert_eq!(data.glyphs().len(), 5);
        assert_eq!(renderer.len(), 6);
        // glyphs share the font atlas batch; the container itself is never listed
        assert_eq!(renderer.list(PassKind::Normal).len(), 5);
        assert_eq!(renderer.list(PassKind::Normal).batch_count(), 1);
        assert!(!renderer.list(PassKind::Normal).contains(text));

        renderer
            .edit_text(text, |data| data.content = "hi".to_string())
            .unwrap();
        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);
        assert_eq!(renderer.len(), 3);
        assert_eq!(
            renderer.backend().draws(PassKind::Normal).last().map(|batch| batch.count),
            Some(2)
        );
    }

    #[test]
    fn test_text_position_moves_glyphs() {
        let mut renderer = renderer();
        let text = renderer.add(Graphic::text(font(), "h", TextStyle::default()));
        let GraphicKind::Text(data) = renderer.get(text).unwrap().kind() else {
            panic!("expected text");
        };
        let glyph = data.glyphs()[0];
        let before = renderer.get(glyph).unwrap().model_matrix();

        renderer
            .graphic_mut(text)
            .unwrap()
            .set_position(Vec2::new(100.0, 0.0));
        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);

        let after = renderer.get(glyph).unwrap().model_matrix();
        assert_eq!(after.w_axis.x - before.w_axis.x, 100.0);
    }

    #[test]
    fn test_edit_text_rejects_sprites() {
        let mut renderer = renderer();
        let sprite = renderer.add(Graphic::sprite(None));
        assert_eq!(
            renderer.edit_text(sprite, |_| {}),
            Err(RenderError::KindMismatch(sprite))
        );

        let text = renderer.add(Graphic::text(font(), "h", TextStyle::default()));
        assert_eq!(
            renderer.set_texture(text, None),
            Err(RenderError::KindMismatch(text))
        );
    }

    #[test]
    fn test_remove_frees_slots() {
        let mut renderer = renderer();
        let id = renderer.add(Graphic::sprite(None));
        let text = renderer.add(Graphic::text(font(), "hi", TextStyle::default()));
        assert_eq!(renderer.allocator().live_statics(), 3);

        renderer.remove(text).unwrap();
        assert_eq!(renderer.allocator().live_statics(), 1);
        assert_eq!(renderer.len(), 1);

        let removed = renderer.remove(id).unwrap();
        assert!(removed.handler().is_none());
        assert!(renderer.list(PassKind::Normal).is_empty());
        assert_eq!(renderer.remove(id).err(), Some(RenderError::UnknownGraphic(id)));
    }

    #[test]
    fn test_glyphs_are_removed_through_their_text() {
        let mut renderer = renderer();
        let text = renderer.add(Graphic::text(font(), "hi", TextStyle::default()));
        let GraphicKind::Text(data) = renderer.get(text).unwrap().kind() else {
            panic!("expected text");
        };
        let glyph = data.glyphs()[0];

        assert_eq!(renderer.remove(glyph).err(), Some(RenderError::KindMismatch(glyph)));
        assert!(renderer.contains(glyph));
        assert_eq!(renderer.len(), 3);
        assert_eq!(renderer.list(PassKind::Normal).len(), 2);

        // the text still owns a live glyph, so a relayout replaces it cleanly
        renderer
            .edit_text(text, |data| data.content = "h".to_string())
            .unwrap();
        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);
        assert_eq!(renderer.len(), 2);
        assert_eq!(renderer.allocator().live_statics(), 1);
    }

    #[test]
    fn test_camera_reaches_every_pass() {
        let mut renderer = renderer();
        renderer.add(Graphic::sprite(None));
        renderer.camera_mut().set_position(Vec2::new(40.0, 20.0));

        renderer.begin_frame().unwrap();
        renderer.render_pass(full());
        renderer.end_frame(None);
        assert!(renderer.camera().flags().is_empty());

        let expected = Mat4::from_translation(Vec3::new(-40.0, -20.0, 0.0)).to_cols_array_2d();
        let views: Vec<_> = renderer
            .backend()
            .calls()
            .iter()
            .filter_map(|call| match call {
                BackendCall::BeginPass { view, .. } => Some(*view),
                _ => None,
            })
            .collect();
        assert_eq!(views, vec![expected]);
    }

    #[test]
    fn test_freed_record_is_hidden() {
        let mut renderer = renderer();
        let id = renderer.add(Graphic::sprite(None));
        let cursor = renderer.get(id).unwrap().handler().unwrap().static_cursor;
        renderer.remove(id).unwrap();
        assert_eq!(
            renderer.allocator().static_instance_data(cursor).kind,
            InstanceKind::Hidden as u32
        );
    }

    #[test]
    fn test_falls_back_to_data_textures() {
        let backend = RecordingBackend::new(64, 64).without_storage_buffers();
        let mut renderer = Renderer2D::new(backend, RendererDescriptor::default());
        assert_eq!(
            renderer.transport(),
            InstanceTransport::DataTexture { row_width: DEFAULT_DATA_TEXTURE_WIDTH }
        );

        renderer.add(Graphic::sprite(None));
        renderer.begin_frame().unwrap();
        assert!(renderer.render_pass(Viewport::full(64, 64)));
        renderer.end_frame(None);

        let mock = renderer.backend().mock();
        assert_eq!(mock.count_buffer_creates(), 0);
        // statics, dynamics and the order indices
        assert_eq!(mock.count_texture_creates(), 3);
        assert!(mock.count_texture_writes() >= 3);
    }

    #[test]
    fn test_explicit_transport_is_configured() {
        let renderer = Renderer2D::new(
            RecordingBackend::new(64, 64),
            RendererDescriptor::new()
                .with_transport(TransportPreference::DataTexture)
                .with_data_texture_width(256),
        );
        assert_eq!(
            renderer.backend().calls()[0],
            BackendCall::Configure(BackendConfig {
                transport: InstanceTransport::DataTexture { row_width: 256 },
                clear_color: [0.0, 0.0, 0.0, 1.0],
            })
        );
    }

    #[test]
    fn test_data_texture_width_respects_device_limit() {
        let renderer = Renderer2D::new(
            RecordingBackend::new(64, 64).with_max_texture_dimension(1024),
            RendererDescriptor::new()
                .with_transport(TransportPreference::DataTexture)
                .with_data_texture_width(4096),
        );
        assert_eq!(renderer.transport(), InstanceTransport::DataTexture { row_width: 1024 });
    }

    #[test]
    fn test_overlay_runs_before_present() {
        struct CountingOverlay(Vec<u64>);

        impl OverlayRenderer<RecordingFrame> for CountingOverlay {
            fn render_overlay(&mut self, frame: &mut RecordingFrame) {
                self.0.push(frame.index);
            }
        }

        let mut renderer = renderer();
        let mut overlay = CountingOverlay(Vec::new());
        renderer.render(None, Some(&mut overlay)).unwrap();
        renderer.render(None, Some(&mut overlay)).unwrap();

        assert_eq!(overlay.0, vec![0, 1]);
        assert_eq!(
            renderer.backend().calls().last(),
            Some(&BackendCall::EndFrame { overlay: true })
        );
    }

    #[test]
    fn test_failed_frame_is_skipped() {
        let mut renderer = renderer();
        renderer.backend_mut().fail_next_frame(BackendError::Outdated);
        assert_eq!(renderer.render(None, None), Err(BackendError::Outdated));
        assert!(!renderer.render_pass(full()));

        renderer.render(None, None).unwrap();
        assert_eq!(renderer.begin_frame(), Ok(()));
        assert_eq!(renderer.begin_frame(), Err(BackendError::FrameInProgress));
    }
}
