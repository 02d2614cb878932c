//! Drawable graphics and their instance data.
//!
//! Every drawable shares one [`Graphic`] value (transform, color, ordering and mask
//! state). What differs per kind lives in [`GraphicKind`]: sprites sample a texture,
//! glyphs sample a distance-field font atlas, and text is a container that owns glyph
//! graphics but never holds instance slots itself.

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3};
use sprocket_core::{alloc::sparse_set::IndexSlot, profiling::profile_function};

use crate::{
    instance::{GraphicBatchHandler, InstanceAllocator, InstanceKind, StaticInstanceRecord},
    render_list::BatchKey,
    text::{FontRef, TextStyle, glyph_smoothness},
    texture::{FULL_UV_RECT, TextureId, TextureRef},
};

/// Handle to a graphic owned by a [`Renderer2D`](crate::Renderer2D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphicId(pub(crate) IndexSlot);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GraphicFlags: u8 {
        /// Instance data must be rewritten on the next compute.
        const DATA_DIRTY = 1 << 0;
        const VISIBLE = 1 << 1;
        /// Container without instance data of its own.
        const NO_BATCHING = 1 << 2;
        /// Glyphs must be laid out again.
        const TEXT_DIRTY = 1 << 3;
    }
}

/// How much of a graphic's instance data [`Graphic::compute_instance_data`] rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeMode {
    /// Allocate if needed and rewrite everything.
    ForceRebuild,
    /// Refresh texture placement even if the graphic itself is clean.
    RebuildTexture,
    /// Rewrite only if the graphic is dirty.
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    pub position: Vec2,
    /// Size in pixels before `scale`.
    pub size: Vec2,
    pub scale: Vec2,
    /// Rotation around the z axis, in radians.
    pub rotation: f32,
    /// Pivot in normalised coordinates, `(0, 0)` top left and `(1, 1)` bottom right.
    pub anchor: Vec2,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            size: Vec2::ONE,
            scale: Vec2::ONE,
            rotation: 0.0,
            anchor: Vec2::ZERO,
        }
    }
}

impl Transform2D {
    /// Maps the unit quad onto this transform's rectangle.
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position.extend(0.0))
            * Mat4::from_rotation_z(self.rotation)
            * Mat4::from_scale((self.size * self.scale).extend(1.0))
            * Mat4::from_translation((-self.anchor).extend(0.0))
    }

    /// The frame children are placed in: position, rotation and scale but no size.
    pub fn parent_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position.extend(0.0))
            * Mat4::from_rotation_z(self.rotation)
            * Mat4::from_scale(self.scale.extend(1.0))
    }
}

#[derive(Debug, Clone)]
pub struct SpriteData {
    pub(crate) texture: Option<TextureRef>,
}

#[derive(Debug, Clone)]
pub struct GlyphData {
    pub(crate) font: FontRef,
    pub(crate) character: char,
    pub(crate) text_size: f32,
    pub(crate) text: GraphicId,
}

impl GlyphData {
    pub fn character(&self) -> char {
        self.character
    }

    /// The text graphic this glyph belongs to.
    pub fn text(&self) -> GraphicId {
        self.text
    }
}

#[derive(Debug, Clone)]
pub struct TextData {
    pub content: String,
    pub font: FontRef,
    pub style: TextStyle,
    pub(crate) glyphs: Vec<GraphicId>,
}

impl TextData {
    pub fn glyphs(&self) -> &[GraphicId] {
        &self.glyphs
    }
}

#[derive(Debug, Clone)]
pub enum GraphicKind {
    Sprite(SpriteData),
    Glyph(GlyphData),
    Text(TextData),
}

/// A drawable and the bookkeeping that ties it to the instance store.
#[derive(Debug, Clone)]
pub struct Graphic {
    transform: Transform2D,
    parent: Mat4,
    color: Vec3,
    z_index: i32,
    reading_mask: u32,
    writing_mask: u32,
    flags: GraphicFlags,
    handler: Option<GraphicBatchHandler>,
    texture_generation: u64,
    kind: GraphicKind,
}

impl Graphic {
    fn new(kind: GraphicKind) -> Self {
        Self {
            transform: Transform2D::default(),
            parent: Mat4::IDENTITY,
            color: Vec3::ONE,
            z_index: 0,
            reading_mask: 0,
            writing_mask: 0,
            flags: GraphicFlags::DATA_DIRTY | GraphicFlags::VISIBLE,
            handler: None,
            texture_generation: 0,
            kind,
        }
    }

    /// A textured quad. Without a texture it draws a solid quad in its color.
    pub fn sprite(texture: Option<TextureRef>) -> Self {
        Self::new(GraphicKind::Sprite(SpriteData { texture }))
    }

    /// A text block laid out from `content` when added to a renderer.
    pub fn text(font: FontRef, content: impl Into<String>, style: TextStyle) -> Self {
        let mut graphic = Self::new(GraphicKind::Text(TextData {
            content: content.into(),
            font,
            style,
            glyphs: Vec::new(),
        }));
        graphic.flags |= GraphicFlags::NO_BATCHING | GraphicFlags::TEXT_DIRTY;
        graphic
    }

    pub(crate) fn glyph(font: FontRef, character: char, text_size: f32, text: GraphicId) -> Self {
        Self::new(GraphicKind::Glyph(GlyphData {
            font,
            character,
            text_size,
            text,
        }))
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_size(mut self, size: Vec2) -> Self {
        self.transform.size = size;
        self
    }

    pub fn with_anchor(mut self, anchor: Vec2) -> Self {
        self.transform.anchor = anchor;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.transform.rotation = rotation;
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_z_index(mut self, z_index: i32) -> Self {
        self.z_index = z_index;
        self
    }

    /// Clip against `reading` and, if non-zero, write `writing` in the mask pass.
    pub fn with_masks(mut self, reading: u32, writing: u32) -> Self {
        self.reading_mask = reading;
        self.writing_mask = writing;
        self
    }

    pub fn transform(&self) -> &Transform2D {
        &self.transform
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn z_index(&self) -> i32 {
        self.z_index
    }

    pub fn reading_mask(&self) -> u32 {
        self.reading_mask
    }

    pub fn writing_mask(&self) -> u32 {
        self.writing_mask
    }

    pub fn flags(&self) -> GraphicFlags {
        self.flags
    }

    pub fn kind(&self) -> &GraphicKind {
        &self.kind
    }

    pub fn handler(&self) -> Option<&GraphicBatchHandler> {
        self.handler.as_ref()
    }

    pub fn is_data_dirty(&self) -> bool {
        self.flags.contains(GraphicFlags::DATA_DIRTY)
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.transform.position = position;
        self.touch();
    }

    pub fn set_size(&mut self, size: Vec2) {
        self.transform.size = size;
        self.touch();
    }

    pub fn set_scale(&mut self, scale: Vec2) {
        self.transform.scale = scale;
        self.touch();
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        self.transform.rotation = rotation;
        self.touch();
    }

    pub fn set_anchor(&mut self, anchor: Vec2) {
        self.transform.anchor = anchor;
        self.touch();
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.touch();
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.flags.set(GraphicFlags::VISIBLE, visible);
        self.touch();
    }

    pub fn set_data_dirty(&mut self, dirty: bool) {
        self.flags.set(GraphicFlags::DATA_DIRTY, dirty);
    }

    pub(crate) fn touch(&mut self) {
        self.flags |= GraphicFlags::DATA_DIRTY;
        if self.flags.contains(GraphicFlags::NO_BATCHING) {
            self.flags |= GraphicFlags::TEXT_DIRTY;
        }
    }

    pub(crate) fn set_z_index(&mut self, z_index: i32) {
        self.z_index = z_index;
        self.touch();
    }

    pub(crate) fn set_masks(&mut self, reading: u32, writing: u32) {
        self.reading_mask = reading;
        self.writing_mask = writing;
        self.touch();
    }

    pub(crate) fn set_parent(&mut self, parent: Mat4) {
        self.parent = parent;
        self.touch();
    }

    pub(crate) fn set_transform(&mut self, transform: Transform2D) {
        self.transform = transform;
        self.touch();
    }

    pub(crate) fn kind_mut(&mut self) -> &mut GraphicKind {
        &mut self.kind
    }

    pub(crate) fn take_handler(&mut self) -> Option<GraphicBatchHandler> {
        self.handler.take()
    }

    pub(crate) fn clear_text_dirty(&mut self) {
        self.flags.remove(GraphicFlags::TEXT_DIRTY | GraphicFlags::DATA_DIRTY);
    }

    pub(crate) fn set_texture(&mut self, texture: Option<TextureRef>) -> bool {
        match &mut self.kind {
            GraphicKind::Sprite(sprite) => {
                sprite.texture = texture;
                self.touch();
                true
            }
            _ => false,
        }
    }

    pub fn texture_id(&self) -> TextureId {
        match &self.kind {
            GraphicKind::Sprite(sprite) => sprite.texture.as_ref().map_or(0, |texture| texture.id()),
            GraphicKind::Glyph(glyph) => glyph.font.id(),
            GraphicKind::Text(text) => text.font.id(),
        }
    }

    pub fn is_opaque(&self) -> bool {
        match &self.kind {
            GraphicKind::Sprite(sprite) => sprite.texture.as_ref().is_none_or(|texture| texture.is_opaque()),
            GraphicKind::Glyph(_) | GraphicKind::Text(_) => false,
        }
    }

    /// Visible flag set and the backing texture or font is loaded.
    pub fn is_visible(&self) -> bool {
        if !self.flags.contains(GraphicFlags::VISIBLE) {
            return false;
        }
        match &self.kind {
            GraphicKind::Sprite(sprite) => sprite.texture.as_ref().is_none_or(|texture| texture.is_loaded()),
            GraphicKind::Glyph(GlyphData { font, .. }) | GraphicKind::Text(TextData { font, .. }) => {
                font.is_loaded()
            }
        }
    }

    pub fn batch_key(&self) -> BatchKey {
        BatchKey {
            z_index: self.z_index,
            opaque: self.is_opaque(),
            texture_id: self.texture_id(),
            writing_mask: self.writing_mask,
            reading_mask: self.reading_mask,
        }
    }

    /// Floats of dynamic payload this kind needs.
    pub fn payload_len(&self) -> usize {
        match self.kind {
            GraphicKind::Sprite(_) => 3,
            GraphicKind::Glyph(_) => 4,
            GraphicKind::Text(_) => 0,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        let mut model = self.parent * self.transform.local_matrix();
        model.w_axis.z = self.z_index as f32 / 1000.0;
        model
    }

    fn uv_rect(&self) -> [f32; 4] {
        match &self.kind {
            GraphicKind::Sprite(sprite) => sprite.texture.as_ref().map_or(FULL_UV_RECT, |texture| texture.uv_rect()),
            GraphicKind::Glyph(glyph) => glyph
                .font
                .glyph(glyph.character)
                .map_or(FULL_UV_RECT, |metrics| metrics.uv_rect),
            GraphicKind::Text(_) => FULL_UV_RECT,
        }
    }

    fn instance_kind(&self) -> InstanceKind {
        if !self.is_visible() {
            return InstanceKind::Hidden;
        }
        match self.kind {
            GraphicKind::Sprite(_) => InstanceKind::Sprite,
            GraphicKind::Glyph(_) => InstanceKind::Glyph,
            GraphicKind::Text(_) => InstanceKind::Hidden,
        }
    }

    fn current_texture_generation(&self) -> u64 {
        match &self.kind {
            GraphicKind::Sprite(sprite) => sprite.texture.as_ref().map_or(0, |texture| texture.generation()),
            GraphicKind::Glyph(glyph) => glyph.font.generation(),
            GraphicKind::Text(_) => 0,
        }
    }

    /// The texture changed placement or load state since instance data was last written.
    pub fn needs_texture_rebuild(&self) -> bool {
        self.handler.is_some() && self.current_texture_generation() != self.texture_generation
    }

    /// Writes this graphic's instance data according to `mode`.
    ///
    /// Allocates slots on first use. Returns true if anything was written, in which case
    /// the caller marks the static record and the dynamic payload dirty for upload.
    pub fn compute_instance_data(&mut self, allocator: &mut InstanceAllocator, mode: ComputeMode) -> bool {
        profile_function!();
        if self.flags.contains(GraphicFlags::NO_BATCHING) {
            return false;
        }

        let (handler, mode) = match self.handler {
            Some(handler) => (handler, mode),
            None => {
                let handler = allocator.allocate(self.payload_len());
                self.handler = Some(handler);
                (handler, ComputeMode::ForceRebuild)
            }
        };

        let dirty = self.is_data_dirty();
        let (record, payload) = allocator.instance_data_mut(&handler);
        match mode {
            ComputeMode::ForceRebuild => {
                self.write_static(record, &handler);
                self.write_dynamic(payload);
            }
            ComputeMode::RebuildTexture if !dirty => self.write_texture_fields(record),
            _ if dirty => {
                self.write_static(record, &handler);
                self.write_dynamic(payload);
            }
            _ => return false,
        }

        self.texture_generation = self.current_texture_generation();
        self.flags.remove(GraphicFlags::DATA_DIRTY);
        true
    }

    fn write_texture_fields(&self, record: &mut StaticInstanceRecord) {
        record.uv_rect = self.uv_rect();
        record.kind = self.instance_kind() as u32;
    }

    fn write_static(&self, record: &mut StaticInstanceRecord, handler: &GraphicBatchHandler) {
        record.model = self.model_matrix().to_cols_array_2d();
        record.data_offset = handler.dynamic_cursor as u32;
        record.writing_mask = self.writing_mask;
        record.reading_mask = self.reading_mask;
        self.write_texture_fields(record);
    }

    fn write_dynamic(&self, payload: &mut [f32]) {
        payload[..3].copy_from_slice(&self.color.to_array());
        if let GraphicKind::Glyph(glyph) = &self.kind {
            payload[3] = glyph_smoothness(glyph.text_size);
        }
    }
}
