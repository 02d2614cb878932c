//! Frame-level behavior of `Renderer2D` against the recording backend.

use std::sync::Arc;

use glam::Vec2;
use sprocket_render::{
    BackendCall, Graphic, PassKind, Pointer, RecordingBackend, Renderer2D, RendererDescriptor, TextureRegion,
    TransportPreference, Viewport, instance::InstanceKind,
};
use sprocket_test_utils::RenderCall;

fn loaded(id: u32) -> Arc<TextureRegion> {
    Arc::new(TextureRegion::loaded(id, false, [0.0, 0.0, 1.0, 1.0]))
}

fn frame(renderer: &mut Renderer2D<RecordingBackend>, viewport: Viewport) {
    renderer.begin_frame().unwrap();
    renderer.render_mask(viewport, None);
    renderer.render_pass(viewport);
    renderer.end_frame(None);
}

struct FixedPointer(Option<(f32, f32)>, u32);

impl Pointer for FixedPointer {
    fn position(&self) -> Option<(f32, f32)> {
        self.0
    }

    fn set_hovered(&mut self, mask_id: u32) {
        self.1 = mask_id;
    }
}

#[test]
fn test_batches_draw_back_to_front() {
    let mut renderer = Renderer2D::new(RecordingBackend::new(320, 240), RendererDescriptor::default());
    renderer.add(Graphic::sprite(Some(loaded(1))).with_z_index(5));
    renderer.add(Graphic::sprite(Some(loaded(2))).with_z_index(-1));
    renderer.add(Graphic::sprite(Some(loaded(1))).with_z_index(5));

    frame(&mut renderer, Viewport::full(320, 240));

    let draws = renderer.backend().draws(PassKind::Normal);
    let textures: Vec<_> = draws.iter().map(|batch| batch.texture_id).collect();
    assert_eq!(textures, vec![2, 1]);
    assert_eq!(draws[1].first, 1);
    assert_eq!(draws[1].count, 2);
}

#[test]
fn test_data_texture_writes_stay_inside_rows() {
    let mut renderer = Renderer2D::new(
        RecordingBackend::new(320, 240),
        RendererDescriptor::new()
            .with_transport(TransportPreference::DataTexture)
            .with_data_texture_width(8),
    );
    for i in 0..20 {
        renderer.add(Graphic::sprite(None).with_position(Vec2::new(i as f32, 0.0)));
    }
    frame(&mut renderer, Viewport::full(320, 240));

    let writes: Vec<_> = renderer
        .backend()
        .mock()
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RenderCall::WriteTexture { origin, size, .. } => Some((origin, size)),
            _ => None,
        })
        .collect();
    assert!(!writes.is_empty());
    for (origin, size) in writes {
        assert!(origin[0] + size[0] <= 8, "write at {:?} of {:?} crosses a row", origin, size);
    }
    assert_eq!(renderer.backend().draws(PassKind::Normal)[0].count, 20);
}

#[test]
fn test_unloaded_texture_hides_until_loaded() {
    let mut renderer = Renderer2D::new(RecordingBackend::new(64, 64), RendererDescriptor::default());
    let texture = Arc::new(TextureRegion::new(4, false));
    let id = renderer.add(Graphic::sprite(Some(texture.clone())));
    let cursor = renderer.get(id).unwrap().handler().unwrap().static_cursor;

    frame(&mut renderer, Viewport::full(64, 64));
    assert_eq!(
        renderer.allocator().static_instance_data(cursor).kind,
        InstanceKind::Hidden as u32
    );

    texture.set_uv_rect([0.5, 0.5, 1.0, 1.0]);
    texture.set_loaded(true);
    frame(&mut renderer, Viewport::full(64, 64));
    let record = renderer.allocator().static_instance_data(cursor);
    assert_eq!(record.kind, InstanceKind::Sprite as u32);
    assert_eq!(record.uv_rect, [0.5, 0.5, 1.0, 1.0]);
}

#[test]
fn test_removed_slot_is_reused() {
    let mut renderer = Renderer2D::new(RecordingBackend::new(64, 64), RendererDescriptor::default());
    let first = renderer.add(Graphic::sprite(None));
    let cursor = renderer.get(first).unwrap().handler().unwrap().static_cursor;
    renderer.remove(first).unwrap();

    let second = renderer.add(Graphic::sprite(None));
    assert_ne!(first, second);
    assert_eq!(renderer.get(second).unwrap().handler().unwrap().static_cursor, cursor);
    assert!(renderer.get(first).is_none());
}

#[test]
fn test_hit_test_inside_offset_viewport() {
    let mut renderer = Renderer2D::new(RecordingBackend::new(400, 400), RendererDescriptor::default());
    renderer.add(Graphic::sprite(None).with_masks(0, 3));
    renderer.backend_mut().set_mask_value(3);

    let viewport = Viewport::new(100.0, 100.0, 200.0, 200.0);
    let mut pointer = FixedPointer(Some((150.0, 160.0)), 0);
    renderer.begin_frame().unwrap();
    assert!(renderer.render_mask(viewport, Some(&mut pointer)));
    renderer.end_frame(None);

    assert_eq!(pointer.1, 3);
    assert!(
        renderer
            .backend()
            .calls()
            .contains(&BackendCall::ReadMaskPixel { x: 150, y: 160 })
    );

    // outside the viewport the previous hover is left alone
    let mut pointer = FixedPointer(Some((50.0, 50.0)), 9);
    renderer.begin_frame().unwrap();
    renderer.render_mask(viewport, Some(&mut pointer));
    renderer.end_frame(None);
    assert_eq!(pointer.1, 9);
}

#[test]
fn test_render_uses_whole_surface() {
    let mut renderer = Renderer2D::new(RecordingBackend::new(640, 480), RendererDescriptor::default());
    renderer.add(Graphic::sprite(None));
    renderer.render(None, None).unwrap();

    let passes: Vec<_> = renderer
        .backend()
        .calls()
        .iter()
        .filter_map(|call| match call {
            BackendCall::BeginPass {
                kind, viewport_size, ..
            } => Some((*kind, *viewport_size)),
            _ => None,
        })
        .collect();
    assert_eq!(
        passes,
        vec![(PassKind::Mask, [640.0, 480.0]), (PassKind::Normal, [640.0, 480.0])]
    );
}

#[test]
fn test_split_screen_passes_keep_their_own_viewport() {
    let mut renderer = Renderer2D::new(RecordingBackend::new(800, 600), RendererDescriptor::default());
    renderer.add(Graphic::sprite(None).with_masks(0, 1));

    let left = Viewport::new(0.0, 0.0, 400.0, 600.0);
    let right = Viewport::new(400.0, 0.0, 400.0, 300.0);
    renderer.begin_frame().unwrap();
    renderer.render_mask(left, None);
    renderer.render_mask(right, None);
    renderer.render_pass(left);
    renderer.render_pass(right);
    renderer.end_frame(None);

    let passes: Vec<_> = renderer
        .backend()
        .calls()
        .iter()
        .filter_map(|call| match call {
            BackendCall::BeginPass {
                kind, viewport_size, ..
            } => Some((*kind, *viewport_size)),
            _ => None,
        })
        .collect();
    assert_eq!(
        passes,
        vec![
            (PassKind::Mask, [400.0, 600.0]),
            (PassKind::Mask, [400.0, 300.0]),
            (PassKind::Normal, [400.0, 600.0]),
            (PassKind::Normal, [400.0, 300.0]),
        ]
    );
}
