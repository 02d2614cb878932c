//! 2D camera feeding the frame uniforms.
//!
//! The camera keeps its matrices cached and only rebuilds the one whose inputs changed:
//! moving it dirties the view matrix, zooming dirties the projection.

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CameraFlags: u8 {
        const NEEDS_REBUILD_VIEW_MATRIX = 1 << 0;
        const NEEDS_REBUILD_PROJECTION_MATRIX = 1 << 1;
    }
}

/// Position and zoom of the world as seen through a viewport.
///
/// `position` is the world point shown at the viewport's top left corner. A zoom above
/// 1 shows more of the world, below 1 magnifies it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera2D {
    position: Vec2,
    zoom: f32,
    flags: CameraFlags,
    view: Mat4,
    projection: Mat4,
}

impl Default for Camera2D {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera2D {
    pub fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            flags: CameraFlags::all(),
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.set_position(position);
        self
    }

    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.set_zoom(zoom);
        self
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn flags(&self) -> CameraFlags {
        self.flags
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.flags.insert(CameraFlags::NEEDS_REBUILD_VIEW_MATRIX);
    }

    /// Ignores zoom values that are not finite and positive.
    pub fn set_zoom(&mut self, zoom: f32) {
        if !zoom.is_finite() || zoom <= 0.0 {
            tracing::warn!(zoom, "Ignoring invalid camera zoom");
            return;
        }
        self.zoom = zoom;
        self.flags.insert(CameraFlags::NEEDS_REBUILD_PROJECTION_MATRIX);
    }

    /// World point under `point`, given in pixels from the viewport's top left.
    pub fn screen_to_world(&self, point: Vec2) -> Vec2 {
        self.position + point * self.zoom
    }

    /// World to camera space.
    pub fn view_matrix(&mut self) -> Mat4 {
        if self.flags.contains(CameraFlags::NEEDS_REBUILD_VIEW_MATRIX) {
            self.view = Mat4::from_translation(-self.position.extend(0.0));
            self.flags.remove(CameraFlags::NEEDS_REBUILD_VIEW_MATRIX);
        }
        self.view
    }

    /// Zoom applied in camera space, before the viewport's pixel projection.
    pub fn projection_matrix(&mut self) -> Mat4 {
        if self.flags.contains(CameraFlags::NEEDS_REBUILD_PROJECTION_MATRIX) {
            self.projection = Mat4::from_scale(Vec3::new(1.0 / self.zoom, 1.0 / self.zoom, 1.0));
            self.flags.remove(CameraFlags::NEEDS_REBUILD_PROJECTION_MATRIX);
        }
        self.projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_camera_rebuilds_both_matrices() {
        let mut camera = Camera2D::new();
        assert_eq!(camera.flags(), CameraFlags::all());
        assert_eq!(camera.view_matrix(), Mat4::IDENTITY);
        assert_eq!(camera.projection_matrix(), Mat4::IDENTITY);
        assert!(camera.flags().is_empty());
    }

    #[test]
    fn test_set_position_dirties_view_only() {
        let mut camera = Camera2D::new();
        camera.view_matrix();
        camera.projection_matrix();

        camera.set_position(Vec2::new(100.0, 50.0));
        assert_eq!(camera.flags(), CameraFlags::NEEDS_REBUILD_VIEW_MATRIX);

        let view = camera.view_matrix();
        assert!(camera.flags().is_empty());
        assert_eq!(view.transform_point3(Vec3::new(100.0, 50.0, 0.0)), Vec3::ZERO);
    }

    #[test]
    fn test_set_zoom_dirties_projection_only() {
        let mut camera = Camera2D::new();
        camera.view_matrix();
        camera.projection_matrix();

        camera.set_zoom(2.0);
        assert_eq!(camera.flags(), CameraFlags::NEEDS_REBUILD_PROJECTION_MATRIX);

        let projection = camera.projection_matrix();
        assert!(camera.flags().is_empty());
        assert_eq!(
            projection.transform_point3(Vec3::new(200.0, 100.0, 0.0)),
            Vec3::new(100.0, 50.0, 0.0)
        );
    }

    #[test]
    fn test_cached_matrix_survives_until_dirty() {
        let mut camera = Camera2D::new().with_position(Vec2::new(3.0, 4.0));
        let first = camera.view_matrix();
        // no rebuild pending, so the cached value comes back
        assert_eq!(camera.view_matrix(), first);

        camera.set_position(Vec2::ZERO);
        assert_ne!(camera.view_matrix(), first);
    }

    #[test]
    fn test_screen_to_world_inverts_matrices() {
        let mut camera = Camera2D::new().with_position(Vec2::new(-50.0, 25.0)).with_zoom(0.5);
        let point = Vec2::new(120.0, 80.0);
        let world = camera.screen_to_world(point);
        let back = (camera.projection_matrix() * camera.view_matrix()).transform_point3(world.extend(0.0));
        assert!((back.truncate() - point).length() < 1e-4);
    }

    #[test]
    fn test_invalid_zoom_is_ignored() {
        let mut camera = Camera2D::new();
        camera.projection_matrix();
        for zoom in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            camera.set_zoom(zoom);
        }
        assert_eq!(camera.zoom(), 1.0);
        assert!(!camera.flags().contains(CameraFlags::NEEDS_REBUILD_PROJECTION_MATRIX));
    }
}
