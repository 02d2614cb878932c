//! Per-frame viewport and shader uniforms.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::camera::Camera2D;

/// A rectangle of the render target, in physical pixels from the top left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// A viewport covering a whole `width` x `height` target.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// Pixel-space projection with y pointing down.
    pub fn projection(&self) -> Mat4 {
        Mat4::orthographic_rh(0.0, self.width, self.height, 0.0, -1000.0, 1000.0)
    }
}

/// Uniform block shared by every shader stage.
///
/// Layout matches the `Frame` struct in the WGSL prelude.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub viewport_size: [f32; 2],
    /// Seconds since the renderer was created.
    pub time: f32,
    pub _padding: f32,
}

impl FrameUniforms {
    /// Uniforms for one pass through `viewport`, rebuilding whatever `camera` has dirty.
    pub fn new(viewport: &Viewport, camera: &mut Camera2D, time: f32) -> Self {
        Self {
            projection: (viewport.projection() * camera.projection_matrix()).to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            viewport_size: [viewport.width, viewport.height],
            time,
            _padding: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 144);
    }

    #[test]
    fn test_projection_maps_corners() {
        let viewport = Viewport::full(800, 600);
        let projection = viewport.projection();

        let top_left = projection.project_point3(Vec3::ZERO);
        let bottom_right = projection.project_point3(Vec3::new(800.0, 600.0, 0.0));
        assert!((top_left.x + 1.0).abs() < 1e-6 && (top_left.y - 1.0).abs() < 1e-6);
        assert!((bottom_right.x - 1.0).abs() < 1e-6 && (bottom_right.y + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_camera_feeds_uniforms() {
        let viewport = Viewport::full(800, 600);
        let mut camera = Camera2D::new().with_position(glam::Vec2::new(400.0, 300.0)).with_zoom(2.0);
        let uniforms = FrameUniforms::new(&viewport, &mut camera, 0.0);
        assert!(camera.flags().is_empty());

        let projection = Mat4::from_cols_array_2d(&uniforms.projection);
        let view = Mat4::from_cols_array_2d(&uniforms.view);
        // the camera position lands on the top left corner
        let corner = (projection * view).project_point3(Vec3::new(400.0, 300.0, 0.0));
        assert!((corner.x + 1.0).abs() < 1e-6 && (corner.y - 1.0).abs() < 1e-6);
        // at zoom 2 the whole 1600 x 1200 world span fits in the viewport
        let far = (projection * view).project_point3(Vec3::new(2000.0, 1500.0, 0.0));
        assert!((far.x - 1.0).abs() < 1e-5 && (far.y + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_viewport_contains() {
        let viewport = Viewport::new(10.0, 10.0, 100.0, 50.0);
        assert!(viewport.contains(10.0, 10.0));
        assert!(!viewport.contains(110.0, 20.0));
        assert!(Viewport::default().is_empty());
    }
}
