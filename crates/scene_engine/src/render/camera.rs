//! 2D orthographic camera
//!
//! The camera's view-projection matrix is pushed as the base of the transform
//! stack before the scene traversal, so every entity's model matrix lands in
//! clip space without the shaders knowing about the camera.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Orthographic3, Vec2, Vec3};

/// Orthographic camera looking down the z axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera2D {
    /// World-space point at the centre of the viewport
    pub position: Vec2,
    /// Magnification; 2.0 shows half as much of the world
    pub zoom: f32,
    /// Visible world size at zoom 1.0 (usually the framebuffer size in pixels)
    pub viewport: Vec2,
}

impl Camera2D {
    /// Create a camera centred on the origin
    pub fn new(viewport_width: f32, viewport_height: f32) -> Self {
        Self {
            position: Vec2::zeros(),
            zoom: 1.0,
            viewport: Vec2::new(viewport_width, viewport_height),
        }
    }

    /// Builder pattern: set position
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    /// Builder pattern: set zoom
    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.set_zoom(zoom);
        self
    }

    /// Set zoom; non-positive values are ignored
    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom > 0.0 && zoom.is_finite() {
            self.zoom = zoom;
        } else {
            log::warn!("Ignoring invalid camera zoom {}", zoom);
        }
    }

    /// Resize the viewport (window resize)
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport = Vec2::new(width, height);
    }

    /// Half-extents of the visible world rectangle
    pub fn half_extents(&self) -> Vec2 {
        self.viewport / (2.0 * self.zoom)
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::new_translation(&Vec3::new(-self.position.x, -self.position.y, 0.0))
    }

    /// View-to-clip matrix
    pub fn projection_matrix(&self) -> Mat4 {
        let half = self.half_extents();
        Orthographic3::new(-half.x, half.x, -half.y, half.y, -1.0, 1.0).to_homogeneous()
    }

    /// Projection * view
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

impl Default for Camera2D {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}
