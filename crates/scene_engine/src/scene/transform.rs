//! Entity transform
//!
//! Local position/rotation/scale of one entity. The local matrix is cached and
//! invalidated by every setter. The global matrix is deliberately not cached
//! here: it is recomputed by [`crate::scene::Scene::global_transformation_matrix`]
//! by composing local matrices up the parent chain on every access.

use std::cell::Cell;

use crate::foundation::math::{trs_2d, utils::wrap_angle, Mat4, Vec2};

/// 2D transform with a cached local matrix
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec2,
    rotation: f32,
    scale: Vec2,
    local: Cell<Option<Mat4>>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            rotation: 0.0,
            scale: Vec2::new(1.0, 1.0),
            local: Cell::new(None),
        }
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.rotation == other.rotation && self.scale == other.scale
    }
}

impl Transform {
    /// Identity transform
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set position
    pub fn with_position(mut self, position: Vec2) -> Self {
        self.set_position(position);
        self
    }

    /// Builder pattern: set rotation (radians)
    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.set_rotation(rotation);
        self
    }

    /// Builder pattern: set scale
    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.set_scale(scale);
        self
    }

    /// Local position
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Local rotation in radians, always in `[0, 2π)`
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Local scale
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Set local position
    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.local.set(None);
    }

    /// Set local rotation; normalized into `[0, 2π)`
    pub fn set_rotation(&mut self, rotation: f32) {
        self.rotation = wrap_angle(rotation);
        self.local.set(None);
    }

    /// Set local scale
    pub fn set_scale(&mut self, scale: Vec2) {
        self.scale = scale;
        self.local.set(None);
    }

    /// Move by `delta`
    pub fn translate(&mut self, delta: Vec2) {
        self.set_position(self.position + delta);
    }

    /// Rotate by `delta` radians
    pub fn rotate(&mut self, delta: f32) {
        self.set_rotation(self.rotation + delta);
    }

    /// Local transformation matrix (translation * rotation * scale)
    pub fn local_matrix(&self) -> Mat4 {
        if let Some(matrix) = self.local.get() {
            return matrix;
        }
        let matrix = trs_2d(self.position, self.rotation, self.scale);
        self.local.set(Some(matrix));
        matrix
    }
}
