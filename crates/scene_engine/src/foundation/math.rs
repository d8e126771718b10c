//! Math utilities and types
//!
//! Provides the math types used by the 2D scene graph. Transforms are 2D but
//! matrices stay 4x4 so they can be uploaded to shaders unchanged.

pub use nalgebra::{Vector2, Vector3, Matrix4, Orthographic3};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// 2 * Pi
    pub const TAU: f32 = 2.0 * PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Wrap an angle in radians into `[0, 2π)`
    pub fn wrap_angle(radians: f32) -> f32 {
        let wrapped = radians.rem_euclid(constants::TAU);
        // rem_euclid can round up to exactly TAU for tiny negative inputs
        if wrapped >= constants::TAU {
            0.0
        } else {
            wrapped
        }
    }
}

/// Build a 2D TRS matrix: translation * rotation(z) * scale
pub fn trs_2d(position: Vec2, rotation: f32, scale: Vec2) -> Mat4 {
    Mat4::new_translation(&Vec3::new(position.x, position.y, 0.0))
        * Mat4::from_axis_angle(&Vec3::z_axis(), rotation)
        * Mat4::new_nonuniform_scaling(&Vec3::new(scale.x, scale.y, 1.0))
}
