//! Built-in components
//!
//! - [`SpriteRenderer`]: draws a textured, tinted quad through a [`crate::render::Renderable`]
//! - [`Rotator`]: spins its entity at a constant angular speed

pub mod rotator;
pub mod sprite;

pub use rotator::Rotator;
pub use sprite::SpriteRenderer;

use crate::scene::ComponentRegistry;

/// Register every built-in component type
pub fn register_builtin(registry: &mut ComponentRegistry) {
    registry.register::<SpriteRenderer>().register::<Rotator>();
}
