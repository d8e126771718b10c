//! # Scene Graph
//!
//! Hierarchical entities carrying ordered lists of components, with the
//! double-buffered mutation protocol that lets the update thread change the
//! graph while the render thread is traversing it.
//!
//! ## Modules
//!
//! - [`scene`]: the [`Scene`] itself: entity arena, root list, traversals
//! - [`entity`]: entity nodes and the per-entity update/render recursion
//! - [`component`]: the [`Component`] trait, typed registration and lifecycle
//! - [`buffered`]: the committed/pending list pair
//! - [`transform`]: per-entity local transform
//! - [`events`]: structural change notifications
//! - [`description`]: serializable scene descriptions (RON/TOML)
//! - [`scene_manager`]: wholesale scene switching

pub mod buffered;
pub mod component;
pub mod description;
pub mod entity;
pub mod events;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod scene_manager;
pub mod transform;

#[cfg(test)]
mod tests;

pub use buffered::BufferedList;
pub use component::{
    AddComponent, AsAny, Component, ComponentContext, ComponentId, ComponentKind, ComponentParams,
    ComponentRegistration, ComponentRegistry, ParamValue, RenderContext,
};
pub use description::{
    CameraDescription, ComponentDescription, EntityDescription, SceneDescription, TransformDescription,
};
pub use entity::EntityId;
pub use events::{EventBus, SceneEvent, SceneEventHandler, SceneEventKind};
pub use scene::Scene;
pub use scene_manager::{SceneBuilder, SceneManager};
pub use transform::Transform;

use crate::config::ConfigError;

/// Contract violations of scene operations
///
/// Configuration, thread-affinity and resource-state problems are not errors:
/// they are logged and the operation becomes a no-op.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The id does not name an entity of this scene
    #[error("Unknown entity {0:?}")]
    UnknownEntity(EntityId),

    /// The entity has been destroyed
    #[error("Entity {0:?} has been destroyed")]
    EntityDead(EntityId),

    /// Re-parenting would make an entity its own ancestor
    #[error("Making {child:?} a child of {parent:?} would create a cycle")]
    CycleDetected {
        /// Requested parent
        parent: EntityId,
        /// Requested child
        child: EntityId,
    },

    /// A structural operation was attempted off the update thread
    #[error("{0} must be called from the update thread")]
    WrongThread(&'static str),

    /// No builder or description is registered under this name
    #[error("Unknown scene '{0}'")]
    UnknownScene(String),

    /// A scene description could not be read
    #[error("Scene description error: {0}")]
    Description(#[from] ConfigError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
