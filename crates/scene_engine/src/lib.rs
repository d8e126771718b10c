//! # Scene Engine
//!
//! Execution core of a 2D engine: a render-state machine that tracks what is
//! bound on the graphics device, and a hierarchical scene graph whose
//! structure can be changed from the update thread while the render thread
//! is traversing it.
//!
//! ## Features
//!
//! - **Render state tracking**: redundant binds never reach the device
//! - **Double-buffered scene graph**: pending changes are committed at a
//!   well-defined point of the update traversal
//! - **Deferred GPU work**: the update thread submits closures that the
//!   render thread drains at each frame boundary
//! - **Typed components**: registered by tag, with declared dependencies and
//!   a small lifecycle (initialize, update, render, death)
//! - **Scene descriptions**: whole scenes loaded from RON or TOML
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! let ctx = EngineContext::builder().build();
//! ctx.bind_update_thread();
//!
//! let scene = Scene::new("main", ctx.clone());
//! scene.set_camera(Some(Camera2D::new(800.0, 600.0)));
//! if let Some(ship) = scene.create_entity("ship") {
//!     scene.add_component::<Rotator>(ship);
//! }
//!
//! let device = HeadlessDevice::new(8);
//! let mut state = RenderStateMachine::new(Box::new(device), ctx.gpu().clone());
//! scene.update(1.0 / 60.0);
//! scene.render(&mut state);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod components;
pub mod config;
pub mod context;
pub mod foundation;
pub mod render;
pub mod scene;

pub use config::{Config, ConfigError, EngineConfig};
pub use context::{EngineContext, EngineContextBuilder};

/// Top-level engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A scene operation violated its contract
    #[error("Scene error: {0}")]
    Scene(#[from] scene::SceneError),

    /// The deferred GPU path failed
    #[error("Render error: {0}")]
    Render(#[from] render::RenderError),
}

/// Result type for engine-level operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        components::{Rotator, SpriteRenderer},
        config::{ClearConfig, Config, EngineConfig},
        context::EngineContext,
        foundation::{
            math::{Mat4, Vec2, Vec3},
            time::FixedStepTimer,
        },
        render::{
            Camera2D, ClearMode, GpuTaskQueue, GraphicsDevice, HeadlessDevice, Mesh, RenderStateMachine,
            Renderable, ResourceCache, ResourceProvider, ShaderProgram, Texture,
        },
        scene::{
            AddComponent, Component, ComponentContext, ComponentKind, ComponentParams, EntityId, RenderContext,
            Scene, SceneDescription, SceneEvent, SceneEventKind, SceneManager, Transform,
        },
        EngineError, EngineResult,
    };
}
