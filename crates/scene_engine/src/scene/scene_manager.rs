//! # Scene Manager
//!
//! Seam for the scene-loading collaborator: it decides when to switch scenes,
//! this module performs the switch. [`SceneManager::load_scene`] tears down
//! the active scene and builds a fresh one from a registered builder function
//! or scene description.
//!
//! The manager is shared between the update thread (`load_scene`, `update`)
//! and the render thread (`render_frame`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::description::SceneDescription;
use super::scene::Scene;
use super::{SceneError, SceneResult};
use crate::config::Config;
use crate::context::EngineContext;
use crate::render::RenderStateMachine;

/// Populates a freshly created scene
pub type SceneBuilder = Box<dyn Fn(&Arc<Scene>) -> SceneResult<()> + Send + Sync>;

enum SceneSource {
    Builder(SceneBuilder),
    Description(SceneDescription),
}

/// Owns the active scene and the catalogue of loadable scenes
pub struct SceneManager {
    context: Arc<EngineContext>,
    sources: HashMap<String, SceneSource>,
    active: RwLock<Option<Arc<Scene>>>,
}

impl SceneManager {
    /// Create a manager with no scenes registered
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            context,
            sources: HashMap::new(),
            active: RwLock::new(None),
        }
    }

    /// Engine services
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Register a builder function under a scene name
    pub fn register_builder(
        &mut self,
        name: impl Into<String>,
        builder: impl Fn(&Arc<Scene>) -> SceneResult<()> + Send + Sync + 'static,
    ) {
        self.sources.insert(name.into(), SceneSource::Builder(Box::new(builder)));
    }

    /// Register a scene description under its own name
    pub fn register_description(&mut self, description: SceneDescription) {
        self.sources.insert(description.name.clone(), SceneSource::Description(description));
    }

    /// Load a scene description file (RON or TOML) and register it
    pub fn register_description_file(&mut self, path: &str) -> SceneResult<String> {
        let description = SceneDescription::load_from_file(path)?;
        let name = description.name.clone();
        log::info!("Registered scene '{}' from {}", name, path);
        self.register_description(description);
        Ok(name)
    }

    /// Whether a scene name is registered
    pub fn has_scene(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Currently active scene
    pub fn active_scene(&self) -> Option<Arc<Scene>> {
        self.active.read().clone()
    }

    /// Tear down the active scene and build `name` in its place (update thread)
    pub fn load_scene(&self, name: &str) -> SceneResult<Arc<Scene>> {
        if !self.context.check_update_thread("load_scene") {
            return Err(SceneError::WrongThread("load_scene"));
        }
        let Some(source) = self.sources.get(name) else {
            log::error!("Cannot load unknown scene '{}'", name);
            return Err(SceneError::UnknownScene(name.to_string()));
        };

        let previous = self.active.write().take();
        if let Some(previous) = previous {
            previous.teardown();
        }

        let scene = Scene::new(name, Arc::clone(&self.context));
        match source {
            SceneSource::Builder(builder) => builder(&scene)?,
            SceneSource::Description(description) => {
                description.instantiate(&scene)?;
            }
        }

        *self.active.write() = Some(Arc::clone(&scene));
        log::info!("Scene '{}' loaded", name);
        Ok(scene)
    }

    /// Tick the active scene (update thread)
    pub fn update(&self, delta_time: f32) {
        if let Some(scene) = self.active_scene() {
            scene.update(delta_time);
        }
    }

    /// Render the active scene (render thread)
    ///
    /// Without an active scene or camera the frame boundary still runs, so
    /// deferred GPU tasks are drained every frame.
    pub fn render_frame(&self, state: &mut RenderStateMachine) -> bool {
        if let Some(scene) = self.active_scene() {
            if scene.render(state) {
                return true;
            }
        }
        state.begin_frame();
        state.end_frame();
        false
    }

    /// Tear down the active scene (update thread)
    pub fn unload(&self) {
        if !self.context.check_update_thread("unload") {
            return;
        }
        let previous = self.active.write().take();
        if let Some(scene) = previous {
            scene.teardown();
        }
    }
}
