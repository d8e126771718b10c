//! Serializable scene descriptions
//!
//! A [`SceneDescription`] lists entities with their transforms, components
//! (type tag, field overrides, initialization parameters) and nested
//! children. It loads from RON or TOML through the [`Config`] trait and is
//! instantiated through the regular `create_entity` / `add_component_by_tag`
//! path, so every thread-affinity and registration check applies.
//!
//! ```ron
//! (
//!     name: "demo",
//!     camera: Some((viewport: (800.0, 600.0))),
//!     entities: [
//!         (
//!             name: "ship",
//!             transform: (position: (0.0, 0.0), rotation: 45.0),
//!             components: [
//!                 (type: "sprite", params: Some({"color": [1.0, 0.8, 0.2, 1.0]})),
//!                 (type: "rotator", overrides: {"speed": 1.5}),
//!             ],
//!         ),
//!     ],
//! )
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::component::{AddComponent, ComponentParams, ParamValue};
use super::entity::EntityId;
use super::scene::Scene;
use super::transform::Transform;
use super::{SceneError, SceneResult};
use crate::config::Config;
use crate::foundation::math::{utils::deg_to_rad, Vec2};
use crate::render::Camera2D;

fn default_true() -> bool {
    true
}

fn default_scale() -> (f32, f32) {
    (1.0, 1.0)
}

fn default_zoom() -> f32 {
    1.0
}

/// Whole scene
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    /// Scene name
    pub name: String,
    /// Camera; the scene does not render without one
    pub camera: Option<CameraDescription>,
    /// Root-level entities
    pub entities: Vec<EntityDescription>,
}

impl Config for SceneDescription {}

/// Camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescription {
    /// World-space centre
    #[serde(default)]
    pub position: (f32, f32),
    /// Magnification
    #[serde(default = "default_zoom")]
    pub zoom: f32,
    /// Visible world size at zoom 1
    pub viewport: (f32, f32),
}

impl CameraDescription {
    /// Build the camera
    pub fn to_camera(&self) -> Camera2D {
        Camera2D::new(self.viewport.0, self.viewport.1)
            .with_position(Vec2::new(self.position.0, self.position.1))
            .with_zoom(self.zoom)
    }
}

/// Local transform; rotation in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDescription {
    /// Local position
    #[serde(default)]
    pub position: (f32, f32),
    /// Local rotation in degrees
    #[serde(default)]
    pub rotation: f32,
    /// Local scale
    #[serde(default = "default_scale")]
    pub scale: (f32, f32),
}

impl Default for TransformDescription {
    fn default() -> Self {
        Self { position: (0.0, 0.0), rotation: 0.0, scale: default_scale() }
    }
}

impl TransformDescription {
    /// Build the transform
    pub fn to_transform(&self) -> Transform {
        Transform::new()
            .with_position(Vec2::new(self.position.0, self.position.1))
            .with_rotation(deg_to_rad(self.rotation))
            .with_scale(Vec2::new(self.scale.0, self.scale.1))
    }
}

/// One entity and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    /// Entity name
    pub name: String,
    /// Start enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local transform
    #[serde(default)]
    pub transform: TransformDescription,
    /// Components in addition order
    #[serde(default)]
    pub components: Vec<ComponentDescription>,
    /// Child entities
    #[serde(default)]
    pub children: Vec<EntityDescription>,
}

/// One component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescription {
    /// Registered type tag
    #[serde(rename = "type")]
    pub tag: String,
    /// Start enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Field overrides applied before `initialize`
    #[serde(default)]
    pub overrides: BTreeMap<String, ParamValue>,
    /// Parameters passed to `initialize`
    #[serde(default)]
    pub params: Option<ComponentParams>,
}

impl ComponentDescription {
    fn to_options(&self) -> AddComponent {
        let mut options = AddComponent::new();
        for (field, value) in &self.overrides {
            options = options.with_override(field.clone(), value.clone());
        }
        if let Some(params) = &self.params {
            options = options.with_params(params.clone());
        }
        if !self.enabled {
            options = options.disabled();
        }
        options
    }
}

impl SceneDescription {
    /// Populate `scene` (update thread); returns the root-level entities created
    ///
    /// Components that cannot be added are logged and skipped.
    pub fn instantiate(&self, scene: &Scene) -> SceneResult<Vec<EntityId>> {
        if !scene.context().check_update_thread("SceneDescription::instantiate") {
            return Err(SceneError::WrongThread("SceneDescription::instantiate"));
        }
        if let Some(camera) = &self.camera {
            scene.set_camera(Some(camera.to_camera()));
        }

        let mut roots = Vec::with_capacity(self.entities.len());
        for entity in &self.entities {
            roots.push(Self::spawn(scene, entity, None)?);
        }
        log::info!("Instantiated scene description '{}' ({} root entities)", self.name, roots.len());
        Ok(roots)
    }

    fn spawn(scene: &Scene, description: &EntityDescription, parent: Option<EntityId>) -> SceneResult<EntityId> {
        let id = scene
            .create_entity(description.name.clone())
            .ok_or(SceneError::WrongThread("create_entity"))?;
        if let Some(parent) = parent {
            scene.make_child(parent, id)?;
        }

        let transform = description.transform.to_transform();
        scene.with_transform(id, |t| *t = transform);
        scene.set_enabled(id, description.enabled);

        for component in &description.components {
            if scene.add_component_by_tag(id, &component.tag, component.to_options()).is_none() {
                log::warn!("Skipped component '{}' on '{}'", component.tag, description.name);
            }
        }
        for child in &description.children {
            Self::spawn(scene, child, Some(id))?;
        }
        Ok(id)
    }
}
