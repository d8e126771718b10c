//! Resource provider seam
//!
//! Decoding and compiling assets is the resource collaborator's job. The core
//! only looks finished objects up by name: linked shader programs, uploaded
//! textures and CPU-side meshes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::mesh::SharedMesh;
use super::shader::ShaderProgram;
use super::texture::Texture;

/// Named lookup of ready-to-use resources
///
/// Implementations are shared between the update and render threads.
pub trait ResourceProvider: Send + Sync {
    /// Linked shader program
    fn shader(&self, name: &str) -> Option<Arc<ShaderProgram>>;

    /// Uploaded texture
    fn texture(&self, name: &str) -> Option<Arc<Texture>>;

    /// CPU-side mesh
    fn mesh(&self, name: &str) -> Option<SharedMesh>;
}

/// In-memory [`ResourceProvider`] filled by the application at startup
#[derive(Default)]
pub struct ResourceCache {
    shaders: RwLock<HashMap<String, Arc<ShaderProgram>>>,
    textures: RwLock<HashMap<String, Arc<Texture>>>,
    meshes: RwLock<HashMap<String, SharedMesh>>,
}

impl ResourceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shader program, replacing any previous one with that name
    pub fn insert_shader(&self, name: impl Into<String>, shader: Arc<ShaderProgram>) {
        let name = name.into();
        log::debug!("Registered shader '{}'", name);
        self.shaders.write().insert(name, shader);
    }

    /// Register a texture
    pub fn insert_texture(&self, name: impl Into<String>, texture: Arc<Texture>) {
        let name = name.into();
        log::debug!("Registered texture '{}' ({}x{})", name, texture.width(), texture.height());
        self.textures.write().insert(name, texture);
    }

    /// Register a mesh
    pub fn insert_mesh(&self, name: impl Into<String>, mesh: SharedMesh) {
        let name = name.into();
        log::debug!("Registered mesh '{}'", name);
        self.meshes.write().insert(name, mesh);
    }

    /// Forget a texture, returning it so the caller can delete it on the render thread
    pub fn remove_texture(&self, name: &str) -> Option<Arc<Texture>> {
        self.textures.write().remove(name)
    }

    /// Every registered texture (for teardown)
    pub fn textures(&self) -> Vec<Arc<Texture>> {
        self.textures.read().values().cloned().collect()
    }
}

impl ResourceProvider for ResourceCache {
    fn shader(&self, name: &str) -> Option<Arc<ShaderProgram>> {
        let shader = self.shaders.read().get(name).cloned();
        if shader.is_none() {
            log::warn!("Unknown shader '{}'", name);
        }
        shader
    }

    fn texture(&self, name: &str) -> Option<Arc<Texture>> {
        let texture = self.textures.read().get(name).cloned();
        if texture.is_none() {
            log::warn!("Unknown texture '{}'", name);
        }
        texture
    }

    fn mesh(&self, name: &str) -> Option<SharedMesh> {
        let mesh = self.meshes.read().get(name).cloned();
        if mesh.is_none() {
            log::warn!("Unknown mesh '{}'", name);
        }
        mesh
    }
}
