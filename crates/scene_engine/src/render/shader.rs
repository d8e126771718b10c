//! Shader program handles
//!
//! Programs are compiled and linked by the resource provider; this module only
//! describes what a linked program exposes (attributes and uniforms) and
//! tracks whether the driver object has been deleted. Binding goes through
//! [`crate::render::RenderStateMachine::bind_shader`].

use std::sync::atomic::{AtomicBool, Ordering};

use super::device::ProgramId;

/// Vertex input declared by a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderAttribute {
    /// Attribute name in the shader source
    pub name: String,
    /// Bound attribute location
    pub location: u32,
    /// Float components consumed per vertex
    pub components: u32,
    /// Rendering is refused when a required attribute cannot be matched
    pub required: bool,
}

impl ShaderAttribute {
    /// A required attribute
    pub fn new(name: impl Into<String>, location: u32, components: u32) -> Self {
        Self { name: name.into(), location, components, required: true }
    }

    /// An attribute that may be left unmatched
    pub fn optional(name: impl Into<String>, location: u32, components: u32) -> Self {
        Self { required: false, ..Self::new(name, location, components) }
    }
}

/// Kind of value a uniform accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    /// Integer
    Int,
    /// Scalar float
    Float,
    /// 2-component vector
    Vec2,
    /// 4-component vector
    Vec4,
    /// 4x4 matrix
    Mat4,
    /// 2D sampler, fed a texture unit
    Sampler2D,
}

/// Uniform declared by a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderUniform {
    /// Uniform name in the shader source
    pub name: String,
    /// Uniform location
    pub location: i32,
    /// Expected value kind
    pub kind: UniformKind,
}

impl ShaderUniform {
    /// Create a uniform description
    pub fn new(name: impl Into<String>, location: i32, kind: UniformKind) -> Self {
        Self { name: name.into(), location, kind }
    }

    /// Whether writes to this uniform go through texture unit assignment
    pub fn is_texture(&self) -> bool {
        self.kind == UniformKind::Sampler2D
    }
}

/// A linked shader program
///
/// Shared by reference (`Arc<ShaderProgram>`) between renderables; the owner
/// deletes it through the render state machine.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ProgramId,
    name: String,
    attributes: Vec<ShaderAttribute>,
    uniforms: Vec<ShaderUniform>,
    disposed: AtomicBool,
}

impl ShaderProgram {
    /// Wrap a program linked by the resource provider
    pub fn from_linked(
        id: ProgramId,
        name: impl Into<String>,
        attributes: Vec<ShaderAttribute>,
        uniforms: Vec<ShaderUniform>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            attributes,
            uniforms,
            disposed: AtomicBool::new(false),
        }
    }

    /// Driver object name
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared vertex attributes
    pub fn attributes(&self) -> &[ShaderAttribute] {
        &self.attributes
    }

    /// Declared uniforms
    pub fn uniforms(&self) -> &[ShaderUniform] {
        &self.uniforms
    }

    /// Look up a uniform by name
    pub fn uniform(&self, name: &str) -> Option<&ShaderUniform> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Whether the driver object has been deleted
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}
