//! Renderable: a mesh paired with a shader
//!
//! A renderable caches the GPU buffers built from its mesh and the mapping
//! from shader attributes to mesh attributes. Three dirty flags stage the
//! rebuild work, from most to least expensive:
//!
//! | flag          | cause                              | work                          |
//! |---------------|------------------------------------|-------------------------------|
//! | `MESH`        | mesh replaced or re-laid out       | recreate buffers, reattribute |
//! | `SHADER`      | shader replaced                    | reattribute, revalidate       |
//! | `VERTEX_DATA` | vertex values changed in place     | upload into existing buffer   |
//!
//! Attribute matching is delegated to an injected [`AttributeResolver`];
//! uniform values come from a [`UniformCallback`] invoked once per declared
//! uniform on every draw.

use std::collections::HashSet;
use std::sync::Arc;

use bitflags::bitflags;

use super::buffer::{GpuBuffer, IndexBuffer, VertexBuffer};
use super::deferred::{GpuTaskQueue, TaskTicket};
use super::device::{BufferId, BufferUsage, UniformValue};
use super::mesh::{Mesh, MeshAttribute, SharedMesh};
use super::shader::{ShaderAttribute, ShaderProgram, ShaderUniform};
use super::state::RenderStateMachine;
use super::texture::Texture;
use crate::foundation::math::Mat4;

bitflags! {
    /// Pending rebuild work
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        /// Mesh replaced: recreate buffers and reattribute
        const MESH = 0b001;
        /// Shader replaced: reattribute and revalidate
        const SHADER = 0b010;
        /// Vertex values changed: upload only
        const VERTEX_DATA = 0b100;
    }
}

/// Lazily computed render readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Not computed since the last shader/mesh change
    Unknown,
    /// Shader and mesh set, every required attribute matched
    Valid,
    /// Missing shader or mesh, or a required attribute is unmatched
    Invalid,
}

/// Picks the mesh attribute (by index) feeding a shader attribute
pub type AttributeResolver =
    Arc<dyn Fn(&ShaderAttribute, &[MeshAttribute]) -> Option<usize> + Send + Sync>;

/// Supplies uniform values; called once per declared uniform on each draw
pub type UniformCallback = Box<dyn FnMut(&ShaderUniform, &mut UniformBinder<'_>) + Send>;

/// Resolver matching attributes by name
pub fn default_attribute_resolver() -> AttributeResolver {
    Arc::new(|attribute: &ShaderAttribute, mesh_attributes: &[MeshAttribute]| {
        mesh_attributes.iter().position(|m| m.name() == attribute.name)
    })
}

/// Uniform writer handed to a [`UniformCallback`]
///
/// Texture uniforms are routed through texture unit assignment; the units are
/// released by the renderable once the draw has been issued.
pub struct UniformBinder<'a> {
    state: &'a mut RenderStateMachine,
    textures: &'a mut Vec<Arc<Texture>>,
}

impl UniformBinder<'_> {
    /// Write a plain value
    pub fn set(&mut self, uniform: &ShaderUniform, value: UniformValue) -> bool {
        if uniform.is_texture() {
            log::warn!("Uniform '{}' is a sampler; use set_texture", uniform.name);
            return false;
        }
        self.state.set_uniform(uniform.location, value)
    }

    /// Write a matrix
    pub fn set_matrix(&mut self, uniform: &ShaderUniform, matrix: &Mat4) -> bool {
        self.set(uniform, UniformValue::Mat4((*matrix).into()))
    }

    /// Assign a texture to a free unit and point the sampler at it
    pub fn set_texture(&mut self, uniform: &ShaderUniform, texture: &Arc<Texture>) -> bool {
        if !uniform.is_texture() {
            log::warn!("Uniform '{}' is not a sampler", uniform.name);
            return false;
        }
        let Some(unit) = self.state.assign_texture(texture, None) else {
            return false;
        };
        if !self.textures.iter().any(|t| Arc::ptr_eq(t, texture)) {
            self.textures.push(Arc::clone(texture));
        }
        #[allow(clippy::cast_possible_wrap)]
        self.state.set_uniform(uniform.location, UniformValue::Int(unit as i32))
    }

    /// Model-view-projection matrix on top of the transform stack
    pub fn current_transform(&self) -> Mat4 {
        self.state.current_transform()
    }
}

/// Shader attribute location fed from a named mesh attribute
#[derive(Debug, Clone)]
struct AttributeBinding {
    location: u32,
    components: u32,
    mesh_attribute: String,
}

struct GpuBuffers {
    vertex: VertexBuffer,
    index: IndexBuffer,
    layout_revision: u64,
    data_revision: u64,
}

impl GpuBuffers {
    fn build(state: &mut RenderStateMachine, mesh: &Mesh) -> Self {
        let vertex = VertexBuffer::create(state, mesh.vertex_layout(), &mesh.vertex_bytes(), BufferUsage::Dynamic);
        let index = IndexBuffer::create(state, mesh.indices());
        Self {
            vertex,
            index,
            layout_revision: mesh.layout_revision(),
            data_revision: mesh.data_revision(),
        }
    }

    fn destroy(mut self, state: &mut RenderStateMachine) {
        self.vertex.destroy(state);
        self.index.destroy(state);
    }
}

/// GPU-facing pairing of a mesh and a shader
pub struct Renderable {
    mesh: Option<SharedMesh>,
    shader: Option<Arc<ShaderProgram>>,
    resolver: AttributeResolver,
    uniforms: Option<UniformCallback>,
    buffers: Option<GpuBuffers>,
    bindings: Vec<AttributeBinding>,
    dirty: DirtyFlags,
    validity: Validity,
    reported_missing: HashSet<String>,
    assigned_textures: Vec<Arc<Texture>>,
}

impl Renderable {
    /// Create an empty renderable using the name-matching resolver
    pub fn new() -> Self {
        Self::with_resolver(default_attribute_resolver())
    }

    /// Create an empty renderable with a custom attribute resolver
    pub fn with_resolver(resolver: AttributeResolver) -> Self {
        Self {
            mesh: None,
            shader: None,
            resolver,
            uniforms: None,
            buffers: None,
            bindings: Vec::new(),
            dirty: DirtyFlags::empty(),
            validity: Validity::Unknown,
            reported_missing: HashSet::new(),
            assigned_textures: Vec::new(),
        }
    }

    /// Assign the mesh; assigning the current mesh again changes nothing
    pub fn set_mesh(&mut self, mesh: SharedMesh) {
        if self.mesh.as_ref().is_some_and(|m| Arc::ptr_eq(m, &mesh)) {
            return;
        }
        self.mesh = Some(mesh);
        self.dirty |= DirtyFlags::MESH;
        self.validity = Validity::Unknown;
    }

    /// Assign the shader; assigning the current shader again changes nothing
    pub fn set_shader(&mut self, shader: Arc<ShaderProgram>) {
        if self.shader.as_ref().is_some_and(|s| Arc::ptr_eq(s, &shader)) {
            return;
        }
        self.shader = Some(shader);
        self.dirty |= DirtyFlags::SHADER;
        self.validity = Validity::Unknown;
        self.reported_missing.clear();
    }

    /// Replace the attribute resolver (forces reattribution)
    pub fn set_resolver(&mut self, resolver: AttributeResolver) {
        self.resolver = resolver;
        self.dirty |= DirtyFlags::SHADER;
        self.validity = Validity::Unknown;
    }

    /// Install the uniform callback
    pub fn set_uniform_callback(&mut self, callback: UniformCallback) {
        self.uniforms = Some(callback);
    }

    /// Request a vertex upload at the next draw
    ///
    /// In-place edits through [`Mesh::set_attribute_data`] are detected
    /// automatically; this is for callers that bypass the revision counter.
    pub fn mark_vertex_data_dirty(&mut self) {
        self.dirty |= DirtyFlags::VERTEX_DATA;
    }

    /// Current mesh
    pub fn mesh(&self) -> Option<&SharedMesh> {
        self.mesh.as_ref()
    }

    /// Current shader
    pub fn shader(&self) -> Option<&Arc<ShaderProgram>> {
        self.shader.as_ref()
    }

    /// Pending rebuild work
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    /// Cached validity without recomputing it
    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// Vertex buffer name, once built
    pub fn vertex_buffer_id(&self) -> Option<BufferId> {
        self.buffers.as_ref().map(|b| b.vertex.id())
    }

    /// Whether shader and mesh are set and every required attribute matched
    ///
    /// Computed lazily and cached until the shader or mesh changes.
    pub fn is_valid(&mut self) -> bool {
        if self.validity == Validity::Unknown {
            self.validity = self.resolve_attributes();
        }
        self.validity == Validity::Valid
    }

    fn resolve_attributes(&mut self) -> Validity {
        let (Some(shader), Some(mesh)) = (self.shader.clone(), self.mesh.clone()) else {
            return Validity::Invalid;
        };
        if shader.is_disposed() {
            log::warn!("Renderable uses deleted shader '{}'", shader.name());
            return Validity::Invalid;
        }

        let mesh = mesh.read();
        let mut bindings = Vec::with_capacity(shader.attributes().len());
        let mut valid = true;

        for attribute in shader.attributes() {
            let matched = (self.resolver)(attribute, mesh.attributes())
                .and_then(|index| mesh.attributes().get(index))
                .filter(|m| m.components() == attribute.components);

            match matched {
                Some(mesh_attribute) => bindings.push(AttributeBinding {
                    location: attribute.location,
                    components: attribute.components,
                    mesh_attribute: mesh_attribute.name().to_string(),
                }),
                None if attribute.required => {
                    if self.reported_missing.insert(attribute.name.clone()) {
                        log::error!(
                            "Shader '{}' requires attribute '{}' ({} components) which the mesh does not provide",
                            shader.name(),
                            attribute.name,
                            attribute.components
                        );
                    }
                    valid = false;
                }
                None => {}
            }
        }

        self.bindings = bindings;
        if valid {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }

    /// Rebuild whatever the dirty flags and mesh revisions call for
    fn resolve_dirty_state(&mut self, state: &mut RenderStateMachine, mesh: &Mesh) {
        let rebuild = self.dirty.contains(DirtyFlags::MESH)
            || self
                .buffers
                .as_ref()
                .map_or(true, |b| b.layout_revision != mesh.layout_revision());

        if rebuild {
            if let Some(old) = self.buffers.take() {
                old.destroy(state);
            }
            self.buffers = Some(GpuBuffers::build(state, mesh));
        } else if let Some(buffers) = self.buffers.as_mut() {
            if self.dirty.contains(DirtyFlags::VERTEX_DATA) || buffers.data_revision != mesh.data_revision() {
                let streamed = mesh
                    .attributes()
                    .iter()
                    .all(|attribute| buffers.vertex.set_attribute_data(state, attribute.name(), attribute.data()));
                if !streamed {
                    buffers.vertex.upload(state, &mesh.vertex_bytes());
                }
                buffers.data_revision = mesh.data_revision();
            }
        }
        self.dirty = DirtyFlags::empty();
    }

    /// Draw the mesh with the shader at the current top of the transform stack
    ///
    /// Returns `false` when the renderable is not valid.
    pub fn render(&mut self, state: &mut RenderStateMachine) -> bool {
        let Some(mesh) = self.mesh.clone() else {
            return false;
        };

        // A re-laid-out mesh may have gained or lost attributes
        let layout_revision = mesh.read().layout_revision();
        if self.buffers.as_ref().is_some_and(|b| b.layout_revision != layout_revision) {
            self.dirty |= DirtyFlags::MESH;
            self.validity = Validity::Unknown;
        }
        if !self.is_valid() {
            return false;
        }
        let Some(shader) = self.shader.clone() else {
            return false;
        };
        let mesh = mesh.read();

        // (1) dirty state
        self.resolve_dirty_state(state, &mesh);
        drop(mesh);
        let Some(buffers) = self.buffers.as_ref() else {
            return false;
        };

        // (2) shader
        if !state.bind_shader(&shader) {
            return false;
        }

        // (3) attributes
        for binding in &self.bindings {
            state.enable_vertex_attribute(binding.location);
        }

        // (4) uniforms
        if let Some(callback) = self.uniforms.as_mut() {
            let mut binder = UniformBinder { state: &mut *state, textures: &mut self.assigned_textures };
            for uniform in shader.uniforms() {
                callback(uniform, &mut binder);
            }
        }

        // (5) attribute pointers against the vertex buffer layout
        state.bind_buffer(&buffers.vertex);
        for binding in &self.bindings {
            if let Some(layout) = buffers.vertex.layout().attribute(&binding.mesh_attribute) {
                state.vertex_attribute_pointer(binding.location, binding.components, layout.stride, layout.offset);
            }
        }
        state.release_buffer(&buffers.vertex);

        // (6) draw
        let drawn = state.draw_indexed(&buffers.index);

        // (7) textures
        for texture in self.assigned_textures.drain(..) {
            state.unassign_texture(&texture);
        }

        // (8) attributes
        for binding in &self.bindings {
            state.disable_vertex_attribute(binding.location);
        }

        // (9) shader
        state.release_shader(&shader);
        drawn
    }

    /// Delete the GPU buffers now (render thread)
    pub fn dispose(&mut self, state: &mut RenderStateMachine) {
        if let Some(buffers) = self.buffers.take() {
            buffers.destroy(state);
        }
        self.dirty |= DirtyFlags::MESH;
    }

    /// Hand the GPU buffers to the render thread for deletion
    ///
    /// Used when the owner dies on the update thread. Returns the ticket of
    /// the deletion task, or `None` when nothing had been built.
    pub fn dispose_deferred(&mut self, queue: &Arc<GpuTaskQueue>) -> Option<TaskTicket> {
        let buffers = self.buffers.take()?;
        self.dirty |= DirtyFlags::MESH;
        match queue.submit(Box::new(move |state: &mut RenderStateMachine| buffers.destroy(state))) {
            Ok(ticket) => Some(ticket),
            Err(err) => {
                log::error!("Could not release renderable buffers: {}", err);
                None
            }
        }
    }
}

impl Default for Renderable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Renderable {
    fn drop(&mut self) {
        if self.buffers.is_some() {
            log::warn!("Renderable dropped with live GPU buffers; call dispose or dispose_deferred");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::ProgramId;
    use crate::render::headless::{DeviceCall, DeviceProbe, HeadlessDevice};
    use crate::render::shader::UniformKind;
    use crate::render::TextureDescriptor;

    fn machine() -> (RenderStateMachine, DeviceProbe) {
        let device = HeadlessDevice::new(4);
        let probe = device.probe();
        (RenderStateMachine::new(Box::new(device), GpuTaskQueue::new()), probe)
    }

    fn sprite_shader() -> Arc<ShaderProgram> {
        Arc::new(ShaderProgram::from_linked(
            ProgramId(1),
            "sprite",
            vec![ShaderAttribute::new("a_position", 0, 2), ShaderAttribute::optional("a_uv", 1, 2)],
            vec![
                ShaderUniform::new("u_transform", 0, UniformKind::Mat4),
                ShaderUniform::new("u_texture", 1, UniformKind::Sampler2D),
            ],
        ))
    }

    #[test]
    fn test_render_protocol_order() {
        let (mut state, probe) = machine();
        let texture = state.create_texture(&TextureDescriptor::solid(2, 2, [255; 4]));
        let mut renderable = Renderable::new();
        renderable.set_shader(sprite_shader());
        renderable.set_mesh(Mesh::quad(1.0, 1.0).into_shared());
        renderable.set_uniform_callback(Box::new(move |uniform: &ShaderUniform, binder: &mut UniformBinder<'_>| {
            if uniform.is_texture() {
                binder.set_texture(uniform, &texture);
            } else {
                let transform = binder.current_transform();
                binder.set_matrix(uniform, &transform);
            }
        }));

        assert!(renderable.render(&mut state));
        assert_eq!(renderable.validity(), Validity::Valid);

        let calls = probe.calls();
        let position = |wanted: &dyn Fn(&DeviceCall) -> bool| calls.iter().position(|c| wanted(c)).unwrap();
        let use_program = position(&|c| matches!(c, DeviceCall::UseProgram(Some(_))));
        let enable = position(&|c| matches!(c, DeviceCall::EnableAttribute(_)));
        let texture_bind = position(&|c| matches!(c, DeviceCall::BindTextureUnit(_, Some(_))));
        let pointer = position(&|c| matches!(c, DeviceCall::AttributePointer(..)));
        let draw = position(&|c| matches!(c, DeviceCall::DrawElements(6)));
        let texture_release = position(&|c| matches!(c, DeviceCall::BindTextureUnit(_, None)));
        let disable = position(&|c| matches!(c, DeviceCall::DisableAttribute(_)));
        let release_program = position(&|c| matches!(c, DeviceCall::UseProgram(None)));

        assert!(use_program < enable);
        assert!(enable < texture_bind);
        assert!(texture_bind < pointer);
        assert!(pointer < draw);
        assert!(draw < texture_release);
        assert!(texture_release < disable);
        assert!(disable < release_program);

        renderable.dispose(&mut state);
        assert_eq!(probe.live_buffers(), 0);
    }

    #[test]
    fn test_missing_required_attribute_is_invalid() {
        let (mut state, probe) = machine();
        let mesh = Mesh::new(3).with_attribute("a_uv", 2, vec![0.0; 6]).with_indices(vec![0, 1, 2]);
        let mut renderable = Renderable::new();
        renderable.set_shader(sprite_shader());
        renderable.set_mesh(mesh.into_shared());

        assert!(!renderable.render(&mut state));
        assert!(!renderable.render(&mut state));
        assert_eq!(renderable.validity(), Validity::Invalid);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::DrawElements(_))), 0);
    }

    #[test]
    fn test_not_valid_without_shader() {
        let (mut state, _probe) = machine();
        let mut renderable = Renderable::new();
        renderable.set_mesh(Mesh::quad(1.0, 1.0).into_shared());
        assert!(!renderable.render(&mut state));
        assert!(!renderable.is_valid());
    }

    #[test]
    fn test_shader_change_reattributes_without_rebuild() {
        let (mut state, probe) = machine();
        let mut renderable = Renderable::new();
        renderable.set_shader(sprite_shader());
        renderable.set_mesh(Mesh::quad(1.0, 1.0).into_shared());
        renderable.render(&mut state);
        let buffer = renderable.vertex_buffer_id();

        renderable.set_shader(sprite_shader());
        assert_eq!(renderable.dirty_flags(), DirtyFlags::SHADER);
        probe.clear_calls();
        renderable.render(&mut state);

        assert_eq!(renderable.vertex_buffer_id(), buffer);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateBuffer(_))), 0);
        renderable.dispose(&mut state);
    }

    #[test]
    fn test_vertex_data_change_uploads_in_place() {
        let (mut state, probe) = machine();
        let mesh = Mesh::quad(1.0, 1.0).into_shared();
        let mut renderable = Renderable::new();
        renderable.set_shader(sprite_shader());
        renderable.set_mesh(Arc::clone(&mesh));
        renderable.render(&mut state);
        let buffer = renderable.vertex_buffer_id().unwrap();

        mesh.write().set_attribute_data("a_uv", &[0.25; 8]);
        probe.clear_calls();
        renderable.render(&mut state);

        assert_eq!(renderable.vertex_buffer_id(), Some(buffer));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::CreateBuffer(_))), 0);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BufferData(..))), 0);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BufferSubData(..))), 2);
        assert_eq!(probe.buffer_contents(buffer).unwrap(), mesh.read().vertex_bytes());
        renderable.dispose(&mut state);
    }

    #[test]
    fn test_mesh_round_trip_matches_fresh_renderable() {
        let (mut state, probe) = machine();
        let original = Mesh::quad(1.0, 1.0).into_shared();
        let other = Mesh::quad(3.0, 0.5).into_shared();
        let shader = sprite_shader();

        let mut renderable = Renderable::new();
        renderable.set_shader(Arc::clone(&shader));
        renderable.set_mesh(Arc::clone(&original));
        renderable.render(&mut state);
        renderable.set_mesh(other);
        renderable.render(&mut state);
        renderable.set_mesh(Arc::clone(&original));
        renderable.render(&mut state);

        let mut fresh = Renderable::new();
        fresh.set_shader(shader);
        fresh.set_mesh(original);
        fresh.render(&mut state);

        let round_trip = probe.buffer_contents(renderable.vertex_buffer_id().unwrap()).unwrap();
        let expected = probe.buffer_contents(fresh.vertex_buffer_id().unwrap()).unwrap();
        assert_eq!(round_trip, expected);

        renderable.dispose(&mut state);
        fresh.dispose(&mut state);
        assert_eq!(probe.live_buffers(), 0);
    }

    #[test]
    fn test_dispose_deferred_runs_at_frame_boundary() {
        let (mut state, probe) = machine();
        let mut renderable = Renderable::new();
        renderable.set_shader(sprite_shader());
        renderable.set_mesh(Mesh::quad(1.0, 1.0).into_shared());
        renderable.render(&mut state);
        assert_eq!(probe.live_buffers(), 2);

        let queue = Arc::clone(state.task_queue());
        let ticket = renderable.dispose_deferred(&queue).unwrap();
        assert_eq!(probe.live_buffers(), 2);

        state.begin_frame();
        state.end_frame();
        assert!(ticket.is_done());
        assert_eq!(probe.live_buffers(), 0);
    }
}
