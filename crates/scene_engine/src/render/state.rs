//! Render state machine
//!
//! Authoritative knowledge of what is currently bound on the graphics device.
//! Every bind/release is checked against the tracked state first, so asking
//! for the state that is already in effect issues no device call.
//!
//! The state machine is owned by the render thread. It also owns:
//! - the model transform stack used by the hierarchical render traversal
//! - the texture unit tables (unit → texture and texture → unit, always in agreement)
//! - the consumer side of the [`GpuTaskQueue`], drained in [`RenderStateMachine::begin_frame`]

use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bitflags::bitflags;

use super::buffer::{GpuBuffer, IndexBuffer};
use super::deferred::{GpuTask, GpuTaskQueue};
use super::device::{BufferId, BufferTarget, GraphicsDevice, ProgramId, TextureDescriptor, TextureId, UniformValue};
use super::shader::ShaderProgram;
use super::texture::Texture;
use crate::config::EngineConfig;
use crate::foundation::math::Mat4;
use crate::scene::Transform;

bitflags! {
    /// Buffers cleared at the frame boundary
    ///
    /// Bit values follow the conventional GL clear mask so the cached mask can
    /// be passed straight to the device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMode: u32 {
        /// Color buffer
        const COLOR = 0x0000_4000;
        /// Depth buffer
        const DEPTH = 0x0000_0100;
        /// Stencil buffer
        const STENCIL = 0x0000_0400;
    }
}

/// Per-frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Indexed draw calls issued
    pub draw_calls: u32,
    /// Bind/release requests that reached the device
    pub state_changes: u32,
    /// Bind/release requests skipped because the state was already in effect
    pub redundant_skipped: u32,
    /// Deferred tasks executed at the frame boundary
    pub tasks_executed: u32,
}

/// Tracked binding state over a [`GraphicsDevice`]
pub struct RenderStateMachine {
    device: Box<dyn GraphicsDevice>,
    tasks: Arc<GpuTaskQueue>,
    task_buffer: Vec<GpuTask>,

    vertex_buffer: Option<BufferId>,
    index_buffer: Option<BufferId>,
    program: Option<ProgramId>,
    enabled_attributes: BTreeSet<u32>,

    supported_texture_units: Option<u32>,
    texture_unit_cap: Option<u32>,
    unit_textures: Vec<Option<TextureId>>,
    texture_units: HashMap<TextureId, u32>,

    transform_stack: Vec<Mat4>,

    clear_mode: ClearMode,
    clear_mask: u32,
    clear_color: [f32; 4],
    clear_color_dirty: bool,

    frame_index: u64,
    in_frame: bool,
    stats: RenderStats,
    last_frame_stats: RenderStats,
}

impl RenderStateMachine {
    /// Create a state machine with default settings
    pub fn new(device: Box<dyn GraphicsDevice>, tasks: Arc<GpuTaskQueue>) -> Self {
        Self::with_config(device, tasks, &EngineConfig::default())
    }

    /// Create a state machine using the clear settings and texture unit cap of `config`
    pub fn with_config(device: Box<dyn GraphicsDevice>, tasks: Arc<GpuTaskQueue>, config: &EngineConfig) -> Self {
        let clear_mode = config.clear.to_clear_mode();
        Self {
            device,
            tasks,
            task_buffer: Vec::new(),
            vertex_buffer: None,
            index_buffer: None,
            program: None,
            enabled_attributes: BTreeSet::new(),
            supported_texture_units: None,
            texture_unit_cap: config.max_texture_units,
            unit_textures: Vec::new(),
            texture_units: HashMap::new(),
            transform_stack: Vec::new(),
            clear_mode,
            clear_mask: clear_mode.bits(),
            clear_color: config.clear_color,
            clear_color_dirty: true,
            frame_index: 0,
            in_frame: false,
            stats: RenderStats::default(),
            last_frame_stats: RenderStats::default(),
        }
    }

    /// Task queue drained by this state machine
    pub fn task_queue(&self) -> &Arc<GpuTaskQueue> {
        &self.tasks
    }

    pub(crate) fn device_mut(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    // ------------------------------------------------------------------
    // Frame boundary
    // ------------------------------------------------------------------

    /// Start a frame
    ///
    /// Drains the deferred task queue (swap, then execute outside the lock),
    /// clears the transform stack and clears the buffers selected by the
    /// clear mode.
    pub fn begin_frame(&mut self) {
        if self.in_frame {
            log::warn!("begin_frame called twice without end_frame (frame {})", self.frame_index);
        }
        self.tasks.bind_render_thread();
        self.stats = RenderStats::default();

        let mut tasks = std::mem::take(&mut self.task_buffer);
        let generation = self.tasks.swap_pending(&mut tasks);
        let executed = tasks.len();
        for task in tasks.drain(..) {
            if panic::catch_unwind(AssertUnwindSafe(|| task(self))).is_err() {
                log::error!("Frame {}: deferred GPU task panicked", self.frame_index);
            }
        }
        self.task_buffer = tasks;
        self.tasks.mark_completed(generation);
        if executed > 0 {
            log::debug!("Frame {}: executed {} deferred GPU tasks", self.frame_index, executed);
        }
        self.stats.tasks_executed = u32::try_from(executed).unwrap_or(u32::MAX);

        self.transform_stack.clear();

        if self.clear_color_dirty {
            self.device.set_clear_color(self.clear_color);
            self.clear_color_dirty = false;
        }
        if self.clear_mask != 0 {
            self.device.clear(self.clear_mask);
        }
        self.in_frame = true;
    }

    /// Close a frame
    ///
    /// Presentation stays with the windowing collaborator.
    pub fn end_frame(&mut self) {
        if !self.in_frame {
            log::warn!("end_frame called without begin_frame");
        }
        if !self.transform_stack.is_empty() {
            log::warn!(
                "Frame {} ended with {} transforms still pushed",
                self.frame_index,
                self.transform_stack.len()
            );
        }
        self.last_frame_stats = self.stats;
        self.frame_index += 1;
        self.in_frame = false;
    }

    /// Whether a frame is open
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Number of completed frames
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Counters of the frame in progress
    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Counters of the last completed frame
    pub fn last_frame_stats(&self) -> RenderStats {
        self.last_frame_stats
    }

    /// Select the buffers cleared at the frame boundary
    pub fn set_clear_mode(&mut self, mode: ClearMode) {
        self.clear_mode = mode;
        self.clear_mask = mode.bits();
    }

    /// Current clear mode
    pub fn clear_mode(&self) -> ClearMode {
        self.clear_mode
    }

    /// Set the clear color, applied at the next frame boundary
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        if self.clear_color != color {
            self.clear_color = color;
            self.clear_color_dirty = true;
        }
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    fn buffer_slot(&mut self, target: BufferTarget) -> &mut Option<BufferId> {
        match target {
            BufferTarget::Vertex => &mut self.vertex_buffer,
            BufferTarget::Index => &mut self.index_buffer,
        }
    }

    /// Buffer currently bound to a target
    pub fn bound_buffer(&self, target: BufferTarget) -> Option<BufferId> {
        match target {
            BufferTarget::Vertex => self.vertex_buffer,
            BufferTarget::Index => self.index_buffer,
        }
    }

    /// Whether `buffer` is the one bound to its target
    pub fn is_buffer_bound(&self, buffer: &impl GpuBuffer) -> bool {
        self.bound_buffer(buffer.target()) == Some(buffer.id())
    }

    /// Bind a buffer to its target; no-op when already bound
    pub fn bind_buffer(&mut self, buffer: &impl GpuBuffer) -> bool {
        if buffer.is_disposed() {
            log::warn!("Attempted to bind destroyed buffer {:?}", buffer.id());
            return false;
        }
        let target = buffer.target();
        if self.bound_buffer(target) == Some(buffer.id()) {
            self.stats.redundant_skipped += 1;
            return true;
        }
        *self.buffer_slot(target) = Some(buffer.id());
        self.device.bind_buffer(target, Some(buffer.id()));
        self.stats.state_changes += 1;
        true
    }

    /// Unbind a buffer; no-op when it is not the bound one
    pub fn release_buffer(&mut self, buffer: &impl GpuBuffer) -> bool {
        if buffer.is_disposed() {
            log::warn!("Attempted to release destroyed buffer {:?}", buffer.id());
            return false;
        }
        let target = buffer.target();
        if self.bound_buffer(target) != Some(buffer.id()) {
            self.stats.redundant_skipped += 1;
            return false;
        }
        *self.buffer_slot(target) = None;
        self.device.bind_buffer(target, None);
        self.stats.state_changes += 1;
        true
    }

    pub(crate) fn delete_buffer_object(&mut self, target: BufferTarget, id: BufferId) {
        if self.bound_buffer(target) == Some(id) {
            *self.buffer_slot(target) = None;
            self.device.bind_buffer(target, None);
        }
        self.device.delete_buffer(id);
    }

    // ------------------------------------------------------------------
    // Shaders
    // ------------------------------------------------------------------

    /// Program currently in use
    pub fn bound_shader(&self) -> Option<ProgramId> {
        self.program
    }

    /// Make a program current; no-op when it already is
    pub fn bind_shader(&mut self, shader: &ShaderProgram) -> bool {
        if shader.is_disposed() {
            log::warn!("Attempted to bind deleted shader '{}'", shader.name());
            return false;
        }
        if self.program == Some(shader.id()) {
            self.stats.redundant_skipped += 1;
            return true;
        }
        self.program = Some(shader.id());
        self.device.use_program(Some(shader.id()));
        self.stats.state_changes += 1;
        true
    }

    /// Stop using a program; no-op when it is not current
    pub fn release_shader(&mut self, shader: &ShaderProgram) -> bool {
        if shader.is_disposed() {
            log::warn!("Attempted to release deleted shader '{}'", shader.name());
            return false;
        }
        if self.program != Some(shader.id()) {
            self.stats.redundant_skipped += 1;
            return false;
        }
        self.program = None;
        self.device.use_program(None);
        self.stats.state_changes += 1;
        true
    }

    /// Delete a program
    ///
    /// Refused while the program is bound; release it first.
    pub fn delete_shader(&mut self, shader: &ShaderProgram) -> bool {
        if shader.is_disposed() {
            log::warn!("Shader '{}' deleted twice", shader.name());
            return false;
        }
        if self.program == Some(shader.id()) {
            log::error!("Cannot delete shader '{}' while it is bound", shader.name());
            return false;
        }
        self.device.delete_program(shader.id());
        shader.mark_disposed();
        true
    }

    /// Write a uniform of the current program
    pub fn set_uniform(&mut self, location: i32, value: UniformValue) -> bool {
        if self.program.is_none() {
            log::warn!("Uniform {} set with no shader bound", location);
            return false;
        }
        if location < 0 {
            return false;
        }
        self.device.set_uniform(location, value);
        true
    }

    // ------------------------------------------------------------------
    // Vertex attributes
    // ------------------------------------------------------------------

    /// Enable a vertex attribute array; no-op when already enabled
    pub fn enable_vertex_attribute(&mut self, location: u32) {
        if self.enabled_attributes.insert(location) {
            self.device.enable_vertex_attribute(location);
            self.stats.state_changes += 1;
        } else {
            self.stats.redundant_skipped += 1;
        }
    }

    /// Disable a vertex attribute array; no-op when not enabled
    pub fn disable_vertex_attribute(&mut self, location: u32) {
        if self.enabled_attributes.remove(&location) {
            self.device.disable_vertex_attribute(location);
            self.stats.state_changes += 1;
        } else {
            self.stats.redundant_skipped += 1;
        }
    }

    /// Enabled attribute locations
    pub fn enabled_attributes(&self) -> impl Iterator<Item = u32> + '_ {
        self.enabled_attributes.iter().copied()
    }

    /// Point an attribute at the bound vertex buffer
    pub fn vertex_attribute_pointer(&mut self, location: u32, components: u32, stride: u32, offset: usize) -> bool {
        if self.vertex_buffer.is_none() {
            log::warn!("Attribute pointer for location {} with no vertex buffer bound", location);
            return false;
        }
        self.device.vertex_attribute_pointer(location, components, stride, offset);
        true
    }

    /// Draw the triangles of an index buffer from the current state
    pub fn draw_indexed(&mut self, indices: &IndexBuffer) -> bool {
        if indices.is_disposed() {
            log::warn!("Draw with destroyed index buffer {:?}", indices.id());
            return false;
        }
        if self.program.is_none() {
            log::warn!("Draw with no shader bound");
            return false;
        }
        let was_bound = self.is_buffer_bound(indices);
        self.bind_buffer(indices);
        self.device.draw_elements(indices.index_count());
        self.stats.draw_calls += 1;
        if !was_bound {
            self.release_buffer(indices);
        }
        true
    }

    // ------------------------------------------------------------------
    // Textures
    // ------------------------------------------------------------------

    /// Number of texture units in the pool
    ///
    /// The platform limit is queried once, on first use, then capped by the
    /// configured maximum.
    pub fn supported_texture_units(&mut self) -> u32 {
        if let Some(units) = self.supported_texture_units {
            return units;
        }
        let platform = self.device.max_texture_units();
        let units = self.texture_unit_cap.map_or(platform, |cap| cap.min(platform));
        log::debug!("Texture units: {} (platform limit {})", units, platform);
        self.supported_texture_units = Some(units);
        self.unit_textures = vec![None; units as usize];
        units
    }

    /// Bind a texture to a unit
    ///
    /// With `unit == None` the first free unit is used; a texture that is
    /// already assigned keeps its unit. A requested unit that holds another
    /// texture is taken over. Returns the unit, or `None` when the texture is
    /// disposed, the unit is out of range or every unit is in use.
    pub fn assign_texture(&mut self, texture: &Texture, unit: Option<u32>) -> Option<u32> {
        if texture.is_disposed() {
            log::warn!("Attempted to assign deleted texture {:?}", texture.id());
            return None;
        }
        let units = self.supported_texture_units();

        if let Some(current) = self.texture_units.get(&texture.id()).copied() {
            if unit.is_none() || unit == Some(current) {
                self.stats.redundant_skipped += 1;
                return Some(current);
            }
        }

        let target = match unit {
            Some(requested) if requested >= units => {
                log::error!("Texture unit {} out of range (0..{})", requested, units);
                return None;
            }
            Some(requested) => requested,
            None => match self.unit_textures.iter().position(Option::is_none) {
                Some(free) => free as u32,
                None => {
                    log::error!("No free texture unit for texture {:?} ({} in use)", texture.id(), units);
                    return None;
                }
            },
        };

        // Move an already-assigned texture, evict whatever holds the target unit
        if let Some(previous) = self.texture_units.remove(&texture.id()) {
            self.unit_textures[previous as usize] = None;
            self.device.bind_texture_unit(previous, None);
        }
        if let Some(occupant) = self.unit_textures[target as usize].take() {
            log::debug!("Texture {:?} evicted from unit {}", occupant, target);
            self.texture_units.remove(&occupant);
        }

        self.unit_textures[target as usize] = Some(texture.id());
        self.texture_units.insert(texture.id(), target);
        self.device.bind_texture_unit(target, Some(texture.id()));
        self.stats.state_changes += 1;
        Some(target)
    }

    /// Free the unit a texture occupies; no-op when it has none
    pub fn unassign_texture(&mut self, texture: &Texture) -> bool {
        let Some(unit) = self.texture_units.remove(&texture.id()) else {
            self.stats.redundant_skipped += 1;
            return false;
        };
        self.unit_textures[unit as usize] = None;
        self.device.bind_texture_unit(unit, None);
        self.stats.state_changes += 1;
        true
    }

    /// Unit a texture occupies
    pub fn texture_unit_of(&self, texture: &Texture) -> Option<u32> {
        self.texture_units.get(&texture.id()).copied()
    }

    /// Texture occupying a unit
    pub fn texture_in_unit(&self, unit: u32) -> Option<TextureId> {
        self.unit_textures.get(unit as usize).copied().flatten()
    }

    /// Upload a texture
    pub fn create_texture(&mut self, descriptor: &TextureDescriptor) -> Arc<Texture> {
        let id = self.device.create_texture(descriptor);
        log::debug!("Created texture {:?} ({}x{})", id, descriptor.width, descriptor.height);
        Arc::new(Texture::from_existing(id, descriptor.width, descriptor.height))
    }

    /// Delete a texture, freeing its unit first
    pub fn delete_texture(&mut self, texture: &Texture) -> bool {
        if texture.is_disposed() {
            log::warn!("Texture {:?} deleted twice", texture.id());
            return false;
        }
        self.unassign_texture(texture);
        self.device.delete_texture(texture.id());
        texture.mark_disposed();
        true
    }

    // ------------------------------------------------------------------
    // Transform stack
    // ------------------------------------------------------------------

    /// Push `top * transform.local_matrix()` (or the local matrix alone on an empty stack)
    pub fn apply_transformation(&mut self, transform: &Transform) {
        self.push_matrix(transform.local_matrix());
    }

    /// Push `top * matrix` (or `matrix` alone on an empty stack)
    pub fn push_matrix(&mut self, matrix: Mat4) {
        let combined = match self.transform_stack.last() {
            Some(top) => top * matrix,
            None => matrix,
        };
        self.transform_stack.push(combined);
    }

    /// Pop the top transform; underflow is a no-op
    pub fn revert_transform(&mut self) -> bool {
        if self.transform_stack.pop().is_none() {
            log::warn!("revert_transform on an empty transform stack");
            return false;
        }
        true
    }

    /// Matrix on top of the stack (identity when empty)
    pub fn current_transform(&self) -> Mat4 {
        self.transform_stack.last().copied().unwrap_or_else(Mat4::identity)
    }

    /// Number of pushed transforms
    pub fn transform_depth(&self) -> usize {
        self.transform_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec2;
    use crate::render::buffer::{AttributeLayout, VertexBuffer, VertexLayout};
    use crate::render::device::BufferUsage;
    use crate::render::headless::{DeviceCall, DeviceProbe, HeadlessDevice};
    use crate::render::RenderError;
    use approx::assert_relative_eq;

    fn machine(units: u32) -> (RenderStateMachine, DeviceProbe) {
        let device = HeadlessDevice::new(units);
        let probe = device.probe();
        (RenderStateMachine::new(Box::new(device), GpuTaskQueue::new()), probe)
    }

    fn vertex_buffer(state: &mut RenderStateMachine) -> VertexBuffer {
        let layout = VertexLayout::new(
            3,
            vec![AttributeLayout { name: "a_position".into(), components: 2, offset: 0, stride: 8 }],
        );
        VertexBuffer::create(state, layout, &[0u8; 24], BufferUsage::Static)
    }

    fn texture(state: &mut RenderStateMachine) -> Arc<Texture> {
        state.create_texture(&TextureDescriptor::solid(1, 1, [255; 4]))
    }

    #[test]
    fn test_redundant_buffer_bind_is_skipped() {
        let (mut state, probe) = machine(4);
        let buffer = vertex_buffer(&mut state);
        probe.clear_calls();

        assert!(state.bind_buffer(&buffer));
        assert!(state.bind_buffer(&buffer));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BindBuffer(_, Some(_)))), 1);

        assert!(state.release_buffer(&buffer));
        assert!(!state.release_buffer(&buffer));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BindBuffer(_, None))), 1);
    }

    #[test]
    fn test_destroyed_buffer_bind_is_ignored() {
        let (mut state, probe) = machine(4);
        let mut buffer = vertex_buffer(&mut state);
        buffer.destroy(&mut state);
        probe.clear_calls();

        assert!(!state.bind_buffer(&buffer));
        assert!(probe.calls().is_empty());
        assert_eq!(probe.live_buffers(), 0);
    }

    #[test]
    fn test_redundant_shader_bind_and_bound_delete() {
        let (mut state, probe) = machine(4);
        let shader = ShaderProgram::from_linked(ProgramId(7), "flat", Vec::new(), Vec::new());

        state.bind_shader(&shader);
        state.bind_shader(&shader);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::UseProgram(Some(_)))), 1);

        assert!(!state.delete_shader(&shader));
        assert!(!shader.is_disposed());

        state.release_shader(&shader);
        assert!(state.delete_shader(&shader));
        assert!(shader.is_disposed());
        assert!(!state.bind_shader(&shader));
    }

    #[test]
    fn test_texture_units_queried_once_and_capped() {
        let device = HeadlessDevice::new(16);
        let probe = device.probe();
        let config = EngineConfig::default().with_max_texture_units(2);
        let mut state = RenderStateMachine::with_config(Box::new(device), GpuTaskQueue::new(), &config);

        assert_eq!(state.supported_texture_units(), 2);
        assert_eq!(state.supported_texture_units(), 2);
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::QueryTextureUnits)), 1);
    }

    #[test]
    fn test_texture_unit_assignment() {
        let (mut state, probe) = machine(2);
        let a = texture(&mut state);
        let b = texture(&mut state);
        let c = texture(&mut state);

        assert_eq!(state.assign_texture(&a, None), Some(0));
        assert_eq!(state.assign_texture(&a, None), Some(0));
        assert_eq!(state.assign_texture(&b, None), Some(1));
        assert_eq!(probe.count(|call| matches!(call, DeviceCall::BindTextureUnit(_, Some(_)))), 2);

        // Pool exhausted, out of range
        assert_eq!(state.assign_texture(&c, None), None);
        assert_eq!(state.assign_texture(&c, Some(2)), None);

        // Freed unit is reusable
        assert!(state.unassign_texture(&a));
        assert_eq!(state.texture_in_unit(0), None);
        assert_eq!(state.texture_unit_of(&a), None);
        assert_eq!(state.assign_texture(&c, None), Some(0));
        assert_eq!(state.texture_in_unit(0), Some(c.id()));
        assert_eq!(state.texture_unit_of(&c), Some(0));
    }

    #[test]
    fn test_requested_unit_evicts_occupant() {
        let (mut state, _probe) = machine(2);
        let a = texture(&mut state);
        let b = texture(&mut state);

        assert_eq!(state.assign_texture(&a, Some(1)), Some(1));
        assert_eq!(state.assign_texture(&b, Some(1)), Some(1));
        assert_eq!(state.texture_unit_of(&a), None);
        assert_eq!(state.texture_in_unit(1), Some(b.id()));

        // Moving b to unit 0 frees unit 1
        assert_eq!(state.assign_texture(&b, Some(0)), Some(0));
        assert_eq!(state.texture_in_unit(1), None);
    }

    #[test]
    fn test_delete_texture_frees_unit() {
        let (mut state, probe) = machine(2);
        let a = texture(&mut state);
        state.assign_texture(&a, None);

        assert!(state.delete_texture(&a));
        assert_eq!(state.texture_in_unit(0), None);
        assert_eq!(probe.live_textures(), 0);
        assert_eq!(state.assign_texture(&a, None), None);
    }

    #[test]
    fn test_transform_stack() {
        let (mut state, _probe) = machine(1);
        let mut parent = Transform::default();
        parent.set_position(Vec2::new(10.0, 0.0));
        let mut child = Transform::default();
        child.set_position(Vec2::new(0.0, 5.0));

        state.apply_transformation(&parent);
        state.apply_transformation(&child);
        let top = state.current_transform();
        assert_relative_eq!(top[(0, 3)], 10.0);
        assert_relative_eq!(top[(1, 3)], 5.0);

        assert!(state.revert_transform());
        assert!(state.revert_transform());
        assert!(!state.revert_transform());
        assert_eq!(state.current_transform(), Mat4::identity());
    }

    #[test]
    fn test_begin_frame_clears_with_cached_mask() {
        let (mut state, probe) = machine(1);
        state.set_clear_mode(ClearMode::COLOR | ClearMode::DEPTH);
        state.push_matrix(Mat4::identity());

        state.begin_frame();
        assert_eq!(state.transform_depth(), 0);
        assert!(probe.calls().contains(&DeviceCall::Clear(0x4100)));
        state.end_frame();
        assert_eq!(state.frame_index(), 1);

        probe.clear_calls();
        state.set_clear_mode(ClearMode::empty());
        state.begin_frame();
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::Clear(_))), 0);
        state.end_frame();
    }

    #[test]
    fn test_begin_frame_runs_tasks_in_order() {
        let (mut state, _probe) = machine(1);
        let queue = Arc::clone(state.task_queue());
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            let _ticket = queue.submit(Box::new(move |_: &mut RenderStateMachine| order.lock().push(i))).unwrap();
        }
        state.begin_frame();
        state.end_frame();

        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(queue.frames_drained(), 1);
        assert_eq!(state.last_frame_stats().tasks_executed, 3);
    }

    #[test]
    fn test_panicking_task_still_completes_generation() {
        let (mut state, _probe) = machine(1);
        let queue = Arc::clone(state.task_queue());
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let failing = queue.submit(Box::new(|_: &mut RenderStateMachine| panic!("task failure"))).unwrap();
        let sink = Arc::clone(&order);
        let following = queue.submit(Box::new(move |_: &mut RenderStateMachine| sink.lock().push(1))).unwrap();
        state.begin_frame();
        state.end_frame();

        assert!(failing.is_done());
        assert!(following.is_done());
        assert_eq!(*order.lock(), vec![1]);

        let waiter = Arc::clone(&queue);
        let worker = std::thread::spawn(move || waiter.run(|_: &mut RenderStateMachine| -> u32 { panic!("task failure") }));
        while !worker.is_finished() {
            state.begin_frame();
            state.end_frame();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert!(matches!(worker.join().unwrap(), Err(RenderError::TaskPanicked)));
    }
}
