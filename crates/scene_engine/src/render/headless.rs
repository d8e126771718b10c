//! Headless graphics device
//!
//! Implements [`GraphicsDevice`] entirely in memory. Every call is appended to
//! a shared log that a [`DeviceProbe`] can inspect after the device has been
//! moved into the render state machine, which makes it the call-count double
//! for binding tests and the backend for headless runs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::device::{
    BufferId, BufferTarget, BufferUsage, GraphicsDevice, ProgramId, TextureDescriptor, TextureId,
    UniformValue,
};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    /// `max_texture_units` query
    QueryTextureUnits,
    /// Buffer created
    CreateBuffer(BufferId),
    /// Buffer bound or unbound
    BindBuffer(BufferTarget, Option<BufferId>),
    /// Full upload of `len` bytes
    BufferData(BufferTarget, usize),
    /// Partial upload of `len` bytes at an offset
    BufferSubData(BufferTarget, usize, usize),
    /// Buffer deleted
    DeleteBuffer(BufferId),
    /// Program made current
    UseProgram(Option<ProgramId>),
    /// Program deleted
    DeleteProgram(ProgramId),
    /// Attribute array enabled
    EnableAttribute(u32),
    /// Attribute array disabled
    DisableAttribute(u32),
    /// Attribute pointer: location, components, stride, offset
    AttributePointer(u32, u32, u32, usize),
    /// Uniform written
    SetUniform(i32, UniformValue),
    /// Texture created
    CreateTexture(TextureId),
    /// Texture deleted
    DeleteTexture(TextureId),
    /// Texture unit binding changed
    BindTextureUnit(u32, Option<TextureId>),
    /// Indexed draw with index count
    DrawElements(u32),
    /// Clear color set
    SetClearColor([f32; 4]),
    /// Clear with bitmask
    Clear(u32),
}

#[derive(Debug, Default)]
struct DeviceLog {
    calls: Vec<DeviceCall>,
    buffers: HashMap<BufferId, Vec<u8>>,
    textures: HashMap<TextureId, (u32, u32)>,
    bound: HashMap<BufferTarget, BufferId>,
}

/// In-memory [`GraphicsDevice`]
pub struct HeadlessDevice {
    max_texture_units: u32,
    next_name: u32,
    log: Arc<Mutex<DeviceLog>>,
}

impl HeadlessDevice {
    /// Create a device reporting `max_texture_units` texture units
    pub fn new(max_texture_units: u32) -> Self {
        Self {
            max_texture_units,
            next_name: 1, // 0 is the "no object" name
            log: Arc::new(Mutex::new(DeviceLog::default())),
        }
    }

    /// Get a probe observing this device's call log
    pub fn probe(&self) -> DeviceProbe {
        DeviceProbe { log: Arc::clone(&self.log) }
    }

    fn next_name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    fn record(&self, call: DeviceCall) {
        log::trace!("device: {:?}", call);
        self.log.lock().calls.push(call);
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(16)
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn max_texture_units(&mut self) -> u32 {
        self.record(DeviceCall::QueryTextureUnits);
        self.max_texture_units
    }

    fn create_buffer(&mut self) -> BufferId {
        let id = BufferId(self.next_name());
        let mut log = self.log.lock();
        log.buffers.insert(id, Vec::new());
        log.calls.push(DeviceCall::CreateBuffer(id));
        id
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>) {
        let mut log = self.log.lock();
        match buffer {
            Some(id) => log.bound.insert(target, id),
            None => log.bound.remove(&target),
        };
        log.calls.push(DeviceCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], _usage: BufferUsage) {
        let mut log = self.log.lock();
        if let Some(id) = log.bound.get(&target).copied() {
            log.buffers.insert(id, data.to_vec());
        }
        log.calls.push(DeviceCall::BufferData(target, data.len()));
    }

    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]) {
        let mut log = self.log.lock();
        if let Some(id) = log.bound.get(&target).copied() {
            if let Some(contents) = log.buffers.get_mut(&id) {
                let end = offset + data.len();
                if contents.len() < end {
                    contents.resize(end, 0);
                }
                contents[offset..end].copy_from_slice(data);
            }
        }
        log.calls.push(DeviceCall::BufferSubData(target, offset, data.len()));
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        let mut log = self.log.lock();
        log.buffers.remove(&buffer);
        log.bound.retain(|_, id| *id != buffer);
        log.calls.push(DeviceCall::DeleteBuffer(buffer));
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.record(DeviceCall::UseProgram(program));
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.record(DeviceCall::DeleteProgram(program));
    }

    fn enable_vertex_attribute(&mut self, location: u32) {
        self.record(DeviceCall::EnableAttribute(location));
    }

    fn disable_vertex_attribute(&mut self, location: u32) {
        self.record(DeviceCall::DisableAttribute(location));
    }

    fn vertex_attribute_pointer(&mut self, location: u32, components: u32, stride: u32, offset: usize) {
        self.record(DeviceCall::AttributePointer(location, components, stride, offset));
    }

    fn set_uniform(&mut self, location: i32, value: UniformValue) {
        self.record(DeviceCall::SetUniform(location, value));
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> TextureId {
        let id = TextureId(self.next_name());
        let mut log = self.log.lock();
        log.textures.insert(id, (descriptor.width, descriptor.height));
        log.calls.push(DeviceCall::CreateTexture(id));
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let mut log = self.log.lock();
        log.textures.remove(&texture);
        log.calls.push(DeviceCall::DeleteTexture(texture));
    }

    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>) {
        self.record(DeviceCall::BindTextureUnit(unit, texture));
    }

    fn draw_elements(&mut self, index_count: u32) {
        self.record(DeviceCall::DrawElements(index_count));
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.record(DeviceCall::SetClearColor(color));
    }

    fn clear(&mut self, mask: u32) {
        self.record(DeviceCall::Clear(mask));
    }
}

/// Read access to a [`HeadlessDevice`] call log from any thread
#[derive(Clone)]
pub struct DeviceProbe {
    log: Arc<Mutex<DeviceLog>>,
}

impl DeviceProbe {
    /// Copy of every call recorded so far
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.log.lock().calls.clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.log.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Current contents of a live buffer
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.log.lock().buffers.get(&buffer).cloned()
    }

    /// Number of buffers that exist on the device
    pub fn live_buffers(&self) -> usize {
        self.log.lock().buffers.len()
    }

    /// Number of textures that exist on the device
    pub fn live_textures(&self) -> usize {
        self.log.lock().textures.len()
    }

    /// Forget recorded calls (object contents are kept)
    pub fn clear_calls(&self) {
        self.log.lock().calls.clear();
    }
}
