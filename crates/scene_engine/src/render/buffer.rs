//! GPU buffer handles
//!
//! Vertex and index buffers have an explicit create / bind / update / destroy
//! lifecycle. They never bind themselves behind the state machine's back:
//! every upload goes through [`RenderStateMachine::bind_buffer`] and restores
//! the previous binding afterwards.

use super::device::{BufferId, BufferTarget, BufferUsage};
use super::state::RenderStateMachine;

/// Placement of one attribute stream inside a vertex buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeLayout {
    /// Mesh attribute name
    pub name: String,
    /// Float components per vertex
    pub components: u32,
    /// Byte offset of the first vertex
    pub offset: usize,
    /// Bytes between consecutive vertices
    pub stride: u32,
}

/// Layout of a vertex buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    vertex_count: usize,
    attributes: Vec<AttributeLayout>,
}

impl VertexLayout {
    /// Create a layout
    pub fn new(vertex_count: usize, attributes: Vec<AttributeLayout>) -> Self {
        Self { vertex_count, attributes }
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Attribute placements
    pub fn attributes(&self) -> &[AttributeLayout] {
        &self.attributes
    }

    /// Look up an attribute placement by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeLayout> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Total size in bytes
    pub fn byte_len(&self) -> usize {
        self.attributes
            .iter()
            .map(|a| self.vertex_count * a.components as usize * 4)
            .sum()
    }
}

/// Common view of GPU buffers for the state machine
pub trait GpuBuffer {
    /// Driver object name
    fn id(&self) -> BufferId;
    /// Binding point
    fn target(&self) -> BufferTarget;
    /// Whether [`destroy`](VertexBuffer::destroy) has been called
    fn is_disposed(&self) -> bool;
}

/// Vertex attribute buffer
#[derive(Debug)]
pub struct VertexBuffer {
    id: BufferId,
    layout: VertexLayout,
    usage: BufferUsage,
    disposed: bool,
}

impl VertexBuffer {
    /// Create a buffer and upload its initial contents
    pub fn create(state: &mut RenderStateMachine, layout: VertexLayout, data: &[u8], usage: BufferUsage) -> Self {
        let id = state.device_mut().create_buffer();
        let buffer = Self { id, layout, usage, disposed: false };
        buffer.upload(state, data);
        buffer
    }

    /// Replace the whole contents; the byte length must match the layout
    pub fn upload(&self, state: &mut RenderStateMachine, data: &[u8]) -> bool {
        if self.disposed {
            log::warn!("Upload into destroyed vertex buffer {:?} ignored", self.id);
            return false;
        }
        if data.len() != self.layout.byte_len() {
            log::warn!(
                "Vertex upload of {} bytes does not match layout size {} for buffer {:?}",
                data.len(),
                self.layout.byte_len(),
                self.id
            );
            return false;
        }

        let was_bound = state.is_buffer_bound(self);
        state.bind_buffer(self);
        state.device_mut().buffer_data(BufferTarget::Vertex, data, self.usage);
        if !was_bound {
            state.release_buffer(self);
        }
        true
    }

    /// Overwrite one attribute stream in place
    ///
    /// The value count must be `vertex_count * components` of that attribute.
    pub fn set_attribute_data(&self, state: &mut RenderStateMachine, name: &str, values: &[f32]) -> bool {
        if self.disposed {
            log::warn!("Attribute update on destroyed vertex buffer {:?} ignored", self.id);
            return false;
        }
        let Some(attribute) = self.layout.attribute(name) else {
            log::warn!("Vertex buffer {:?} has no attribute '{}'", self.id, name);
            return false;
        };
        let expected = self.layout.vertex_count() * attribute.components as usize;
        if values.len() != expected {
            log::warn!(
                "Attribute '{}' update has {} values, expected {} ({} components)",
                name, values.len(), expected, attribute.components
            );
            return false;
        }

        let was_bound = state.is_buffer_bound(self);
        state.bind_buffer(self);
        state
            .device_mut()
            .buffer_sub_data(BufferTarget::Vertex, attribute.offset, bytemuck::cast_slice(values));
        if !was_bound {
            state.release_buffer(self);
        }
        true
    }

    /// Layout the buffer was created with
    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    /// Delete the driver object; later binds are warned about and ignored
    pub fn destroy(&mut self, state: &mut RenderStateMachine) {
        if self.disposed {
            log::warn!("Vertex buffer {:?} destroyed twice", self.id);
            return;
        }
        state.delete_buffer_object(BufferTarget::Vertex, self.id);
        self.disposed = true;
    }
}

impl GpuBuffer for VertexBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn target(&self) -> BufferTarget {
        BufferTarget::Vertex
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Triangle index buffer
#[derive(Debug)]
pub struct IndexBuffer {
    id: BufferId,
    index_count: u32,
    disposed: bool,
}

impl IndexBuffer {
    /// Create a buffer and upload the indices
    pub fn create(state: &mut RenderStateMachine, indices: &[u32]) -> Self {
        let id = state.device_mut().create_buffer();
        let mut buffer = Self { id, index_count: 0, disposed: false };
        buffer.upload(state, indices);
        buffer
    }

    /// Replace the indices
    pub fn upload(&mut self, state: &mut RenderStateMachine, indices: &[u32]) -> bool {
        if self.disposed {
            log::warn!("Upload into destroyed index buffer {:?} ignored", self.id);
            return false;
        }
        let Ok(count) = u32::try_from(indices.len()) else {
            log::warn!("Index buffer {:?}: {} indices exceed u32 range", self.id, indices.len());
            return false;
        };

        let was_bound = state.is_buffer_bound(self);
        state.bind_buffer(self);
        state
            .device_mut()
            .buffer_data(BufferTarget::Index, bytemuck::cast_slice(indices), BufferUsage::Static);
        if !was_bound {
            state.release_buffer(self);
        }
        self.index_count = count;
        true
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Delete the driver object
    pub fn destroy(&mut self, state: &mut RenderStateMachine) {
        if self.disposed {
            log::warn!("Index buffer {:?} destroyed twice", self.id);
            return;
        }
        state.delete_buffer_object(BufferTarget::Index, self.id);
        self.disposed = true;
    }
}

impl GpuBuffer for IndexBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn target(&self) -> BufferTarget {
        BufferTarget::Index
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::deferred::GpuTaskQueue;
    use crate::render::headless::{DeviceCall, HeadlessDevice};

    fn two_stream_layout() -> VertexLayout {
        VertexLayout::new(
            3,
            vec![
                AttributeLayout { name: "a_position".into(), components: 2, offset: 0, stride: 8 },
                AttributeLayout { name: "a_uv".into(), components: 2, offset: 24, stride: 8 },
            ],
        )
    }

    #[test]
    fn test_set_attribute_data_writes_one_stream() {
        let device = HeadlessDevice::new(1);
        let probe = device.probe();
        let mut state = RenderStateMachine::new(Box::new(device), GpuTaskQueue::new());
        let buffer = VertexBuffer::create(&mut state, two_stream_layout(), &[0u8; 48], BufferUsage::Dynamic);

        assert!(buffer.set_attribute_data(&mut state, "a_uv", &[1.0; 6]));
        assert!(!state.is_buffer_bound(&buffer));

        let contents = probe.buffer_contents(buffer.id()).unwrap();
        assert_eq!(&contents[..24], &[0u8; 24]);
        assert_eq!(&contents[24..], bytemuck::cast_slice::<f32, u8>(&[1.0; 6]));
    }

    #[test]
    fn test_set_attribute_data_rejects_mismatch() {
        let device = HeadlessDevice::new(1);
        let probe = device.probe();
        let mut state = RenderStateMachine::new(Box::new(device), GpuTaskQueue::new());
        let mut buffer = VertexBuffer::create(&mut state, two_stream_layout(), &[0u8; 48], BufferUsage::Dynamic);
        probe.clear_calls();

        // Three components per vertex against a two-component stream
        assert!(!buffer.set_attribute_data(&mut state, "a_uv", &[1.0; 9]));
        assert!(!buffer.set_attribute_data(&mut state, "a_normal", &[1.0; 6]));
        assert_eq!(probe.count(|c| matches!(c, DeviceCall::BufferSubData(..))), 0);
        assert_eq!(probe.buffer_contents(buffer.id()).unwrap(), vec![0u8; 48]);

        buffer.destroy(&mut state);
        assert!(!buffer.set_attribute_data(&mut state, "a_uv", &[1.0; 6]));
    }
}
