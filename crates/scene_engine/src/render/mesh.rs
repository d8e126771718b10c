//! Mesh representation for 2D geometry
//!
//! A mesh is pure CPU-side data: named float attributes (non-interleaved)
//! plus a triangle index list. It is owned by the resource provider and shared
//! with renderables as a [`SharedMesh`]; GPU buffers are built from it by
//! [`crate::render::Renderable`].
//!
//! Two revision counters let renderables pick the cheapest rebuild:
//! - `layout_revision` changes when attributes or indices are replaced
//!   (buffers must be recreated)
//! - `data_revision` changes when vertex values change in place
//!   (an upload into the existing buffer is enough)

use std::sync::Arc;

use parking_lot::RwLock;

use super::buffer::{AttributeLayout, VertexLayout};

/// Mesh shared by reference between renderables
pub type SharedMesh = Arc<RwLock<Mesh>>;

/// One named per-vertex attribute stream
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAttribute {
    name: String,
    components: u32,
    data: Vec<f32>,
}

impl MeshAttribute {
    /// Attribute name, matched against shader attribute names by the default resolver
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Float components per vertex
    pub fn components(&self) -> u32 {
        self.components
    }

    /// Raw values, `components` per vertex
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// CPU-side mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    vertex_count: usize,
    attributes: Vec<MeshAttribute>,
    indices: Vec<u32>,
    layout_revision: u64,
    data_revision: u64,
}

impl Mesh {
    /// Create an empty mesh with a fixed vertex count
    pub fn new(vertex_count: usize) -> Self {
        Self {
            vertex_count,
            attributes: Vec::new(),
            indices: Vec::new(),
            layout_revision: 0,
            data_revision: 0,
        }
    }

    /// Unit quad centred on the origin with `a_position` and `a_uv`
    pub fn quad(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        Self::new(4)
            .with_attribute("a_position", 2, vec![-hw, -hh, hw, -hh, hw, hh, -hw, hh])
            .with_attribute("a_uv", 2, vec![0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0])
            .with_indices(vec![0, 1, 2, 2, 3, 0])
    }

    /// Builder pattern: add an attribute stream
    pub fn with_attribute(mut self, name: impl Into<String>, components: u32, data: Vec<f32>) -> Self {
        self.add_attribute(name, components, data);
        self
    }

    /// Builder pattern: set the index list
    pub fn with_indices(mut self, indices: Vec<u32>) -> Self {
        self.set_indices(indices);
        self
    }

    /// Add (or replace) an attribute stream
    ///
    /// Returns `false` and leaves the mesh unchanged when the data length does
    /// not match `vertex_count * components`.
    pub fn add_attribute(&mut self, name: impl Into<String>, components: u32, data: Vec<f32>) -> bool {
        let name = name.into();
        if components == 0 || data.len() != self.vertex_count * components as usize {
            log::warn!(
                "Mesh attribute '{}' rejected: {} values for {} vertices x {} components",
                name, data.len(), self.vertex_count, components
            );
            return false;
        }

        let attribute = MeshAttribute { name, components, data };
        match self.attributes.iter_mut().find(|a| a.name == attribute.name) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        self.layout_revision += 1;
        true
    }

    /// Overwrite the values of an existing attribute in place
    ///
    /// The component count must stay the same; a mismatch is logged and ignored.
    pub fn set_attribute_data(&mut self, name: &str, data: &[f32]) -> bool {
        let vertex_count = self.vertex_count;
        let Some(attribute) = self.attributes.iter_mut().find(|a| a.name == name) else {
            log::warn!("Mesh has no attribute '{}' to update", name);
            return false;
        };

        if data.len() != vertex_count * attribute.components as usize {
            log::warn!(
                "Vertex data for '{}' has {} values, expected {} ({} components)",
                name,
                data.len(),
                vertex_count * attribute.components as usize,
                attribute.components
            );
            return false;
        }

        attribute.data.copy_from_slice(data);
        self.data_revision += 1;
        true
    }

    /// Replace the triangle index list
    ///
    /// Indices referencing vertices past `vertex_count` are rejected.
    pub fn set_indices(&mut self, indices: Vec<u32>) -> bool {
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= self.vertex_count) {
            log::warn!("Index {} out of range for {} vertices", bad, self.vertex_count);
            return false;
        }
        self.indices = indices;
        self.layout_revision += 1;
        true
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Attribute streams in declaration order
    pub fn attributes(&self) -> &[MeshAttribute] {
        &self.attributes
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&MeshAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Triangle indices
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Revision bumped by structural changes
    pub fn layout_revision(&self) -> u64 {
        self.layout_revision
    }

    /// Revision bumped by in-place vertex data changes
    pub fn data_revision(&self) -> u64 {
        self.data_revision
    }

    /// Block layout of the vertex buffer: each attribute stream stored contiguously
    pub fn vertex_layout(&self) -> VertexLayout {
        let mut offset = 0;
        let attributes = self
            .attributes
            .iter()
            .map(|a| {
                let layout = AttributeLayout {
                    name: a.name.clone(),
                    components: a.components,
                    offset,
                    stride: a.components * 4,
                };
                offset += a.data.len() * 4;
                layout
            })
            .collect();

        VertexLayout::new(self.vertex_count, attributes)
    }

    /// Vertex bytes matching [`Mesh::vertex_layout`]
    pub fn vertex_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.attributes.iter().map(|a| a.data.len() * 4).sum());
        for attribute in &self.attributes {
            bytes.extend_from_slice(bytemuck::cast_slice(&attribute.data));
        }
        bytes
    }

    /// Wrap the mesh for sharing
    pub fn into_shared(self) -> SharedMesh {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_layout() {
        let quad = Mesh::quad(2.0, 2.0);
        let layout = quad.vertex_layout();

        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.indices().len(), 6);
        assert_eq!(layout.attribute("a_position").unwrap().offset, 0);
        assert_eq!(layout.attribute("a_uv").unwrap().offset, 32);
        assert_eq!(layout.byte_len(), quad.vertex_bytes().len());
    }

    #[test]
    fn test_mismatched_component_count_is_ignored() {
        let mut mesh = Mesh::quad(1.0, 1.0);
        let before = mesh.clone();

        assert!(!mesh.set_attribute_data("a_position", &[0.0; 12]));
        assert!(!mesh.add_attribute("a_color", 4, vec![1.0; 15]));
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_revisions() {
        let mut mesh = Mesh::quad(1.0, 1.0);
        let layout = mesh.layout_revision();

        assert!(mesh.set_attribute_data("a_uv", &[0.5; 8]));
        assert_eq!(mesh.layout_revision(), layout);
        assert_eq!(mesh.data_revision(), 1);

        assert!(!mesh.set_indices(vec![0, 1, 9]));
        assert!(mesh.set_indices(vec![0, 1, 2]));
        assert_eq!(mesh.layout_revision(), layout + 1);
    }
}
