//! Graphics device abstraction
//!
//! [`GraphicsDevice`] is the raw, stateful graphics API as seen by the render
//! state machine: every call here reaches the driver. The state machine in
//! [`crate::render::state`] is the only caller and is responsible for skipping
//! redundant calls; implementations should forward blindly.
//!
//! The windowing/surface collaborator provides the concrete device (an OpenGL
//! context, a GLES surface, ...). [`crate::render::HeadlessDevice`] is an
//! in-memory implementation used by tests and headless runs.

/// Driver-side buffer object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Driver-side linked shader program name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Driver-side texture object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Binding point of a buffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Vertex,
    /// Element (index) data
    Index,
}

/// Expected update frequency of buffer contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Uploaded once, drawn many times
    Static,
    /// Re-uploaded frequently
    Dynamic,
}

/// Value written to a shader uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// Integer (also used for sampler texture units)
    Int(i32),
    /// Scalar float
    Float(f32),
    /// 2-component float vector
    Vec2([f32; 2]),
    /// 4-component float vector
    Vec4([f32; 4]),
    /// Column-major 4x4 matrix
    Mat4([[f32; 4]; 4]),
}

/// Pixel formats accepted for texture uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGBA
    Rgba8,
    /// 8-bit single channel (font atlases)
    R8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8 => 4,
            Self::R8 => 1,
        }
    }
}

/// Decoded texture data handed over by the resource provider
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `pixels`
    pub format: PixelFormat,
    /// Tightly packed pixel rows
    pub pixels: Vec<u8>,
}

impl TextureDescriptor {
    /// Create a descriptor, returning `None` when the pixel data does not match
    /// the declared size
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            log::error!(
                "Texture data size mismatch: {}x{} {:?} needs {} bytes, got {}",
                width, height, format, expected, pixels.len()
            );
            return None;
        }
        Some(Self { width, height, format, pixels })
    }

    /// A single-color RGBA texture
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba.repeat(width as usize * height as usize);
        Self { width, height, format: PixelFormat::Rgba8, pixels }
    }
}

/// Raw graphics API used by the render state machine
///
/// Implementations must be `Send` so the state machine can be built on one
/// thread and handed to the render thread; they are never shared.
pub trait GraphicsDevice: Send {
    /// Number of texture image units the platform supports
    fn max_texture_units(&mut self) -> u32;

    /// Generate a buffer object name
    fn create_buffer(&mut self) -> BufferId;

    /// Bind (or unbind with `None`) a buffer to a target
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<BufferId>);

    /// Replace the contents of the buffer bound to `target`
    fn buffer_data(&mut self, target: BufferTarget, data: &[u8], usage: BufferUsage);

    /// Overwrite part of the buffer bound to `target`
    fn buffer_sub_data(&mut self, target: BufferTarget, offset: usize, data: &[u8]);

    /// Delete a buffer object
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Make a program current (or none)
    fn use_program(&mut self, program: Option<ProgramId>);

    /// Delete a linked program
    fn delete_program(&mut self, program: ProgramId);

    /// Enable a vertex attribute array
    fn enable_vertex_attribute(&mut self, location: u32);

    /// Disable a vertex attribute array
    fn disable_vertex_attribute(&mut self, location: u32);

    /// Describe a float vertex attribute inside the bound vertex buffer
    fn vertex_attribute_pointer(&mut self, location: u32, components: u32, stride: u32, offset: usize);

    /// Write a uniform of the current program
    fn set_uniform(&mut self, location: i32, value: UniformValue);

    /// Create and upload a texture object
    fn create_texture(&mut self, descriptor: &TextureDescriptor) -> TextureId;

    /// Delete a texture object
    fn delete_texture(&mut self, texture: TextureId);

    /// Bind (or unbind) a texture to a texture image unit
    fn bind_texture_unit(&mut self, unit: u32, texture: Option<TextureId>);

    /// Draw indexed triangles from the bound vertex/index state
    fn draw_elements(&mut self, index_count: u32);

    /// Set the color used by [`GraphicsDevice::clear`]
    fn set_clear_color(&mut self, color: [f32; 4]);

    /// Clear the buffers selected by the bitmask
    fn clear(&mut self, mask: u32);
}
