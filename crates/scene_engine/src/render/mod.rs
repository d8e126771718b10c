//! # Rendering Layer
//!
//! Binding-tracking layer between the scene graph and the raw graphics API.
//!
//! ## Architecture
//!
//! - **GraphicsDevice**: the raw, stateful API supplied by the windowing collaborator
//! - **RenderStateMachine**: authoritative record of what is bound; skips
//!   redundant state changes, owns the transform stack and texture units
//! - **GpuTaskQueue**: deferred GPU work submitted from the update thread and
//!   drained at each frame boundary
//! - **Resource handles**: vertex/index buffers, shader programs and textures
//!   with explicit lifecycles
//! - **Renderable**: a mesh paired with a shader, with cached GPU buffers
//!
//! ## Thread Model
//!
//! The state machine lives on the render thread and is only reached through
//! `&mut`. Everything the update thread needs from the GPU goes through
//! [`GpuTaskQueue`].

pub mod buffer;
pub mod camera;
pub mod deferred;
pub mod device;
pub mod headless;
pub mod mesh;
pub mod renderable;
pub mod resources;
pub mod shader;
pub mod state;
pub mod texture;

pub use buffer::{AttributeLayout, GpuBuffer, IndexBuffer, VertexBuffer, VertexLayout};
pub use camera::Camera2D;
pub use deferred::{GpuTask, GpuTaskQueue, TaskTicket};
pub use device::{
    BufferId, BufferTarget, BufferUsage, GraphicsDevice, PixelFormat, ProgramId, TextureDescriptor,
    TextureId, UniformValue,
};
pub use headless::{DeviceCall, DeviceProbe, HeadlessDevice};
pub use mesh::{Mesh, MeshAttribute, SharedMesh};
pub use renderable::{
    default_attribute_resolver, AttributeResolver, DirtyFlags, Renderable, UniformBinder, UniformCallback,
    Validity,
};
pub use resources::{ResourceCache, ResourceProvider};
pub use shader::{ShaderAttribute, ShaderProgram, ShaderUniform, UniformKind};
pub use state::{ClearMode, RenderStateMachine, RenderStats};
pub use texture::Texture;

/// Errors from the cross-thread GPU task path
///
/// Binding and resource-state problems on the render thread are not errors:
/// they are logged and the call becomes a no-op.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// A blocking GPU task was requested from the render thread
    ///
    /// The render thread is the one that drains the queue, so waiting on it
    /// from there would never return.
    #[error("Blocking GPU task requested from the render thread")]
    WouldDeadlock,

    /// The task queue was closed before the task ran
    #[error("GPU task queue is closed")]
    QueueClosed,

    /// The task panicked on the render thread
    #[error("GPU task panicked on the render thread")]
    TaskPanicked,

    /// No frame boundary drained the task in time
    #[error("Timed out waiting for the render thread")]
    Timeout,
}

/// Result type for deferred rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
