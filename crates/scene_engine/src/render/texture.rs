//! Texture handles

use std::sync::atomic::{AtomicBool, Ordering};

use super::device::TextureId;

/// A texture object living on the GPU
///
/// Created and deleted only on the render thread; other threads go through
/// the deferred task queue and receive an `Arc<Texture>` back.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
    disposed: AtomicBool,
}

impl Texture {
    /// Wrap a texture object the resource provider already uploaded
    pub fn from_existing(id: TextureId, width: u32, height: u32) -> Self {
        Self { id, width, height, disposed: AtomicBool::new(false) }
    }

    /// Driver object name
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the driver object has been deleted
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}
