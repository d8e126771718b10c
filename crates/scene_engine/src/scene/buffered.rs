//! Double-buffered list
//!
//! Structural changes (adding or removing entities and components) are
//! written to a pending buffer while traversals iterate the committed list.
//! [`BufferedList::commit`] replaces the committed list with a copy of the
//! pending buffer under a lock scoped to this list only; readers holding an
//! earlier snapshot keep iterating it undisturbed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Committed list plus pending buffer
pub struct BufferedList<T> {
    committed: RwLock<Arc<Vec<T>>>,
    pending: Mutex<Vec<T>>,
    modified: AtomicBool,
}

impl<T: Clone> BufferedList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(Vec::new())),
            pending: Mutex::new(Vec::new()),
            modified: AtomicBool::new(false),
        }
    }

    /// Current committed list
    pub fn snapshot(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.committed.read())
    }

    /// Copy of the pending buffer
    pub fn pending(&self) -> Vec<T> {
        self.pending.lock().clone()
    }

    /// Append to the pending buffer
    pub fn push(&self, item: T) {
        let mut pending = self.pending.lock();
        pending.push(item);
        self.modified.store(true, Ordering::Release);
    }

    /// Keep only the pending items matching `keep`; returns how many were removed
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|item| keep(item));
        let removed = before - pending.len();
        if removed > 0 {
            self.modified.store(true, Ordering::Release);
        }
        removed
    }

    /// Empty the pending buffer
    pub fn clear(&self) {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            pending.clear();
            self.modified.store(true, Ordering::Release);
        }
    }

    /// Whether the pending buffer differs from the committed list
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Swap the committed list to a snapshot of the pending buffer
    ///
    /// Returns `false` (and does nothing) when nothing changed since the last commit.
    pub fn commit(&self) -> bool {
        let next = {
            let pending = self.pending.lock();
            if !self.modified.swap(false, Ordering::AcqRel) {
                return false;
            }
            pending.clone()
        };
        *self.committed.write() = Arc::new(next);
        true
    }
}

impl<T: Clone> Default for BufferedList<T> {
    fn default() -> Self {
        Self::new()
    }
}
