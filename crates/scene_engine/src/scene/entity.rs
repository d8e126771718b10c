//! Entities and their per-frame traversal
//!
//! Entities live in the scene's arena and refer to each other by
//! [`EntityId`]: the parent is stored as an id and the children as an id
//! list, so there are no reference cycles to manage.
//!
//! Per-entity state machine: `Disabled` ⇄ `Enabled-Alive` → `Dead` (terminal).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::buffered::BufferedList;
use super::component::{ComponentContext, ComponentHandle, RenderContext};
use super::scene::Scene;
use super::transform::Transform;
use crate::render::RenderStateMachine;

slotmap::new_key_type! {
    /// Stable arena id of an entity
    pub struct EntityId;
}

/// One node of the scene graph
pub(crate) struct EntityNode {
    id: EntityId,
    name: String,
    alive: AtomicBool,
    enabled: AtomicBool,
    parent: Mutex<Option<EntityId>>,
    children: RwLock<Vec<EntityId>>,
    transform: Mutex<Transform>,
    pub(crate) components: BufferedList<ComponentHandle>,
}

impl EntityNode {
    pub(crate) fn new(id: EntityId, name: String) -> Self {
        Self {
            id,
            name,
            alive: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            parent: Mutex::new(None),
            children: RwLock::new(Vec::new()),
            transform: Mutex::new(Transform::default()),
            components: BufferedList::new(),
        }
    }

    pub(crate) fn id(&self) -> EntityId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Enabled and alive
    pub(crate) fn is_active(&self) -> bool {
        self.is_enabled() && self.is_alive()
    }

    pub(crate) fn parent(&self) -> Option<EntityId> {
        *self.parent.lock()
    }

    pub(crate) fn set_parent(&self, parent: Option<EntityId>) {
        *self.parent.lock() = parent;
    }

    pub(crate) fn children(&self) -> Vec<EntityId> {
        self.children.read().clone()
    }

    pub(crate) fn add_child(&self, child: EntityId) {
        let mut children = self.children.write();
        if !children.contains(&child) {
            children.push(child);
        }
    }

    pub(crate) fn remove_child(&self, child: EntityId) {
        self.children.write().retain(|c| *c != child);
    }

    pub(crate) fn transform(&self) -> parking_lot::MutexGuard<'_, Transform> {
        self.transform.lock()
    }

    /// Update this entity and its subtree
    ///
    /// Iterates the committed component list, then commits pending component
    /// changes, then recurses into a snapshot of the children taken before any
    /// component ran.
    pub(crate) fn update(&self, scene: &Scene, delta_time: f32) {
        if !self.is_active() {
            return;
        }
        let children = self.children();

        for slot in self.components.snapshot().iter() {
            if !self.is_active() {
                break;
            }
            if slot.is_alive() && slot.is_enabled() {
                let mut ctx = ComponentContext {
                    scene,
                    entity: self.id,
                    component: slot.id(),
                    delta_time,
                };
                slot.update(&mut ctx);
            }
        }

        if self.components.commit() {
            log::trace!("Entity '{}' committed component changes", self.name);
        }

        for child in children {
            match scene.node(child) {
                Some(node) if node.parent() == Some(self.id) => node.update(scene, delta_time),
                _ => {}
            }
        }
    }

    /// Render this entity and its subtree
    ///
    /// Pushes the local transform around the subtree. Never commits buffers.
    pub(crate) fn render(&self, scene: &Scene, state: &mut RenderStateMachine) {
        if !self.is_active() {
            return;
        }
        {
            let transform = self.transform();
            state.apply_transformation(&transform);
        }

        let children = self.children();
        for slot in self.components.snapshot().iter() {
            if slot.is_alive() && slot.is_enabled() {
                let mut ctx = RenderContext { scene, entity: self.id, state: &mut *state };
                slot.render(&mut ctx);
            }
        }

        for child in children {
            match scene.node(child) {
                Some(node) if node.parent() == Some(self.id) => node.render(scene, state),
                _ => {}
            }
        }

        state.revert_transform();
    }
}

pub(crate) type EntityHandle = Arc<EntityNode>;
