//! # Scene
//!
//! Owns the entity arena and the double-buffered root list, and drives the
//! per-tick update and per-frame render traversals.
//!
//! ## Threading
//!
//! A scene is shared as `Arc<Scene>` between the update thread and the render
//! thread. Structural operations (creating/destroying entities, adding and
//! removing components, re-parenting) are accepted only on the update thread
//! recorded in the [`EngineContext`]; from any other thread they log an error
//! and do nothing. Structural changes land in pending buffers and become
//! visible to traversals at the next commit, i.e. one tick later.
//!
//! The render thread only reads committed snapshots.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use slotmap::SlotMap;

use super::buffered::BufferedList;
use super::component::{
    AddComponent, ComponentContext, ComponentHandle, ComponentId, ComponentKind, ComponentSlot,
};
use super::entity::{EntityHandle, EntityId, EntityNode};
use super::events::{EventBus, SceneEvent, SceneEventHandler, SceneEventKind};
use super::transform::Transform;
use super::{SceneError, SceneResult};
use crate::context::EngineContext;
use crate::foundation::math::Mat4;
use crate::render::{Camera2D, RenderStateMachine};

/// Retained-mode scene graph
pub struct Scene {
    name: String,
    context: Arc<EngineContext>,
    entities: RwLock<SlotMap<EntityId, EntityHandle>>,
    roots: BufferedList<EntityId>,
    camera: RwLock<Option<Camera2D>>,
    events: EventBus,
    next_component: AtomicU64,
    torn_down: AtomicBool,
}

impl Scene {
    /// Create an empty scene
    pub fn new(name: impl Into<String>, context: Arc<EngineContext>) -> Arc<Self> {
        let name = name.into();
        log::info!("Creating scene '{}'", name);
        Arc::new(Self {
            name,
            context,
            entities: RwLock::new(SlotMap::with_key()),
            roots: BufferedList::new(),
            camera: RwLock::new(None),
            events: EventBus::new(),
            next_component: AtomicU64::new(1),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine services
    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Whether [`Scene::teardown`] has run
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    pub(crate) fn node(&self, id: EntityId) -> Option<EntityHandle> {
        self.entities.read().get(id).cloned()
    }

    fn live_node(&self, id: EntityId) -> SceneResult<EntityHandle> {
        let node = self.node(id).ok_or(SceneError::UnknownEntity(id))?;
        if node.is_alive() {
            Ok(node)
        } else {
            Err(SceneError::EntityDead(id))
        }
    }

    /// Structural operations need the update thread and a live scene
    fn accepts_structural(&self, operation: &str) -> bool {
        if self.is_torn_down() {
            log::error!("{} on torn-down scene '{}' ignored", operation, self.name);
            return false;
        }
        self.context.check_update_thread(operation)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Register a handler for one kind of structural event
    pub fn register_handler(&self, kind: SceneEventKind, handler: Box<dyn SceneEventHandler>) {
        self.events.register_handler(kind, handler);
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Create a root-level entity
    ///
    /// The entity is reachable through lookups immediately and joins the
    /// update/render traversals at the next commit. Returns `None` off the
    /// update thread.
    pub fn create_entity(&self, name: impl Into<String>) -> Option<EntityId> {
        if !self.accepts_structural("create_entity") {
            return None;
        }
        let name = name.into();
        let id = self
            .entities
            .write()
            .insert_with_key(|id| Arc::new(EntityNode::new(id, name.clone())));
        self.roots.push(id);
        log::debug!("Created entity '{}' {:?} in scene '{}'", name, id, self.name);
        self.events.dispatch(SceneEvent::EntityAdded { entity: id });
        Some(id)
    }

    /// Create an entity as a child of `parent`
    pub fn create_child(&self, parent: EntityId, name: impl Into<String>) -> Option<EntityId> {
        if let Err(err) = self.live_node(parent) {
            log::error!("create_child: {}", err);
            return None;
        }
        let id = self.create_entity(name)?;
        match self.make_child(parent, id) {
            Ok(_) => Some(id),
            Err(err) => {
                log::error!("create_child: {}", err);
                None
            }
        }
    }

    /// Attach `child` under `parent`
    ///
    /// Returns `Ok(false)` when nothing changed (already attached, or called
    /// off the update thread). Unknown or dead ids and re-parenting that would
    /// make an entity its own ancestor are errors.
    pub fn make_child(&self, parent: EntityId, child: EntityId) -> SceneResult<bool> {
        if !self.accepts_structural("make_child") {
            return Ok(false);
        }
        let parent_node = self.live_node(parent)?;
        let child_node = self.live_node(child)?;

        if child_node.parent() == Some(parent) {
            return Ok(false);
        }
        if parent == child || self.is_ancestor(child, parent) {
            log::error!("Re-parenting {:?} under {:?} would create a cycle", child, parent);
            return Err(SceneError::CycleDetected { parent, child });
        }

        if let Some(old) = child_node.parent().and_then(|old| self.node(old)) {
            old.remove_child(child);
        }
        child_node.set_parent(Some(parent));
        parent_node.add_child(child);

        self.events.dispatch(SceneEvent::Reparented { entity: child, parent: Some(parent) });
        Ok(true)
    }

    /// Detach `child` from its parent, making it root-level
    pub fn unmake_child(&self, child: EntityId) -> SceneResult<bool> {
        if !self.accepts_structural("unmake_child") {
            return Ok(false);
        }
        let child_node = self.live_node(child)?;
        let Some(parent) = child_node.parent() else {
            return Ok(false);
        };
        if let Some(parent_node) = self.node(parent) {
            parent_node.remove_child(child);
        }
        child_node.set_parent(None);

        self.events.dispatch(SceneEvent::Reparented { entity: child, parent: None });
        Ok(true)
    }

    /// Whether `ancestor` is on the parent chain of `entity`
    pub fn is_ancestor(&self, ancestor: EntityId, entity: EntityId) -> bool {
        let entities = self.entities.read();
        let mut current = entities.get(entity).and_then(|n| n.parent());
        let mut depth = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            depth += 1;
            if depth > entities.len() {
                log::error!("Parent chain of {:?} does not terminate", entity);
                return false;
            }
            current = entities.get(id).and_then(|n| n.parent());
        }
        false
    }

    /// Destroy an entity and, recursively, its children
    ///
    /// Every component receives `death` in reverse addition order before the
    /// entity is flagged dead. The entity leaves the traversals at the next
    /// commit.
    pub fn destroy_entity(&self, id: EntityId) -> bool {
        if !self.accepts_structural("destroy_entity") {
            return false;
        }
        let Some(node) = self.node(id).filter(|n| n.is_alive()) else {
            log::warn!("destroy_entity: {:?} is unknown or already dead", id);
            return false;
        };

        for child in node.children() {
            self.destroy_entity(child);
        }

        for slot in node.components.pending().iter().rev() {
            self.kill_component(&node, slot);
        }
        node.components.clear();
        node.mark_dead();

        if let Some(parent) = node.parent().and_then(|p| self.node(p)) {
            parent.remove_child(id);
        }
        log::debug!("Destroyed entity '{}' {:?}", node.name(), id);
        self.events.dispatch(SceneEvent::EntityDestroyed { entity: id });
        true
    }

    /// Enable or disable an entity (and so its subtree)
    pub fn set_enabled(&self, id: EntityId, enabled: bool) -> bool {
        match self.node(id) {
            Some(node) => {
                node.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Whether an entity is enabled
    pub fn is_enabled(&self, id: EntityId) -> bool {
        self.node(id).is_some_and(|n| n.is_enabled())
    }

    /// Whether an entity exists and has not been destroyed
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.node(id).is_some_and(|n| n.is_alive())
    }

    /// Entity name
    pub fn entity_name(&self, id: EntityId) -> Option<String> {
        self.node(id).map(|n| n.name().to_string())
    }

    /// First live entity with the given name
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entities
            .read()
            .iter()
            .find(|(_, n)| n.is_alive() && n.name() == name)
            .map(|(id, _)| id)
    }

    /// Parent of an entity
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.node(id).and_then(|n| n.parent())
    }

    /// Children of an entity
    pub fn children(&self, id: EntityId) -> Vec<EntityId> {
        self.node(id).map(|n| n.children()).unwrap_or_default()
    }

    /// Entities in the arena, including dead ones awaiting the next commit
    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Committed root list (what the traversals iterate)
    pub fn committed_entities(&self) -> Vec<EntityId> {
        self.roots.snapshot().to_vec()
    }

    // ------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------

    /// Copy of an entity's transform
    pub fn transform(&self, id: EntityId) -> Option<Transform> {
        self.node(id).map(|n| n.transform().clone())
    }

    /// Edit an entity's transform in place
    pub fn with_transform<R>(&self, id: EntityId, f: impl FnOnce(&mut Transform) -> R) -> Option<R> {
        let node = self.node(id)?;
        let mut transform = node.transform();
        Some(f(&mut transform))
    }

    /// Local transformation matrix of an entity
    pub fn local_transformation_matrix(&self, id: EntityId) -> Option<Mat4> {
        self.node(id).map(|n| n.transform().local_matrix())
    }

    /// Global transformation matrix, composed up the parent chain on every call
    pub fn global_transformation_matrix(&self, id: EntityId) -> Option<Mat4> {
        let node = self.node(id)?;
        let local = node.transform().local_matrix();
        match node.parent() {
            Some(parent) => Some(self.global_transformation_matrix(parent)? * local),
            None => Some(local),
        }
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Add a component by type with default options
    pub fn add_component<T: ComponentKind>(&self, entity: EntityId) -> Option<ComponentId> {
        self.add_component_by_tag(entity, T::TAG, AddComponent::default())
    }

    /// Add a component by type with explicit options
    pub fn add_component_with<T: ComponentKind>(&self, entity: EntityId, options: AddComponent) -> Option<ComponentId> {
        self.add_component_by_tag(entity, T::TAG, options)
    }

    /// Add a component by registered type tag
    ///
    /// Required components missing from the entity and its ancestors are
    /// added first. The new component goes into the pending buffer and joins
    /// the traversals at the next commit. Returns `None` (after logging) off
    /// the update thread, for unknown tags, duplicate singletons and
    /// unsatisfiable requirements.
    pub fn add_component_by_tag(&self, entity: EntityId, tag: &str, options: AddComponent) -> Option<ComponentId> {
        if !self.accepts_structural("add_component") {
            return None;
        }
        let node = match self.live_node(entity) {
            Ok(node) => node,
            Err(err) => {
                log::error!("add_component '{}': {}", tag, err);
                return None;
            }
        };
        let mut chain = Vec::new();
        self.add_component_inner(&node, tag, options, &mut chain)
    }

    fn add_component_inner(
        &self,
        node: &EntityHandle,
        tag: &str,
        options: AddComponent,
        chain: &mut Vec<&'static str>,
    ) -> Option<ComponentId> {
        let Some(registration) = self.context.registry().get(tag).copied() else {
            log::error!("Cannot add '{}': not a registered component type", tag);
            return None;
        };
        if chain.contains(&registration.tag) {
            log::error!("Circular component requirement: {} -> {}", chain.join(" -> "), tag);
            return None;
        }
        if registration.singleton && Self::has_live_component(node, registration.tag) {
            log::error!(
                "Component '{}' is a singleton and entity '{}' already has one",
                tag,
                node.name()
            );
            return None;
        }

        chain.push(registration.tag);
        for required in registration.requires {
            if self.hierarchy_has_component(node, required) {
                continue;
            }
            log::debug!("Adding '{}' required by '{}' to '{}'", required, tag, node.name());
            if self.add_component_inner(node, required, AddComponent::default(), chain).is_none() {
                log::error!("Cannot add '{}': required component '{}' could not be added", tag, required);
                chain.pop();
                return None;
            }
        }
        chain.pop();

        let id = ComponentId(self.next_component.fetch_add(1, Ordering::Relaxed));
        let slot: ComponentHandle = Arc::new(ComponentSlot::new(id, registration.tag, options.enabled, registration.create()));
        node.components.push(Arc::clone(&slot));

        for (field, value) in &options.overrides {
            if !slot.apply_override(field, value) {
                log::warn!("Component '{}' has no overridable field '{}' for {:?}", tag, field, value);
            }
        }

        let mut ctx = ComponentContext { scene: self, entity: node.id(), component: id, delta_time: 0.0 };
        slot.initialize(&mut ctx, options.params.as_ref());

        self.events.dispatch(SceneEvent::ComponentAdded { entity: node.id(), component: id, tag: registration.tag });
        Some(id)
    }

    fn has_live_component(node: &EntityNode, tag: &str) -> bool {
        node.components.pending().iter().any(|s| s.tag() == tag && s.is_alive())
    }

    fn hierarchy_has_component(&self, node: &EntityHandle, tag: &str) -> bool {
        if Self::has_live_component(node, tag) {
            return true;
        }
        let mut current = node.parent();
        while let Some(id) = current {
            let Some(ancestor) = self.node(id) else { break };
            if Self::has_live_component(&ancestor, tag) {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }

    /// Remove a component
    ///
    /// Only components in the committed list can be removed; anything else
    /// (including components of other entities) is a no-op that neither calls
    /// `death` nor fires the removal event.
    pub fn remove_component(&self, entity: EntityId, component: ComponentId) -> bool {
        if !self.accepts_structural("remove_component") {
            return false;
        }
        let Some(node) = self.node(entity) else {
            return false;
        };
        let Some(slot) = node
            .components
            .snapshot()
            .iter()
            .find(|s| s.id() == component && s.is_alive())
            .cloned()
        else {
            log::debug!("Entity {:?} has no committed component {:?}", entity, component);
            return false;
        };

        self.kill_component(&node, &slot);
        node.components.retain(|s| s.id() != component);
        true
    }

    fn kill_component(&self, node: &EntityNode, slot: &ComponentSlot) {
        let mut ctx = ComponentContext { scene: self, entity: node.id(), component: slot.id(), delta_time: 0.0 };
        if slot.kill(&mut ctx) {
            self.events.dispatch(SceneEvent::ComponentRemoved {
                entity: node.id(),
                component: slot.id(),
                tag: slot.tag(),
            });
        }
    }

    /// Enable or disable a single component
    pub fn set_component_enabled(&self, entity: EntityId, component: ComponentId, enabled: bool) -> bool {
        let Some(node) = self.node(entity) else {
            return false;
        };
        match node.components.pending().iter().find(|s| s.id() == component) {
            Some(slot) => {
                slot.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Committed components of an entity as `(id, tag)`
    pub fn components(&self, entity: EntityId) -> Vec<(ComponentId, &'static str)> {
        self.node(entity)
            .map(|n| n.components.snapshot().iter().map(|s| (s.id(), s.tag())).collect())
            .unwrap_or_default()
    }

    /// Components of an entity including additions not yet committed
    pub fn pending_components(&self, entity: EntityId) -> Vec<(ComponentId, &'static str)> {
        self.node(entity)
            .map(|n| n.components.pending().iter().map(|s| (s.id(), s.tag())).collect())
            .unwrap_or_default()
    }

    /// Whether the entity has a live component with this tag
    pub fn has_component(&self, entity: EntityId, tag: &str) -> bool {
        self.node(entity).is_some_and(|n| Self::has_live_component(&n, tag))
    }

    fn find_slot<T: ComponentKind>(&self, entity: EntityId) -> Option<ComponentHandle> {
        let node = self.node(entity)?;
        let committed = node.components.snapshot();
        let found = committed.iter().find(|s| s.tag() == T::TAG && s.is_alive()).cloned();
        found.or_else(|| {
            node.components
                .pending()
                .into_iter()
                .find(|s| s.tag() == T::TAG && s.is_alive())
        })
    }

    /// Id of the first live component of type `T`
    pub fn component_id<T: ComponentKind>(&self, entity: EntityId) -> Option<ComponentId> {
        self.find_slot::<T>(entity).map(|s| s.id())
    }

    /// Run `f` on the first live component of type `T`
    ///
    /// Looks in the committed list first, then in additions not yet committed.
    /// Returns `None` if there is none, or if that component is currently
    /// inside one of its own hooks. On the render thread it also returns
    /// `None` while the update thread holds the component.
    pub fn with_component<T: ComponentKind, R>(&self, entity: EntityId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.find_slot::<T>(entity)?.with(self.may_block(), f)
    }

    /// Run `f` on a specific component
    pub fn with_component_id<T: ComponentKind, R>(
        &self,
        entity: EntityId,
        component: ComponentId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        let node = self.node(entity)?;
        let slot = node.components.pending().into_iter().find(|s| s.id() == component)?;
        slot.with(self.may_block(), f)
    }

    /// The render thread never waits on a component lock
    fn may_block(&self) -> bool {
        !self.context.gpu().is_render_thread()
    }

    // ------------------------------------------------------------------
    // Camera
    // ------------------------------------------------------------------

    /// Set (or clear) the camera; rendering is skipped without one
    pub fn set_camera(&self, camera: Option<Camera2D>) {
        *self.camera.write() = camera;
    }

    /// Current camera
    pub fn camera(&self) -> Option<Camera2D> {
        *self.camera.read()
    }

    /// Edit the camera in place
    pub fn with_camera<R>(&self, f: impl FnOnce(&mut Camera2D) -> R) -> Option<R> {
        self.camera.write().as_mut().map(f)
    }

    // ------------------------------------------------------------------
    // Traversals
    // ------------------------------------------------------------------

    /// Advance the scene by one tick (update thread)
    ///
    /// Updates every alive, enabled, parentless entity of the committed root
    /// list (children are reached through their parents), drops dead entities
    /// from the pending list, then commits it.
    pub fn update(&self, delta_time: f32) {
        if !self.accepts_structural("Scene::update") {
            return;
        }

        for id in self.roots.snapshot().iter() {
            let Some(node) = self.node(*id) else { continue };
            if node.parent().is_none() && node.is_active() {
                node.update(self, delta_time);
            }
        }

        let dead: Vec<EntityId> = self
            .roots
            .pending()
            .into_iter()
            .filter(|id| !self.is_alive(*id))
            .collect();
        if !dead.is_empty() {
            self.roots.retain(|id| !dead.contains(id));
        }

        if self.roots.commit() {
            self.purge_dead();
        }
    }

    /// Drop dead entities that are no longer referenced by the committed list
    fn purge_dead(&self) {
        let committed = self.roots.snapshot();
        let mut entities = self.entities.write();
        let before = entities.len();
        entities.retain(|id, node| node.is_alive() || committed.contains(&id));
        let purged = before - entities.len();
        if purged > 0 {
            log::debug!("Scene '{}': purged {} dead entities", self.name, purged);
        }
    }

    /// Render the scene (render thread)
    ///
    /// No-op without a camera. Otherwise brackets the traversal with the
    /// frame boundary calls and pushes the camera's view-projection as the
    /// base transform. Returns whether a frame was rendered.
    pub fn render(&self, state: &mut RenderStateMachine) -> bool {
        let Some(camera) = self.camera() else {
            return false;
        };

        state.begin_frame();
        state.push_matrix(camera.view_projection());
        for id in self.roots.snapshot().iter() {
            let Some(node) = self.node(*id) else { continue };
            if node.parent().is_none() {
                node.render(self, state);
            }
        }
        state.revert_transform();
        state.end_frame();
        true
    }

    /// Destroy every entity and stop accepting structural changes
    pub fn teardown(&self) {
        if self.is_torn_down() || !self.context.check_update_thread("Scene::teardown") {
            return;
        }
        log::info!("Tearing down scene '{}'", self.name);

        for id in self.roots.pending() {
            if self.node(id).is_some_and(|n| n.is_alive() && n.parent().is_none()) {
                self.destroy_entity(id);
            }
        }
        // Entities whose parent vanished without cascading
        for id in self.roots.pending() {
            if self.is_alive(id) {
                self.destroy_entity(id);
            }
        }

        self.roots.clear();
        self.roots.commit();
        self.purge_dead();
        self.events.clear();
        self.torn_down.store(true, Ordering::Release);
    }
}
