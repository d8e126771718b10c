//! Components
//!
//! A component is a behavior or rendering unit attached to exactly one
//! entity. Components are constructed through a [`ComponentRegistry`]: a
//! factory table keyed by type tag, built once at startup. The registration
//! also carries the typed metadata (singleton, required components) that
//! [`crate::scene::Scene::add_component_by_tag`] checks.
//!
//! ## Lifecycle
//!
//! `factory()` → field overrides → `initialize` (exactly once) → `update` /
//! `render` while active → `death` (exactly once). A component that removes
//! itself from inside one of its own hooks has `death` deferred until the
//! hook returns.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};

use super::entity::EntityId;
use super::scene::Scene;
use crate::context::EngineContext;
use crate::foundation::math::Vec2;
use crate::render::{GpuTaskQueue, RenderStateMachine, ResourceProvider};

/// Unique id of an attached component within a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u64);

/// Downcasting support for components
pub trait AsAny {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behavior attached to an entity
///
/// Every hook has an empty default so components implement only what they use.
pub trait Component: AsAny + Send {
    /// Called once after construction and field overrides
    ///
    /// `params` is `Some` when the caller supplied initialization parameters.
    fn initialize(&mut self, _ctx: &mut ComponentContext<'_>, _params: Option<&ComponentParams>) {}

    /// Per-tick update while active (update thread)
    fn update(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Per-frame render while active (render thread)
    fn render(&mut self, _ctx: &mut RenderContext<'_>) {}

    /// Called once before removal
    fn death(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Apply a named field override before `initialize`
    ///
    /// Returns `false` for unknown fields or mismatched value types.
    fn apply_override(&mut self, _field: &str, _value: &ParamValue) -> bool {
        false
    }
}

/// Static registration data of a concrete component type
pub trait ComponentKind: Component + Default + 'static {
    /// Type tag used by the factory table and scene descriptions
    const TAG: &'static str;

    /// At most one instance per entity
    const SINGLETON: bool = false;

    /// Tags of components that must be present on the entity (or an ancestor)
    ///
    /// Missing ones are added automatically, before this component.
    fn requires() -> &'static [&'static str] {
        &[]
    }
}

fn make_component<T: ComponentKind>() -> Box<dyn Component> {
    Box::new(T::default())
}

/// Factory table entry
#[derive(Clone, Copy)]
pub struct ComponentRegistration {
    /// Type tag
    pub tag: &'static str,
    /// At most one instance per entity
    pub singleton: bool,
    /// Required component tags
    pub requires: &'static [&'static str],
    factory: fn() -> Box<dyn Component>,
}

impl ComponentRegistration {
    /// Construct a default instance
    pub fn create(&self) -> Box<dyn Component> {
        (self.factory)()
    }
}

impl std::fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("tag", &self.tag)
            .field("singleton", &self.singleton)
            .field("requires", &self.requires)
            .finish()
    }
}

/// Factory table keyed by component type tag
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
    entries: HashMap<&'static str, ComponentRegistration>,
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the engine's built-in components
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::components::register_builtin(&mut registry);
        registry
    }

    /// Register a component type
    pub fn register<T: ComponentKind>(&mut self) -> &mut Self {
        let registration = ComponentRegistration {
            tag: T::TAG,
            singleton: T::SINGLETON,
            requires: T::requires(),
            factory: make_component::<T>,
        };
        if self.entries.insert(T::TAG, registration).is_some() {
            log::warn!("Component type '{}' registered twice", T::TAG);
        }
        self
    }

    /// Look up a registration
    pub fn get(&self, tag: &str) -> Option<&ComponentRegistration> {
        self.entries.get(tag)
    }

    /// Whether a tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    /// Registered tags, sorted
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.entries.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

/// Value of an initialization parameter or field override
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Text(String),
    /// List of numbers (vectors, colors)
    List(Vec<f64>),
}

impl ParamValue {
    /// Numeric value as `f32`
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Int(v) => Some(*v as f32),
            Self::Float(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Two-element list as a vector
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            Self::List(v) if v.len() == 2 => Some(Vec2::new(v[0] as f32, v[1] as f32)),
            _ => None,
        }
    }

    /// Four-element list as an RGBA color
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Self::List(v) if v.len() == 4 => Some([v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32]),
            _ => None,
        }
    }
}

/// Named initialization parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentParams(BTreeMap<String, ParamValue>);

impl ComponentParams {
    /// Empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: add a parameter
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Raw value
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// Numeric parameter
    pub fn get_f32(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(ParamValue::as_f32)
    }

    /// Boolean parameter
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    /// String parameter
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Vector parameter
    pub fn get_vec2(&self, name: &str) -> Option<Vec2> {
        self.get(name).and_then(ParamValue::as_vec2)
    }

    /// Color parameter
    pub fn get_color(&self, name: &str) -> Option<[f32; 4]> {
        self.get(name).and_then(ParamValue::as_color)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no parameters
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Options of an add-component call
///
/// Field overrides replace post-construction field injection; they are
/// applied in order before `initialize`.
#[derive(Debug, Clone)]
pub struct AddComponent {
    pub(crate) overrides: Vec<(String, ParamValue)>,
    pub(crate) params: Option<ComponentParams>,
    pub(crate) enabled: bool,
}

impl Default for AddComponent {
    fn default() -> Self {
        Self { overrides: Vec::new(), params: None, enabled: true }
    }
}

impl AddComponent {
    /// Default options: enabled, no overrides, parameterless `initialize`
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: override a field
    pub fn with_override(mut self, field: impl Into<String>, value: ParamValue) -> Self {
        self.overrides.push((field.into(), value));
        self
    }

    /// Builder pattern: call `initialize` with parameters
    pub fn with_params(mut self, params: ComponentParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Builder pattern: start disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// What an update-thread hook can reach
pub struct ComponentContext<'a> {
    /// Scene the owning entity lives in
    pub scene: &'a Scene,
    /// Owning entity
    pub entity: EntityId,
    /// This component
    pub component: ComponentId,
    /// Seconds since the previous tick (0 outside `update`)
    pub delta_time: f32,
}

impl ComponentContext<'_> {
    /// Engine services
    pub fn engine(&self) -> &Arc<EngineContext> {
        self.scene.context()
    }

    /// Deferred GPU task queue
    pub fn gpu(&self) -> &Arc<GpuTaskQueue> {
        self.scene.context().gpu()
    }

    /// Resource provider
    pub fn resources(&self) -> &dyn ResourceProvider {
        self.scene.context().resources()
    }
}

/// What a render-thread hook can reach
pub struct RenderContext<'a> {
    /// Scene the owning entity lives in
    pub scene: &'a Scene,
    /// Owning entity
    pub entity: EntityId,
    /// Render state machine, top of stack holds this entity's model-view-projection
    pub state: &'a mut RenderStateMachine,
}

const ALIVE: u8 = 0;
const DEATH_PENDING: u8 = 1;
const DEAD: u8 = 2;

/// A component attached to an entity
///
/// The component sits behind a re-entrant lock so that the thread running one
/// of its hooks can still reach the scene (and this slot) without deadlocking;
/// the inner `RefCell` detects that case.
pub(crate) struct ComponentSlot {
    id: ComponentId,
    tag: &'static str,
    enabled: AtomicBool,
    lifecycle: AtomicU8,
    component: ReentrantMutex<RefCell<Box<dyn Component>>>,
}

impl ComponentSlot {
    pub(crate) fn new(id: ComponentId, tag: &'static str, enabled: bool, component: Box<dyn Component>) -> Self {
        Self {
            id,
            tag,
            enabled: AtomicBool::new(enabled),
            lifecycle: AtomicU8::new(ALIVE),
            component: ReentrantMutex::new(RefCell::new(component)),
        }
    }

    pub(crate) fn id(&self) -> ComponentId {
        self.id
    }

    pub(crate) fn tag(&self) -> &'static str {
        self.tag
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) == ALIVE
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Run an update-thread hook, then a death deferred from inside it
    fn invoke(&self, ctx: &mut ComponentContext<'_>, hook: impl FnOnce(&mut dyn Component, &mut ComponentContext<'_>)) {
        let guard = self.component.lock();
        {
            let Ok(mut component) = guard.try_borrow_mut() else {
                log::error!("Component '{}' re-entered its own hook", self.tag);
                return;
            };
            hook(&mut **component, ctx);
        }
        if self
            .lifecycle
            .compare_exchange(DEATH_PENDING, DEAD, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            guard.borrow_mut().death(ctx);
        }
    }

    pub(crate) fn initialize(&self, ctx: &mut ComponentContext<'_>, params: Option<&ComponentParams>) {
        self.invoke(ctx, |component, ctx| component.initialize(ctx, params));
    }

    pub(crate) fn update(&self, ctx: &mut ComponentContext<'_>) {
        self.invoke(ctx, |component, ctx| component.update(ctx));
    }

    /// Run the render hook, skipped for this frame while the update thread
    /// holds the component
    pub(crate) fn render(&self, ctx: &mut RenderContext<'_>) {
        let Some(guard) = self.component.try_lock() else {
            log::trace!("Component '{}' busy on the update thread, not rendered this frame", self.tag);
            return;
        };
        let Ok(mut component) = guard.try_borrow_mut() else {
            log::error!("Component '{}' re-entered from its own render hook", self.tag);
            return;
        };
        component.render(ctx);
    }

    pub(crate) fn apply_override(&self, field: &str, value: &ParamValue) -> bool {
        let guard = self.component.lock();
        let applied = guard.borrow_mut().apply_override(field, value);
        applied
    }

    /// Run `death` exactly once
    ///
    /// When the component is inside one of its own hooks, `death` runs as
    /// soon as that hook returns. Returns `false` if the component was already
    /// dying.
    pub(crate) fn kill(&self, ctx: &mut ComponentContext<'_>) -> bool {
        let guard = self.component.lock();
        let borrowed = guard.try_borrow_mut();
        let next = if borrowed.is_ok() { DEAD } else { DEATH_PENDING };
        if self
            .lifecycle
            .compare_exchange(ALIVE, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Ok(mut component) = borrowed {
            component.death(ctx);
        }
        true
    }

    /// Run `f` on the concrete component; `None` on type mismatch or when
    /// the component is inside one of its own hooks
    ///
    /// With `wait` false the call gives up instead of blocking when another
    /// thread holds the component.
    pub(crate) fn with<T: Component + 'static, R>(&self, wait: bool, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let guard = if wait {
            self.component.lock()
        } else {
            let Some(guard) = self.component.try_lock() else {
                log::trace!("Component '{}' held by another thread", self.tag);
                return None;
            };
            guard
        };
        let Ok(mut component) = guard.try_borrow_mut() else {
            log::debug!("Component '{}' is busy in its own hook", self.tag);
            return None;
        };
        let component: &mut dyn Component = &mut **component;
        component.as_any_mut().downcast_mut::<T>().map(f)
    }
}

/// Shared handle to a slot
pub(crate) type ComponentHandle = Arc<ComponentSlot>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Marker;

    impl Component for Marker {}

    impl ComponentKind for Marker {
        const TAG: &'static str = "marker";
        const SINGLETON: bool = true;
    }

    #[test]
    fn test_registry() {
        let mut registry = ComponentRegistry::new();
        registry.register::<Marker>();

        let registration = registry.get("marker").unwrap();
        assert!(registration.singleton);
        assert!(registration.requires.is_empty());
        assert!(registration.create().as_ref().as_any().is::<Marker>());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_non_waiting_lookup_gives_up_on_held_component() {
        let slot = Arc::new(ComponentSlot::new(ComponentId(1), Marker::TAG, true, Box::new(Marker)));
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                let _guard = slot.component.lock();
                held_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
        };
        held_rx.recv().unwrap();

        assert_eq!(slot.with(false, |_: &mut Marker| ()), None);
        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(slot.with(true, |_: &mut Marker| ()), Some(()));
    }

    #[test]
    fn test_param_values_from_ron() {
        let params: ComponentParams =
            ron::from_str(r#"{"speed": 90, "scale": 1.5, "tint": [1.0, 0.5, 0.0, 1.0], "name": "ship", "visible": true}"#)
                .unwrap();

        assert_eq!(params.get_f32("speed"), Some(90.0));
        assert_eq!(params.get_f32("scale"), Some(1.5));
        assert_eq!(params.get_color("tint"), Some([1.0, 0.5, 0.0, 1.0]));
        assert_eq!(params.get_str("name"), Some("ship"));
        assert_eq!(params.get_bool("visible"), Some(true));
        assert_eq!(params.get_vec2("tint"), None);
    }

    #[test]
    fn test_param_values_from_toml() {
        let params: ComponentParams = toml::from_str("offset = [2, 3]\nspeed = 1.25\n").unwrap();
        assert_eq!(params.get_vec2("offset"), Some(Vec2::new(2.0, 3.0)));
        assert_eq!(params.get_f32("speed"), Some(1.25));
    }
}
