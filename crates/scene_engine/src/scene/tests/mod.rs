//! Scenario tests for the scene graph
//!
//! Each scenario drives a real [`Scene`] through update ticks and rendered
//! frames on a [`HeadlessDevice`]. Hook calls are recorded in a per-thread
//! journal so that ordering can be asserted without sharing state between
//! tests.

mod hierarchy;
mod lifecycle;

use std::cell::RefCell;
use std::sync::Arc;

use crate::context::EngineContext;
use crate::foundation::math::Mat4;
use crate::render::{DeviceProbe, HeadlessDevice, RenderStateMachine};
use crate::scene::{
    AddComponent, Component, ComponentContext, ComponentId, ComponentKind, ComponentParams, EntityId, ParamValue,
    RenderContext, Scene,
};

thread_local! {
    static JOURNAL: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

fn record(entry: String) {
    JOURNAL.with(|journal| journal.borrow_mut().push(entry));
}

/// Drain the calling thread's journal
pub(super) fn take_journal() -> Vec<String> {
    JOURNAL.with(|journal| std::mem::take(&mut *journal.borrow_mut()))
}

/// Records every hook call as `label:hook`
#[derive(Default)]
pub(super) struct Tracer {
    pub label: String,
    pub updates: u32,
    pub last_mvp: Option<Mat4>,
}

impl Component for Tracer {
    fn initialize(&mut self, _ctx: &mut ComponentContext<'_>, _params: Option<&ComponentParams>) {
        record(format!("{}:init", self.label));
    }

    fn update(&mut self, _ctx: &mut ComponentContext<'_>) {
        self.updates += 1;
        record(format!("{}:update", self.label));
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        self.last_mvp = Some(ctx.state.current_transform());
        record(format!("{}:render", self.label));
    }

    fn death(&mut self, _ctx: &mut ComponentContext<'_>) {
        record(format!("{}:death", self.label));
    }

    fn apply_override(&mut self, field: &str, value: &ParamValue) -> bool {
        match (field, value.as_str()) {
            ("label", Some(label)) => {
                self.label = label.to_string();
                true
            }
            _ => false,
        }
    }
}

impl ComponentKind for Tracer {
    const TAG: &'static str = "tracer";
}

/// Removes itself from inside its first update
#[derive(Default)]
pub(super) struct SelfRemover;

impl Component for SelfRemover {
    fn update(&mut self, ctx: &mut ComponentContext<'_>) {
        record("remover:update".to_string());
        let removed = ctx.scene.remove_component(ctx.entity, ctx.component);
        record(format!("remover:removed={removed}"));
    }

    fn death(&mut self, _ctx: &mut ComponentContext<'_>) {
        record("remover:death".to_string());
    }
}

impl ComponentKind for SelfRemover {
    const TAG: &'static str = "self_remover";
}

#[derive(Default)]
pub(super) struct Unique;

impl Component for Unique {}

impl ComponentKind for Unique {
    const TAG: &'static str = "unique";
    const SINGLETON: bool = true;
}

/// Needs a tracer on the entity or an ancestor
#[derive(Default)]
pub(super) struct Follower;

impl Component for Follower {}

impl ComponentKind for Follower {
    const TAG: &'static str = "follower";

    fn requires() -> &'static [&'static str] {
        &["tracer"]
    }
}

#[derive(Default)]
pub(super) struct ChainA;

impl Component for ChainA {}

impl ComponentKind for ChainA {
    const TAG: &'static str = "chain_a";

    fn requires() -> &'static [&'static str] {
        &["chain_b"]
    }
}

#[derive(Default)]
pub(super) struct ChainB;

impl Component for ChainB {}

impl ComponentKind for ChainB {
    const TAG: &'static str = "chain_b";

    fn requires() -> &'static [&'static str] {
        &["chain_a"]
    }
}

/// Adopts the entity named `target` from inside its first render hook
#[derive(Default)]
pub(super) struct Adopter {
    pub target: String,
    pub adopted: bool,
}

impl Component for Adopter {
    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        record("adopter:render".to_string());
        if self.adopted {
            return;
        }
        if let Some(target) = ctx.scene.find_by_name(&self.target) {
            self.adopted = ctx.scene.make_child(ctx.entity, target).is_ok_and(|changed| changed);
        }
    }

    fn apply_override(&mut self, field: &str, value: &ParamValue) -> bool {
        match (field, value.as_str()) {
            ("target", Some(target)) => {
                self.target = target.to_string();
                true
            }
            _ => false,
        }
    }
}

impl ComponentKind for Adopter {
    const TAG: &'static str = "adopter";
}

/// Context with the test components registered, bound to the calling thread
pub(super) fn context() -> Arc<EngineContext> {
    let context = EngineContext::builder()
        .register::<Tracer>()
        .register::<SelfRemover>()
        .register::<Unique>()
        .register::<Follower>()
        .register::<ChainA>()
        .register::<ChainB>()
        .register::<Adopter>()
        .build();
    context.bind_update_thread();
    context
}

pub(super) fn scene() -> Arc<Scene> {
    Scene::new("test", context())
}

pub(super) fn render_state(scene: &Scene) -> (RenderStateMachine, DeviceProbe) {
    let device = HeadlessDevice::new(8);
    let probe = device.probe();
    let state = RenderStateMachine::new(Box::new(device), Arc::clone(scene.context().gpu()));
    (state, probe)
}

pub(super) fn add_tracer(scene: &Scene, entity: EntityId, label: &str) -> ComponentId {
    let options = AddComponent::new().with_override("label", ParamValue::Text(label.to_string()));
    scene.add_component_with::<Tracer>(entity, options).unwrap()
}

/// Tick until entities and their components are committed
///
/// The first tick publishes new entities; the second reaches them and
/// publishes their components. Neither tick updates a freshly added component.
pub(super) fn settle(scene: &Scene) {
    scene.update(0.0);
    scene.update(0.0);
}
