//! Component lifecycle: add, remove, death and registration metadata

use super::*;
use crate::components::Rotator;
use crate::scene::{SceneEvent, SceneEventKind};
use approx::assert_relative_eq;
use parking_lot::Mutex;

fn count_removals(scene: &Scene) -> Arc<Mutex<usize>> {
    let removed = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&removed);
    scene.register_handler(
        SceneEventKind::ComponentRemoved,
        Box::new(move |_: &SceneEvent| {
            *sink.lock() += 1;
            false
        }),
    );
    removed
}

#[test]
fn test_removing_foreign_component_is_noop() {
    let scene = scene();
    let owner = scene.create_entity("owner").unwrap();
    let other = scene.create_entity("other").unwrap();
    let owned = add_tracer(&scene, owner, "owned");
    add_tracer(&scene, other, "other");
    settle(&scene);
    let removed = count_removals(&scene);
    take_journal();

    assert!(!scene.remove_component(other, owned));
    assert!(take_journal().is_empty());
    assert_eq!(*removed.lock(), 0);
    assert_eq!(scene.components(owner).len(), 1);
    assert_eq!(scene.components(other).len(), 1);
}

#[test]
fn test_removing_uncommitted_component_is_noop() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();
    settle(&scene);
    let fresh = add_tracer(&scene, entity, "fresh");
    let removed = count_removals(&scene);
    take_journal();

    assert!(!scene.remove_component(entity, fresh));
    assert!(take_journal().is_empty());
    assert_eq!(*removed.lock(), 0);
    assert_eq!(scene.pending_components(entity).len(), 1);
}

#[test]
fn test_remove_component_runs_death_once() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();
    let doomed = add_tracer(&scene, entity, "doomed");
    settle(&scene);
    let removed = count_removals(&scene);
    take_journal();

    assert!(scene.remove_component(entity, doomed));
    assert!(!scene.remove_component(entity, doomed));
    assert_eq!(take_journal(), vec!["doomed:death"]);
    assert_eq!(*removed.lock(), 1);
    assert!(!scene.has_component(entity, "tracer"));

    // Committed list still holds it (dead) until the entity's next update
    scene.update(0.0);
    assert!(take_journal().is_empty());
    assert!(scene.components(entity).is_empty());
}

#[test]
fn test_self_removal_defers_death_until_hook_returns() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();
    scene.add_component::<SelfRemover>(entity).unwrap();
    settle(&scene);
    let removed = count_removals(&scene);
    take_journal();

    scene.update(0.0);
    assert_eq!(take_journal(), vec!["remover:update", "remover:removed=true", "remover:death"]);
    assert_eq!(*removed.lock(), 1);

    scene.update(0.0);
    assert!(take_journal().is_empty());
    assert!(scene.components(entity).is_empty());
}

#[test]
fn test_singleton_rejects_duplicate() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();

    assert!(scene.add_component::<Unique>(entity).is_some());
    assert!(scene.add_component::<Unique>(entity).is_none());
    assert_eq!(scene.pending_components(entity).len(), 1);

    // Another entity may have its own
    let other = scene.create_entity("other").unwrap();
    assert!(scene.add_component::<Unique>(other).is_some());
}

#[test]
fn test_required_component_added_first() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();

    scene.add_component::<Follower>(entity).unwrap();
    let tags: Vec<_> = scene.pending_components(entity).into_iter().map(|(_, tag)| tag).collect();
    assert_eq!(tags, vec!["tracer", "follower"]);
}

#[test]
fn test_requirement_satisfied_by_ancestor() {
    let scene = scene();
    let parent = scene.create_entity("parent").unwrap();
    let child = scene.create_child(parent, "child").unwrap();
    add_tracer(&scene, parent, "p");

    scene.add_component::<Follower>(child).unwrap();
    let tags: Vec<_> = scene.pending_components(child).into_iter().map(|(_, tag)| tag).collect();
    assert_eq!(tags, vec!["follower"]);
}

#[test]
fn test_circular_requirement_is_rejected() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();

    assert!(scene.add_component::<ChainA>(entity).is_none());
    assert!(scene.pending_components(entity).is_empty());
}

#[test]
fn test_unknown_tag_is_rejected() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();
    assert!(scene.add_component_by_tag(entity, "no_such_component", AddComponent::new()).is_none());
}

#[test]
fn test_overrides_and_params_reach_component() {
    let scene = scene();
    let fast = scene.create_entity("fast").unwrap();
    let slow = scene.create_entity("slow").unwrap();

    let options = AddComponent::new().with_override("speed", ParamValue::Float(2.0));
    scene.add_component_with::<Rotator>(fast, options).unwrap();
    let params = ComponentParams::new().with("degrees_per_second", ParamValue::Int(180));
    scene.add_component_with::<Rotator>(slow, AddComponent::new().with_params(params)).unwrap();

    // Visible before the commit
    assert_eq!(scene.with_component::<Rotator, _>(fast, |r| r.speed), Some(2.0));
    let speed = scene.with_component::<Rotator, _>(slow, |r| r.speed).unwrap();
    assert_relative_eq!(speed, std::f32::consts::PI, epsilon = 1e-6);
}

#[test]
fn test_with_component_id_downcasts() {
    let scene = scene();
    let entity = scene.create_entity("ship").unwrap();
    let tracer = add_tracer(&scene, entity, "t");
    let rotator = scene.add_component::<Rotator>(entity).unwrap();

    assert_eq!(scene.component_id::<Rotator>(entity), Some(rotator));
    assert_eq!(scene.with_component_id::<Tracer, _>(entity, tracer, |t| t.label.clone()), Some("t".to_string()));
    assert_eq!(scene.with_component_id::<Rotator, _>(entity, tracer, |r| r.speed), None);
}

#[test]
fn test_component_added_event() {
    let scene = scene();
    let added = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&added);
    scene.register_handler(
        SceneEventKind::ComponentAdded,
        Box::new(move |event: &SceneEvent| {
            if let SceneEvent::ComponentAdded { tag, .. } = event {
                sink.lock().push(*tag);
            }
            false
        }),
    );

    let entity = scene.create_entity("ship").unwrap();
    scene.add_component::<Follower>(entity).unwrap();
    assert_eq!(*added.lock(), vec!["tracer", "follower"]);
}

#[test]
fn test_handler_can_register_handlers_while_dispatching() {
    let scene = scene();
    let destroyed = Arc::new(Mutex::new(0));

    let inner = Arc::clone(&scene);
    let sink = Arc::clone(&destroyed);
    scene.register_handler(
        SceneEventKind::EntityAdded,
        Box::new(move |_: &SceneEvent| {
            let sink = Arc::clone(&sink);
            inner.register_handler(
                SceneEventKind::EntityDestroyed,
                Box::new(move |_: &SceneEvent| {
                    *sink.lock() += 1;
                    false
                }),
            );
            false
        }),
    );

    let entity = scene.create_entity("x").unwrap();
    assert!(scene.destroy_entity(entity));
    assert_eq!(*destroyed.lock(), 1);
}
