//! Parenting, transforms and destruction

use super::*;
use crate::foundation::math::{Vec2, Vec3};
use crate::scene::{SceneError, SceneEvent, SceneEventKind};
use approx::assert_relative_eq;
use parking_lot::Mutex;

fn origin_of(matrix: &Mat4) -> Vec2 {
    let point = matrix.transform_point(&nalgebra::Point3::from(Vec3::zeros()));
    Vec2::new(point.x, point.y)
}

#[test]
fn test_global_matrix_composes_parent_chain() {
    let scene = scene();
    let root = scene.create_entity("root").unwrap();
    let arm = scene.create_child(root, "arm").unwrap();
    let hand = scene.create_child(arm, "hand").unwrap();

    scene.with_transform(root, |t| {
        t.set_position(Vec2::new(10.0, 0.0));
        t.set_rotation(std::f32::consts::FRAC_PI_2);
    });
    scene.with_transform(arm, |t| t.set_position(Vec2::new(5.0, 0.0)));
    scene.with_transform(hand, |t| t.set_scale(Vec2::new(2.0, 2.0)));

    let arm_global = scene.global_transformation_matrix(arm).unwrap();
    let expected = scene.global_transformation_matrix(root).unwrap() * scene.local_transformation_matrix(arm).unwrap();
    assert_relative_eq!(arm_global, expected, epsilon = 1e-6);
    assert_relative_eq!(origin_of(&arm_global), Vec2::new(10.0, 5.0), epsilon = 1e-5);

    let hand_global = scene.global_transformation_matrix(hand).unwrap();
    assert_relative_eq!(hand_global, arm_global * scene.local_transformation_matrix(hand).unwrap(), epsilon = 1e-6);

    // Parentless: global is local
    assert_relative_eq!(
        scene.global_transformation_matrix(root).unwrap(),
        scene.local_transformation_matrix(root).unwrap()
    );
}

#[test]
fn test_reparenting_rejects_cycles() {
    let scene = scene();
    let a = scene.create_entity("a").unwrap();
    let b = scene.create_child(a, "b").unwrap();
    let c = scene.create_child(b, "c").unwrap();

    assert!(scene.is_ancestor(a, c));
    assert!(!scene.is_ancestor(c, a));
    assert!(matches!(scene.make_child(c, a), Err(SceneError::CycleDetected { .. })));
    assert!(matches!(scene.make_child(a, a), Err(SceneError::CycleDetected { .. })));

    // Unchanged after the rejection
    assert_eq!(scene.parent(a), None);
    assert_eq!(scene.children(c), Vec::new());
}

#[test]
fn test_reparenting_moves_between_parents() {
    let scene = scene();
    let first = scene.create_entity("first").unwrap();
    let second = scene.create_entity("second").unwrap();
    let child = scene.create_child(first, "child").unwrap();

    let moves = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&moves);
    scene.register_handler(
        SceneEventKind::Reparented,
        Box::new(move |event: &SceneEvent| {
            if let SceneEvent::Reparented { entity, parent } = event {
                sink.lock().push((*entity, *parent));
            }
            false
        }),
    );

    assert!(scene.make_child(second, child).unwrap());
    assert!(!scene.make_child(second, child).unwrap());
    assert_eq!(scene.parent(child), Some(second));
    assert!(scene.children(first).is_empty());
    assert_eq!(scene.children(second), vec![child]);

    assert!(scene.unmake_child(child).unwrap());
    assert_eq!(scene.parent(child), None);
    assert_eq!(*moves.lock(), vec![(child, Some(second)), (child, None)]);
}

#[test]
fn test_detached_child_updates_as_root() {
    let scene = scene();
    let parent = scene.create_entity("parent").unwrap();
    let child = scene.create_child(parent, "child").unwrap();
    add_tracer(&scene, child, "c");
    settle(&scene);
    scene.set_enabled(parent, false);
    take_journal();

    scene.update(0.0);
    assert!(take_journal().is_empty());

    scene.unmake_child(child).unwrap();
    scene.update(0.0);
    assert_eq!(take_journal(), vec!["c:update"]);
}

#[test]
fn test_destroy_cascades_in_reverse_order() {
    let scene = scene();
    let parent = scene.create_entity("parent").unwrap();
    let child = scene.create_child(parent, "child").unwrap();
    add_tracer(&scene, parent, "p1");
    add_tracer(&scene, parent, "p2");
    add_tracer(&scene, child, "c");
    settle(&scene);
    take_journal();

    let destroyed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&destroyed);
    scene.register_handler(
        SceneEventKind::EntityDestroyed,
        Box::new(move |event: &SceneEvent| {
            if let SceneEvent::EntityDestroyed { entity } = event {
                sink.lock().push(*entity);
            }
            false
        }),
    );

    assert!(scene.destroy_entity(parent));
    assert_eq!(take_journal(), vec!["c:death", "p2:death", "p1:death"]);
    assert_eq!(*destroyed.lock(), vec![child, parent]);
    assert!(!scene.is_alive(parent));
    assert!(!scene.is_alive(child));
    assert!(!scene.destroy_entity(parent));

    // Still committed until the next tick, which also purges them
    assert_eq!(scene.committed_entities().len(), 2);
    scene.update(0.0);
    assert!(scene.committed_entities().is_empty());
    assert_eq!(scene.entity_count(), 0);
    assert!(take_journal().is_empty());
}

#[test]
fn test_dead_entity_rejects_structural_changes() {
    let scene = scene();
    let keep = scene.create_entity("keep").unwrap();
    let gone = scene.create_entity("gone").unwrap();
    scene.destroy_entity(gone);

    assert!(matches!(scene.make_child(keep, gone), Err(SceneError::EntityDead(_))));
    assert!(scene.create_child(gone, "orphan").is_none());
    assert!(scene.add_component::<Tracer>(gone).is_none());
    assert_eq!(scene.find_by_name("gone"), None);
    assert_eq!(scene.find_by_name("keep"), Some(keep));
}
