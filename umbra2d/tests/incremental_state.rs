mod common;

use common::{camera, Call, RecordingBackend};
use umbra2d::{Hull, Light, LightingSystem, Vec2};

#[test]
fn resolving_twice_does_no_work_the_second_time() {
    let mut system = LightingSystem::new();
    for i in 0..8 {
        system.add_hull(Hull::regular_polygon(5, 8.0).with_position(Vec2::new(i as f32 * 30.0, 0.0)));
    }

    system.resolve();
    assert_eq!(system.resolver().last_recompute_count(), 8);
    let first: Vec<_> = system
        .resolver()
        .iter()
        .map(|hull| (hull.points.clone(), hull.bounds, hull.centroid, hull.radius))
        .collect();
    let revision = system.resolver().revision();

    // Dirty flags stay set until a frame runs; generations already match.
    system.resolve();
    assert_eq!(system.resolver().last_recompute_count(), 0);
    assert_eq!(system.resolver().revision(), revision);
    let second: Vec<_> = system
        .resolver()
        .iter()
        .map(|hull| (hull.points.clone(), hull.bounds, hull.centroid, hull.radius))
        .collect();
    assert_eq!(first, second);
}

#[test]
fn unchanged_frames_reuse_hulls_and_shadows() {
    let mut system = LightingSystem::new();
    system.add_light(Light::new(Vec2::ZERO, 100.0).unwrap());
    system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(40.0, 0.0)));
    let mut backend = RecordingBackend::new(200, 200);

    let first = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(first.hulls_recomputed, 1);
    assert_eq!(first.shadow_cache_hits, 0);

    let second = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(second.hulls_recomputed, 0);
    assert_eq!(second.shadow_cache_hits, 1);
    assert_eq!(second.shadow_polygons, first.shadow_polygons);
}

#[test]
fn light_change_invalidates_only_its_shadows() {
    let mut system = LightingSystem::new();
    let moving = system.add_light(Light::new(Vec2::new(0.0, -20.0), 100.0).unwrap());
    system.add_light(Light::new(Vec2::new(0.0, 20.0), 100.0).unwrap());
    system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(40.0, 0.0)));
    let mut backend = RecordingBackend::new(200, 200);
    system.render(&mut backend, &camera()).unwrap();

    system
        .light_mut(moving)
        .unwrap()
        .set_position(Vec2::new(-10.0, -20.0))
        .unwrap();
    let stats = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(stats.hulls_recomputed, 0);
    assert_eq!(stats.shadow_cache_hits, 1);
}

#[test]
fn every_dirty_flag_is_cleared_after_a_frame() {
    let mut system = LightingSystem::new();
    let drawn = system.add_light(Light::new(Vec2::ZERO, 50.0).unwrap());
    let culled = system.add_light(Light::new(Vec2::new(5000.0, 0.0), 50.0).unwrap());
    let disabled = system.add_light(Light::new(Vec2::new(10.0, 0.0), 50.0).unwrap());
    system.light_mut(disabled).unwrap().set_enabled(false);
    let hull = system.add_hull(Hull::rectangle(4.0, 4.0).with_position(Vec2::new(20.0, 0.0)));
    let inert = system.add_hull(Hull::new(vec![Vec2::ZERO, Vec2::new(1.0, 0.0)]));

    for id in [drawn, culled, disabled] {
        assert!(system.light(id).unwrap().dirty().any());
    }
    assert!(system.hull(hull).unwrap().dirty().any());

    let mut backend = RecordingBackend::new(200, 200);
    system.render(&mut backend, &camera()).unwrap();

    for id in [drawn, culled, disabled] {
        assert!(!system.light(id).unwrap().dirty().any(), "light {id:?} still dirty");
    }
    for id in [hull, inert] {
        assert!(!system.hull(id).unwrap().dirty().any(), "hull {id:?} still dirty");
    }
    assert!(!system.resolver().get(inert).unwrap().valid);
}

#[test]
fn translate_and_back_restores_resolved_data() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..50 {
        let start = Vec2::new(rng.f32() * 200.0 - 100.0, rng.f32() * 200.0 - 100.0);
        let offset = Vec2::new(rng.f32() * 80.0 - 40.0, rng.f32() * 80.0 - 40.0);
        let hull = Hull::regular_polygon(3 + rng.usize(0..6), 5.0 + rng.f32() * 20.0)
            .with_rotation(rng.f32() * std::f32::consts::TAU)
            .with_position(start);

        let mut system = LightingSystem::new();
        let id = system.add_hull(hull);
        system.resolve();
        let before = system.resolver().get(id).unwrap().clone();

        system.hull_mut(id).unwrap().translate(offset).unwrap();
        system.resolve();
        system.hull_mut(id).unwrap().translate(-offset).unwrap();
        system.resolve();
        let after = system.resolver().get(id).unwrap();

        assert!(before.centroid.distance(after.centroid) < 1e-3);
        assert!(before.bounds.min.distance(after.bounds.min) < 1e-3);
        assert!(before.bounds.max.distance(after.bounds.max) < 1e-3);
        assert!((before.radius - after.radius).abs() < 1e-3);
    }
}

#[test]
fn drawn_lights_use_the_cached_unit_transform() {
    let mut system = LightingSystem::new();
    let id = system.add_light(Light::new(Vec2::ZERO, 50.0).unwrap());
    assert!(!system.light(id).unwrap().transform_is_fresh());

    let mut backend = RecordingBackend::new(200, 200);
    system.render(&mut backend, &camera()).unwrap();
    assert!(system.light(id).unwrap().transform_is_fresh());

    let moved = Vec2::new(20.0, -10.0);
    system.try_light_mut(id).unwrap().set_position(moved).unwrap();
    assert!(!system.light(id).unwrap().transform_is_fresh());

    system.render(&mut backend, &camera()).unwrap();
    assert!(system.light(id).unwrap().transform_is_fresh());
    assert!(backend
        .calls
        .iter()
        .any(|call| matches!(call, Call::Light { center, .. } if *center == moved)));
}
