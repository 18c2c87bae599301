mod common;

use common::{camera, pixel_at};
use umbra2d::render::RenderTarget;
use umbra2d::{
    CameraProvider, Color, Hull, Light, LightingConfig, LightingSystem, ShadowType, SoftwareBackend, Vec2,
};

const AMBIENT: f32 = 0.1;

fn system() -> LightingSystem {
    LightingSystem::with_config(LightingConfig {
        ambient: Color::rgb(AMBIENT, AMBIENT, AMBIENT),
        ..Default::default()
    })
    .unwrap()
}

fn lightmap_red(backend: &SoftwareBackend, x: f32, y: f32) -> f32 {
    let (px, py) = pixel_at(x, y);
    backend.pixel(RenderTarget::Lightmap, px, py).unwrap()[0]
}

fn assert_close(actual: f32, expected: f32) {
    assert!((actual - expected).abs() < 1e-3, "expected {expected}, got {actual}");
}

#[test]
fn lone_light_fills_its_range_unmasked() {
    let mut system = system();
    system.add_light(Light::new(Vec2::ZERO, 100.0).unwrap());

    let mut backend = SoftwareBackend::new(200, 200);
    let camera = camera();
    let wvp = camera.world_view_projection();
    let view = camera.world_bounds().corners().to_vec();
    let stats = system
        .render_with_scene(&mut backend, &camera, |backend| {
            backend.fill_scene_polygon(&view, Color::WHITE, wvp);
            Ok(())
        })
        .unwrap();

    assert_eq!(stats.lights_drawn, 1);
    assert_eq!(stats.shadow_polygons, 0);

    // Pixel centres sit half a unit off the world coordinate.
    let expected = |x: f32, y: f32| AMBIENT + (1.0 - Vec2::new(x + 0.5, y + 0.5).length() / 100.0).max(0.0);
    assert_close(lightmap_red(&backend, 0.0, 0.0), expected(0.0, 0.0));
    assert_close(lightmap_red(&backend, 50.0, 0.0), expected(50.0, 0.0));
    assert_close(lightmap_red(&backend, -30.0, 40.0), expected(-30.0, 40.0));
    // Corners are beyond the range: ambient only.
    assert_close(lightmap_red(&backend, -99.0, -99.0), AMBIENT);

    // The mask was reset after the light.
    let (px, py) = pixel_at(50.0, 0.0);
    assert_eq!(backend.pixel(RenderTarget::Lightmap, px, py).unwrap()[3], 1.0);

    // White scene times lightmap.
    let output = backend.output_pixel(px, py).unwrap();
    assert_close(output[0], expected(50.0, 0.0));
}

#[test]
fn square_hull_shadows_the_region_behind_it() {
    let mut system = system();
    system.add_light(Light::new(Vec2::ZERO, 100.0).unwrap());
    system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0)));

    let mut backend = SoftwareBackend::new(200, 200);
    let stats = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(stats.lights_drawn, 1);
    assert!(stats.shadow_polygons > 0);

    // Directly behind the hull, out to the range boundary.
    assert_close(lightmap_red(&backend, 80.0, 0.0), AMBIENT);
    assert_close(lightmap_red(&backend, 95.0, 2.0), AMBIENT);
    // In front of the hull, beside the wedge, and the lit hull itself.
    assert!(lightmap_red(&backend, 30.0, 0.0) > AMBIENT + 0.5);
    assert!(lightmap_red(&backend, 80.0, 40.0) > AMBIENT);
    assert!(lightmap_red(&backend, 50.0, 0.0) > AMBIENT + 0.4);
}

#[test]
fn solid_shadow_type_darkens_the_hull_footprint() {
    let mut system = system();
    system.add_light(
        Light::new(Vec2::ZERO, 100.0)
            .unwrap()
            .with_shadow_type(ShadowType::Solid),
    );
    system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0)));

    let mut backend = SoftwareBackend::new(200, 200);
    system.render(&mut backend, &camera()).unwrap();

    assert_close(lightmap_red(&backend, 50.0, 0.0), AMBIENT);
    assert_close(lightmap_red(&backend, 80.0, 0.0), AMBIENT);
    assert!(lightmap_red(&backend, 30.0, 0.0) > AMBIENT + 0.5);
}

#[test]
fn light_inside_a_hull_contributes_nothing() {
    let mut system = system();
    system.add_light(Light::new(Vec2::new(50.0, 0.0), 100.0).unwrap());
    system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0)));

    let mut backend = SoftwareBackend::new(200, 200);
    let stats = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(stats.lights_contained, 1);
    assert_eq!(stats.lights_drawn, 0);

    assert_close(lightmap_red(&backend, 20.0, 0.0), AMBIENT);
    assert_close(lightmap_red(&backend, 80.0, 0.0), AMBIENT);
}

#[test]
fn non_shadow_casting_light_ignores_containment_and_hulls() {
    let mut system = system();
    let id = system.add_light(Light::new(Vec2::new(50.0, 0.0), 100.0).unwrap());
    system.light_mut(id).unwrap().set_casts_shadows(false);
    system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0)));

    let mut backend = SoftwareBackend::new(200, 200);
    let stats = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(stats.lights_contained, 0);
    assert_eq!(stats.lights_drawn, 1);
    assert_eq!(stats.shadow_polygons, 0);
    assert!(lightmap_red(&backend, 80.0, 0.0) > AMBIENT);
}

#[test]
fn lights_accumulate_additively() {
    let mut system = system();
    system.add_light(
        Light::new(Vec2::new(-20.0, 0.0), 60.0)
            .unwrap()
            .with_color(Color::rgb(1.0, 0.0, 0.0))
            .unwrap(),
    );
    system.add_light(
        Light::new(Vec2::new(20.0, 0.0), 60.0)
            .unwrap()
            .with_color(Color::rgb(1.0, 0.0, 0.0))
            .unwrap(),
    );

    let mut backend = SoftwareBackend::new(200, 200);
    system.render(&mut backend, &camera()).unwrap();

    let both = lightmap_red(&backend, 0.0, 0.0);
    let single = 1.0 - Vec2::new(20.5, 0.5).length() / 60.0;
    let other = 1.0 - Vec2::new(19.5, 0.5).length() / 60.0;
    assert_close(both, AMBIENT + single + other);
}

#[test]
fn off_screen_lights_are_culled() {
    let mut system = system();
    system.add_light(Light::new(Vec2::new(1000.0, 0.0), 50.0).unwrap());

    let mut backend = SoftwareBackend::new(200, 200);
    let stats = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(stats.lights_culled, 1);
    assert_eq!(stats.lights_drawn, 0);
}

#[test]
fn moving_the_hull_moves_the_shadow() {
    let mut system = system();
    system.add_light(Light::new(Vec2::ZERO, 100.0).unwrap());
    let hull = system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0)));

    let mut backend = SoftwareBackend::new(200, 200);
    system.render(&mut backend, &camera()).unwrap();
    assert_close(lightmap_red(&backend, 80.0, 0.0), AMBIENT);

    system
        .hull_mut(hull)
        .unwrap()
        .set_position(Vec2::new(0.0, 50.0))
        .unwrap();
    let stats = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(stats.hulls_recomputed, 1);
    assert_eq!(stats.shadow_cache_hits, 0);
    assert!(lightmap_red(&backend, 80.0, 0.0) > AMBIENT);
    assert_close(lightmap_red(&backend, 0.0, 80.0), AMBIENT);
}

#[test]
fn half_resolution_lightmap_stays_in_bounds() {
    let mut system = system();
    system.add_light(Light::new(Vec2::ZERO, 100.0).unwrap());
    system.add_light(Light::new(Vec2::new(60.0, 60.0), 30.0).unwrap());
    system.add_hull(Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0)));

    // 200x200 viewport onto 100x100 targets: one pixel per two world units.
    let mut backend = SoftwareBackend::new(100, 100);
    let stats = system.render(&mut backend, &camera()).unwrap();
    assert_eq!(stats.lights_drawn, 2);

    let red = |x: f32, y: f32| {
        let (px, py) = ((x + 100.0) as u32 / 2, (y + 100.0) as u32 / 2);
        backend.pixel(RenderTarget::Lightmap, px, py).unwrap()[0]
    };
    assert_close(red(80.0, 0.0), AMBIENT);
    assert!(red(30.0, 0.0) > AMBIENT + 0.5);
    assert!(red(-80.0, 0.0) > AMBIENT + 0.05);
    // Second light's scissor shrinks with the target.
    assert!(red(62.0, 62.0) > AMBIENT + 0.5);
    assert_eq!(backend.pixel(RenderTarget::Lightmap, 99, 99).unwrap()[3], 1.0);
}

/// U-shaped hull with its mouth facing a light at the origin. The cavity
/// spans x 40..55, y -10..10.
fn u_hull() -> Hull {
    Hull::new(vec![
        Vec2::new(40.0, -20.0),
        Vec2::new(60.0, -20.0),
        Vec2::new(60.0, 20.0),
        Vec2::new(40.0, 20.0),
        Vec2::new(40.0, 10.0),
        Vec2::new(55.0, 10.0),
        Vec2::new(55.0, -10.0),
        Vec2::new(40.0, -10.0),
    ])
}

#[test]
fn concave_hull_shadows_behind_each_back_facing_edge() {
    let mut system = system();
    system.add_light(Light::new(Vec2::ZERO, 100.0).unwrap());
    let hull = system.add_hull(u_hull());
    assert!(!system.hull(hull).unwrap().is_convex());

    let mut backend = SoftwareBackend::new(200, 200);
    let stats = system.render(&mut backend, &camera()).unwrap();
    // Outer right, top and bottom edges face away from the light.
    assert_eq!(stats.shadow_polygons, 3);

    assert_close(lightmap_red(&backend, 80.0, 0.0), AMBIENT);
    assert_close(lightmap_red(&backend, 75.0, 30.0), AMBIENT);
    // The mouth and the arms themselves stay lit.
    assert!(lightmap_red(&backend, 50.0, 0.0) > AMBIENT + 0.3);
    assert!(lightmap_red(&backend, 50.0, 15.0) > AMBIENT + 0.3);
    // Beside the hull.
    assert!(lightmap_red(&backend, 50.0, 40.0) > AMBIENT + 0.2);
    assert!(lightmap_red(&backend, 20.0, 0.0) > AMBIENT + 0.5);
}

#[test]
fn concave_hull_with_solid_light_darkens_only_the_arms() {
    let mut system = system();
    system.add_light(
        Light::new(Vec2::ZERO, 100.0)
            .unwrap()
            .with_shadow_type(ShadowType::Solid),
    );
    system.add_hull(u_hull());

    let mut backend = SoftwareBackend::new(200, 200);
    let stats = system.render(&mut backend, &camera()).unwrap();
    // Per-edge projection plus the footprint.
    assert_eq!(stats.shadow_polygons, 4);

    assert_close(lightmap_red(&backend, 80.0, 0.0), AMBIENT);
    assert_close(lightmap_red(&backend, 50.0, 15.0), AMBIENT);
    assert_close(lightmap_red(&backend, 50.0, -15.0), AMBIENT);
    // The cavity is outside the footprint and in front of every back face.
    assert!(lightmap_red(&backend, 50.0, 0.0) > AMBIENT + 0.3);
    assert!(lightmap_red(&backend, 50.0, 40.0) > AMBIENT + 0.2);
}
