use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use umbra2d::{
    Camera2D, Color, Hull, HullId, Light, LightId, LightShape, LightingConfig, LightingSystem, ShadowType,
    Vec2, WgpuBackend,
};
use winit::{
    dpi::LogicalSize,
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

struct LightingDemo {
    system: LightingSystem,
    camera: Camera2D,
    orbiting: Vec<(LightId, f32, f32)>,
    spinning: Vec<HullId>,
    time: f32,
}

impl LightingDemo {
    fn new(config: LightingConfig) -> Result<Self> {
        let mut system = LightingSystem::with_config(config)?;
        let camera = Camera2D::new(Vec2::ZERO, WIDTH, HEIGHT);

        let mut spinning = Vec::new();
        for i in 0..5 {
            let x = (i as f32 - 2.0) * 200.0;
            let hull = if i % 2 == 0 {
                Hull::rectangle(60.0, 60.0)
            } else {
                Hull::regular_polygon(6, 40.0)
            };
            spinning.push(system.add_hull(hull.with_position(Vec2::new(x, 0.0))));
        }
        // A wall along the bottom that never moves.
        system.add_hull(Hull::rectangle(900.0, 30.0).with_position(Vec2::new(0.0, 250.0)));

        let mut orbiting = Vec::new();
        let colors = [
            Color::rgb(1.0, 0.85, 0.6),
            Color::rgb(0.4, 0.6, 1.0),
            Color::rgb(1.0, 0.3, 0.3),
        ];
        for (i, color) in colors.into_iter().enumerate() {
            let light = Light::new(Vec2::ZERO, 420.0)?
                .with_color(color)?
                .with_intensity(1.5)?
                .with_radius(12.0)?;
            let id = system.add_light(light);
            orbiting.push((id, 260.0 + i as f32 * 40.0, i as f32 * 2.1));
        }

        let spot = Light::new(Vec2::new(0.0, -300.0), 600.0)?
            .with_color(Color::rgb(0.9, 0.9, 0.7))?
            .with_shadow_type(ShadowType::Solid)
            .with_shape(LightShape::Spot {
                direction_angle: std::f32::consts::FRAC_PI_2,
                cone_half_angle: 0.35,
                decay: 0.15,
            })?;
        system.add_light(spot);

        Ok(Self {
            system,
            camera,
            orbiting,
            spinning,
            time: 0.0,
        })
    }

    fn update(&mut self, dt: f32) -> Result<()> {
        self.time += dt;
        for &(id, orbit, phase) in &self.orbiting {
            let angle = self.time * 0.4 + phase;
            let position = Vec2::new(angle.cos() * orbit, angle.sin() * orbit * 0.6);
            self.system.try_light_mut(id)?.set_position(position)?;
        }
        for (i, &id) in self.spinning.iter().enumerate() {
            let speed = if i % 2 == 0 { 0.5 } else { -0.8 };
            self.system.try_hull_mut(id)?.set_rotation(self.time * speed)?;
        }
        Ok(())
    }

    fn draw(&mut self, backend: &mut WgpuBackend<'_>) -> Result<()> {
        let wvp = umbra2d::CameraProvider::world_view_projection(&self.camera);
        let floor = [
            Vec2::new(-640.0, -360.0),
            Vec2::new(640.0, -360.0),
            Vec2::new(640.0, 360.0),
            Vec2::new(-640.0, 360.0),
        ];
        let hull_outlines: Vec<Vec<Vec2>> = self
            .system
            .hulls()
            .map(|(_, hull)| {
                let transform = hull.transform();
                hull.points().iter().map(|&p| transform.transform_point(p)).collect()
            })
            .collect();

        let stats = self.system.render_with_scene(backend, &self.camera, |backend| {
            backend.draw_scene_polygon(&floor, Color::rgb(0.75, 0.75, 0.8), wvp)?;
            for outline in &hull_outlines {
                backend.draw_scene_polygon(outline, Color::rgb(0.35, 0.3, 0.3), wvp)?;
            }
            Ok(())
        })?;
        log::trace!("{stats:?}");
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            log::info!("Loading lighting config from {}", path.display());
            LightingConfig::load_from_file(&path)?
        }
        None => LightingConfig::default(),
    };

    let event_loop = EventLoop::new()?;
    let mut window_attributes = Window::default_attributes();
    window_attributes.title = "Umbra2D Lighting Demo".into();
    window_attributes.inner_size = Some(LogicalSize::new(WIDTH, HEIGHT).into());
    #[allow(deprecated)]
    let window = event_loop.create_window(window_attributes)?;

    // The window lives as long as the program; the surface borrows it.
    let window: &'static Window = Box::leak(Box::new(window));
    let size = window.inner_size();

    let mut demo = LightingDemo::new(config.clone())?;
    demo.camera.resize(size.width, size.height);
    let mut backend = WgpuBackend::new(window, size.width, size.height, true, config.max_lights)?;

    let mut last_frame = Instant::now();
    #[allow(deprecated)]
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. } => {
                if is_pressed(&event, KeyCode::Escape) {
                    elwt.exit();
                } else if is_pressed(&event, KeyCode::KeyD) {
                    let enabled = demo.system.toggle_debug_draw();
                    log::info!("Debug draw {}", if enabled { "on" } else { "off" });
                }
            }
            WindowEvent::Resized(new_size) => {
                backend.resize(new_size.width, new_size.height);
                demo.camera.resize(new_size.width, new_size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = demo.draw(&mut backend) {
                    log::error!("Encountered error during draw: {err:?}");
                    elwt.exit();
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            let now = Instant::now();
            let dt = (now - last_frame).as_secs_f32();
            last_frame = now;

            if let Err(err) = demo.update(dt) {
                log::error!("Encountered error during update: {err:?}");
                elwt.exit();
                return;
            }
            window.request_redraw();
        }
        _ => {}
    })?;

    Ok(())
}

fn is_pressed(event: &KeyEvent, key: KeyCode) -> bool {
    event.state == ElementState::Pressed && !event.repeat && event.physical_key == PhysicalKey::Code(key)
}
