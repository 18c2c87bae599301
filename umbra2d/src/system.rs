//! The public entry point: owns lights, hulls and per-frame caches.

use crate::camera::CameraProvider;
use crate::compositor::{Compositor, FrameStats};
use crate::config::LightingConfig;
use crate::error::{LightingError, Result};
use crate::hull::{Hull, HullId};
use crate::light::{Light, LightId};
use crate::math::Color;
use crate::render::LightingBackend;
use crate::resolver::HullResolver;

/// Lights and hulls in insertion order, plus the machinery to draw them.
///
/// Ids are never reused, so a cache entry can never be mistaken for a newer
/// object that happens to share its id.
pub struct LightingSystem {
    lights: Vec<(LightId, Light)>,
    hulls: Vec<(HullId, Hull)>,
    next_light_id: u32,
    next_hull_id: u32,
    resolver: HullResolver,
    compositor: Compositor,
    config: LightingConfig,
}

impl LightingSystem {
    pub fn new() -> Self {
        Self::from_valid_config(LightingConfig::default())
    }

    /// Start from `config`, rejecting it under the same rules as
    /// [`Self::set_config`].
    pub fn with_config(config: LightingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(mut config: LightingConfig) -> Self {
        config.ambient = config.ambient.opaque();
        Self {
            lights: Vec::new(),
            hulls: Vec::new(),
            next_light_id: 0,
            next_hull_id: 0,
            resolver: HullResolver::new(),
            compositor: Compositor::new(config.shadow_caching),
            config,
        }
    }

    pub fn config(&self) -> &LightingConfig {
        &self.config
    }

    /// Replace the whole configuration after validating it.
    pub fn set_config(&mut self, config: LightingConfig) -> Result<()> {
        config.validate()?;
        self.compositor.caster_mut().set_caching(config.shadow_caching);
        self.config = LightingConfig {
            ambient: config.ambient.opaque(),
            ..config
        };
        Ok(())
    }

    pub fn ambient(&self) -> Color {
        self.config.ambient.opaque()
    }

    /// Lightmap clear color. Alpha is forced to 1.
    pub fn set_ambient(&mut self, ambient: Color) -> Result<()> {
        if !ambient.is_finite() {
            return Err(LightingError::InvalidColor);
        }
        self.config.ambient = ambient.opaque();
        Ok(())
    }

    pub fn debug_draw(&self) -> bool {
        self.config.debug_draw
    }

    pub fn set_debug_draw(&mut self, enabled: bool) {
        self.config.debug_draw = enabled;
    }

    pub fn toggle_debug_draw(&mut self) -> bool {
        self.config.debug_draw = !self.config.debug_draw;
        self.config.debug_draw
    }

    // Lights

    pub fn add_light(&mut self, light: Light) -> LightId {
        let id = LightId(self.next_light_id);
        self.next_light_id += 1;
        self.lights.push((id, light));
        log::debug!("Added light {:?} ({} total)", id, self.lights.len());
        id
    }

    pub fn remove_light(&mut self, id: LightId) -> Result<Light> {
        let index = self
            .lights
            .iter()
            .position(|(light_id, _)| *light_id == id)
            .ok_or(LightingError::UnknownLight(id))?;
        let (_, light) = self.lights.remove(index);
        self.compositor.caster_mut().retain(|cached| cached != id);
        log::debug!("Removed light {:?} ({} left)", id, self.lights.len());
        Ok(light)
    }

    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights
            .iter()
            .find(|(light_id, _)| *light_id == id)
            .map(|(_, light)| light)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        self.lights
            .iter_mut()
            .find(|(light_id, _)| *light_id == id)
            .map(|(_, light)| light)
    }

    /// Like [`Self::light_mut`], but a missing id is an error.
    pub fn try_light_mut(&mut self, id: LightId) -> Result<&mut Light> {
        self.light_mut(id).ok_or(LightingError::UnknownLight(id))
    }

    pub fn lights(&self) -> impl Iterator<Item = (LightId, &Light)> + '_ {
        self.lights.iter().map(|(id, light)| (*id, light))
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    // Hulls

    pub fn add_hull(&mut self, hull: Hull) -> HullId {
        let id = HullId(self.next_hull_id);
        self.next_hull_id += 1;
        if !hull.is_valid() {
            log::debug!("Hull {:?} has {} vertices and stays inert", id, hull.points().len());
        }
        self.hulls.push((id, hull));
        id
    }

    pub fn remove_hull(&mut self, id: HullId) -> Result<Hull> {
        let index = self
            .hulls
            .iter()
            .position(|(hull_id, _)| *hull_id == id)
            .ok_or(LightingError::UnknownHull(id))?;
        let (_, hull) = self.hulls.remove(index);
        log::debug!("Removed hull {:?} ({} left)", id, self.hulls.len());
        Ok(hull)
    }

    pub fn hull(&self, id: HullId) -> Option<&Hull> {
        self.hulls
            .iter()
            .find(|(hull_id, _)| *hull_id == id)
            .map(|(_, hull)| hull)
    }

    pub fn hull_mut(&mut self, id: HullId) -> Option<&mut Hull> {
        self.hulls
            .iter_mut()
            .find(|(hull_id, _)| *hull_id == id)
            .map(|(_, hull)| hull)
    }

    pub fn try_hull_mut(&mut self, id: HullId) -> Result<&mut Hull> {
        self.hull_mut(id).ok_or(LightingError::UnknownHull(id))
    }

    pub fn hulls(&self) -> impl Iterator<Item = (HullId, &Hull)> + '_ {
        self.hulls.iter().map(|(id, hull)| (*id, hull))
    }

    pub fn hull_count(&self) -> usize {
        self.hulls.len()
    }

    /// World-space hull data as of the last [`Self::resolve`].
    pub fn resolver(&self) -> &HullResolver {
        &self.resolver
    }

    /// Bring the resolved hull set up to date. Called by `render`, but safe
    /// to call on its own (e.g. for queries between frames).
    pub fn resolve(&mut self) {
        self.resolver
            .resolve(self.hulls.iter().map(|(id, hull)| (*id, hull)));
    }

    /// Render a frame with an empty (black) scene.
    pub fn render<B, C>(&mut self, backend: &mut B, camera: &C) -> Result<FrameStats>
    where
        B: LightingBackend + ?Sized,
        C: CameraProvider + ?Sized,
    {
        self.render_with_scene(backend, camera, |_| Ok(()))
    }

    /// Resolve, then run the full frame. `draw_scene` fills the bound scene
    /// target before lighting is accumulated.
    pub fn render_with_scene<B, C, F>(&mut self, backend: &mut B, camera: &C, draw_scene: F) -> Result<FrameStats>
    where
        B: LightingBackend + ?Sized,
        C: CameraProvider + ?Sized,
        F: FnOnce(&mut B) -> Result<()>,
    {
        self.resolve();
        self.compositor.render_frame(
            backend,
            camera,
            &self.config,
            &mut self.lights,
            &mut self.hulls,
            &self.resolver,
            draw_scene,
        )
    }
}

impl Default for LightingSystem {
    fn default() -> Self {
        Self::new()
    }
}
