//! Per-frame render sequence: scene, lightmap accumulation, composite.
//!
//! The lightmap's alpha channel is the shadow mask, shared by every light in
//! turn. [`LightmapPass`] owns the backend for the lightmap phase and hands
//! out one [`LightSlot`] at a time; a slot has to be finished (alpha reset)
//! before the next one can be opened, so two lights can never interleave
//! their mask writes.

use glam::Mat4;

use crate::camera::{CameraProvider, ScissorRect};
use crate::config::LightingConfig;
use crate::error::Result;
use crate::hull::{Hull, HullId};
use crate::light::{Light, LightId, LightShape};
use crate::math::{Color, Vec2};
use crate::render::{ClearMask, LightUniforms, LightingBackend, RenderTarget, SpotCone, Technique};
use crate::resolver::HullResolver;
use crate::shadow::{ShadowCaster, ShadowPolygon};
use crate::visibility;

/// Counters for one rendered frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Enabled lights looked at this frame.
    pub lights_considered: usize,
    /// Outside the camera view, or with an empty scissor.
    pub lights_culled: usize,
    /// Centre enclosed by a hull; nothing drawn.
    pub lights_contained: usize,
    pub lights_drawn: usize,
    pub shadow_polygons: usize,
    pub shadow_cache_hits: usize,
    pub hulls_recomputed: usize,
}

/// Exclusive handle on the bound lightmap for the per-light loop.
#[must_use = "a lightmap pass has to be closed to restore the default target"]
pub struct LightmapPass<'b, B: LightingBackend + ?Sized> {
    backend: &'b mut B,
    world_view_projection: Mat4,
}

impl<'b, B: LightingBackend + ?Sized> LightmapPass<'b, B> {
    /// Bind the lightmap and clear it to `ambient` (alpha forced to 1).
    pub fn open(backend: &'b mut B, ambient: Color, world_view_projection: Mat4) -> Result<Self> {
        backend.bind_target(Some(RenderTarget::Lightmap))?;
        backend.clear_target(RenderTarget::Lightmap, ambient.opaque(), ClearMask::ALL)?;
        Ok(Self {
            backend,
            world_view_projection,
        })
    }

    /// Start one light's draws, limited to `scissor`.
    pub fn light(&mut self, scissor: ScissorRect) -> Result<LightSlot<'_, 'b, B>> {
        self.backend.set_scissor(Some(scissor))?;
        Ok(LightSlot {
            pass: self,
            masked: false,
        })
    }

    /// Outline drawn outside any light slot (e.g. for a swallowed light).
    pub fn marker(&mut self, center: Vec2, radius: f32, color: Color, segments: u32) -> Result<()> {
        self.backend
            .draw_circle_outline(center, radius, color, self.world_view_projection, segments)
    }

    /// Restore the default render target.
    pub fn close(self) -> Result<&'b mut B> {
        self.backend.bind_target(None)?;
        Ok(self.backend)
    }
}

/// One light's turn on the lightmap, before its quad is drawn.
#[must_use = "a light slot has to be drawn and finished to reset the shadow mask"]
pub struct LightSlot<'p, 'b, B: LightingBackend + ?Sized> {
    pass: &'p mut LightmapPass<'b, B>,
    masked: bool,
}

impl<'p, 'b, B: LightingBackend + ?Sized> LightSlot<'p, 'b, B> {
    /// Write the shadow mask. May be called for several polygon batches.
    pub fn mask(mut self, polygons: &[ShadowPolygon]) -> Result<Self> {
        if !polygons.is_empty() {
            let wvp = self.pass.world_view_projection;
            self.pass.backend.fill_shadow_mask(polygons, wvp)?;
            self.masked = true;
        }
        Ok(self)
    }

    /// Add the light quad, masked by whatever `mask` wrote.
    pub fn draw(self, technique: Technique, uniforms: &LightUniforms) -> Result<LitSlot<'p, 'b, B>> {
        self.pass.backend.draw_light_quad(technique, uniforms, self.masked)?;
        Ok(LitSlot { pass: self.pass })
    }
}

/// A light whose quad is in the lightmap; only markers may follow.
#[must_use = "a lit slot has to be finished to reset the shadow mask"]
pub struct LitSlot<'p, 'b, B: LightingBackend + ?Sized> {
    pass: &'p mut LightmapPass<'b, B>,
}

impl<B: LightingBackend + ?Sized> LitSlot<'_, '_, B> {
    pub fn marker(&mut self, center: Vec2, radius: f32, color: Color, segments: u32) -> Result<()> {
        self.pass.marker(center, radius, color, segments)
    }

    /// Reset alpha inside the scissor and drop the scissor.
    pub fn finish(self) -> Result<()> {
        self.pass.backend.clear_alpha()?;
        self.pass.backend.set_scissor(None)
    }
}

/// Technique and uniforms for `light` under the given camera matrix. Reuses
/// the light's cached unit transform.
pub fn light_uniforms(light: &mut Light, world_view_projection: Mat4) -> (Technique, LightUniforms) {
    let mut uniforms = LightUniforms::with_transform(
        world_view_projection,
        light.transform(),
        light.color().to_rgb(),
        light.intensity_factor(),
    );
    let technique = match light.shape() {
        LightShape::Point => Technique::PointLight,
        LightShape::Spot {
            direction_angle,
            cone_half_angle,
            decay,
        } => {
            uniforms.cone = Some(SpotCone {
                direction_angle,
                half_angle: cone_half_angle,
                decay,
            });
            Technique::SpotLight
        }
        LightShape::Textured { texture, rotation } => {
            uniforms.texture = Some(texture);
            uniforms.texture_rotation = rotation;
            Technique::TexturedLight
        }
    };
    (technique, uniforms)
}

/// Drives the frame sequence and owns the shadow cache.
#[derive(Debug, Default)]
pub struct Compositor {
    caster: ShadowCaster,
}

impl Compositor {
    pub fn new(shadow_caching: bool) -> Self {
        Self {
            caster: ShadowCaster::new(shadow_caching),
        }
    }

    pub fn caster(&self) -> &ShadowCaster {
        &self.caster
    }

    pub fn caster_mut(&mut self) -> &mut ShadowCaster {
        &mut self.caster
    }

    /// Render one frame. `resolver` must already reflect `hulls`.
    ///
    /// Every light's dirty flags are cleared, drawn or not, and then every
    /// hull's. A backend error aborts the frame with all flags left set.
    #[allow(clippy::too_many_arguments)]
    pub fn render_frame<B, C, F>(
        &mut self,
        backend: &mut B,
        camera: &C,
        config: &LightingConfig,
        lights: &mut [(LightId, Light)],
        hulls: &mut [(HullId, Hull)],
        resolver: &HullResolver,
        draw_scene: F,
    ) -> Result<FrameStats>
    where
        B: LightingBackend + ?Sized,
        C: CameraProvider + ?Sized,
        F: FnOnce(&mut B) -> Result<()>,
    {
        let mut stats = FrameStats {
            hulls_recomputed: resolver.last_recompute_count(),
            ..Default::default()
        };
        let wvp = camera.world_view_projection();
        let view_bounds = camera.world_bounds();
        // Scissors come in viewport pixels; the targets may be a different size.
        let viewport = camera.viewport_size();
        let target_size = backend.size();

        backend.begin_frame()?;
        backend.bind_target(Some(RenderTarget::Scene))?;
        backend.clear_target(RenderTarget::Scene, Color::BLACK, ClearMask::ALL)?;
        draw_scene(backend)?;

        let mut pass = LightmapPass::open(backend, config.ambient, wvp)?;
        let mut capped = false;

        for (id, light) in lights.iter_mut() {
            if !light.enabled() {
                continue;
            }
            stats.lights_considered += 1;

            if !visibility::light_visible(&light.bounds(), &view_bounds) {
                log::trace!("Light {:?} culled: outside view", id);
                stats.lights_culled += 1;
                continue;
            }

            if light.casts_shadows() {
                if let Some(hull) = visibility::find_enclosing_hull(light, resolver.active()) {
                    stats.lights_contained += 1;
                    if config.debug_draw {
                        log::warn!("Light {:?} at {:?} is inside hull {:?}", id, light.position(), hull.id);
                        pass.marker(
                            light.position(),
                            light.radius(),
                            config.debug_contained_color,
                            config.debug_marker_segments,
                        )?;
                    } else {
                        log::trace!("Light {:?} contained by hull {:?}", id, hull.id);
                    }
                    continue;
                }
            }

            if stats.lights_drawn >= config.max_lights {
                if !capped {
                    log::warn!("More than {} visible lights; the rest are skipped", config.max_lights);
                    capped = true;
                }
                continue;
            }

            let scissor = camera
                .scissor_rect(light.bounds())
                .map(|rect| rect.rescaled(viewport, target_size))
                .filter(|rect| !rect.is_empty());
            let Some(scissor) = scissor else {
                log::warn!("Light {:?} has an empty scissor rectangle", id);
                stats.lights_culled += 1;
                continue;
            };

            let mut slot = pass.light(scissor)?;
            if light.casts_shadows() {
                let (shadows, cached) = self.caster.cast(*id, light, resolver);
                if cached {
                    stats.shadow_cache_hits += 1;
                    log::trace!("Light {:?}: shadow cache hit", id);
                }
                stats.shadow_polygons += shadows.polygons.len();
                slot = slot.mask(&shadows.polygons)?;
            }

            let (technique, uniforms) = light_uniforms(light, wvp);
            let mut lit = slot.draw(technique, &uniforms)?;
            if config.debug_draw {
                lit.marker(
                    light.position(),
                    light.radius(),
                    config.debug_light_color,
                    config.debug_marker_segments,
                )?;
            }
            lit.finish()?;
            stats.lights_drawn += 1;
        }

        let backend = pass.close()?;
        backend.present(Technique::PresentScene, RenderTarget::Scene)?;
        backend.present(Technique::PresentLightmap, RenderTarget::Lightmap)?;
        backend.end_frame()?;

        // Flags are only cleared once every consumer of this frame has run.
        for (_, light) in lights.iter_mut() {
            light.clear_dirty();
        }
        for (_, hull) in hulls.iter_mut() {
            hull.clear_dirty();
        }

        log::debug!(
            "Frame: {} lights ({} culled, {} contained, {} drawn), {} shadow polygons, {} cache hits, {} hulls recomputed",
            stats.lights_considered,
            stats.lights_culled,
            stats.lights_contained,
            stats.lights_drawn,
            stats.shadow_polygons,
            stats.shadow_cache_hits,
            stats.hulls_recomputed
        );
        Ok(stats)
    }
}
