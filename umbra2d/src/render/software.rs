use std::collections::HashMap;

use glam::{Mat4, Vec3};

use super::{
    cone_attenuation, radial_falloff, world_to_pixel, ClearMask, LightUniforms, LightingBackend, RenderTarget,
    ScissorRect, Technique,
};
use crate::error::{LightingError, Result};
use crate::light::LightTextureId;
use crate::math::{Color, Vec2};
use crate::shadow::ShadowPolygon;

type Pixel = [f32; 4];

struct SoftwareTexture {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

impl SoftwareTexture {
    /// Nearest sample at `uv` in `[0, 1]`, clamped to the edge.
    fn sample(&self, u: f32, v: f32) -> Pixel {
        let x = ((u.clamp(0.0, 1.0) * self.width as f32) as u32).min(self.width - 1);
        let y = ((v.clamp(0.0, 1.0) * self.height as f32) as u32).min(self.height - 1);
        self.pixels[(y * self.width + x) as usize]
    }
}

/// CPU reference implementation of [`LightingBackend`].
///
/// Targets are RGBA `f32` buffers, so the lightmap can accumulate past 1.
/// Coverage is decided at pixel centres, inclusive on edges. Shading uses the
/// same expressions as `light.wgsl`.
pub struct SoftwareBackend {
    width: u32,
    height: u32,
    scene: Vec<Pixel>,
    lightmap: Vec<Pixel>,
    output: Vec<Pixel>,
    bound: Option<RenderTarget>,
    scissor: Option<ScissorRect>,
    textures: HashMap<LightTextureId, SoftwareTexture>,
    next_texture_id: u32,
    triangles: Vec<[Vec2; 3]>,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let len = (width * height) as usize;
        Self {
            width,
            height,
            scene: vec![[0.0, 0.0, 0.0, 1.0]; len],
            lightmap: vec![[0.0, 0.0, 0.0, 1.0]; len],
            output: vec![[0.0, 0.0, 0.0, 1.0]; len],
            bound: None,
            scissor: None,
            textures: HashMap::new(),
            next_texture_id: 1,
            triangles: Vec::new(),
        }
    }

    /// Register an RGBA8 image for textured lights.
    pub fn load_texture_from_rgba(&mut self, data: &[u8], width: u32, height: u32) -> Result<LightTextureId> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(LightingError::Backend(format!(
                "texture data is {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        let pixels = data
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]].map(|c| c as f32 / 255.0))
            .collect();

        let id = LightTextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id, SoftwareTexture { width, height, pixels });
        Ok(id)
    }

    /// Decode an encoded image (PNG) and register it.
    pub fn load_texture_from_bytes(&mut self, bytes: &[u8]) -> Result<LightTextureId> {
        let image = image::load_from_memory(bytes)
            .map_err(|err| LightingError::Backend(format!("decoding light texture: {err}")))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        self.load_texture_from_rgba(&image, width, height)
    }

    /// Read a pixel from an off-screen target.
    pub fn pixel(&self, target: RenderTarget, x: u32, y: u32) -> Option<Pixel> {
        let index = self.index(x, y)?;
        Some(match target {
            RenderTarget::Scene => self.scene[index],
            RenderTarget::Lightmap => self.lightmap[index],
        })
    }

    /// Read a pixel of the composited output.
    pub fn output_pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        self.index(x, y).map(|index| self.output[index])
    }

    /// Fill a world-space polygon with `color` in the scene target.
    pub fn fill_scene_polygon(&mut self, points: &[Vec2], color: Color, world_view_projection: Mat4) {
        let size = (self.width, self.height);
        let pixels: Vec<Vec2> = points
            .iter()
            .map(|&p| world_to_pixel(&world_view_projection, p, size))
            .collect();
        self.triangles.clear();
        crate::geometry::triangulate(&pixels, &mut self.triangles);

        let rect = self.clip_rect();
        let width = self.width;
        let color = color.to_array();
        for triangle in &self.triangles {
            for_each_covered(triangle, rect, |x, y| {
                self.scene[(y * width + x) as usize] = color;
            });
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }

    fn clip_rect(&self) -> ScissorRect {
        self.scissor.unwrap_or(ScissorRect::full(self.width, self.height))
    }

    fn bound_pixels(&mut self) -> Result<&mut Vec<Pixel>> {
        match self.bound {
            Some(RenderTarget::Scene) => Ok(&mut self.scene),
            Some(RenderTarget::Lightmap) => Ok(&mut self.lightmap),
            None => Err(LightingError::Backend("no off-screen target bound".into())),
        }
    }

    fn shade(&self, technique: Technique, uniforms: &LightUniforms, uv: Vec2) -> [f32; 3] {
        let mut factor = radial_falloff(uv, uniforms.intensity_factor);
        let mut tint = [1.0; 3];
        match technique {
            Technique::SpotLight => {
                if let Some(cone) = &uniforms.cone {
                    factor *= cone_attenuation(uv, cone);
                }
            }
            Technique::TexturedLight => {
                let local = uv.rotated(-uniforms.texture_rotation);
                let texel = uniforms
                    .texture
                    .and_then(|id| self.textures.get(&id))
                    .map_or([1.0; 4], |texture| {
                        texture.sample((local.x + 1.0) * 0.5, (local.y + 1.0) * 0.5)
                    });
                tint = [texel[0] * texel[3], texel[1] * texel[3], texel[2] * texel[3]];
            }
            _ => {}
        }
        [
            uniforms.color[0] * tint[0] * factor,
            uniforms.color[1] * tint[1] * factor,
            uniforms.color[2] * tint[2] * factor,
        ]
    }
}

impl LightingBackend for SoftwareBackend {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear_target(&mut self, target: RenderTarget, color: Color, mask: ClearMask) -> Result<()> {
        // No depth or stencil planes: the mask lives in alpha.
        if !mask.color {
            return Ok(());
        }
        let pixels = match target {
            RenderTarget::Scene => &mut self.scene,
            RenderTarget::Lightmap => &mut self.lightmap,
        };
        pixels.fill(color.to_array());
        Ok(())
    }

    fn bind_target(&mut self, target: Option<RenderTarget>) -> Result<()> {
        self.bound = target;
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) -> Result<()> {
        self.scissor = rect.map(|rect| rect.clamped(self.width, self.height));
        Ok(())
    }

    fn fill_shadow_mask(&mut self, polygons: &[ShadowPolygon], world_view_projection: Mat4) -> Result<()> {
        let size = (self.width, self.height);
        let rect = self.clip_rect();
        let width = self.width;

        let mut triangles = std::mem::take(&mut self.triangles);
        triangles.clear();
        let mut projected = Vec::new();
        for polygon in polygons {
            projected.clear();
            projected.extend(
                polygon
                    .points
                    .iter()
                    .map(|&p| world_to_pixel(&world_view_projection, p, size)),
            );
            crate::geometry::triangulate(&projected, &mut triangles);
        }

        let pixels = self.bound_pixels()?;
        for triangle in &triangles {
            for_each_covered(triangle, rect, |x, y| {
                pixels[(y * width + x) as usize][3] = 0.0;
            });
        }
        self.triangles = triangles;
        Ok(())
    }

    fn draw_light_quad(&mut self, technique: Technique, uniforms: &LightUniforms, masked: bool) -> Result<()> {
        if !matches!(
            technique,
            Technique::PointLight | Technique::SpotLight | Technique::TexturedLight
        ) {
            return Err(LightingError::Backend(format!("{technique:?} is not a light technique")));
        }
        if self.bound.is_none() {
            return Err(LightingError::Backend("no off-screen target bound".into()));
        }

        let size = (self.width, self.height);
        let wvp = uniforms.world_view_projection;
        let inverse = wvp.inverse();
        let corners = uniforms.quad().map(|p| world_to_pixel(&wvp, p, size));
        let min = corners.iter().fold(Vec2::splat(f32::INFINITY), |a, &b| a.min(b));
        let max = corners.iter().fold(Vec2::splat(f32::NEG_INFINITY), |a, &b| a.max(b));
        let rect = self.clip_rect();

        let x0 = (min.x.floor().max(rect.x as f32)) as u32;
        let y0 = (min.y.floor().max(rect.y as f32)) as u32;
        let x1 = (max.x.ceil() as u32).min(rect.x + rect.width);
        let y1 = (max.y.ceil() as u32).min(rect.y + rect.height);

        let mut contributions = Vec::new();
        for y in y0..y1 {
            for x in x0..x1 {
                let ndc_x = (x as f32 + 0.5) / size.0 as f32 * 2.0 - 1.0;
                let ndc_y = 1.0 - (y as f32 + 0.5) / size.1 as f32 * 2.0;
                let world = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
                let uv = uniforms.transform.to_unit(Vec2::new(world.x, world.y));
                if uv.x.abs() > 1.0 || uv.y.abs() > 1.0 {
                    continue;
                }
                contributions.push(((y * size.0 + x) as usize, self.shade(technique, uniforms, uv)));
            }
        }

        let pixels = self.bound_pixels()?;
        for (index, rgb) in contributions {
            let pixel = &mut pixels[index];
            let weight = if masked { pixel[3] } else { 1.0 };
            for channel in 0..3 {
                pixel[channel] += rgb[channel] * weight;
            }
        }
        Ok(())
    }

    fn draw_circle_outline(
        &mut self,
        center: Vec2,
        radius: f32,
        color: Color,
        world_view_projection: Mat4,
        segments: u32,
    ) -> Result<()> {
        let size = (self.width, self.height);
        let rect = self.clip_rect();
        let width = self.width;
        let segments = segments.max(3);
        let step = std::f32::consts::TAU / segments as f32;
        let ring: Vec<Vec2> = (0..segments)
            .map(|i| world_to_pixel(&world_view_projection, center + Vec2::from_angle(step * i as f32) * radius, size))
            .collect();

        let pixels = self.bound_pixels()?;
        for (a, b) in crate::geometry::edges(&ring) {
            let samples = ((b - a).length() * 2.0).ceil().max(1.0) as u32;
            for s in 0..=samples {
                let p = a.lerp(b, s as f32 / samples as f32);
                if p.x < 0.0 || p.y < 0.0 {
                    continue;
                }
                let (x, y) = (p.x as u32, p.y as u32);
                if !rect.contains(x, y) {
                    continue;
                }
                let pixel = &mut pixels[(y * width + x) as usize];
                for channel in 0..3 {
                    pixel[channel] += (color.to_array()[channel] - pixel[channel]) * color.a;
                }
            }
        }
        Ok(())
    }

    fn clear_alpha(&mut self) -> Result<()> {
        let rect = self.clip_rect();
        let width = self.width;
        let pixels = self.bound_pixels()?;
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                pixels[(y * width + x) as usize][3] = 1.0;
            }
        }
        Ok(())
    }

    fn present(&mut self, technique: Technique, source: RenderTarget) -> Result<()> {
        if self.bound.is_some() {
            return Err(LightingError::Backend("present needs the default target bound".into()));
        }
        match (technique, source) {
            (Technique::PresentScene, RenderTarget::Scene) => {
                self.output.copy_from_slice(&self.scene);
            }
            (Technique::PresentLightmap, RenderTarget::Lightmap) => {
                for (out, light) in self.output.iter_mut().zip(&self.lightmap) {
                    for channel in 0..3 {
                        out[channel] *= light[channel];
                    }
                }
            }
            _ => {
                return Err(LightingError::Backend(format!(
                    "{technique:?} cannot present {source:?}"
                )))
            }
        }
        Ok(())
    }
}

/// Calls `plot` for every pixel whose centre lies in `triangle` (pixel space)
/// and inside `rect`.
fn for_each_covered(triangle: &[Vec2; 3], rect: ScissorRect, mut plot: impl FnMut(u32, u32)) {
    let [a, mut b, mut c] = *triangle;
    // Projection may flip winding (y-down framebuffer).
    if (b - a).cross(c - a) < 0.0 {
        std::mem::swap(&mut b, &mut c);
    }
    let min = a.min(b).min(c);
    let max = a.max(b).max(c);
    let x0 = min.x.floor().max(rect.x as f32) as u32;
    let y0 = min.y.floor().max(rect.y as f32) as u32;
    let x1 = (max.x.ceil().max(0.0) as u32).min(rect.x + rect.width);
    let y1 = (max.y.ceil().max(0.0) as u32).min(rect.y + rect.height);

    for y in y0..y1 {
        for x in x0..x1 {
            let centre = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            if crate::geometry::point_in_triangle(centre, a, b, c) {
                plot(x, y);
            }
        }
    }
}
