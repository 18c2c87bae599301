//! Backend contract for the lightmap compositor, plus two implementations.
//!
//! The compositor only ever talks to a [`LightingBackend`]; it never knows
//! whether pixels land in a CPU buffer or a GPU texture.

mod software;
mod wgpu_backend;

use glam::Mat4;

pub use crate::camera::ScissorRect;
use crate::error::Result;
use crate::light::{LightTextureId, LightTransform};
use crate::math::{Color, Vec2};
use crate::shadow::ShadowPolygon;

pub use software::SoftwareBackend;
pub use wgpu_backend::{WgpuBackend, WgpuTarget};

/// The two equally sized off-screen targets the pipeline renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Scene,
    Lightmap,
}

/// Which planes of a target a clear touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
    pub stencil: bool,
}

impl ClearMask {
    pub const ALL: Self = Self {
        color: true,
        depth: true,
        stencil: true,
    };
}

/// Named shader techniques a backend must provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Technique {
    PointLight,
    SpotLight,
    TexturedLight,
    DebugLight,
    PresentScene,
    PresentLightmap,
    ClearAlpha,
}

/// Cone parameters for the spotlight technique.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotCone {
    pub direction_angle: f32,
    pub half_angle: f32,
    pub decay: f32,
}

/// Per-draw uniforms for a light quad.
///
/// The quad covers `center ± range` in world space; shading is evaluated in
/// light unit space where the quad spans `[-1, 1]` on both axes. `transform`
/// maps between the two.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightUniforms {
    pub world_view_projection: Mat4,
    pub transform: LightTransform,
    pub center: Vec2,
    pub range: f32,
    pub color: [f32; 3],
    pub intensity_factor: f32,
    pub texture: Option<LightTextureId>,
    pub texture_rotation: f32,
    pub cone: Option<SpotCone>,
    pub debug_color: Option<Color>,
}

impl LightUniforms {
    pub fn new(world_view_projection: Mat4, center: Vec2, range: f32, color: [f32; 3], intensity_factor: f32) -> Self {
        Self::with_transform(world_view_projection, LightTransform::new(center, range), color, intensity_factor)
    }

    /// Uniforms around an already computed light transform.
    pub fn with_transform(
        world_view_projection: Mat4,
        transform: LightTransform,
        color: [f32; 3],
        intensity_factor: f32,
    ) -> Self {
        Self {
            world_view_projection,
            transform,
            center: transform.center(),
            range: transform.range(),
            color,
            intensity_factor,
            texture: None,
            texture_rotation: 0.0,
            cone: None,
            debug_color: None,
        }
    }

    /// World-space corners of the light quad, counter-clockwise from min.
    pub fn quad(&self) -> [Vec2; 4] {
        [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .map(|(x, y)| self.transform.to_world.transform_point2(glam::Vec2::new(x, y)).into())
    }

    /// Light unit space to clip space.
    pub fn model_view_projection(&self) -> Mat4 {
        let to_world = self.transform.to_world;
        let model = Mat4::from_cols(
            to_world.matrix2.x_axis.extend(0.0).extend(0.0),
            to_world.matrix2.y_axis.extend(0.0).extend(0.0),
            glam::Vec4::Z,
            to_world.translation.extend(0.0).extend(1.0),
        );
        self.world_view_projection * model
    }
}

/// Radial falloff at `uv` (light unit space). Zero outside the unit circle.
///
/// `light.wgsl` evaluates the same expression.
pub fn radial_falloff(uv: Vec2, intensity_factor: f32) -> f32 {
    let distance = uv.length();
    if distance >= 1.0 {
        return 0.0;
    }
    (1.0 - distance).powf(intensity_factor)
}

/// Angular attenuation of a spotlight cone at `uv`.
pub fn cone_attenuation(uv: Vec2, cone: &SpotCone) -> f32 {
    if uv.length_squared() <= f32::EPSILON {
        return 1.0;
    }
    let facing = Vec2::from_angle(cone.direction_angle);
    let delta = facing.cross(uv).atan2(facing.dot(uv)).abs();
    if delta <= cone.half_angle {
        return 1.0;
    }
    if cone.decay <= 0.0 {
        return 0.0;
    }
    (1.0 - (delta - cone.half_angle) / cone.decay).clamp(0.0, 1.0)
}

/// Rendering services the compositor drives.
///
/// Calls arrive in the strict order the frame sequence dictates; a backend
/// may queue them, but must execute them in submission order.
pub trait LightingBackend {
    /// Size of both off-screen targets in pixels.
    fn size(&self) -> (u32, u32);

    fn begin_frame(&mut self) -> Result<()> {
        Ok(())
    }

    fn clear_target(&mut self, target: RenderTarget, color: Color, mask: ClearMask) -> Result<()>;

    /// Bind an off-screen target, or the default output with `None`.
    fn bind_target(&mut self, target: Option<RenderTarget>) -> Result<()>;

    fn set_scissor(&mut self, rect: Option<ScissorRect>) -> Result<()>;

    /// Zero the bound target's alpha under every polygon, leaving color alone.
    fn fill_shadow_mask(&mut self, polygons: &[ShadowPolygon], world_view_projection: Mat4) -> Result<()>;

    /// Add a light quad into the bound target. With `masked`, each pixel's
    /// contribution is scaled by the destination alpha.
    fn draw_light_quad(&mut self, technique: Technique, uniforms: &LightUniforms, masked: bool) -> Result<()>;

    fn draw_circle_outline(
        &mut self,
        center: Vec2,
        radius: f32,
        color: Color,
        world_view_projection: Mat4,
        segments: u32,
    ) -> Result<()>;

    /// Reset the bound target's alpha to 1 inside the scissor, keeping color.
    fn clear_alpha(&mut self) -> Result<()>;

    /// Draw `source` full-screen into the default output.
    fn present(&mut self, technique: Technique, source: RenderTarget) -> Result<()>;

    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Clip space to framebuffer pixels (origin top-left, y down).
pub fn world_to_pixel(world_view_projection: &Mat4, point: Vec2, size: (u32, u32)) -> Vec2 {
    let ndc = world_view_projection.project_point3(glam::Vec3::new(point.x, point.y, 0.0));
    Vec2::new(
        (ndc.x + 1.0) * 0.5 * size.0 as f32,
        (1.0 - ndc.y) * 0.5 * size.1 as f32,
    )
}
