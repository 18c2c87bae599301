#![allow(dead_code)]

use glam::Mat4;
use umbra2d::render::{ClearMask, LightUniforms, LightingBackend, RenderTarget, Technique};
use umbra2d::shadow::ShadowPolygon;
use umbra2d::{Camera2D, Color, Result, ScissorRect, Vec2};

/// Backend call, as seen by [`RecordingBackend`].
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    BeginFrame,
    Clear(RenderTarget),
    Bind(Option<RenderTarget>),
    Scissor(Option<ScissorRect>),
    Mask(usize),
    Light { technique: Technique, center: Vec2, masked: bool },
    Outline { center: Vec2, color: Color },
    ClearAlpha,
    Present(RenderTarget),
    EndFrame,
}

/// Records every call and draws nothing.
pub struct RecordingBackend {
    pub size: (u32, u32),
    pub calls: Vec<Call>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            calls: Vec::new(),
        }
    }

    pub fn light_draws(&self) -> usize {
        self.calls.iter().filter(|call| matches!(call, Call::Light { .. })).count()
    }

    pub fn mask_draws(&self) -> usize {
        self.calls.iter().filter(|call| matches!(call, Call::Mask(_))).count()
    }
}

impl LightingBackend for RecordingBackend {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.calls.clear();
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn clear_target(&mut self, target: RenderTarget, _color: Color, _mask: ClearMask) -> Result<()> {
        self.calls.push(Call::Clear(target));
        Ok(())
    }

    fn bind_target(&mut self, target: Option<RenderTarget>) -> Result<()> {
        self.calls.push(Call::Bind(target));
        Ok(())
    }

    fn set_scissor(&mut self, rect: Option<ScissorRect>) -> Result<()> {
        self.calls.push(Call::Scissor(rect));
        Ok(())
    }

    fn fill_shadow_mask(&mut self, polygons: &[ShadowPolygon], _wvp: Mat4) -> Result<()> {
        self.calls.push(Call::Mask(polygons.len()));
        Ok(())
    }

    fn draw_light_quad(&mut self, technique: Technique, uniforms: &LightUniforms, masked: bool) -> Result<()> {
        self.calls.push(Call::Light {
            technique,
            center: uniforms.center,
            masked,
        });
        Ok(())
    }

    fn draw_circle_outline(&mut self, center: Vec2, _radius: f32, color: Color, _wvp: Mat4, _segments: u32) -> Result<()> {
        self.calls.push(Call::Outline { center, color });
        Ok(())
    }

    fn clear_alpha(&mut self) -> Result<()> {
        self.calls.push(Call::ClearAlpha);
        Ok(())
    }

    fn present(&mut self, _technique: Technique, source: RenderTarget) -> Result<()> {
        self.calls.push(Call::Present(source));
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.calls.push(Call::EndFrame);
        Ok(())
    }
}

/// 200x200 view centred on the origin: world (x, y) sits at pixel (x + 100, y + 100).
pub fn camera() -> Camera2D {
    Camera2D::new(Vec2::ZERO, 200, 200)
}

/// Pixel whose centre is nearest to world `(x, y)` under [`camera`].
pub fn pixel_at(x: f32, y: f32) -> (u32, u32) {
    ((x + 100.0) as u32, (y + 100.0) as u32)
}
