//! Camera / projection provider consumed by the compositor.

use glam::{Mat4, Vec3};

use crate::math::{Aabb, Vec2};

/// Pixel rectangle in framebuffer space (origin top-left).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The part of this rectangle inside a `width` x `height` target. May be empty.
    #[must_use]
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    /// Map a rectangle from a `from`-sized framebuffer onto a `to`-sized one,
    /// rounding outwards, then clamp it to `to`.
    #[must_use]
    pub fn rescaled(self, from: (u32, u32), to: (u32, u32)) -> Self {
        if from == to {
            return self.clamped(to.0, to.1);
        }
        let sx = to.0 as f32 / from.0.max(1) as f32;
        let sy = to.1 as f32 / from.1.max(1) as f32;
        let x0 = (self.x as f32 * sx).floor() as u32;
        let y0 = (self.y as f32 * sy).floor() as u32;
        let x1 = ((self.x + self.width) as f32 * sx).ceil() as u32;
        let y1 = ((self.y + self.height) as f32 * sy).ceil() as u32;
        Self {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
        .clamped(to.0, to.1)
    }
}

/// What the lighting pipeline needs to know about the view.
pub trait CameraProvider {
    /// World space straight to clip space.
    fn world_view_projection(&self) -> Mat4;

    /// Screen-space scissor for `world_bounds`, clamped to the viewport.
    /// `None` when nothing of the bounds is on screen.
    fn scissor_rect(&self, world_bounds: Aabb) -> Option<ScissorRect>;

    /// World-space area covered by the viewport, for culling.
    fn world_bounds(&self) -> Aabb;

    /// Viewport size in pixels.
    fn viewport_size(&self) -> (u32, u32);
}

/// Centre-anchored 2D camera. World y grows downwards on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera2D {
    pub position: Vec2,
    pub zoom: f32,
    viewport: (u32, u32),
}

impl Camera2D {
    pub fn new(position: Vec2, viewport_width: u32, viewport_height: u32) -> Self {
        Self {
            position,
            zoom: 1.0,
            viewport: (viewport_width.max(1), viewport_height.max(1)),
        }
    }

    #[must_use]
    pub fn with_zoom(mut self, zoom: f32) -> Self {
        self.set_zoom(zoom);
        self
    }

    /// Non-positive or non-finite zoom values are ignored.
    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    fn half_extent(&self) -> Vec2 {
        Vec2::new(self.viewport.0 as f32, self.viewport.1 as f32) * (0.5 / self.zoom)
    }

    /// Converts screen coordinates to world coordinates using this camera.
    pub fn screen_to_world(&self, screen_pos: Vec2) -> Vec2 {
        let centre = Vec2::new(self.viewport.0 as f32, self.viewport.1 as f32) * 0.5;
        self.position + (screen_pos - centre) / self.zoom
    }

    /// Converts world coordinates to screen coordinates using this camera.
    pub fn world_to_screen(&self, world_pos: Vec2) -> Vec2 {
        let centre = Vec2::new(self.viewport.0 as f32, self.viewport.1 as f32) * 0.5;
        (world_pos - self.position) * self.zoom + centre
    }
}

impl Default for Camera2D {
    fn default() -> Self {
        Self::new(Vec2::ZERO, 1, 1)
    }
}

impl CameraProvider for Camera2D {
    fn world_view_projection(&self) -> Mat4 {
        let half = self.half_extent();
        let projection = Mat4::orthographic_rh_gl(-half.x, half.x, half.y, -half.y, -1.0, 1.0);
        let translation = Mat4::from_translation(Vec3::new(-self.position.x, -self.position.y, 0.0));

        projection * translation
    }

    fn scissor_rect(&self, world_bounds: Aabb) -> Option<ScissorRect> {
        let visible = world_bounds.intersection(&self.world_bounds())?;
        let min = self.world_to_screen(visible.min);
        let max = self.world_to_screen(visible.max);

        let (width, height) = self.viewport;
        let x0 = (min.x.floor().max(0.0) as u32).min(width);
        let y0 = (min.y.floor().max(0.0) as u32).min(height);
        let x1 = (max.x.ceil().max(0.0) as u32).min(width);
        let y1 = (max.y.ceil().max(0.0) as u32).min(height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(ScissorRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    fn world_bounds(&self) -> Aabb {
        Aabb::from_center_extent(self.position, self.half_extent())
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.viewport
    }
}
