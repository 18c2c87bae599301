//! Light sources and their change tracking.

use glam::Affine2;
use serde::{Deserialize, Serialize};

use crate::cache::{CachedValue, Generation};
use crate::error::{LightingError, Result};
use crate::math::{Aabb, Color, Vec2};

/// Stable identifier for a light inside a [`crate::LightingSystem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(pub(crate) u32);

impl LightId {
    /// Get the underlying integer ID (useful for debugging or serialization).
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

/// Handle to a texture registered with a backend for textured lights.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LightTextureId(pub u32);

/// How hulls interact with a light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowType {
    /// Hull surfaces are lit; only the region behind them is shadowed.
    #[default]
    Illuminated,
    /// The hull footprint itself receives no light.
    Solid,
}

/// Emission shape, selecting the fill technique used for the light quad.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum LightShape {
    /// Radial falloff in every direction.
    #[default]
    Point,
    /// Cone around `direction_angle` (radians), fading over `decay` past the edge.
    Spot {
        direction_angle: f32,
        cone_half_angle: f32,
        decay: f32,
    },
    /// Light quad modulated by a backend texture rotated by `rotation`.
    Textured {
        texture: LightTextureId,
        rotation: f32,
    },
}

/// Mapping between world space and a light's unit space, where the light
/// sits at the origin and its range is 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightTransform {
    pub to_world: Affine2,
    pub to_light: Affine2,
}

impl LightTransform {
    pub fn new(center: Vec2, range: f32) -> Self {
        let to_world = Affine2::from_scale_angle_translation(glam::Vec2::splat(range), 0.0, center.to_glam());
        Self {
            to_world,
            to_light: to_world.inverse(),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.to_world.translation.into()
    }

    pub fn range(&self) -> f32 {
        self.to_world.matrix2.x_axis.x
    }

    /// World point into light unit space.
    pub fn to_unit(&self, world: Vec2) -> Vec2 {
        self.to_light.transform_point2(world.to_glam()).into()
    }
}

/// Which light fields changed since the frame orchestrator last cleared them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightDirty {
    pub position: bool,
    pub range: bool,
    pub radius: bool,
    pub enabled: bool,
    pub casts_shadows: bool,
    pub shadow_type: bool,
    pub appearance: bool,
}

impl LightDirty {
    pub fn all() -> Self {
        Self {
            position: true,
            range: true,
            radius: true,
            enabled: true,
            casts_shadows: true,
            shadow_type: true,
            appearance: true,
        }
    }

    pub fn any(&self) -> bool {
        *self != Self::default()
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A single light source.
///
/// All setters validate before assigning, so a rejected mutation leaves the
/// light untouched.
#[derive(Clone, Debug)]
pub struct Light {
    position: Vec2,
    range: f32,
    radius: f32,
    intensity: f32,
    color: Color,
    enabled: bool,
    casts_shadows: bool,
    shadow_type: ShadowType,
    shape: LightShape,
    dirty: LightDirty,
    // Bumped on position/range changes (unit transform source).
    transform_generation: Generation,
    // Bumped on anything that changes the light's shadow geometry.
    shadow_generation: Generation,
    transform: CachedValue<LightTransform>,
}

impl Light {
    /// Create an enabled, shadow-casting white point light.
    ///
    /// The visualization radius starts at 1.
    pub fn new(position: Vec2, range: f32) -> Result<Self> {
        validate_range(range)?;
        if !position.is_finite() {
            return Err(LightingError::InvalidPosition(position.x, position.y));
        }
        Ok(Self {
            position,
            range,
            radius: 1.0,
            intensity: 1.0,
            color: Color::WHITE,
            enabled: true,
            casts_shadows: true,
            shadow_type: ShadowType::default(),
            shape: LightShape::Point,
            dirty: LightDirty::all(),
            transform_generation: Generation::INITIAL,
            shadow_generation: Generation::INITIAL,
            transform: CachedValue::new(),
        })
    }

    /// Set the color (builder form). Alpha is forced to 1.
    pub fn with_color(mut self, color: Color) -> Result<Self> {
        self.set_color(color)?;
        Ok(self)
    }

    pub fn with_intensity(mut self, intensity: f32) -> Result<Self> {
        self.set_intensity(intensity)?;
        Ok(self)
    }

    pub fn with_radius(mut self, radius: f32) -> Result<Self> {
        self.set_radius(radius)?;
        Ok(self)
    }

    pub fn with_shadow_type(mut self, shadow_type: ShadowType) -> Self {
        self.set_shadow_type(shadow_type);
        self
    }

    pub fn with_shape(mut self, shape: LightShape) -> Result<Self> {
        self.set_shape(shape)?;
        Ok(self)
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Shader decay factor, `1 / intensity`. Always finite.
    pub fn intensity_factor(&self) -> f32 {
        1.0 / self.intensity
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn casts_shadows(&self) -> bool {
        self.casts_shadows
    }

    pub fn shadow_type(&self) -> ShadowType {
        self.shadow_type
    }

    pub fn shape(&self) -> LightShape {
        self.shape
    }

    pub fn dirty(&self) -> LightDirty {
        self.dirty
    }

    pub fn shadow_generation(&self) -> Generation {
        self.shadow_generation
    }

    /// World-space bounds `[position - range, position + range]`.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_center_extent(self.position, Vec2::splat(self.range))
    }

    pub fn set_position(&mut self, position: Vec2) -> Result<()> {
        if !position.is_finite() {
            return Err(LightingError::InvalidPosition(position.x, position.y));
        }
        if position != self.position {
            self.position = position;
            self.dirty.position = true;
            self.transform_generation.bump();
            self.shadow_generation.bump();
        }
        Ok(())
    }

    /// Change the reach. Fails if `range < 1` or if it would drop below the radius.
    pub fn set_range(&mut self, range: f32) -> Result<()> {
        validate_range(range)?;
        if self.radius > range {
            return Err(LightingError::InvalidRadius {
                radius: self.radius,
                range,
            });
        }
        if range != self.range {
            self.range = range;
            self.dirty.range = true;
            self.transform_generation.bump();
            self.shadow_generation.bump();
        }
        Ok(())
    }

    pub fn set_radius(&mut self, radius: f32) -> Result<()> {
        if !radius.is_finite() || radius < 1.0 || radius > self.range {
            return Err(LightingError::InvalidRadius {
                radius,
                range: self.range,
            });
        }
        if radius != self.radius {
            self.radius = radius;
            self.dirty.radius = true;
        }
        Ok(())
    }

    /// Zero, negative and non-finite intensities are rejected.
    pub fn set_intensity(&mut self, intensity: f32) -> Result<()> {
        if !intensity.is_finite() || intensity <= 0.0 {
            return Err(LightingError::InvalidIntensity(intensity));
        }
        if intensity != self.intensity {
            self.intensity = intensity;
            self.dirty.appearance = true;
        }
        Ok(())
    }

    pub fn set_color(&mut self, color: Color) -> Result<()> {
        if !color.is_finite() {
            return Err(LightingError::InvalidColor);
        }
        let color = color.opaque();
        if color != self.color {
            self.color = color;
            self.dirty.appearance = true;
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            self.enabled = enabled;
            self.dirty.enabled = true;
            self.shadow_generation.bump();
        }
    }

    pub fn set_casts_shadows(&mut self, casts_shadows: bool) {
        if casts_shadows != self.casts_shadows {
            self.casts_shadows = casts_shadows;
            self.dirty.casts_shadows = true;
            self.shadow_generation.bump();
        }
    }

    pub fn set_shadow_type(&mut self, shadow_type: ShadowType) {
        if shadow_type != self.shadow_type {
            self.shadow_type = shadow_type;
            self.dirty.shadow_type = true;
            self.shadow_generation.bump();
        }
    }

    pub fn set_shape(&mut self, shape: LightShape) -> Result<()> {
        if let LightShape::Spot {
            direction_angle,
            cone_half_angle,
            decay,
        } = shape
        {
            if !cone_half_angle.is_finite()
                || cone_half_angle <= 0.0
                || cone_half_angle > std::f32::consts::PI
            {
                return Err(LightingError::InvalidConeAngle(cone_half_angle));
            }
            if !direction_angle.is_finite() || !decay.is_finite() || decay < 0.0 {
                return Err(LightingError::InvalidConeAngle(cone_half_angle));
            }
        }
        if shape != self.shape {
            self.shape = shape;
            self.dirty.appearance = true;
        }
        Ok(())
    }

    /// Flag every field as changed, forcing downstream recomputation.
    pub fn mark_all_dirty(&mut self) {
        self.dirty = LightDirty::all();
        self.transform_generation.bump();
        self.shadow_generation.bump();
    }

    /// World/unit-space transform pair, rebuilt only after a position or
    /// range change.
    pub fn transform(&mut self) -> LightTransform {
        let (position, range) = (self.position, self.range);
        *self
            .transform
            .get_or_update(self.transform_generation, || LightTransform::new(position, range))
    }

    pub fn transform_is_fresh(&self) -> bool {
        self.transform.is_fresh(self.transform_generation)
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }
}

fn validate_range(range: f32) -> Result<()> {
    if !range.is_finite() || range < 1.0 {
        return Err(LightingError::InvalidRange(range));
    }
    Ok(())
}
