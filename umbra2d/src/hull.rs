//! Polygonal occluders ("hulls").

use crate::cache::Generation;
use crate::error::{LightingError, Result};
use crate::geometry;
use crate::math::{Transform2D, Vec2};

/// Stable identifier for a hull inside a [`crate::LightingSystem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HullId(pub(crate) u32);

impl HullId {
    /// Get the underlying integer ID (useful for debugging or serialization).
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

/// Which hull fields changed since the frame orchestrator last cleared them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HullDirty {
    pub transform: bool,
    pub vertices: bool,
    pub enabled: bool,
}

impl HullDirty {
    pub fn all() -> Self {
        Self {
            transform: true,
            vertices: true,
            enabled: true,
        }
    }

    pub fn any(&self) -> bool {
        self.transform || self.vertices || self.enabled
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A polygon occluder in local space plus its world transform.
///
/// Vertices are stored counter-clockwise regardless of input winding. A hull
/// with fewer than three vertices is inert: it resolves as invalid and takes
/// part in no light test.
#[derive(Clone, Debug)]
pub struct Hull {
    points: Vec<Vec2>,
    transform: Transform2D,
    enabled: bool,
    convex: bool,
    dirty: HullDirty,
    generation: Generation,
}

impl Hull {
    pub fn new(points: Vec<Vec2>) -> Self {
        let mut hull = Self {
            points: Vec::new(),
            transform: Transform2D::identity(),
            enabled: true,
            convex: false,
            dirty: HullDirty::all(),
            generation: Generation::INITIAL,
        };
        hull.commit_points(points);
        hull
    }

    /// Axis-aligned rectangle centred on the local origin.
    pub fn rectangle(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        Self::new(vec![
            Vec2::new(-hw, -hh),
            Vec2::new(hw, -hh),
            Vec2::new(hw, hh),
            Vec2::new(-hw, hh),
        ])
    }

    /// Regular polygon with `sides` vertices on a circle of `radius`.
    pub fn regular_polygon(sides: usize, radius: f32) -> Self {
        let step = std::f32::consts::TAU / sides.max(1) as f32;
        Self::new(
            (0..sides)
                .map(|i| Vec2::from_angle(step * i as f32) * radius)
                .collect(),
        )
    }

    /// Builder form of [`Self::set_position`]. A non-finite position is ignored.
    #[must_use]
    pub fn with_position(mut self, position: Vec2) -> Self {
        if let Err(err) = self.set_position(position) {
            log::warn!("Ignoring hull position: {err}");
        }
        self
    }

    /// Builder form of [`Self::set_rotation`]. A non-finite rotation is ignored.
    #[must_use]
    pub fn with_rotation(mut self, rotation: f32) -> Self {
        if let Err(err) = self.set_rotation(rotation) {
            log::warn!("Ignoring hull rotation: {err}");
        }
        self
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn transform(&self) -> Transform2D {
        self.transform
    }

    pub fn position(&self) -> Vec2 {
        self.transform.position
    }

    pub fn rotation(&self) -> f32 {
        self.transform.rotation
    }

    pub fn scale(&self) -> Vec2 {
        self.transform.scale
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// At least three vertices.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= 3
    }

    /// Silhouette extraction is exact only for convex hulls.
    pub fn is_convex(&self) -> bool {
        self.convex
    }

    pub fn dirty(&self) -> HullDirty {
        self.dirty
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn set_position(&mut self, position: Vec2) -> Result<()> {
        if !position.is_finite() {
            return Err(LightingError::InvalidPosition(position.x, position.y));
        }
        if position != self.transform.position {
            self.transform.position = position;
            self.touch_transform();
        }
        Ok(())
    }

    pub fn translate(&mut self, offset: Vec2) -> Result<()> {
        self.set_position(self.transform.position + offset)
    }

    pub fn set_rotation(&mut self, rotation: f32) -> Result<()> {
        if !rotation.is_finite() {
            return Err(LightingError::InvalidRotation(rotation));
        }
        if rotation != self.transform.rotation {
            self.transform.rotation = rotation;
            self.touch_transform();
        }
        Ok(())
    }

    /// Zero or non-finite scale components are rejected.
    pub fn set_scale(&mut self, scale: Vec2) -> Result<()> {
        if !scale.is_finite() || scale.x == 0.0 || scale.y == 0.0 {
            return Err(LightingError::InvalidScale(scale.x, scale.y));
        }
        if scale != self.transform.scale {
            self.transform.scale = scale;
            self.touch_transform();
        }
        Ok(())
    }

    pub fn set_transform(&mut self, transform: Transform2D) -> Result<()> {
        let Transform2D {
            position,
            scale,
            rotation,
        } = transform;
        if !position.is_finite() {
            return Err(LightingError::InvalidPosition(position.x, position.y));
        }
        if !rotation.is_finite() {
            return Err(LightingError::InvalidRotation(rotation));
        }
        if !scale.is_finite() || scale.x == 0.0 || scale.y == 0.0 {
            return Err(LightingError::InvalidScale(scale.x, scale.y));
        }
        if transform != self.transform {
            self.transform = transform;
            self.touch_transform();
        }
        Ok(())
    }

    /// Replace the local-space outline. Clockwise input is reversed.
    pub fn set_points(&mut self, points: Vec<Vec2>) {
        self.commit_points(points);
        self.dirty.vertices = true;
        self.generation.bump();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            self.enabled = enabled;
            self.dirty.enabled = true;
            self.generation.bump();
        }
    }

    /// Flag every field as changed, forcing a resolve on the next frame.
    pub fn mark_all_dirty(&mut self) {
        self.dirty = HullDirty::all();
        self.generation.bump();
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    fn touch_transform(&mut self) {
        self.dirty.transform = true;
        self.generation.bump();
    }

    fn commit_points(&mut self, mut points: Vec<Vec2>) {
        // Reflecting scales (negative determinant) flip world winding; the
        // resolver re-checks orientation after transforming.
        if points.len() >= 3 && !geometry::is_counter_clockwise(&points) {
            points.reverse();
        }
        self.convex = geometry::is_convex(&points);
        self.points = points;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clockwise_input_is_normalized() {
        let hull = Hull::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ]);
        assert!(geometry::is_counter_clockwise(hull.points()));
        assert!(hull.is_convex());
    }

    #[test]
    fn fewer_than_three_points_is_inert() {
        let hull = Hull::new(vec![Vec2::ZERO, Vec2::new(1.0, 0.0)]);
        assert!(!hull.is_valid());
        assert!(!hull.is_convex());
    }

    #[test]
    fn mutations_set_dirty_flags_and_bump_generation() {
        let mut hull = Hull::rectangle(2.0, 2.0);
        hull.clear_dirty();
        let before = hull.generation();

        hull.set_position(Vec2::ZERO).unwrap();
        assert_eq!(hull.generation(), before);
        assert!(!hull.dirty().any());

        hull.set_rotation(0.5).unwrap();
        assert!(hull.dirty().transform);
        assert!(!hull.dirty().vertices);
        assert_ne!(hull.generation(), before);

        hull.set_points(vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)]);
        assert!(hull.dirty().vertices);
    }

    #[test]
    fn builders_track_changes_like_setters() {
        let mut hull = Hull::rectangle(2.0, 2.0);
        hull.clear_dirty();
        let before = hull.generation();

        let hull = hull.with_position(Vec2::new(3.0, 0.0)).with_rotation(0.25);
        assert!(hull.dirty().transform);
        assert_ne!(hull.generation(), before);
        assert_eq!(hull.position(), Vec2::new(3.0, 0.0));

        let hull = hull.with_position(Vec2::new(f32::NAN, 0.0));
        assert_eq!(hull.position(), Vec2::new(3.0, 0.0));
    }

    #[test]
    fn invalid_scale_is_rejected_without_mutation() {
        let mut hull = Hull::rectangle(2.0, 2.0);
        hull.clear_dirty();
        assert!(matches!(
            hull.set_scale(Vec2::new(0.0, 1.0)),
            Err(LightingError::InvalidScale(..))
        ));
        assert_eq!(hull.scale(), Vec2::ONE);
        assert!(!hull.dirty().any());
    }
}
