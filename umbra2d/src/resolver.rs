//! Lazy world-space resolution of hulls.
//!
//! Cost is proportional to the hulls that changed since their last resolve,
//! not to the hulls that exist.

use std::collections::HashMap;

use crate::cache::Generation;
use crate::geometry;
use crate::hull::{Hull, HullId};
use crate::math::{Aabb, Vec2};

/// World-space data derived from a [`Hull`].
#[derive(Clone, Debug)]
pub struct ResolvedHull {
    pub id: HullId,
    /// World vertices, counter-clockwise.
    pub points: Vec<Vec2>,
    pub bounds: Aabb,
    /// Average of the world vertices.
    pub centroid: Vec2,
    /// Largest centroid-to-vertex distance.
    pub radius: f32,
    /// At least three vertices.
    pub valid: bool,
    pub enabled: bool,
    pub convex: bool,
    generation: Generation,
}

impl ResolvedHull {
    /// Enabled and valid: the hull takes part in light tests.
    pub fn is_active(&self) -> bool {
        self.enabled && self.valid
    }

    fn compute(id: HullId, hull: &Hull, mut points: Vec<Vec2>) -> Self {
        let transform = hull.transform();
        points.clear();
        points.extend(hull.points().iter().map(|&p| transform.transform_point(p)));

        // A mirroring scale flips the winding the hull normalized at commit.
        if transform.scale.x * transform.scale.y < 0.0 {
            points.reverse();
        }

        let centroid = geometry::vertex_centroid(&points);
        Self {
            id,
            bounds: Aabb::from_points(&points),
            radius: geometry::bounding_radius(centroid, &points),
            centroid,
            valid: points.len() >= 3,
            enabled: hull.enabled(),
            convex: hull.is_convex(),
            generation: hull.generation(),
            points,
        }
    }
}

/// Owns the authoritative resolved view of the live hull collection.
#[derive(Debug, Default)]
pub struct HullResolver {
    entries: HashMap<HullId, ResolvedHull>,
    order: Vec<HullId>,
    revision: Generation,
    last_recomputed: usize,
}

impl HullResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the resolved set in line with `hulls` (in collection order).
    ///
    /// A hull is recomputed when it is new, or when its dirty flags are set
    /// and its generation moved since the cached entry. Entries for hulls no
    /// longer present are dropped.
    pub fn resolve<'a>(&mut self, hulls: impl IntoIterator<Item = (HullId, &'a Hull)>) {
        let mut recomputed = 0;
        self.order.clear();

        for (id, hull) in hulls {
            self.order.push(id);
            let stale = match self.entries.get(&id) {
                None => true,
                Some(entry) => hull.dirty().any() && entry.generation != hull.generation(),
            };
            if !stale {
                continue;
            }

            // Reuse the previous vertex allocation when there is one.
            let scratch = self
                .entries
                .remove(&id)
                .map(|entry| entry.points)
                .unwrap_or_default();
            self.entries.insert(id, ResolvedHull::compute(id, hull, scratch));
            recomputed += 1;
        }

        let before = self.entries.len();
        if before != self.order.len() {
            let live: std::collections::HashSet<HullId> = self.order.iter().copied().collect();
            self.entries.retain(|id, _| live.contains(id));
        }
        let removed = before - self.entries.len();

        if recomputed > 0 || removed > 0 {
            self.revision.bump();
            log::trace!("Resolved hulls: {recomputed} recomputed, {removed} dropped");
        }
        self.last_recomputed = recomputed;
    }

    /// Resolved hulls in collection order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedHull> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Enabled, valid hulls only.
    pub fn active(&self) -> impl Iterator<Item = &ResolvedHull> + '_ {
        self.iter().filter(|hull| hull.is_active())
    }

    pub fn get(&self, id: HullId) -> Option<&ResolvedHull> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Advances whenever the resolved set changes in any way.
    pub fn revision(&self) -> Generation {
        self.revision
    }

    /// Hulls recomputed by the most recent `resolve`.
    pub fn last_recompute_count(&self) -> usize {
        self.last_recomputed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u32) -> Vec<HullId> {
        (0..n).map(HullId).collect()
    }

    #[test]
    fn world_data_follows_transform() {
        let hull = Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0));
        let mut resolver = HullResolver::new();
        resolver.resolve([(HullId(0), &hull)]);

        let resolved = resolver.get(HullId(0)).unwrap();
        assert!(resolved.valid && resolved.enabled && resolved.convex);
        assert_eq!(resolved.bounds, Aabb::new(Vec2::new(45.0, -5.0), Vec2::new(55.0, 5.0)));
        assert!((resolved.centroid.x - 50.0).abs() < 1e-5);
        assert!((resolved.radius - 50.0f32.sqrt()).abs() < 1e-4);
    }

    #[test]
    fn second_resolve_without_mutation_does_no_work() {
        let hulls: Vec<(HullId, Hull)> = ids(3)
            .into_iter()
            .map(|id| (id, Hull::regular_polygon(5, 3.0).with_position(Vec2::new(id.0 as f32 * 10.0, 0.0))))
            .collect();
        let mut resolver = HullResolver::new();

        resolver.resolve(hulls.iter().map(|(id, h)| (*id, h)));
        assert_eq!(resolver.last_recompute_count(), 3);
        let first: Vec<Vec<Vec2>> = resolver.iter().map(|h| h.points.clone()).collect();
        let revision = resolver.revision();

        // Dirty flags are still set (only the frame orchestrator clears them),
        // but nothing moved since the cached generation.
        resolver.resolve(hulls.iter().map(|(id, h)| (*id, h)));
        assert_eq!(resolver.last_recompute_count(), 0);
        assert_eq!(resolver.revision(), revision);
        let second: Vec<Vec<Vec2>> = resolver.iter().map(|h| h.points.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn only_changed_hulls_are_recomputed() {
        let mut hulls: Vec<(HullId, Hull)> = ids(4).into_iter().map(|id| (id, Hull::rectangle(1.0, 1.0))).collect();
        let mut resolver = HullResolver::new();
        resolver.resolve(hulls.iter().map(|(id, h)| (*id, h)));
        for (_, hull) in &mut hulls {
            hull.clear_dirty();
        }

        hulls[2].1.set_rotation(1.0).unwrap();
        resolver.resolve(hulls.iter().map(|(id, h)| (*id, h)));
        assert_eq!(resolver.last_recompute_count(), 1);
    }

    #[test]
    fn removed_hulls_leave_the_resolved_set() {
        let hulls: Vec<(HullId, Hull)> = ids(3).into_iter().map(|id| (id, Hull::rectangle(1.0, 1.0))).collect();
        let mut resolver = HullResolver::new();
        resolver.resolve(hulls.iter().map(|(id, h)| (*id, h)));
        let revision = resolver.revision();

        resolver.resolve(hulls.iter().filter(|(id, _)| id.0 != 1).map(|(id, h)| (*id, h)));
        assert_eq!(resolver.len(), 2);
        assert!(resolver.get(HullId(1)).is_none());
        assert_ne!(resolver.revision(), revision);
        assert_eq!(resolver.iter().map(|h| h.id).collect::<Vec<_>>(), vec![HullId(0), HullId(2)]);
    }

    #[test]
    fn mirrored_scale_keeps_counter_clockwise_winding() {
        let mut hull = Hull::rectangle(2.0, 4.0);
        hull.set_scale(Vec2::new(-1.0, 1.0)).unwrap();
        let mut resolver = HullResolver::new();
        resolver.resolve([(HullId(0), &hull)]);
        assert!(geometry::is_counter_clockwise(&resolver.get(HullId(0)).unwrap().points));
    }

    #[test]
    fn degenerate_hull_resolves_inactive() {
        let hull = Hull::new(vec![Vec2::ZERO, Vec2::new(1.0, 1.0)]);
        let mut resolver = HullResolver::new();
        resolver.resolve([(HullId(0), &hull)]);
        assert!(!resolver.get(HullId(0)).unwrap().valid);
        assert_eq!(resolver.active().count(), 0);
    }

    #[test]
    fn translate_round_trip_restores_bounds() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut hull = Hull::regular_polygon(6, 4.0).with_position(Vec2::new(3.0, -2.0));
        let mut resolver = HullResolver::new();
        resolver.resolve([(HullId(0), &hull)]);
        let original = resolver.get(HullId(0)).unwrap().clone();

        for _ in 0..16 {
            let offset = Vec2::new(rng.f32() * 200.0 - 100.0, rng.f32() * 200.0 - 100.0);
            hull.translate(offset).unwrap();
            resolver.resolve([(HullId(0), &hull)]);
            hull.translate(-offset).unwrap();
            resolver.resolve([(HullId(0), &hull)]);

            let back = resolver.get(HullId(0)).unwrap();
            assert!(back.bounds.min.distance(original.bounds.min) < 1e-3);
            assert!(back.bounds.max.distance(original.bounds.max) < 1e-3);
            assert!(back.centroid.distance(original.centroid) < 1e-3);
        }
    }
}
