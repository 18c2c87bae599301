//! Shadow geometry: silhouette extraction and projection to a light's reach.
//!
//! Every polygon produced here is clipped to the light's bounding square, so
//! a masked light quad never needs geometry beyond its own extent.

use std::collections::HashMap;

use crate::cache::Generation;
use crate::geometry::{self, EPSILON};
use crate::hull::HullId;
use crate::light::{Light, LightId, ShadowType};
use crate::math::Vec2;
use crate::resolver::{HullResolver, ResolvedHull};
use crate::visibility;

/// A filled region that receives no light from its caster.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowPolygon {
    /// Counter-clockwise outline.
    pub points: Vec<Vec2>,
}

impl ShadowPolygon {
    pub fn contains(&self, point: Vec2) -> bool {
        geometry::point_in_polygon(point, &self.points)
    }

    /// Appends this polygon's triangles to `out`.
    pub fn triangulate_into(&self, out: &mut Vec<[Vec2; 3]>) {
        geometry::triangulate(&self.points, out);
    }
}

/// The two hull vertices where edge facing flips, as seen from a light.
///
/// Walking the hull counter-clockwise from `start` to `end` visits exactly
/// the edges facing away from the light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Silhouette {
    pub hull: HullId,
    pub start: Vec2,
    pub end: Vec2,
    pub start_index: usize,
    pub end_index: usize,
    /// False when the pair came from a fallback (no clean facing flip) or the
    /// hull is not convex.
    pub exact: bool,
}

/// All shadow geometry a light casts this frame.
#[derive(Clone, Debug, Default)]
pub struct LightShadows {
    pub polygons: Vec<ShadowPolygon>,
    pub silhouettes: Vec<Silhouette>,
}

impl LightShadows {
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// True when any shadow polygon covers `point`.
    pub fn shadows(&self, point: Vec2) -> bool {
        self.polygons.iter().any(|polygon| polygon.contains(point))
    }

    fn clear(&mut self) {
        self.polygons.clear();
        self.silhouettes.clear();
    }
}

/// Marks each edge `v[i] -> v[i + 1]` of a counter-clockwise polygon as
/// facing the light (`true`) or away from it.
pub fn classify_edges(points: &[Vec2], light_position: Vec2, out: &mut Vec<bool>) {
    out.clear();
    out.extend(geometry::edges(points).map(|(a, b)| {
        let edge = b - a;
        let outward = Vec2::new(edge.y, -edge.x);
        outward.dot(light_position - a) > 0.0
    }));
}

/// Finds the silhouette of a counter-clockwise hull as seen from `light_position`.
///
/// Returns `None` for hulls with fewer than three vertices. When the facing
/// walk finds no flip (light on or inside the outline), the angular extremes
/// around the centroid direction are used instead, so any valid hull yields
/// two vertices.
pub fn find_silhouette(hull: &ResolvedHull, light_position: Vec2, facing: &mut Vec<bool>) -> Option<Silhouette> {
    let points = &hull.points;
    let n = points.len();
    if n < 3 {
        return None;
    }
    classify_edges(points, light_position, facing);

    let flips_at = |i: usize| facing[(i + n - 1) % n] != facing[i];
    let flips = (0..n).filter(|&i| flips_at(i)).count();
    // Front-to-back flip opens the back-facing chain; the next back-to-front closes it.
    let start = (0..n).find(|&i| flips_at(i) && !facing[i]);
    let end = start.and_then(|s| (1..=n).map(|k| (s + k) % n).find(|&i| flips_at(i) && facing[i]));

    if let (Some(start_index), Some(end_index)) = (start, end) {
        return Some(Silhouette {
            hull: hull.id,
            start: points[start_index],
            end: points[end_index],
            start_index,
            end_index,
            exact: flips == 2 && hull.convex,
        });
    }

    let (start_index, end_index) = angular_extremes(points, light_position, hull.centroid)?;
    Some(Silhouette {
        hull: hull.id,
        start: points[start_index],
        end: points[end_index],
        start_index,
        end_index,
        exact: false,
    })
}

/// Indices of the vertices with the smallest and largest angle around
/// `light_position`, measured from the direction towards `centroid`.
fn angular_extremes(points: &[Vec2], light_position: Vec2, centroid: Vec2) -> Option<(usize, usize)> {
    let mut reference = centroid - light_position;
    if reference.length_squared() <= EPSILON {
        reference = points[0] - light_position;
    }
    if reference.length_squared() <= EPSILON {
        return None;
    }

    let angle = |p: Vec2| {
        let d = p - light_position;
        reference.cross(d).atan2(reference.dot(d))
    };
    let mut min = (0, f32::INFINITY);
    let mut max = (0, f32::NEG_INFINITY);
    for (i, &p) in points.iter().enumerate() {
        let a = angle(p);
        if a < min.1 {
            min = (i, a);
        }
        if a > max.1 {
            max = (i, a);
        }
    }
    (min.0 != max.0).then_some((min.0, max.0))
}

/// Projects the segment `a`-`b` away from the light up to the edge of the
/// light's bounding square (`clip`, counter-clockwise corners).
///
/// Returns a convex counter-clockwise polygon, or `None` when the segment is
/// degenerate as seen from the light (zero length, collinear with it, or
/// touching the light position).
pub fn project_segment(light_position: Vec2, a: Vec2, b: Vec2, clip: &[Vec2; 4]) -> Option<ShadowPolygon> {
    let (mut a, mut b) = (a, b);
    let mut da = a - light_position;
    let mut db = b - light_position;
    if da.length_squared() <= EPSILON || db.length_squared() <= EPSILON {
        return None;
    }
    let turn = da.cross(db);
    if turn.abs() <= EPSILON {
        return None;
    }
    if turn < 0.0 {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut da, &mut db);
    }

    let far = |d: Vec2| {
        let dir = d.normalized();
        let exit = geometry::intersect_ray_polygon(light_position, dir, clip)
            .unwrap_or_else(|| clip[0].distance(clip[2]));
        light_position + dir * exit.max(d.length())
    };
    let far_a = far(da);
    let far_b = far(db);

    // Square corners strictly inside the wedge, in increasing angle from `da`.
    let mut corners: Vec<(f32, Vec2)> = clip
        .iter()
        .filter_map(|&c| {
            let dc = c - light_position;
            (da.cross(dc) > 0.0 && dc.cross(db) > 0.0).then(|| (da.cross(dc).atan2(da.dot(dc)), c))
        })
        .collect();
    corners.sort_by(|x, y| x.0.total_cmp(&y.0));

    let mut points = Vec::with_capacity(4 + corners.len());
    points.push(a);
    points.push(far_a);
    points.extend(corners.into_iter().map(|(_, c)| c));
    points.push(far_b);
    points.push(b);
    Some(ShadowPolygon { points })
}

/// Appends the shadow geometry `hull` casts from `light` to `out`.
///
/// Illuminated lights project every back-facing edge, keeping the hull's own
/// footprint lit. Solid lights project the silhouette span and add the hull
/// footprint; non-convex hulls fall back to per-edge projection there too.
pub fn cast_hull_shadow(
    light: &Light,
    hull: &ResolvedHull,
    facing: &mut Vec<bool>,
    out: &mut LightShadows,
) {
    let position = light.position();
    let Some(silhouette) = find_silhouette(hull, position, facing) else {
        return;
    };
    if !silhouette.exact {
        log::trace!(
            "Approximate silhouette for hull {:?} (convex: {})",
            hull.id,
            hull.convex
        );
    }
    out.silhouettes.push(silhouette);

    let clip = light.bounds().corners();
    let per_edge = light.shadow_type() == ShadowType::Illuminated || !hull.convex;
    if per_edge {
        for (i, (a, b)) in geometry::edges(&hull.points).enumerate() {
            if facing[i] {
                continue;
            }
            if let Some(polygon) = project_segment(position, a, b, &clip) {
                out.polygons.push(polygon);
            }
        }
    } else if let Some(polygon) = project_segment(position, silhouette.start, silhouette.end, &clip) {
        out.polygons.push(polygon);
    }

    if light.shadow_type() == ShadowType::Solid {
        out.polygons.push(ShadowPolygon {
            points: hull.points.clone(),
        });
    }
}

/// Builds a light's shadows from every reachable, active hull.
pub fn build_light_shadows<'a>(
    light: &Light,
    hulls: impl IntoIterator<Item = &'a ResolvedHull>,
    out: &mut LightShadows,
) {
    out.clear();
    if !light.enabled() || !light.casts_shadows() {
        return;
    }
    let mut facing = Vec::new();
    for hull in hulls {
        if visibility::light_reaches_hull(light.position(), light.range(), hull) {
            cast_hull_shadow(light, hull, &mut facing, out);
        }
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    built: bool,
    light_generation: Generation,
    hull_revision: Generation,
    shadows: LightShadows,
}

/// Per-light shadow builder with reuse across frames.
///
/// An entry is reused while neither the light's shadow-relevant fields nor
/// the resolved hull set changed.
#[derive(Debug, Default)]
pub struct ShadowCaster {
    cache: HashMap<LightId, CacheEntry>,
    caching: bool,
}

impl ShadowCaster {
    pub fn new(caching: bool) -> Self {
        Self {
            cache: HashMap::new(),
            caching,
        }
    }

    pub fn set_caching(&mut self, caching: bool) {
        self.caching = caching;
        if !caching {
            self.cache.clear();
        }
    }

    /// Shadows for `light`, plus whether they came from the cache.
    pub fn cast(&mut self, id: LightId, light: &Light, hulls: &HullResolver) -> (&LightShadows, bool) {
        let light_generation = light.shadow_generation();
        let hull_revision = hulls.revision();

        let entry = self.cache.entry(id).or_default();
        let hit = self.caching
            && entry.built
            && entry.light_generation == light_generation
            && entry.hull_revision == hull_revision;
        if !hit {
            build_light_shadows(light, hulls.active(), &mut entry.shadows);
            entry.light_generation = light_generation;
            entry.hull_revision = hull_revision;
            entry.built = true;
        }
        (&entry.shadows, hit)
    }

    /// Drop cache entries for lights that no longer exist.
    pub fn retain(&mut self, mut live: impl FnMut(LightId) -> bool) {
        self.cache.retain(|id, _| live(*id));
    }

    pub fn cached_lights(&self) -> usize {
        self.cache.len()
    }
}
