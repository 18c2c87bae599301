//! 2D intersection kernel and polygon helpers.
//!
//! Intersection queries are pure and allocation-free. Degenerate inputs (parallel
//! lines, zero-length directions, near-zero denominators) resolve to `None`
//! rather than an error, so per-light loops never branch on failures.

use crate::math::Vec2;

/// Shared tolerance for every comparison in the kernel.
pub const EPSILON: f32 = 1e-5;

/// Intersects the line through `p1`/`p2` with the line through `p3`/`p4`.
///
/// With `segment_a` (resp. `segment_b`) set, the parametric value along the
/// first (resp. second) line must lie in `[0, 1]`, within `EPSILON` at the
/// ends. Parallel and collinear inputs report no intersection; collinear
/// overlap is never reported. A solution with both parameters exactly zero is
/// rejected so that segments sharing a start point don't self-intersect.
pub fn intersect_lines(
    p1: Vec2,
    p2: Vec2,
    p3: Vec2,
    p4: Vec2,
    segment_a: bool,
    segment_b: bool,
) -> Option<Vec2> {
    let d1 = p2 - p1;
    let d2 = p4 - p3;
    let denom = d2.y * d1.x - d2.x * d1.y;
    if denom.abs() <= EPSILON {
        return None;
    }

    let offset = p1 - p3;
    let ua = (d2.x * offset.y - d2.y * offset.x) / denom;
    let ub = (d1.x * offset.y - d1.y * offset.x) / denom;

    if ua == 0.0 && ub == 0.0 {
        return None;
    }
    if segment_a && !within_unit(ua) {
        return None;
    }
    if segment_b && !within_unit(ub) {
        return None;
    }

    Some(p1 + d1 * ua)
}

/// Intersects two rays, returning the parametric distance along the first.
///
/// Distances are measured in multiples of `dir1`'s length. Both parameters
/// must be `>= -EPSILON`, so the hit lies on or ahead of both origins.
pub fn intersect_ray_ray(origin1: Vec2, dir1: Vec2, origin2: Vec2, dir2: Vec2) -> Option<f32> {
    let cross = dir1.cross(dir2);
    if cross.abs() <= EPSILON {
        return None;
    }

    let offset = origin2 - origin1;
    let t1 = offset.cross(dir2) / cross;
    let t2 = offset.cross(dir1) / cross;

    (t1 >= -EPSILON && t2 >= -EPSILON).then_some(t1)
}

/// Intersects a ray with the segment `p1`-`p2`.
///
/// Projects onto the ray's perpendicular; the hit is valid when the ray
/// parameter is `>= -EPSILON` and the segment parameter lies in
/// `[-EPSILON, 1 + EPSILON]`. Returns the distance in multiples of `dir`'s length.
pub fn intersect_ray_segment(origin: Vec2, dir: Vec2, p1: Vec2, p2: Vec2) -> Option<f32> {
    let v1 = origin - p1;
    let v2 = p2 - p1;
    let v3 = dir.perp();

    let dot = v2.dot(v3);
    if dot.abs() <= EPSILON {
        return None;
    }

    let t_ray = v2.cross(v1) / dot;
    let t_segment = v1.dot(v3) / dot;

    (t_ray >= -EPSILON && t_segment >= -EPSILON && t_segment <= 1.0 + EPSILON).then_some(t_ray)
}

/// Intersects a ray with a closed polygon (last vertex connects to the first).
///
/// Returns the hit on the first edge, in vertex order, that the ray crosses.
/// That is the nearest hit whenever the ray can cross only one edge (origin
/// inside a convex polygon); use [`nearest_ray_polygon`] otherwise.
pub fn intersect_ray_polygon(origin: Vec2, dir: Vec2, polygon: &[Vec2]) -> Option<f32> {
    edges(polygon).find_map(|(a, b)| intersect_ray_segment(origin, dir, a, b))
}

/// Like [`intersect_ray_polygon`] but scans every edge and keeps the closest hit.
pub fn nearest_ray_polygon(origin: Vec2, dir: Vec2, polygon: &[Vec2]) -> Option<f32> {
    edges(polygon)
        .filter_map(|(a, b)| intersect_ray_segment(origin, dir, a, b))
        .fold(None, |best: Option<f32>, t| Some(best.map_or(t, |b| b.min(t))))
}

/// Iterates the closed edge list `(v[i], v[i + 1])`, wrapping last to first.
pub fn edges(polygon: &[Vec2]) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    let n = polygon.len();
    (0..n).map(move |i| (polygon[i], polygon[(i + 1) % n]))
}

/// Shoelace signed area. Positive for counter-clockwise winding (y-up).
pub fn signed_area(polygon: &[Vec2]) -> f32 {
    edges(polygon).map(|(a, b)| a.cross(b)).sum::<f32>() * 0.5
}

pub fn is_counter_clockwise(polygon: &[Vec2]) -> bool {
    signed_area(polygon) > 0.0
}

/// True when every turn has the same sign (collinear runs are tolerated).
pub fn is_convex(polygon: &[Vec2]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut sign = 0.0f32;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let c = polygon[(i + 2) % n];
        let turn = (b - a).cross(c - b);
        if turn.abs() <= EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

/// Even-odd point-in-polygon test. Works for either winding.
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    for (a, b) in edges(polygon) {
        if (a.y > point.y) != (b.y > point.y) {
            let x = a.x + (point.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if point.x < x {
                inside = !inside;
            }
        }
    }
    inside
}

/// Arithmetic mean of the vertices.
pub fn vertex_centroid(polygon: &[Vec2]) -> Vec2 {
    if polygon.is_empty() {
        return Vec2::ZERO;
    }
    let sum = polygon.iter().fold(Vec2::ZERO, |acc, &p| acc + p);
    sum / polygon.len() as f32
}

/// Largest distance from `center` to any vertex.
pub fn bounding_radius(center: Vec2, polygon: &[Vec2]) -> f32 {
    polygon
        .iter()
        .map(|&p| p.distance_squared(center))
        .fold(0.0f32, f32::max)
        .sqrt()
}

/// Splits a simple polygon (either winding) into triangles appended to `out`.
///
/// Convex input is fanned from the first vertex; anything else goes through
/// ear clipping. Self-intersecting input yields a partial result.
pub fn triangulate(polygon: &[Vec2], out: &mut Vec<[Vec2; 3]>) {
    let n = polygon.len();
    if n < 3 {
        return;
    }
    if is_convex(polygon) {
        out.extend((1..n - 1).map(|i| [polygon[0], polygon[i], polygon[i + 1]]));
        return;
    }

    let mut ring: Vec<usize> = (0..n).collect();
    if !is_counter_clockwise(polygon) {
        ring.reverse();
    }

    while ring.len() > 3 {
        let m = ring.len();
        let ear = (0..m).find(|&i| {
            let (ia, ib, ic) = (ring[(i + m - 1) % m], ring[i], ring[(i + 1) % m]);
            let (a, b, c) = (polygon[ia], polygon[ib], polygon[ic]);
            if (b - a).cross(c - b) <= EPSILON {
                return false;
            }
            !ring
                .iter()
                .any(|&j| j != ia && j != ib && j != ic && point_in_triangle(polygon[j], a, b, c))
        });
        let Some(i) = ear else {
            return;
        };
        let m = ring.len();
        out.push([polygon[ring[(i + m - 1) % m]], polygon[ring[i]], polygon[ring[(i + 1) % m]]]);
        ring.remove(i);
    }
    out.push([polygon[ring[0]], polygon[ring[1]], polygon[ring[2]]]);
}

/// Inclusive test against a counter-clockwise triangle.
pub fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    (b - a).cross(p - a) >= 0.0 && (c - b).cross(p - b) >= 0.0 && (a - c).cross(p - c) >= 0.0
}

fn within_unit(t: f32) -> bool {
    (-EPSILON..=1.0 + EPSILON).contains(&t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn parallel_lines_do_not_intersect() {
        let hit = intersect_lines(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            true,
            true,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn collinear_overlap_is_not_reported() {
        let hit = intersect_lines(
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(3.0, 0.0),
            true,
            true,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn crossing_segments_meet_at_center() {
        let hit = intersect_lines(
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(2.0, 0.0),
            true,
            true,
        )
        .expect("segments cross");
        assert!(approx(hit.x, 1.0) && approx(hit.y, 1.0));
    }

    #[test]
    fn segment_constraint_rejects_hits_beyond_endpoints() {
        let a1 = Vec2::new(0.0, 0.0);
        let a2 = Vec2::new(1.0, 0.0);
        let b1 = Vec2::new(3.0, -1.0);
        let b2 = Vec2::new(3.0, 1.0);

        assert!(intersect_lines(a1, a2, b1, b2, true, true).is_none());
        let unconstrained = intersect_lines(a1, a2, b1, b2, false, true).expect("line hit");
        assert!(approx(unconstrained.x, 3.0) && approx(unconstrained.y, 0.0));
    }

    #[test]
    fn shared_start_point_is_not_a_hit() {
        let origin = Vec2::new(0.0, 0.0);
        let hit = intersect_lines(origin, Vec2::new(1.0, 0.0), origin, Vec2::new(0.0, 1.0), true, true);
        assert!(hit.is_none());
    }

    #[test]
    fn endpoint_touch_is_within_tolerance() {
        let hit = intersect_lines(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            true,
            true,
        )
        .expect("touching at the end of the first segment");
        assert!(approx(hit.x, 1.0) && approx(hit.y, 0.0));
    }

    #[test]
    fn ray_ray_requires_hit_ahead_of_both_origins() {
        let t = intersect_ray_ray(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(5.0, -5.0),
            Vec2::new(0.0, 1.0),
        )
        .expect("rays cross");
        assert!(approx(t, 5.0));

        // Second ray points away from the crossing.
        let behind = intersect_ray_ray(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(5.0, -5.0),
            Vec2::new(0.0, -1.0),
        );
        assert!(behind.is_none());

        let parallel = intersect_ray_ray(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(2.0, 0.0),
        );
        assert!(parallel.is_none());
    }

    #[test]
    fn ray_segment_hits_at_distance_one() {
        let t = intersect_ray_segment(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
        )
        .expect("ray hits the segment");
        assert!(approx(t, 1.0));
    }

    #[test]
    fn ray_segment_misses_behind_and_beside() {
        let origin = Vec2::new(0.0, 0.0);
        let dir = Vec2::new(1.0, 0.0);
        assert!(intersect_ray_segment(origin, dir, Vec2::new(-1.0, -1.0), Vec2::new(-1.0, 1.0)).is_none());
        assert!(intersect_ray_segment(origin, dir, Vec2::new(1.0, 0.5), Vec2::new(1.0, 2.0)).is_none());
        assert!(intersect_ray_segment(origin, Vec2::ZERO, Vec2::new(1.0, -1.0), Vec2::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn ray_polygon_first_hit_versus_nearest() {
        let square = [
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, 1.0),
        ];
        let origin = Vec2::new(-5.0, 0.0);
        let dir = Vec2::new(1.0, 0.0);

        // Edge order reaches the far side (x = 1) before the near side (x = -1).
        let first = intersect_ray_polygon(origin, dir, &square).expect("hit");
        let nearest = nearest_ray_polygon(origin, dir, &square).expect("hit");
        assert!(approx(first, 6.0));
        assert!(approx(nearest, 4.0));

        let inside = intersect_ray_polygon(Vec2::ZERO, dir, &square).expect("exit hit");
        assert!(approx(inside, 1.0));
    }

    #[test]
    fn polygon_predicates() {
        let ccw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(0.0, 4.0),
        ];
        let mut cw = ccw;
        cw.reverse();

        assert!(approx(signed_area(&ccw), 16.0));
        assert!(is_counter_clockwise(&ccw));
        assert!(!is_counter_clockwise(&cw));
        assert!(is_convex(&ccw) && is_convex(&cw));

        let arrow = [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 2.0),
            Vec2::new(0.0, 4.0),
            Vec2::new(1.0, 2.0),
        ];
        assert!(!is_convex(&arrow));

        assert!(point_in_polygon(Vec2::new(2.0, 2.0), &ccw));
        assert!(point_in_polygon(Vec2::new(2.0, 2.0), &cw));
        assert!(!point_in_polygon(Vec2::new(5.0, 2.0), &ccw));
        assert!(!point_in_polygon(Vec2::new(0.5, 2.0), &arrow));
    }

    #[test]
    fn centroid_and_radius() {
        let square = [
            Vec2::new(-2.0, -2.0),
            Vec2::new(2.0, -2.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(-2.0, 2.0),
        ];
        let c = vertex_centroid(&square);
        assert!(approx(c.x, 0.0) && approx(c.y, 0.0));
        assert!(approx(bounding_radius(c, &square), 8.0f32.sqrt()));
    }

    #[test]
    fn triangulation_covers_concave_area() {
        let notch = [
            Vec2::new(0.0, 0.0),
            Vec2::new(4.0, 0.0),
            Vec2::new(4.0, 4.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(0.0, 4.0),
        ];
        let mut triangles = Vec::new();
        triangulate(&notch, &mut triangles);
        assert_eq!(triangles.len(), 3);
        let area: f32 = triangles.iter().map(|t| signed_area(t).abs()).sum();
        assert!(approx(area, signed_area(&notch).abs()));

        triangles.clear();
        triangulate(&notch[..2], &mut triangles);
        assert!(triangles.is_empty());
    }
}
