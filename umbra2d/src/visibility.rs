//! Broad-phase culling and containment tests between lights, hulls and the view.

use crate::geometry;
use crate::light::Light;
use crate::math::{Aabb, Vec2};
use crate::resolver::ResolvedHull;

/// Circle-vs-circle reach test: can a light of `range` at `light_position`
/// touch a hull bounded by its centroid circle? Compared squared.
pub fn light_reaches_hull(light_position: Vec2, range: f32, hull: &ResolvedHull) -> bool {
    if !hull.is_active() {
        return false;
    }
    let reach = range + hull.radius;
    light_position.distance_squared(hull.centroid) <= reach * reach
}

/// Returns the first active hull whose polygon encloses the light's centre.
///
/// Only hulls whose bounds overlap the light's bounds are tested.
pub fn find_enclosing_hull<'a>(
    light: &Light,
    hulls: impl IntoIterator<Item = &'a ResolvedHull>,
) -> Option<&'a ResolvedHull> {
    let position = light.position();
    let bounds = light.bounds();
    hulls.into_iter().find(|hull| {
        hull.is_active()
            && hull.bounds.intersects(&bounds)
            && geometry::point_in_polygon(position, &hull.points)
    })
}

/// Light bounds against the camera's world-space view bounds.
pub fn light_visible(light_bounds: &Aabb, view_bounds: &Aabb) -> bool {
    light_bounds.intersects(view_bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hull::{Hull, HullId};
    use crate::resolver::HullResolver;

    fn resolve(hulls: &[Hull]) -> HullResolver {
        let mut resolver = HullResolver::new();
        resolver.resolve(hulls.iter().enumerate().map(|(i, h)| (HullId(i as u32), h)));
        resolver
    }

    #[test]
    fn broad_phase_uses_range_plus_hull_radius() {
        let resolver = resolve(&[Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0))]);
        let hull = resolver.get(HullId(0)).unwrap();

        assert!(light_reaches_hull(Vec2::ZERO, 100.0, hull));
        // 50 - radius(~7.07) > 40
        assert!(!light_reaches_hull(Vec2::ZERO, 40.0, hull));
        assert!(light_reaches_hull(Vec2::ZERO, 43.0, hull));
    }

    #[test]
    fn light_at_centroid_of_enclosing_hull_is_contained() {
        let resolver = resolve(&[
            Hull::rectangle(4.0, 4.0).with_position(Vec2::new(-30.0, 0.0)),
            Hull::rectangle(10.0, 10.0).with_position(Vec2::new(50.0, 0.0)),
        ]);
        let inside = Light::new(Vec2::new(50.0, 0.0), 100.0).unwrap();
        let outside = Light::new(Vec2::new(0.0, 0.0), 100.0).unwrap();

        let found = find_enclosing_hull(&inside, resolver.iter()).expect("contained");
        assert_eq!(found.id, HullId(1));
        assert!(find_enclosing_hull(&outside, resolver.iter()).is_none());
    }

    #[test]
    fn disabled_and_degenerate_hulls_never_contain() {
        let mut disabled = Hull::rectangle(10.0, 10.0);
        disabled.set_enabled(false);
        let resolver = resolve(&[disabled, Hull::new(vec![Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0)])]);
        let light = Light::new(Vec2::ZERO, 10.0).unwrap();
        assert!(find_enclosing_hull(&light, resolver.iter()).is_none());
        assert!(!light_reaches_hull(Vec2::ZERO, 10.0, resolver.get(HullId(1)).unwrap()));
    }

    #[test]
    fn camera_culling_uses_bounds_overlap() {
        let view = Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0));
        let near = Light::new(Vec2::new(120.0, 0.0), 30.0).unwrap();
        let far = Light::new(Vec2::new(500.0, 0.0), 30.0).unwrap();
        assert!(light_visible(&near.bounds(), &view));
        assert!(!light_visible(&far.bounds(), &view));
    }
}
