//! Convex hull of a point set.

use embedded_graphics::prelude::Point;

/// Computes the convex hull of `points` using Andrew's monotone chain algorithm.
///
/// The hull is returned in counter-clockwise order (in a y-down image coordinate system this
/// appears clockwise on screen), without repeating the first point, and without collinear points on
/// its edges.
///
/// Returns `None` if the points do not span an area, ie. if there are fewer than 3 distinct points
/// or all of them lie on a single line.
pub fn convex_hull(points: &[Point]) -> Option<Vec<Point>> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| (p.x, p.y));
    sorted.dedup();
    if sorted.len() < 3 {
        return None;
    }

    let mut hull: Vec<Point> = Vec::with_capacity(sorted.len() * 2);
    half_hull(&mut hull, sorted.iter().copied());
    half_hull(&mut hull, sorted.iter().rev().copied());

    if hull.len() < 3 {
        return None;
    }
    Some(hull)
}

/// Appends the lower (or, for reversed input, upper) half of the hull to `hull`.
///
/// Points that would make a clockwise or straight turn are popped. The last point of each half is
/// the first point of the other one, so it is removed again at the end.
fn half_hull(hull: &mut Vec<Point>, points: impl Iterator<Item = Point>) {
    let start = hull.len();
    for p in points {
        while hull.len() >= start + 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
}

/// Z component of the cross product of `a -> b` and `a -> c`.
///
/// Positive for a counter-clockwise turn, negative for a clockwise one, 0 if collinear.
fn cross(a: Point, b: Point, c: Point) -> i128 {
    let [ax, ay, bx, by, cx, cy] = [a.x, a.y, b.x, b.y, c.x, c.y].map(i128::from);
    (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn square_with_interior_points() {
        let points = [p(0, 0), p(10, 0), p(5, 5), p(10, 10), p(0, 10), p(3, 7), p(5, 0)];
        let hull = convex_hull(&points).unwrap();
        assert_eq!(hull, [p(0, 0), p(10, 0), p(10, 10), p(0, 10)]);
    }

    #[test]
    fn triangle() {
        let hull = convex_hull(&[p(0, 0), p(4, 0), p(0, 3)]).unwrap();
        assert_eq!(hull.len(), 3);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(convex_hull(&[]), None);
        assert_eq!(convex_hull(&[p(1, 1)]), None);
        assert_eq!(convex_hull(&[p(1, 1), p(2, 2)]), None);
        assert_eq!(convex_hull(&[p(1, 1), p(1, 1), p(1, 1), p(1, 1)]), None);
        // collinear
        assert_eq!(convex_hull(&[p(0, 0), p(1, 1), p(2, 2), p(5, 5)]), None);
        assert_eq!(convex_hull(&[p(3, 0), p(3, 7), p(3, 2)]), None);
    }

    #[test]
    fn extreme_coordinates() {
        let (lo, hi) = (i32::MIN, i32::MAX);
        let hull = convex_hull(&[p(lo, lo), p(hi, lo), p(hi, hi), p(lo, hi), p(0, 0)]).unwrap();
        assert_eq!(hull, [p(lo, lo), p(hi, lo), p(hi, hi), p(lo, hi)]);

        let big = 1_000_000_000;
        assert_eq!(convex_hull(&[p(-big, -big), p(0, 0), p(big, big)]), None);
    }
}
