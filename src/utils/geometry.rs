/// Geometry utilities: polygon measurements on simplified contours
use crate::models::Point;

/// Zeroth and first order moments of a closed polygon (Green's theorem).
///
/// Returned as `(m00, m10, m01)` with the sign of the traversal direction
/// removed.
pub fn polygon_moments(points: &[Point]) -> (f64, f64, f64) {
    let mut m00 = 0.0;
    let mut m10 = 0.0;
    let mut m01 = 0.0;
    for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
        let cross = a.x * b.y - b.x * a.y;
        m00 += cross;
        m10 += (a.x + b.x) * cross;
        m01 += (a.y + b.y) * cross;
    }
    m00 *= 0.5;
    m10 /= 6.0;
    m01 /= 6.0;
    if m00 < 0.0 {
        (-m00, -m10, -m01)
    } else {
        (m00, m10, m01)
    }
}

/// Unsigned polygon area
pub fn polygon_area(points: &[Point]) -> f64 {
    polygon_moments(points).0
}

/// True when every turn has the same orientation
pub fn is_convex(points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

/// Inclusive pixel bounding box as `(x, y, width, height)`
pub fn bounding_box(points: &[Point]) -> (f64, f64, f64, f64) {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if points.is_empty() {
        return (0.0, 0.0, 0.0, 0.0);
    }
    (min_x, min_y, max_x - min_x + 1.0, max_y - min_y + 1.0)
}

/// Drop the first vertex of a simplified closed contour when it lies within
/// `epsilon` of the chord joining its neighbours.
///
/// Douglas-Peucker always keeps the point the trace started from, which for a
/// slightly rotated square is usually somewhere along an edge.
pub fn drop_seam_vertex(mut polygon: Vec<Point>, epsilon: f64) -> Vec<Point> {
    if polygon.len() > 3 {
        let prev = polygon[polygon.len() - 1];
        let next = polygon[1];
        if point_line_distance(&polygon[0], &prev, &next) <= epsilon {
            polygon.remove(0);
        }
    }
    polygon
}

fn point_line_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return p.distance(a);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}
