//! 2D helpers over `[f64; 2]` points in sketch-plane coordinates.

use super::EPSILON;
use std::f64::consts::PI;

/// Check if two 2D points are approximately equal within EPSILON.
#[inline]
pub fn points_equal(p1: [f64; 2], p2: [f64; 2]) -> bool {
    (p1[0] - p2[0]).abs() < EPSILON && (p1[1] - p2[1]).abs() < EPSILON
}

#[inline]
pub fn distance(p1: [f64; 2], p2: [f64; 2]) -> f64 {
    (p2[0] - p1[0]).hypot(p2[1] - p1[1])
}

/// 2D cross product (z-component of 3D cross product).
#[inline]
pub fn cross_2d(v1: [f64; 2], v2: [f64; 2]) -> f64 {
    v1[0] * v2[1] - v1[1] * v2[0]
}

/// Point on a circle at `angle` radians.
#[inline]
pub fn arc_point(center: [f64; 2], radius: f64, angle: f64) -> [f64; 2] {
    [center[0] + radius * angle.cos(), center[1] + radius * angle.sin()]
}

/// Angle of `point` around `center`, in `(-PI, PI]`.
#[inline]
pub fn angle_of(center: [f64; 2], point: [f64; 2]) -> f64 {
    (point[1] - center[1]).atan2(point[0] - center[0])
}

/// Wrap an angle into `[0, 2PI)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped >= 2.0 * PI {
        0.0
    } else {
        wrapped
    }
}

/// Perpendicular distance from `point` to the infinite line through `a` and `b`.
pub fn distance_point_to_line(a: [f64; 2], b: [f64; 2], point: [f64; 2]) -> f64 {
    let len = distance(a, b);
    if len < EPSILON {
        return distance(a, point);
    }
    cross_2d([b[0] - a[0], b[1] - a[1]], [point[0] - a[0], point[1] - a[1]]).abs() / len
}

/// Circle through three points as `(center, radius)`. `None` when collinear.
pub fn circle_through_points(p1: [f64; 2], p2: [f64; 2], p3: [f64; 2]) -> Option<([f64; 2], f64)> {
    let d = 2.0 * cross_2d([p2[0] - p1[0], p2[1] - p1[1]], [p3[0] - p1[0], p3[1] - p1[1]]);
    if d.abs() < EPSILON * EPSILON {
        return None;
    }
    let a2 = (p2[0] - p1[0]).powi(2) + (p2[1] - p1[1]).powi(2);
    let a3 = (p3[0] - p1[0]).powi(2) + (p3[1] - p1[1]).powi(2);
    let cx = ((p3[1] - p1[1]) * a2 - (p2[1] - p1[1]) * a3) / d;
    let cy = ((p2[0] - p1[0]) * a3 - (p3[0] - p1[0]) * a2) / d;
    let center = [p1[0] + cx, p1[1] + cy];
    Some((center, distance(center, p1)))
}
