//! Local 2D frame embedded in 3D, the numeric side of a sketch plane.

use super::{Matrix3, Point3, Vector3, EPSILON};
use serde::{Deserialize, Serialize};

/// A resolved sketch plane: base point, unit normal and unit up vector.
///
/// The local `s` axis is `up × normal`, `t` runs along `up`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SketchFrame {
    pub base: Point3,
    pub normal: Vector3,
    pub up: Vector3,
}

impl SketchFrame {
    /// Build a frame, normalising both vectors. Returns `None` if either is
    /// zero length or they are not orthogonal.
    pub fn new(base: Point3, normal: Vector3, up: Vector3) -> Option<Self> {
        let n = normal.try_normalize(EPSILON)?;
        let u = up.try_normalize(EPSILON)?;
        if n.dot(&u).abs() > EPSILON {
            return None;
        }
        Some(Self { base, normal: n, up: u })
    }

    /// Standard XY frame at the origin.
    pub fn xy() -> Self {
        Self {
            base: Point3::origin(),
            normal: Vector3::z(),
            up: Vector3::y(),
        }
    }

    pub fn s_axis(&self) -> Vector3 {
        self.up.cross(&self.normal)
    }

    /// Local `(s, t)` to global coordinates.
    pub fn to_global(&self, s: f64, t: f64) -> Point3 {
        self.base + self.s_axis() * s + self.up * t
    }

    /// Global point to `(s, t, d)`, `d` being the signed distance along the normal.
    pub fn to_local(&self, point: &Point3) -> Option<(f64, f64, f64)> {
        let basis = Matrix3::from_columns(&[self.s_axis(), self.up, self.normal]);
        let rhs = point - self.base;
        let solved = basis.lu().solve(&rhs)?;
        Some((solved[0], solved[1], solved[2]))
    }

    /// Plane equation `a x + b y + c z = d`.
    pub fn coefficients(&self) -> [f64; 4] {
        let n = self.normal;
        [n.x, n.y, n.z, n.dot(&self.base.coords)]
    }

    /// Global direction of a local `(s, t)` vector.
    pub fn direction_to_global(&self, ds: f64, dt: f64) -> Vector3 {
        self.s_axis() * ds + self.up * dt
    }
}
