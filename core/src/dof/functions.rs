//! Scalar functions used both to define dependent DOFs and as constraint residuals.
//!
//! Every variant is a pure function over an explicit, ordered input list and
//! provides an analytic gradient with one entry per input.

use serde::{Deserialize, Serialize};

/// Below this squared length a direction is treated as undefined.
const MIN_LENGTH_SQ: f64 = 1e-24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverFunction {
    /// `|p1 - p2| - d` over `[p1s, p1t, p2s, p2t, d]`
    DistancePoint2D,
    /// Squared perpendicular distance minus `d²` over `[ps, pt, l1s, l1t, l2s, l2t, d]`
    DistancePointLine2D,
    /// `cos(l1, l2) - cos(angle)` over `[l1p1s, l1p1t, l1p2s, l1p2t, l2p1s, l2p1t, l2p2s, l2p2t, angle]`
    AngleLine2DInterior,
    /// `cos(l1, l2) + cos(angle)`, same inputs as the interior form
    AngleLine2DExterior,
    /// `(s1 s2 + t1 t2)² - 1` over two unit tangents `[s1, t1, s2, t2]`
    TangentEdge2D,
    /// `cos²(l1, l2) - 1` over `[l1p1s, l1p1t, l1p2s, l1p2t, l2p1s, l2p1t, l2p2s, l2p2t]`
    ParallelLine2D,
    /// `a - b`
    HoriVert2D,
    /// `sc + r cos θ` over `[sc, r, θ]`
    Arc2DPointS,
    /// `tc + r sin θ` over `[tc, r, θ]`
    Arc2DPointT,
    /// `sin θ`
    Arc2DTangentS,
    /// `-cos θ`
    Arc2DTangentT,
    /// s component of the unit vector from point 2 to point 1, over `[p1s, p1t, p2s, p2t]`
    Point2DTangent1S,
    Point2DTangent1T,
    /// s component of the unit vector from point 1 to point 2
    Point2DTangent2S,
    Point2DTangent2T,
}

impl SolverFunction {
    pub fn name(&self) -> &'static str {
        match self {
            SolverFunction::DistancePoint2D => "distance_point_2d",
            SolverFunction::DistancePointLine2D => "distance_point_line_2d",
            SolverFunction::AngleLine2DInterior => "angle_line_2d_interior",
            SolverFunction::AngleLine2DExterior => "angle_line_2d_exterior",
            SolverFunction::TangentEdge2D => "tangent_edge_2d",
            SolverFunction::ParallelLine2D => "parallel_line_2d",
            SolverFunction::HoriVert2D => "hori_vert_2d",
            SolverFunction::Arc2DPointS => "arc2d_point_s",
            SolverFunction::Arc2DPointT => "arc2d_point_t",
            SolverFunction::Arc2DTangentS => "arc2d_tangent_s",
            SolverFunction::Arc2DTangentT => "arc2d_tangent_t",
            SolverFunction::Point2DTangent1S => "point2d_tangent1_s",
            SolverFunction::Point2DTangent1T => "point2d_tangent1_t",
            SolverFunction::Point2DTangent2S => "point2d_tangent2_s",
            SolverFunction::Point2DTangent2T => "point2d_tangent2_t",
        }
    }

    /// Number of inputs the function expects.
    pub fn arity(&self) -> usize {
        match self {
            SolverFunction::DistancePoint2D => 5,
            SolverFunction::DistancePointLine2D => 7,
            SolverFunction::AngleLine2DInterior | SolverFunction::AngleLine2DExterior => 9,
            SolverFunction::TangentEdge2D => 4,
            SolverFunction::ParallelLine2D => 8,
            SolverFunction::HoriVert2D => 2,
            SolverFunction::Arc2DPointS | SolverFunction::Arc2DPointT => 3,
            SolverFunction::Arc2DTangentS | SolverFunction::Arc2DTangentT => 1,
            SolverFunction::Point2DTangent1S
            | SolverFunction::Point2DTangent1T
            | SolverFunction::Point2DTangent2S
            | SolverFunction::Point2DTangent2T => 4,
        }
    }

    /// Evaluate the function. `x` must hold exactly `arity()` values.
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), self.arity(), "{} arity", self.name());
        match self {
            SolverFunction::DistancePoint2D => {
                let ds = x[0] - x[2];
                let dt = x[1] - x[3];
                (ds * ds + dt * dt).sqrt() - x[4]
            }
            SolverFunction::DistancePointLine2D => {
                let (n, len_sq) = point_line_terms(x);
                if len_sq < MIN_LENGTH_SQ {
                    return -x[6] * x[6];
                }
                n * n / len_sq - x[6] * x[6]
            }
            SolverFunction::AngleLine2DInterior => line_cosine(x) - x[8].cos(),
            SolverFunction::AngleLine2DExterior => line_cosine(x) + x[8].cos(),
            SolverFunction::TangentEdge2D => {
                let dot = x[0] * x[2] + x[1] * x[3];
                dot * dot - 1.0
            }
            SolverFunction::ParallelLine2D => {
                let (u, v) = line_vectors(x);
                let a = u[0] * u[0] + u[1] * u[1];
                let b = v[0] * v[0] + v[1] * v[1];
                if a * b < MIN_LENGTH_SQ {
                    return 0.0;
                }
                let p = u[0] * v[0] + u[1] * v[1];
                p * p / (a * b) - 1.0
            }
            SolverFunction::HoriVert2D => x[0] - x[1],
            SolverFunction::Arc2DPointS => x[0] + x[1] * x[2].cos(),
            SolverFunction::Arc2DPointT => x[0] + x[1] * x[2].sin(),
            SolverFunction::Arc2DTangentS => x[0].sin(),
            SolverFunction::Arc2DTangentT => -x[0].cos(),
            SolverFunction::Point2DTangent1S => unit_component(x, 0),
            SolverFunction::Point2DTangent1T => unit_component(x, 1),
            SolverFunction::Point2DTangent2S => -unit_component(x, 0),
            SolverFunction::Point2DTangent2T => -unit_component(x, 1),
        }
    }

    /// Analytic partial derivatives, one per input, in input order.
    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.arity(), "{} arity", self.name());
        match self {
            SolverFunction::DistancePoint2D => {
                let ds = x[0] - x[2];
                let dt = x[1] - x[3];
                let len = (ds * ds + dt * dt).sqrt();
                // Coincident points: move apart along s
                let (us, ut) = if len * len < MIN_LENGTH_SQ {
                    (1.0, 0.0)
                } else {
                    (ds / len, dt / len)
                };
                vec![us, ut, -us, -ut, -1.0]
            }
            SolverFunction::DistancePointLine2D => point_line_gradient(x),
            SolverFunction::AngleLine2DInterior => {
                let mut g = line_cosine_gradient(x);
                g.push(x[8].sin());
                g
            }
            SolverFunction::AngleLine2DExterior => {
                let mut g = line_cosine_gradient(x);
                g.push(-x[8].sin());
                g
            }
            SolverFunction::TangentEdge2D => {
                let dot = x[0] * x[2] + x[1] * x[3];
                let k = 2.0 * dot;
                vec![k * x[2], k * x[3], k * x[0], k * x[1]]
            }
            SolverFunction::ParallelLine2D => parallel_gradient(x),
            SolverFunction::HoriVert2D => vec![1.0, -1.0],
            SolverFunction::Arc2DPointS => vec![1.0, x[2].cos(), -x[1] * x[2].sin()],
            SolverFunction::Arc2DPointT => vec![1.0, x[2].sin(), x[1] * x[2].cos()],
            SolverFunction::Arc2DTangentS => vec![x[0].cos()],
            SolverFunction::Arc2DTangentT => vec![x[0].sin()],
            SolverFunction::Point2DTangent1S => unit_component_gradient(x, 0),
            SolverFunction::Point2DTangent1T => unit_component_gradient(x, 1),
            SolverFunction::Point2DTangent2S => negate(unit_component_gradient(x, 0)),
            SolverFunction::Point2DTangent2T => negate(unit_component_gradient(x, 1)),
        }
    }
}

fn negate(mut g: Vec<f64>) -> Vec<f64> {
    g.iter_mut().for_each(|v| *v = -*v);
    g
}

/// Direction vectors `l1p1 - l1p2` and `l2p1 - l2p2`.
fn line_vectors(x: &[f64]) -> ([f64; 2], [f64; 2]) {
    ([x[0] - x[2], x[1] - x[3]], [x[4] - x[6], x[5] - x[7]])
}

/// Spread a derivative with respect to the direction vectors onto the 8 endpoint inputs.
fn spread_line_gradient(du: [f64; 2], dv: [f64; 2]) -> Vec<f64> {
    vec![du[0], du[1], -du[0], -du[1], dv[0], dv[1], -dv[0], -dv[1]]
}

fn line_cosine(x: &[f64]) -> f64 {
    let (u, v) = line_vectors(x);
    let lu = (u[0] * u[0] + u[1] * u[1]).sqrt();
    let lv = (v[0] * v[0] + v[1] * v[1]).sqrt();
    if lu * lv < MIN_LENGTH_SQ.sqrt() {
        return 0.0;
    }
    (u[0] * v[0] + u[1] * v[1]) / (lu * lv)
}

fn line_cosine_gradient(x: &[f64]) -> Vec<f64> {
    let (u, v) = line_vectors(x);
    let a = u[0] * u[0] + u[1] * u[1];
    let b = v[0] * v[0] + v[1] * v[1];
    let lu = a.sqrt();
    let lv = b.sqrt();
    if lu * lv < MIN_LENGTH_SQ.sqrt() {
        return vec![0.0; 8];
    }
    let c = (u[0] * v[0] + u[1] * v[1]) / (lu * lv);
    let du = [
        v[0] / (lu * lv) - c * u[0] / a,
        v[1] / (lu * lv) - c * u[1] / a,
    ];
    let dv = [
        u[0] / (lu * lv) - c * v[0] / b,
        u[1] / (lu * lv) - c * v[1] / b,
    ];
    spread_line_gradient(du, dv)
}

fn parallel_gradient(x: &[f64]) -> Vec<f64> {
    let (u, v) = line_vectors(x);
    let a = u[0] * u[0] + u[1] * u[1];
    let b = v[0] * v[0] + v[1] * v[1];
    if a * b < MIN_LENGTH_SQ {
        return vec![0.0; 8];
    }
    let p = u[0] * v[0] + u[1] * v[1];
    let k = 2.0 * p / (a * b);
    let du = [k * (v[0] - p * u[0] / a), k * (v[1] - p * u[1] / a)];
    let dv = [k * (u[0] - p * v[0] / b), k * (u[1] - p * v[1] / b)];
    spread_line_gradient(du, dv)
}

/// Cross term `n` and squared line length for the point-line distance.
fn point_line_terms(x: &[f64]) -> (f64, f64) {
    let (ps, pt, l1s, l1t, l2s, l2t) = (x[0], x[1], x[2], x[3], x[4], x[5]);
    let dx = l2s - l1s;
    let dy = l2t - l1t;
    let n = (l1t - pt) * dx - (l1s - ps) * dy;
    (n, dx * dx + dy * dy)
}

fn point_line_gradient(x: &[f64]) -> Vec<f64> {
    let (ps, pt, l1s, l1t, l2s, l2t, d) = (x[0], x[1], x[2], x[3], x[4], x[5], x[6]);
    let (n, len_sq) = point_line_terms(x);
    if len_sq < MIN_LENGTH_SQ {
        return vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -2.0 * d];
    }
    let dx = l2s - l1s;
    let dy = l2t - l1t;
    // partials of n
    let dn = [dy, -dx, pt - l2t, l2s - ps, l1t - pt, ps - l1s];
    // partials of len_sq
    let dl = [0.0, 0.0, -2.0 * dx, -2.0 * dy, 2.0 * dx, 2.0 * dy];
    let mut g: Vec<f64> = dn
        .iter()
        .zip(dl.iter())
        .map(|(n_i, l_i)| 2.0 * n * n_i / len_sq - n * n * l_i / (len_sq * len_sq))
        .collect();
    g.push(-2.0 * d);
    g
}

/// Component `axis` of `(p1 - p2) / |p1 - p2|`.
fn unit_component(x: &[f64], axis: usize) -> f64 {
    let ds = x[0] - x[2];
    let dt = x[1] - x[3];
    let len = (ds * ds + dt * dt).sqrt();
    if len * len < MIN_LENGTH_SQ {
        return 0.0;
    }
    if axis == 0 {
        ds / len
    } else {
        dt / len
    }
}

fn unit_component_gradient(x: &[f64], axis: usize) -> Vec<f64> {
    let ds = x[0] - x[2];
    let dt = x[1] - x[3];
    let len_sq = ds * ds + dt * dt;
    if len_sq < MIN_LENGTH_SQ {
        return vec![0.0; 4];
    }
    let len3 = len_sq * len_sq.sqrt();
    let (g_ds, g_dt) = if axis == 0 {
        (dt * dt / len3, -ds * dt / len3)
    } else {
        (-ds * dt / len3, ds * ds / len3)
    };
    vec![g_ds, g_dt, -g_ds, -g_dt]
}
