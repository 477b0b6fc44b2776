//! Resolve primitives to concrete geometry from current DOF values.
//!
//! Read-only: renderers and exporters call these, nothing here mutates the graph.

use super::constraints::ConstraintEquation;
use super::graph::Graph;
use super::primitives::PrimitiveKind;
use crate::error::{SketchError, SketchResult};
use crate::geometry::{utils_2d, Point3, SketchFrame, Vector3};
use crate::ids::PrimitiveId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Point {
        position: Point3,
    },
    Vector {
        direction: Vector3,
    },
    Line {
        start: Point3,
        end: Point3,
        length: f64,
    },
    SketchPlane {
        frame: SketchFrame,
        /// `a x + b y + c z = d`
        coefficients: [f64; 4],
    },
    Point2D {
        local: [f64; 2],
        global: Point3,
    },
    Line2D {
        start: [f64; 2],
        end: [f64; 2],
        global_start: Point3,
        global_end: Point3,
        length: f64,
        /// Unit vector pointing out of the line at each end
        tangent1: [f64; 2],
        tangent2: [f64; 2],
    },
    Arc2D {
        center: [f64; 2],
        radius: f64,
        theta1: f64,
        theta2: f64,
        start: [f64; 2],
        end: [f64; 2],
        tangent1: [f64; 2],
        tangent2: [f64; 2],
        global_center: Point3,
    },
    Circle2D {
        center: [f64; 2],
        radius: f64,
        global_center: Point3,
    },
}

fn xyz(graph: &Graph, x: crate::ids::DofId, y: crate::ids::DofId, z: crate::ids::DofId) -> SketchResult<[f64; 3]> {
    Ok([graph.value(x)?, graph.value(y)?, graph.value(z)?])
}

/// Numeric frame of a SketchPlane primitive.
pub fn frame(graph: &Graph, plane: PrimitiveId) -> SketchResult<SketchFrame> {
    let PrimitiveKind::SketchPlane { normal, up, base } = graph.primitive(plane)?.kind else {
        graph.expect_plane(plane)?;
        return Err(SketchError::UnknownPrimitive(plane));
    };
    let normal = vector(graph, normal)?;
    let up = vector(graph, up)?;
    let base = point(graph, base)?;
    SketchFrame::new(base, normal, up)
        .ok_or_else(|| SketchError::DegenerateGeometry(format!("{} has a degenerate frame", plane)))
}

fn vector(graph: &Graph, id: PrimitiveId) -> SketchResult<Vector3> {
    match graph.primitive(id)?.kind {
        PrimitiveKind::Vector { x, y, z } | PrimitiveKind::Point { x, y, z } => {
            let [x, y, z] = xyz(graph, x, y, z)?;
            Ok(Vector3::new(x, y, z))
        }
        ref other => Err(SketchError::WrongKind {
            id,
            expected: "vector",
            found: other.name(),
        }),
    }
}

fn point(graph: &Graph, id: PrimitiveId) -> SketchResult<Point3> {
    vector(graph, id).map(Point3::from)
}

/// Local coordinates of a Point2D.
pub fn point2d(graph: &Graph, id: PrimitiveId) -> SketchResult<[f64; 2]> {
    let (s, t) = graph.point2d_dofs(id)?;
    Ok([graph.value(s)?, graph.value(t)?])
}

/// Project a global point onto a sketch plane: `(s, t, signed distance)`.
pub fn project(graph: &Graph, plane: PrimitiveId, global: &Point3) -> SketchResult<(f64, f64, f64)> {
    frame(graph, plane)?
        .to_local(global)
        .ok_or_else(|| SketchError::DegenerateGeometry(format!("{} cannot be inverted", plane)))
}

fn unit(from: [f64; 2], to: [f64; 2]) -> [f64; 2] {
    let len = utils_2d::distance(from, to);
    if len == 0.0 {
        return [0.0, 0.0];
    }
    [(to[0] - from[0]) / len, (to[1] - from[1]) / len]
}

pub fn resolve(graph: &Graph, id: PrimitiveId) -> SketchResult<Geometry> {
    let geometry = match graph.primitive(id)?.kind {
        PrimitiveKind::Point { .. } => Geometry::Point {
            position: point(graph, id)?,
        },
        PrimitiveKind::Vector { .. } => Geometry::Vector {
            direction: vector(graph, id)?,
        },
        PrimitiveKind::Line { point1, point2 } => {
            let start = point(graph, point1)?;
            let end = point(graph, point2)?;
            Geometry::Line {
                start,
                end,
                length: (end - start).norm(),
            }
        }
        PrimitiveKind::SketchPlane { .. } => {
            let frame = frame(graph, id)?;
            Geometry::SketchPlane {
                coefficients: frame.coefficients(),
                frame,
            }
        }
        PrimitiveKind::Point2D { plane, .. } => {
            let local = point2d(graph, id)?;
            Geometry::Point2D {
                local,
                global: frame(graph, plane)?.to_global(local[0], local[1]),
            }
        }
        PrimitiveKind::Line2D {
            plane, s1, t1, s2, t2, ..
        } => {
            let start = [graph.value(s1)?, graph.value(t1)?];
            let end = [graph.value(s2)?, graph.value(t2)?];
            let frame = frame(graph, plane)?;
            Geometry::Line2D {
                start,
                end,
                global_start: frame.to_global(start[0], start[1]),
                global_end: frame.to_global(end[0], end[1]),
                length: utils_2d::distance(start, end),
                tangent1: unit(end, start),
                tangent2: unit(start, end),
            }
        }
        PrimitiveKind::Arc2D {
            s_center,
            t_center,
            theta1,
            theta2,
            radius,
            plane,
            point1,
            point2,
            ..
        } => {
            let center = [graph.value(s_center)?, graph.value(t_center)?];
            let theta1 = graph.value(theta1)?;
            let theta2 = graph.value(theta2)?;
            Geometry::Arc2D {
                center,
                radius: graph.value(radius)?,
                theta1,
                theta2,
                start: point2d(graph, point1)?,
                end: point2d(graph, point2)?,
                tangent1: [theta1.sin(), -theta1.cos()],
                tangent2: [-theta2.sin(), theta2.cos()],
                global_center: frame(graph, plane)?.to_global(center[0], center[1]),
            }
        }
        PrimitiveKind::Circle2D {
            s_center,
            t_center,
            radius,
            plane,
            ..
        } => {
            let center = [graph.value(s_center)?, graph.value(t_center)?];
            Geometry::Circle2D {
                center,
                radius: graph.value(radius)?,
                global_center: frame(graph, plane)?.to_global(center[0], center[1]),
            }
        }
    };
    Ok(geometry)
}

/// Current residual of a constraint; zero when satisfied.
pub fn constraint_error(graph: &Graph, constraint: &ConstraintEquation) -> SketchResult<f64> {
    let args = graph.dofs().values(&constraint.residual.inputs)?;
    Ok(constraint.residual.function.evaluate(&args))
}
