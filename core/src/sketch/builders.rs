//! Constructors for primitives and constraints. Each one is a single
//! transaction, so a failed add leaves the model untouched.

use super::constraints::{ConstraintEquation, ConstraintKind};
use super::model::Model;
use super::primitives::{EdgeEnd, PrimitiveKind};
use super::query;
use crate::dof::{DofKind, SolverFunction};
use crate::error::{SketchError, SketchResult};
use crate::geometry::{utils_2d, Point3, SketchFrame, Vector3};
use crate::ids::{ConstraintId, DofId, EntityRef, PrimitiveId};
use tracing::debug;

/// Fixed label DOF.
fn label(value: f64) -> DofKind {
    DofKind::independent(value, false)
}

impl Model {
    // ---------------------------------------------------------------------
    // 3D primitives
    // ---------------------------------------------------------------------

    fn add_xyz(
        &mut self,
        description: &str,
        [x, y, z]: [f64; 3],
        free: bool,
        build: fn(DofId, DofId, DofId) -> PrimitiveKind,
    ) -> SketchResult<PrimitiveId> {
        self.transaction(description, |m| {
            let id = m.ids.primitive();
            let owner = EntityRef::Primitive(id);
            let x = m.new_dof(DofKind::independent(x, free), owner)?;
            let y = m.new_dof(DofKind::independent(y, free), owner)?;
            let z = m.new_dof(DofKind::independent(z, free), owner)?;
            m.insert_primitive(id, build(x, y, z))
        })
    }

    pub fn add_point(&mut self, position: [f64; 3], free: bool) -> SketchResult<PrimitiveId> {
        self.add_xyz("Add point", position, free, |x, y, z| PrimitiveKind::Point { x, y, z })
    }

    pub fn add_vector(&mut self, direction: [f64; 3], free: bool) -> SketchResult<PrimitiveId> {
        self.add_xyz("Add vector", direction, free, |x, y, z| PrimitiveKind::Vector { x, y, z })
    }

    pub fn add_line(&mut self, point1: PrimitiveId, point2: PrimitiveId) -> SketchResult<PrimitiveId> {
        for point in [point1, point2] {
            if !matches!(self.primitive(point)?.kind, PrimitiveKind::Point { .. }) {
                return Err(SketchError::WrongKind {
                    id: point,
                    expected: "point",
                    found: self.primitive(point)?.kind.name(),
                });
            }
        }
        self.transaction("Add line", |m| {
            let id = m.ids.primitive();
            m.insert_primitive(id, PrimitiveKind::Line { point1, point2 })
        })
    }

    /// Sketch plane from existing vector and point primitives. `normal` and
    /// `up` must currently be non-zero and perpendicular.
    pub fn add_sketch_plane(
        &mut self,
        normal: PrimitiveId,
        up: PrimitiveId,
        base: PrimitiveId,
    ) -> SketchResult<PrimitiveId> {
        self.transaction("Add sketch plane", |m| {
            let id = m.ids.primitive();
            m.insert_primitive(id, PrimitiveKind::SketchPlane { normal, up, base })?;
            // Rejects wrong kinds and degenerate frames
            query::frame(&m.graph, id)?;
            Ok(id)
        })
    }

    /// A fixed sketch plane together with its base point and axis vectors.
    pub fn add_reference_plane(&mut self, base: Point3, normal: Vector3, up: Vector3) -> SketchResult<PrimitiveId> {
        if SketchFrame::new(base, normal, up).is_none() {
            return Err(SketchError::DegenerateGeometry(
                "plane normal and up must be non-zero and perpendicular".to_string(),
            ));
        }
        self.transaction("Add reference plane", |m| {
            let normal = m.add_vector([normal.x, normal.y, normal.z], false)?;
            let up = m.add_vector([up.x, up.y, up.z], false)?;
            let base = m.add_point([base.x, base.y, base.z], false)?;
            m.add_sketch_plane(normal, up, base)
        })
    }

    /// The global XY plane through the origin.
    pub fn add_xy_plane(&mut self) -> SketchResult<PrimitiveId> {
        self.add_reference_plane(Point3::origin(), Vector3::z(), Vector3::y())
    }

    // ---------------------------------------------------------------------
    // 2D primitives
    // ---------------------------------------------------------------------

    pub fn add_point2d(&mut self, plane: PrimitiveId, s: f64, t: f64, free: bool) -> SketchResult<PrimitiveId> {
        self.graph.expect_plane(plane)?;
        self.transaction("Add point", |m| {
            let id = m.ids.primitive();
            let owner = EntityRef::Primitive(id);
            let s = m.new_dof(DofKind::independent(s, free), owner)?;
            let t = m.new_dof(DofKind::independent(t, free), owner)?;
            m.insert_primitive(id, PrimitiveKind::Point2D { s, t, plane })
        })
    }

    /// Line between two existing Point2Ds. The line reads the points' own
    /// DOFs, so anything else built on those points stays connected.
    pub fn add_line2d(&mut self, point1: PrimitiveId, point2: PrimitiveId) -> SketchResult<PrimitiveId> {
        if point1 == point2 {
            return Err(SketchError::DegenerateGeometry(format!(
                "line from {} to itself",
                point1
            )));
        }
        let (s1, t1) = self.graph.point2d_dofs(point1)?;
        let (s2, t2) = self.graph.point2d_dofs(point2)?;
        let plane = self.graph.plane_of(point1)?;
        if self.graph.plane_of(point2)? != plane {
            return Err(SketchError::InvalidValue(format!(
                "{} and {} lie on different planes",
                point1, point2
            )));
        }
        self.transaction("Add line", |m| {
            let id = m.ids.primitive();
            m.insert_primitive(
                id,
                PrimitiveKind::Line2D {
                    point1,
                    point2,
                    plane,
                    s1,
                    t1,
                    s2,
                    t2,
                },
            )
        })
    }

    /// Two new points and the line between them.
    pub fn add_line2d_from(
        &mut self,
        plane: PrimitiveId,
        start: [f64; 2],
        end: [f64; 2],
    ) -> SketchResult<PrimitiveId> {
        self.transaction("Add line", |m| {
            let p1 = m.add_point2d(plane, start[0], start[1], true)?;
            let p2 = m.add_point2d(plane, end[0], end[1], true)?;
            m.add_line2d(p1, p2)
        })
    }

    /// Arc running counter-clockwise from `theta1` to `theta2`. Creates the
    /// centre point and the two endpoint points, whose coordinates are
    /// computed from the arc's own DOFs.
    pub fn add_arc2d(
        &mut self,
        plane: PrimitiveId,
        center: [f64; 2],
        radius: f64,
        theta1: f64,
        theta2: f64,
        free: bool,
    ) -> SketchResult<PrimitiveId> {
        self.graph.expect_plane(plane)?;
        if !(radius.is_finite() && radius > 0.0) {
            return Err(SketchError::DegenerateGeometry(format!("arc radius {}", radius)));
        }
        self.transaction("Add arc", |m| {
            let id = m.ids.primitive();
            let owner = EntityRef::Primitive(id);
            let s_center = m.new_dof(DofKind::independent(center[0], free), owner)?;
            let t_center = m.new_dof(DofKind::independent(center[1], free), owner)?;
            let theta1_dof = m.new_dof(DofKind::independent(theta1, free), owner)?;
            let theta2_dof = m.new_dof(DofKind::independent(theta2, free), owner)?;
            let radius_dof = m.new_dof(DofKind::independent(radius, free), owner)?;

            let center_point = m.ids.primitive();
            m.insert_primitive(
                center_point,
                PrimitiveKind::Point2D {
                    s: s_center,
                    t: t_center,
                    plane,
                },
            )?;
            let mut ends = [center_point; 2];
            for (slot, theta) in ends.iter_mut().zip([theta1_dof, theta2_dof]) {
                let point = m.ids.primitive();
                let point_owner = EntityRef::Primitive(point);
                let s = m.new_dof(
                    DofKind::dependent(SolverFunction::Arc2DPointS, vec![s_center, radius_dof, theta]),
                    point_owner,
                )?;
                let t = m.new_dof(
                    DofKind::dependent(SolverFunction::Arc2DPointT, vec![t_center, radius_dof, theta]),
                    point_owner,
                )?;
                *slot = m.insert_primitive(point, PrimitiveKind::Point2D { s, t, plane })?;
            }

            let text_angle = m.new_dof(label(0.5 * (theta1 + theta2)), owner)?;
            let text_radius = m.new_dof(label(0.5 * radius), owner)?;
            m.insert_primitive(
                id,
                PrimitiveKind::Arc2D {
                    s_center,
                    t_center,
                    theta1: theta1_dof,
                    theta2: theta2_dof,
                    radius: radius_dof,
                    plane,
                    point1: ends[0],
                    point2: ends[1],
                    center: center_point,
                    text_angle,
                    text_radius,
                },
            )
        })
    }

    /// Arc from `start` through `mid` to `end`.
    pub fn add_arc2d_three_points(
        &mut self,
        plane: PrimitiveId,
        start: [f64; 2],
        mid: [f64; 2],
        end: [f64; 2],
    ) -> SketchResult<PrimitiveId> {
        let (center, radius) = utils_2d::circle_through_points(start, mid, end)
            .ok_or_else(|| SketchError::DegenerateGeometry("arc points are collinear".to_string()))?;
        let mut theta1 = utils_2d::angle_of(center, start);
        let mut theta2 = utils_2d::angle_of(center, end);
        let theta_mid = utils_2d::angle_of(center, mid);
        // Counter-clockwise from theta1 must pass through mid
        if utils_2d::normalize_angle(theta_mid - theta1) > utils_2d::normalize_angle(theta2 - theta1) {
            std::mem::swap(&mut theta1, &mut theta2);
        }
        debug!("Three-point arc: centre {:?}, radius {}", center, radius);
        self.add_arc2d(plane, center, radius, theta1, theta2, true)
    }

    pub fn add_circle2d(
        &mut self,
        plane: PrimitiveId,
        center: [f64; 2],
        radius: f64,
        free: bool,
    ) -> SketchResult<PrimitiveId> {
        self.graph.expect_plane(plane)?;
        if !(radius.is_finite() && radius > 0.0) {
            return Err(SketchError::DegenerateGeometry(format!("circle radius {}", radius)));
        }
        self.transaction("Add circle", |m| {
            let id = m.ids.primitive();
            let owner = EntityRef::Primitive(id);
            let s_center = m.new_dof(DofKind::independent(center[0], free), owner)?;
            let t_center = m.new_dof(DofKind::independent(center[1], free), owner)?;
            let radius_dof = m.new_dof(DofKind::independent(radius, free), owner)?;
            let center_point = m.ids.primitive();
            m.insert_primitive(
                center_point,
                PrimitiveKind::Point2D {
                    s: s_center,
                    t: t_center,
                    plane,
                },
            )?;
            let text_angle = m.new_dof(label(std::f64::consts::FRAC_PI_4), owner)?;
            let text_radius = m.new_dof(label(0.5 * radius), owner)?;
            m.insert_primitive(
                id,
                PrimitiveKind::Circle2D {
                    s_center,
                    t_center,
                    radius: radius_dof,
                    plane,
                    center: center_point,
                    text_angle,
                    text_radius,
                },
            )
        })
    }

    pub fn add_circle2d_three_points(
        &mut self,
        plane: PrimitiveId,
        a: [f64; 2],
        b: [f64; 2],
        c: [f64; 2],
    ) -> SketchResult<PrimitiveId> {
        let (center, radius) = utils_2d::circle_through_points(a, b, c)
            .ok_or_else(|| SketchError::DegenerateGeometry("circle points are collinear".to_string()))?;
        self.add_circle2d(plane, center, radius, true)
    }

    // ---------------------------------------------------------------------
    // Constraints
    // ---------------------------------------------------------------------

    fn add_constraint(
        &mut self,
        description: &str,
        build: impl FnOnce(&mut Model, ConstraintId, EntityRef) -> SketchResult<ConstraintEquation>,
    ) -> SketchResult<ConstraintId> {
        self.transaction(description, |m| {
            let id = m.ids.constraint();
            let constraint = build(m, id, EntityRef::Constraint(id))?;
            m.insert_constraint(constraint)
        })
    }

    fn local(&self, point: PrimitiveId) -> SketchResult<[f64; 2]> {
        query::point2d(&self.graph, point)
    }

    fn check_distance(distance: f64) -> SketchResult<f64> {
        if distance.is_finite() && distance >= 0.0 {
            Ok(distance)
        } else {
            Err(SketchError::InvalidValue(format!("distance must be non-negative, got {}", distance)))
        }
    }

    /// Distance between two Point2Ds. With `None` the current distance is used.
    pub fn add_distance_point2d(
        &mut self,
        point1: PrimitiveId,
        point2: PrimitiveId,
        distance: Option<f64>,
    ) -> SketchResult<ConstraintId> {
        let (s1, t1) = self.graph.point2d_dofs(point1)?;
        let (s2, t2) = self.graph.point2d_dofs(point2)?;
        let current = utils_2d::distance(self.local(point1)?, self.local(point2)?);
        let distance = Self::check_distance(distance.unwrap_or(current))?;

        self.add_constraint("Add distance", |m, id, owner| {
            let distance = m.new_dof(DofKind::independent(distance, false), owner)?;
            let text_position = m.new_dof(label(0.5), owner)?;
            let text_offset = m.new_dof(label(0.1 * current.max(1.0)), owner)?;
            Ok(ConstraintEquation::new(
                id,
                ConstraintKind::DistancePoint2D {
                    point1,
                    point2,
                    distance,
                    text_position,
                    text_offset,
                },
                vec![point1, point2],
                SolverFunction::DistancePoint2D,
                vec![s1, t1, s2, t2, distance],
            ))
        })
    }

    /// Perpendicular distance from a Point2D to the infinite extension of a Line2D.
    pub fn add_distance_point_line2d(
        &mut self,
        point: PrimitiveId,
        line: PrimitiveId,
        distance: Option<f64>,
    ) -> SketchResult<ConstraintId> {
        let (ps, pt) = self.graph.point2d_dofs(point)?;
        let (lp1, lp2, [s1, t1, s2, t2]) = self.graph.line2d(line)?;
        let current = utils_2d::distance_point_to_line(self.local(lp1)?, self.local(lp2)?, self.local(point)?);
        let distance = Self::check_distance(distance.unwrap_or(current))?;

        self.add_constraint("Add distance", |m, id, owner| {
            let distance = m.new_dof(DofKind::independent(distance, false), owner)?;
            let text_position = m.new_dof(label(0.5), owner)?;
            let text_offset = m.new_dof(label(0.1 * current.max(1.0)), owner)?;
            Ok(ConstraintEquation::new(
                id,
                ConstraintKind::DistancePointLine2D {
                    point,
                    line,
                    distance,
                    text_position,
                    text_offset,
                },
                vec![point, line],
                SolverFunction::DistancePointLine2D,
                vec![ps, pt, s1, t1, s2, t2, distance],
            ))
        })
    }

    pub fn add_parallel_line2d(&mut self, line1: PrimitiveId, line2: PrimitiveId) -> SketchResult<ConstraintId> {
        if line1 == line2 {
            return Err(SketchError::InvalidValue(format!("{} cannot be parallel to itself", line1)));
        }
        let (_, _, a) = self.graph.line2d(line1)?;
        let (_, _, b) = self.graph.line2d(line2)?;
        self.add_constraint("Add parallel", |m, id, owner| {
            let marker_position = m.new_dof(label(0.5), owner)?;
            Ok(ConstraintEquation::new(
                id,
                ConstraintKind::ParallelLine2D {
                    line1,
                    line2,
                    marker_position,
                },
                vec![line1, line2],
                SolverFunction::ParallelLine2D,
                a.into_iter().chain(b).collect(),
            ))
        })
    }

    /// Angle between two lines, in radians. `interior` selects the angle
    /// between the direction vectors; otherwise its supplement.
    pub fn add_angle_line2d(
        &mut self,
        line1: PrimitiveId,
        line2: PrimitiveId,
        angle: f64,
        interior: bool,
    ) -> SketchResult<ConstraintId> {
        if line1 == line2 {
            return Err(SketchError::InvalidValue(format!("angle between {} and itself", line1)));
        }
        if !angle.is_finite() {
            return Err(SketchError::InvalidValue(format!("angle {}", angle)));
        }
        let (a1, a2, a) = self.graph.line2d(line1)?;
        let (b1, b2, b) = self.graph.line2d(line2)?;
        let [text_angle, text_radius, text_s, text_t] =
            angle_label([self.local(a1)?, self.local(a2)?], [self.local(b1)?, self.local(b2)?]);

        let function = if interior {
            SolverFunction::AngleLine2DInterior
        } else {
            SolverFunction::AngleLine2DExterior
        };
        self.add_constraint("Add angle", |m, id, owner| {
            let angle = m.new_dof(DofKind::independent(angle, false), owner)?;
            let text_angle = m.new_dof(label(text_angle), owner)?;
            let text_radius = m.new_dof(label(text_radius), owner)?;
            let text_s = m.new_dof(label(text_s), owner)?;
            let text_t = m.new_dof(label(text_t), owner)?;
            Ok(ConstraintEquation::new(
                id,
                ConstraintKind::AngleLine2D {
                    line1,
                    line2,
                    angle,
                    interior,
                    text_angle,
                    text_radius,
                    text_s,
                    text_t,
                },
                vec![line1, line2],
                function,
                a.into_iter().chain(b).chain([angle]).collect(),
            ))
        })
    }

    /// Dependent DOFs for the unit tangent of `edge` at `end`.
    fn tangent_dofs(&mut self, edge: PrimitiveId, end: EdgeEnd, owner: EntityRef) -> SketchResult<[DofId; 2]> {
        let (functions, inputs) = match self.primitive(edge)?.kind {
            PrimitiveKind::Line2D { s1, t1, s2, t2, .. } => {
                let functions = match end {
                    EdgeEnd::Point1 => [SolverFunction::Point2DTangent1S, SolverFunction::Point2DTangent1T],
                    EdgeEnd::Point2 => [SolverFunction::Point2DTangent2S, SolverFunction::Point2DTangent2T],
                };
                (functions, vec![s1, t1, s2, t2])
            }
            PrimitiveKind::Arc2D { theta1, theta2, .. } => {
                let theta = match end {
                    EdgeEnd::Point1 => theta1,
                    EdgeEnd::Point2 => theta2,
                };
                (
                    [SolverFunction::Arc2DTangentS, SolverFunction::Arc2DTangentT],
                    vec![theta],
                )
            }
            ref other => {
                return Err(SketchError::WrongKind {
                    id: edge,
                    expected: "edge",
                    found: other.name(),
                })
            }
        };
        let s = self.new_dof(DofKind::dependent(functions[0], inputs.clone()), owner)?;
        let t = self.new_dof(DofKind::dependent(functions[1], inputs), owner)?;
        Ok([s, t])
    }

    /// Make two edges tangent where they meet. The ends are expected to be
    /// coincident already; tangency alone does not join them.
    pub fn add_tangent_edge2d(
        &mut self,
        edge1: PrimitiveId,
        end1: EdgeEnd,
        edge2: PrimitiveId,
        end2: EdgeEnd,
    ) -> SketchResult<ConstraintId> {
        if edge1 == edge2 {
            return Err(SketchError::InvalidValue(format!("{} cannot be tangent to itself", edge1)));
        }
        self.add_constraint("Add tangent", |m, id, owner| {
            let [s1, t1] = m.tangent_dofs(edge1, end1, owner)?;
            let [s2, t2] = m.tangent_dofs(edge2, end2, owner)?;
            Ok(ConstraintEquation::new(
                id,
                ConstraintKind::TangentEdge2D {
                    edge1,
                    end1,
                    edge2,
                    end2,
                    tangent: [s1, t1, s2, t2],
                },
                vec![edge1, edge2],
                SolverFunction::TangentEdge2D,
                vec![s1, t1, s2, t2],
            ))
        })
    }

    /// Horizontal (equal t) or vertical (equal s) line.
    pub fn add_hori_vert_line2d(&mut self, line: PrimitiveId, vertical: bool) -> SketchResult<ConstraintId> {
        let (_, _, [s1, t1, s2, t2]) = self.graph.line2d(line)?;
        let inputs = if vertical { vec![s1, s2] } else { vec![t1, t2] };
        self.add_constraint(if vertical { "Add vertical" } else { "Add horizontal" }, |m, id, owner| {
            let marker_position = m.new_dof(label(0.5), owner)?;
            Ok(ConstraintEquation::new(
                id,
                ConstraintKind::HoriVertLine2D {
                    line,
                    vertical,
                    marker_position,
                },
                vec![line],
                SolverFunction::HoriVert2D,
                inputs,
            ))
        })
    }
}

/// Default annotation placement for an angle: polar `(angle, radius)` about
/// the lines' intersection, or a point between the lines when they are
/// parallel. Returns `[text_angle, text_radius, text_s, text_t]`.
fn angle_label(a: [[f64; 2]; 2], b: [[f64; 2]; 2]) -> [f64; 4] {
    let da = [a[1][0] - a[0][0], a[1][1] - a[0][1]];
    let db = [b[1][0] - b[0][0], b[1][1] - b[0][1]];
    let denom = utils_2d::cross_2d(da, db);
    let mid = |p: [[f64; 2]; 2]| [0.5 * (p[0][0] + p[1][0]), 0.5 * (p[0][1] + p[1][1])];
    let (ma, mb) = (mid(a), mid(b));

    if denom.abs() < 1e-12 {
        return [0.0, 0.0, 0.5 * (ma[0] + mb[0]), 0.5 * (ma[1] + mb[1])];
    }
    let diff = [b[0][0] - a[0][0], b[0][1] - a[0][1]];
    let u = utils_2d::cross_2d(diff, db) / denom;
    let center = [a[0][0] + u * da[0], a[0][1] + u * da[1]];
    let text_angle = 0.5 * (utils_2d::angle_of(center, ma) + utils_2d::angle_of(center, mb));
    let text_radius = 0.5 * (utils_2d::distance(center, ma) + utils_2d::distance(center, mb));
    [text_angle, text_radius, center[0], center[1]]
}
