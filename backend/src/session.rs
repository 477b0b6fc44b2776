//! One editing session: a model plus the glue from protocol commands to it.

use crate::protocol::{Command, ConstraintView, PrimitiveView, Reply, Snapshot};
use sketch_core::history::JsonLinesStore;
use sketch_core::sketch::{CancelToken, Model, SolverConfig};
use sketch_core::{EntityRef, SketchResult};
use std::path::Path;
use tracing::{debug, info};

pub struct Session {
    model: Model,
}

impl Session {
    /// In-memory session, or one persisted to (and restored from) a
    /// JSON-lines log when `log_path` is given.
    pub fn open(log_path: Option<&Path>, config: SolverConfig) -> SketchResult<Self> {
        let mut model = match log_path {
            Some(path) => {
                let store = JsonLinesStore::open(path)?;
                let model = Model::restore(store)?;
                info!(
                    "Opened sketch log {} ({} entries)",
                    path.display(),
                    model.log().len()
                );
                model
            }
            None => Model::new(),
        };
        model.set_config(config);
        Ok(Self { model })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn snapshot(&self) -> Snapshot {
        let graph = self.model.graph();
        let primitives = graph
            .primitives()
            .filter_map(|p| {
                // Unresolvable geometry (degenerate plane) is left out of the view
                let geometry = self.model.geometry(p.id).ok()?;
                Some(PrimitiveView {
                    id: p.id,
                    kind: p.kind.name().to_string(),
                    geometry,
                })
            })
            .collect();
        let constraints = graph
            .constraints()
            .map(|c| ConstraintView {
                id: c.id,
                kind: c.kind.name().to_string(),
                error: self.model.constraint_error(c.id).unwrap_or(f64::NAN),
                weight: c.weight,
                suppressed: c.suppressed,
            })
            .collect();
        Snapshot {
            primitives,
            constraints,
            can_undo: self.model.can_undo(),
            can_redo: self.model.can_redo(),
        }
    }

    fn created(&self, entity: EntityRef) -> Reply {
        debug!("Created {}", entity);
        Reply::Created {
            entity,
            snapshot: self.snapshot(),
        }
    }

    fn updated(&self) -> Reply {
        Reply::Updated {
            snapshot: self.snapshot(),
        }
    }

    /// Run one command. Blocking; solves can take a while.
    pub fn execute(&mut self, command: Command, cancel: &CancelToken) -> SketchResult<Reply> {
        let m = &mut self.model;
        let reply = match command {
            Command::AddXyPlane => {
                let id = m.add_xy_plane()?;
                self.created(EntityRef::Primitive(id))
            }
            Command::AddPoint2d { plane, s, t, free } => {
                let id = m.add_point2d(plane, s, t, free)?;
                self.created(EntityRef::Primitive(id))
            }
            Command::AddLine2d { point1, point2 } => {
                let id = m.add_line2d(point1, point2)?;
                self.created(EntityRef::Primitive(id))
            }
            Command::AddArc2d {
                plane,
                center,
                radius,
                theta1,
                theta2,
                free,
            } => {
                let id = m.add_arc2d(plane, center, radius, theta1, theta2, free)?;
                self.created(EntityRef::Primitive(id))
            }
            Command::AddArc2dThreePoints { plane, start, mid, end } => {
                let id = m.add_arc2d_three_points(plane, start, mid, end)?;
                self.created(EntityRef::Primitive(id))
            }
            Command::AddCircle2d {
                plane,
                center,
                radius,
                free,
            } => {
                let id = m.add_circle2d(plane, center, radius, free)?;
                self.created(EntityRef::Primitive(id))
            }
            Command::AddCircle2dThreePoints { plane, a, b, c } => {
                let id = m.add_circle2d_three_points(plane, a, b, c)?;
                self.created(EntityRef::Primitive(id))
            }
            Command::AddDistancePoint2d {
                point1,
                point2,
                distance,
            } => {
                let id = m.add_distance_point2d(point1, point2, distance)?;
                self.created(EntityRef::Constraint(id))
            }
            Command::AddDistancePointLine2d { point, line, distance } => {
                let id = m.add_distance_point_line2d(point, line, distance)?;
                self.created(EntityRef::Constraint(id))
            }
            Command::AddParallelLine2d { line1, line2 } => {
                let id = m.add_parallel_line2d(line1, line2)?;
                self.created(EntityRef::Constraint(id))
            }
            Command::AddAngleLine2d {
                line1,
                line2,
                angle,
                interior,
            } => {
                let id = m.add_angle_line2d(line1, line2, angle, interior)?;
                self.created(EntityRef::Constraint(id))
            }
            Command::AddTangentEdge2d {
                edge1,
                end1,
                edge2,
                end2,
            } => {
                let id = m.add_tangent_edge2d(edge1, end1, edge2, end2)?;
                self.created(EntityRef::Constraint(id))
            }
            Command::AddHoriVertLine2d { line, vertical } => {
                let id = m.add_hori_vert_line2d(line, vertical)?;
                self.created(EntityRef::Constraint(id))
            }
            Command::Delete {
                primitives,
                constraints,
            } => {
                m.delete_many(&primitives, &constraints)?;
                self.updated()
            }
            Command::SetValue { dof, value } => {
                m.set_value(dof, value)?;
                self.updated()
            }
            Command::SetFree { dof, free } => {
                m.set_free(dof, free)?;
                self.updated()
            }
            Command::SetWeight { constraint, weight } => {
                m.set_weight(constraint, weight)?;
                self.updated()
            }
            Command::SetSuppressed {
                constraint,
                suppressed,
            } => {
                m.set_suppressed(constraint, suppressed)?;
                self.updated()
            }
            Command::MoveLabel { dof, value } => {
                m.move_label(dof, value)?;
                self.updated()
            }
            Command::MergePoints { keep, drop } => {
                let kept = m.merge_points(keep, drop)?;
                self.created(EntityRef::Primitive(kept))
            }
            Command::Drag { point, s, t } => {
                let report = m.drag_point(point, s, t, cancel)?;
                Reply::Solved {
                    report,
                    snapshot: self.snapshot(),
                }
            }
            Command::Solve => {
                let config = m.config().clone();
                let report = m.solve_with(&config, cancel)?;
                Reply::Solved {
                    report,
                    snapshot: self.snapshot(),
                }
            }
            Command::Undo => {
                m.undo()?;
                self.updated()
            }
            Command::Redo => {
                m.redo()?;
                self.updated()
            }
            Command::Geometry { primitive } => Reply::Geometry {
                primitive,
                geometry: m.geometry(primitive)?,
            },
            Command::Snapshot => Reply::Snapshot {
                snapshot: self.snapshot(),
            },
        };
        Ok(reply)
    }
}
