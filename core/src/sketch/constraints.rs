//! Constraint equations: a weighted residual over DOFs plus what it relates.

use super::primitives::EdgeEnd;
use crate::dof::SolverFunction;
use crate::ids::{ConstraintId, DofId, PrimitiveId};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintKind {
    DistancePoint2D {
        point1: PrimitiveId,
        point2: PrimitiveId,
        distance: DofId,
        text_position: DofId,
        text_offset: DofId,
    },
    DistancePointLine2D {
        point: PrimitiveId,
        line: PrimitiveId,
        distance: DofId,
        text_position: DofId,
        text_offset: DofId,
    },
    ParallelLine2D {
        line1: PrimitiveId,
        line2: PrimitiveId,
        marker_position: DofId,
    },
    AngleLine2D {
        line1: PrimitiveId,
        line2: PrimitiveId,
        angle: DofId,
        interior: bool,
        text_angle: DofId,
        text_radius: DofId,
        text_s: DofId,
        text_t: DofId,
    },
    /// `tangent` holds the dependent unit-tangent DOFs `[s1, t1, s2, t2]`
    /// this constraint created at the two edge ends.
    TangentEdge2D {
        edge1: PrimitiveId,
        end1: EdgeEnd,
        edge2: PrimitiveId,
        end2: EdgeEnd,
        tangent: [DofId; 4],
    },
    HoriVertLine2D {
        line: PrimitiveId,
        vertical: bool,
        marker_position: DofId,
    },
}

impl ConstraintKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::DistancePoint2D { .. } => "distance_point2d",
            ConstraintKind::DistancePointLine2D { .. } => "distance_point_line2d",
            ConstraintKind::ParallelLine2D { .. } => "parallel_line2d",
            ConstraintKind::AngleLine2D { .. } => "angle_line2d",
            ConstraintKind::TangentEdge2D { .. } => "tangent_edge2d",
            ConstraintKind::HoriVertLine2D { .. } => "hori_vert_line2d",
        }
    }

    /// Independent DOFs that only position the constraint's annotation.
    pub fn label_dofs(&self) -> Vec<DofId> {
        match *self {
            ConstraintKind::DistancePoint2D {
                text_position,
                text_offset,
                ..
            }
            | ConstraintKind::DistancePointLine2D {
                text_position,
                text_offset,
                ..
            } => vec![text_position, text_offset],
            ConstraintKind::ParallelLine2D { marker_position, .. }
            | ConstraintKind::HoriVertLine2D { marker_position, .. } => vec![marker_position],
            ConstraintKind::AngleLine2D {
                text_angle,
                text_radius,
                text_s,
                text_t,
                ..
            } => vec![text_angle, text_radius, text_s, text_t],
            ConstraintKind::TangentEdge2D { .. } => Vec::new(),
        }
    }

    /// The dimension DOF (distance or angle), if the constraint has one.
    pub fn value_dof(&self) -> Option<DofId> {
        match *self {
            ConstraintKind::DistancePoint2D { distance, .. }
            | ConstraintKind::DistancePointLine2D { distance, .. } => Some(distance),
            ConstraintKind::AngleLine2D { angle, .. } => Some(angle),
            _ => None,
        }
    }

    fn replace_dof(&mut self, old: DofId, new: DofId) -> bool {
        let mut changed = false;
        let mut swap = |slot: &mut DofId| {
            if *slot == old {
                *slot = new;
                changed = true;
            }
        };
        match self {
            ConstraintKind::DistancePoint2D {
                distance,
                text_position,
                text_offset,
                ..
            }
            | ConstraintKind::DistancePointLine2D {
                distance,
                text_position,
                text_offset,
                ..
            } => {
                for slot in [distance, text_position, text_offset] {
                    swap(slot);
                }
            }
            ConstraintKind::ParallelLine2D { marker_position, .. }
            | ConstraintKind::HoriVertLine2D { marker_position, .. } => swap(marker_position),
            ConstraintKind::AngleLine2D {
                angle,
                text_angle,
                text_radius,
                text_s,
                text_t,
                ..
            } => {
                for slot in [angle, text_angle, text_radius, text_s, text_t] {
                    swap(slot);
                }
            }
            ConstraintKind::TangentEdge2D { tangent, .. } => tangent.iter_mut().for_each(&mut swap),
        }
        changed
    }
}

/// The function a constraint drives to zero and the DOFs it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Residual {
    pub function: SolverFunction,
    pub inputs: Vec<DofId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintEquation {
    pub id: ConstraintId,
    pub kind: ConstraintKind,
    /// Residual inputs first, in residual order, then label DOFs.
    pub dofs: Vec<DofId>,
    pub depends_on: Vec<PrimitiveId>,
    pub weight: f64,
    /// Suppressed constraints stay in the graph but are skipped by the solver.
    #[serde(default)]
    pub suppressed: bool,
    pub residual: Residual,
}

impl ConstraintEquation {
    pub fn new(
        id: ConstraintId,
        kind: ConstraintKind,
        depends_on: Vec<PrimitiveId>,
        function: SolverFunction,
        inputs: Vec<DofId>,
    ) -> Self {
        let mut dofs = inputs.clone();
        for label in kind.label_dofs() {
            if !dofs.contains(&label) {
                dofs.push(label);
            }
        }
        Self {
            id,
            kind,
            dofs,
            depends_on,
            weight: DEFAULT_WEIGHT,
            suppressed: false,
            residual: Residual { function, inputs },
        }
    }

    pub fn is_active(&self) -> bool {
        !self.suppressed
    }

    /// True when `residual.inputs` appears in `dofs` in the same relative order.
    pub fn residual_aligned(&self) -> bool {
        let mut remaining = self.dofs.iter();
        self.residual
            .inputs
            .iter()
            .all(|input| remaining.any(|dof| dof == input))
    }

    /// Rewrite every reference to `old` as `new`.
    pub fn replace_dof(&mut self, old: DofId, new: DofId) -> bool {
        let mut changed = false;
        for dof in self.dofs.iter_mut().chain(self.residual.inputs.iter_mut()) {
            if *dof == old {
                *dof = new;
                changed = true;
            }
        }
        self.kind.replace_dof(old, new) || changed
    }
}
