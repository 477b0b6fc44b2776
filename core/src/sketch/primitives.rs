//! Geometric primitives and their DOF / dependency bookkeeping.

use crate::ids::{DofId, PrimitiveId};
use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Which end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeEnd {
    Point1,
    Point2,
}

impl EdgeEnd {
    pub const BOTH: [EdgeEnd; 2] = [EdgeEnd::Point1, EdgeEnd::Point2];
}

/// Classification bits used by pickers to filter what can be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionMask(u8);

impl SelectionMask {
    pub const NONE: SelectionMask = SelectionMask(0);
    pub const POINT: SelectionMask = SelectionMask(1);
    pub const EDGE: SelectionMask = SelectionMask(1 << 1);
    pub const PLANE: SelectionMask = SelectionMask(1 << 2);
    pub const VECTOR: SelectionMask = SelectionMask(1 << 3);
    pub const CONSTRAINT: SelectionMask = SelectionMask(1 << 4);
    pub const ALL: SelectionMask = SelectionMask(0x1f);

    pub fn contains(self, other: SelectionMask) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: SelectionMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for SelectionMask {
    type Output = SelectionMask;

    fn bitor(self, rhs: SelectionMask) -> SelectionMask {
        SelectionMask(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveKind {
    Point {
        x: DofId,
        y: DofId,
        z: DofId,
    },
    Vector {
        x: DofId,
        y: DofId,
        z: DofId,
    },
    Line {
        point1: PrimitiveId,
        point2: PrimitiveId,
    },
    SketchPlane {
        normal: PrimitiveId,
        up: PrimitiveId,
        base: PrimitiveId,
    },
    Point2D {
        s: DofId,
        t: DofId,
        plane: PrimitiveId,
    },
    /// Endpoint coordinates are the endpoint points' own DOFs.
    Line2D {
        point1: PrimitiveId,
        point2: PrimitiveId,
        plane: PrimitiveId,
        s1: DofId,
        t1: DofId,
        s2: DofId,
        t2: DofId,
    },
    /// Counter-clockwise from `theta1` to `theta2`. `point1`, `point2` and
    /// `center` are generated Point2D primitives.
    Arc2D {
        s_center: DofId,
        t_center: DofId,
        theta1: DofId,
        theta2: DofId,
        radius: DofId,
        plane: PrimitiveId,
        point1: PrimitiveId,
        point2: PrimitiveId,
        center: PrimitiveId,
        text_angle: DofId,
        text_radius: DofId,
    },
    Circle2D {
        s_center: DofId,
        t_center: DofId,
        radius: DofId,
        plane: PrimitiveId,
        center: PrimitiveId,
        text_angle: DofId,
        text_radius: DofId,
    },
}

impl PrimitiveKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Point { .. } => "point",
            PrimitiveKind::Vector { .. } => "vector",
            PrimitiveKind::Line { .. } => "line",
            PrimitiveKind::SketchPlane { .. } => "sketch_plane",
            PrimitiveKind::Point2D { .. } => "point2d",
            PrimitiveKind::Line2D { .. } => "line2d",
            PrimitiveKind::Arc2D { .. } => "arc2d",
            PrimitiveKind::Circle2D { .. } => "circle2d",
        }
    }

    /// Lines and arcs; the things an edge loop is made of.
    pub fn is_edge(&self) -> bool {
        matches!(self, PrimitiveKind::Line2D { .. } | PrimitiveKind::Arc2D { .. })
    }

    /// Ordered DOF list. Label DOFs come last.
    pub fn dofs(&self) -> Vec<DofId> {
        match *self {
            PrimitiveKind::Point { x, y, z } | PrimitiveKind::Vector { x, y, z } => vec![x, y, z],
            PrimitiveKind::Line { .. } | PrimitiveKind::SketchPlane { .. } => Vec::new(),
            PrimitiveKind::Point2D { s, t, .. } => vec![s, t],
            PrimitiveKind::Line2D { s1, t1, s2, t2, .. } => vec![s1, t1, s2, t2],
            PrimitiveKind::Arc2D {
                s_center,
                t_center,
                theta1,
                theta2,
                radius,
                text_angle,
                text_radius,
                ..
            } => vec![s_center, t_center, theta1, theta2, radius, text_angle, text_radius],
            PrimitiveKind::Circle2D {
                s_center,
                t_center,
                radius,
                text_angle,
                text_radius,
                ..
            } => vec![s_center, t_center, radius, text_angle, text_radius],
        }
    }

    /// Independent DOFs that only position annotation text.
    pub fn label_dofs(&self) -> Vec<DofId> {
        match *self {
            PrimitiveKind::Arc2D { text_angle, text_radius, .. }
            | PrimitiveKind::Circle2D { text_angle, text_radius, .. } => vec![text_angle, text_radius],
            _ => Vec::new(),
        }
    }

    pub fn depends_on(&self) -> Vec<PrimitiveId> {
        match *self {
            PrimitiveKind::Point { .. } | PrimitiveKind::Vector { .. } => Vec::new(),
            PrimitiveKind::Line { point1, point2 } => vec![point1, point2],
            PrimitiveKind::SketchPlane { normal, up, base } => vec![normal, up, base],
            PrimitiveKind::Point2D { plane, .. } => vec![plane],
            PrimitiveKind::Line2D { plane, point1, point2, .. } => vec![plane, point1, point2],
            PrimitiveKind::Arc2D {
                plane,
                center,
                point1,
                point2,
                ..
            } => vec![plane, center, point1, point2],
            PrimitiveKind::Circle2D { plane, center, .. } => vec![plane, center],
        }
    }

    /// Point primitives created together with this one and deleted with it.
    pub fn generated(&self) -> Vec<PrimitiveId> {
        match *self {
            PrimitiveKind::Arc2D {
                point1,
                point2,
                center,
                ..
            } => vec![point1, point2, center],
            PrimitiveKind::Circle2D { center, .. } => vec![center],
            _ => Vec::new(),
        }
    }

    pub fn selection_mask(&self) -> SelectionMask {
        match self {
            PrimitiveKind::Point { .. } | PrimitiveKind::Point2D { .. } => SelectionMask::POINT,
            PrimitiveKind::Vector { .. } => SelectionMask::VECTOR,
            PrimitiveKind::SketchPlane { .. } => SelectionMask::PLANE,
            PrimitiveKind::Line { .. }
            | PrimitiveKind::Line2D { .. }
            | PrimitiveKind::Arc2D { .. }
            | PrimitiveKind::Circle2D { .. } => SelectionMask::EDGE,
        }
    }

    /// Sketch plane of a 2D primitive.
    pub fn plane(&self) -> Option<PrimitiveId> {
        match *self {
            PrimitiveKind::Point2D { plane, .. }
            | PrimitiveKind::Line2D { plane, .. }
            | PrimitiveKind::Arc2D { plane, .. }
            | PrimitiveKind::Circle2D { plane, .. } => Some(plane),
            _ => None,
        }
    }

    /// Rewrite every reference to `old` as `new`. Returns whether anything changed.
    pub fn replace_dof(&mut self, old: DofId, new: DofId) -> bool {
        let mut changed = false;
        let mut swap = |slot: &mut DofId| {
            if *slot == old {
                *slot = new;
                changed = true;
            }
        };
        match self {
            PrimitiveKind::Point { x, y, z } | PrimitiveKind::Vector { x, y, z } => {
                swap(x);
                swap(y);
                swap(z);
            }
            PrimitiveKind::Line { .. } | PrimitiveKind::SketchPlane { .. } => {}
            PrimitiveKind::Point2D { s, t, .. } => {
                swap(s);
                swap(t);
            }
            PrimitiveKind::Line2D { s1, t1, s2, t2, .. } => {
                swap(s1);
                swap(t1);
                swap(s2);
                swap(t2);
            }
            PrimitiveKind::Arc2D {
                s_center,
                t_center,
                theta1,
                theta2,
                radius,
                text_angle,
                text_radius,
                ..
            } => {
                for slot in [s_center, t_center, theta1, theta2, radius, text_angle, text_radius] {
                    swap(slot);
                }
            }
            PrimitiveKind::Circle2D {
                s_center,
                t_center,
                radius,
                text_angle,
                text_radius,
                ..
            } => {
                for slot in [s_center, t_center, radius, text_angle, text_radius] {
                    swap(slot);
                }
            }
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    pub id: PrimitiveId,
    pub kind: PrimitiveKind,
}

impl Primitive {
    pub fn new(id: PrimitiveId, kind: PrimitiveKind) -> Self {
        Self { id, kind }
    }

    pub fn dofs(&self) -> Vec<DofId> {
        self.kind.dofs()
    }

    pub fn depends_on(&self) -> Vec<PrimitiveId> {
        self.kind.depends_on()
    }

    pub fn selection_mask(&self) -> SelectionMask {
        self.kind.selection_mask()
    }
}
