//! JSON messages exchanged over the WebSocket.
//!
//! Every frame is a single JSON object tagged by `"type"`.

use serde::{Deserialize, Serialize};
use sketch_core::sketch::{EdgeEnd, Geometry, SolveReport};
use sketch_core::{ConstraintId, DofId, EntityRef, PrimitiveId, SketchError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    AddXyPlane,
    AddPoint2d {
        plane: PrimitiveId,
        s: f64,
        t: f64,
        #[serde(default = "default_free")]
        free: bool,
    },
    AddLine2d {
        point1: PrimitiveId,
        point2: PrimitiveId,
    },
    AddArc2d {
        plane: PrimitiveId,
        center: [f64; 2],
        radius: f64,
        theta1: f64,
        theta2: f64,
        #[serde(default = "default_free")]
        free: bool,
    },
    AddArc2dThreePoints {
        plane: PrimitiveId,
        start: [f64; 2],
        mid: [f64; 2],
        end: [f64; 2],
    },
    AddCircle2d {
        plane: PrimitiveId,
        center: [f64; 2],
        radius: f64,
        #[serde(default = "default_free")]
        free: bool,
    },
    AddCircle2dThreePoints {
        plane: PrimitiveId,
        a: [f64; 2],
        b: [f64; 2],
        c: [f64; 2],
    },
    AddDistancePoint2d {
        point1: PrimitiveId,
        point2: PrimitiveId,
        #[serde(default)]
        distance: Option<f64>,
    },
    AddDistancePointLine2d {
        point: PrimitiveId,
        line: PrimitiveId,
        #[serde(default)]
        distance: Option<f64>,
    },
    AddParallelLine2d {
        line1: PrimitiveId,
        line2: PrimitiveId,
    },
    AddAngleLine2d {
        line1: PrimitiveId,
        line2: PrimitiveId,
        angle: f64,
        #[serde(default = "default_free")]
        interior: bool,
    },
    AddTangentEdge2d {
        edge1: PrimitiveId,
        end1: EdgeEnd,
        edge2: PrimitiveId,
        end2: EdgeEnd,
    },
    AddHoriVertLine2d {
        line: PrimitiveId,
        vertical: bool,
    },
    Delete {
        #[serde(default)]
        primitives: Vec<PrimitiveId>,
        #[serde(default)]
        constraints: Vec<ConstraintId>,
    },
    SetValue {
        dof: DofId,
        value: f64,
    },
    SetFree {
        dof: DofId,
        free: bool,
    },
    SetWeight {
        constraint: ConstraintId,
        weight: f64,
    },
    SetSuppressed {
        constraint: ConstraintId,
        suppressed: bool,
    },
    MoveLabel {
        dof: DofId,
        value: f64,
    },
    MergePoints {
        keep: PrimitiveId,
        drop: PrimitiveId,
    },
    Drag {
        point: PrimitiveId,
        s: f64,
        t: f64,
    },
    Solve,
    Undo,
    Redo,
    Geometry {
        primitive: PrimitiveId,
    },
    Snapshot,
}

fn default_free() -> bool {
    true
}

impl Command {
    /// Commands that may run long enough to be worth cancelling.
    pub fn is_drag(&self) -> bool {
        matches!(self, Command::Drag { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveView {
    pub id: PrimitiveId,
    pub kind: String,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintView {
    pub id: ConstraintId,
    pub kind: String,
    pub error: f64,
    pub weight: f64,
    pub suppressed: bool,
}

/// Everything a client needs to redraw the sketch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub primitives: Vec<PrimitiveView>,
    pub constraints: Vec<ConstraintView>,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Created { entity: EntityRef, snapshot: Snapshot },
    Updated { snapshot: Snapshot },
    Solved { report: SolveReport, snapshot: Snapshot },
    Geometry { primitive: PrimitiveId, geometry: Geometry },
    Snapshot { snapshot: Snapshot },
    Error { code: String, message: String, severity: String },
}

impl Reply {
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "type": "error",
                "code": "ENCODING",
                "message": format!("Failed to encode reply: {}", e),
                "severity": "error",
            })
            .to_string()
        })
    }
}

pub fn parse_command(text: &str) -> Result<Command, Reply> {
    serde_json::from_str(text).map_err(|e| format_error("BAD_COMMAND", &format!("Invalid command: {}", e), "error"))
}

pub fn format_error(code: &str, message: &str, severity: &str) -> Reply {
    Reply::Error {
        code: code.to_string(),
        message: message.to_string(),
        severity: severity.to_string(),
    }
}

impl From<&SketchError> for Reply {
    fn from(err: &SketchError) -> Self {
        let severity = if err.is_informational() { "info" } else { "error" };
        format_error(err.code(), &err.to_string(), severity)
    }
}
