//! Error taxonomy for the sketch core.

use crate::ids::{ConstraintId, DofId, PrimitiveId};
use thiserror::Error;

/// Failures of the persistence collaborator behind [`crate::history::LogStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Log store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log entry encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Log store rejected entry {sequence}: {reason}")]
    Rejected { sequence: u64, reason: String },
}

/// Errors raised by graph construction, mutation, solving and history replay.
#[derive(Debug, Error)]
pub enum SketchError {
    #[error("Cyclic dependency: {dof} would depend on itself via {path:?}")]
    CyclicDependency { dof: DofId, path: Vec<DofId> },

    #[error("Referential integrity violated: {entity} is still referenced by {referenced_by}")]
    ReferentialIntegrity {
        entity: String,
        referenced_by: String,
    },

    #[error("Unknown DOF: {0}")]
    UnknownDof(DofId),

    #[error("Unknown primitive: {0}")]
    UnknownPrimitive(PrimitiveId),

    #[error("Unknown constraint: {0}")]
    UnknownConstraint(ConstraintId),

    #[error("{0} is a dependent DOF and cannot be assigned")]
    NotIndependent(DofId),

    #[error("Wrong primitive kind for {id}: expected {expected}, found {found}")]
    WrongKind {
        id: PrimitiveId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{function} takes {expected} inputs, got {found}")]
    Arity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Solver did not converge after {iterations} iterations (residual {residual:e})")]
    DidNotConverge { iterations: usize, residual: f64 },

    #[error("Solve cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("History replay failed at entry {sequence}: {reason}")]
    Replay { sequence: u64, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SketchError {
    /// Short machine-readable code, used by front ends.
    pub fn code(&self) -> &'static str {
        match self {
            SketchError::CyclicDependency { .. } => "CYCLIC_DEPENDENCY",
            SketchError::ReferentialIntegrity { .. } => "REFERENTIAL_INTEGRITY",
            SketchError::UnknownDof(_) => "UNKNOWN_DOF",
            SketchError::UnknownPrimitive(_) => "UNKNOWN_PRIMITIVE",
            SketchError::UnknownConstraint(_) => "UNKNOWN_CONSTRAINT",
            SketchError::NotIndependent(_) => "NOT_INDEPENDENT",
            SketchError::WrongKind { .. } => "WRONG_KIND",
            SketchError::Arity { .. } => "ARITY",
            SketchError::InvalidValue(_) => "INVALID_VALUE",
            SketchError::DegenerateGeometry(_) => "DEGENERATE_GEOMETRY",
            SketchError::DidNotConverge { .. } => "DID_NOT_CONVERGE",
            SketchError::Cancelled { .. } => "CANCELLED",
            SketchError::NothingToUndo => "NOTHING_TO_UNDO",
            SketchError::NothingToRedo => "NOTHING_TO_REDO",
            SketchError::Replay { .. } => "REPLAY",
            SketchError::Store(_) => "STORE",
        }
    }

    /// Informational errors leave the model untouched and need no user action.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            SketchError::NothingToUndo
                | SketchError::NothingToRedo
                | SketchError::DidNotConverge { .. }
                | SketchError::Cancelled { .. }
        )
    }
}

/// Result type for sketch operations.
pub type SketchResult<T> = Result<T, SketchError>;
