//! Parametric geometric constraint solving for 2D sketches on 3D planes.

pub mod dof;
pub mod error;
pub mod geometry;
pub mod history;
pub mod ids;
pub mod sketch;

pub use error::{SketchError, SketchResult, StoreError};
pub use ids::{ConstraintId, DofId, EntityRef, PrimitiveId};
pub use sketch::{CancelToken, Model, SolveReport, SolveStatus, SolverConfig};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
