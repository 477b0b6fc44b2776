//! Parametric sketches.
//!
//! A [`Model`] owns a [`Graph`] of primitives and constraint equations built
//! on shared DOFs. Edits go through the model so they are validated, logged
//! and undoable; [`SketchSolver`] moves free DOFs to satisfy the constraints.

mod builders;
pub mod constraints;
pub mod graph;
pub mod loops;
pub mod model;
pub mod primitives;
pub mod query;
pub mod solver;

#[cfg(test)]
mod tests_history;
#[cfg(test)]
mod tests_loops;
#[cfg(test)]
mod tests_model;
#[cfg(test)]
mod tests_solver;

pub use constraints::{ConstraintEquation, ConstraintKind, Residual, DEFAULT_WEIGHT};
pub use graph::Graph;
pub use loops::{EdgeLoop, LoopDefect};
pub use model::Model;
pub use primitives::{EdgeEnd, Primitive, PrimitiveKind, SelectionMask};
pub use query::Geometry;
pub use solver::{CancelToken, SketchSolver, SolveReport, SolveStatus, SolverConfig};
