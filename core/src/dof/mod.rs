//! Degrees of freedom.
//!
//! Provides the scalar parameter model the solver works on:
//! - Independent DOFs holding a value and a free/fixed flag
//! - Dependent DOFs defined by a [`SolverFunction`] over other DOFs
//! - Lazy cached evaluation with downstream invalidation
//! - Chain-rule gradients and cycle detection

pub mod functions;
pub mod types;


pub use functions::SolverFunction;
pub use types::{Dof, DofKind, DofStore};
