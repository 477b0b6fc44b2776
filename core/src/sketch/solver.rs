//! Weighted Levenberg-Marquardt solve over the free DOFs of a graph.

use super::graph::Graph;
use crate::geometry::EPSILON;
use crate::error::{SketchError, SketchResult};
use crate::ids::{ConstraintId, DofId};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunable solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum number of trial steps
    pub max_iterations: usize,
    /// Success when the weighted residual norm drops below this
    pub tolerance: f64,
    /// Success when an accepted step is this small relative to the variables
    pub relative_tolerance: f64,
    /// Success when the gradient of the objective vanishes
    pub gradient_tolerance: f64,
    pub lambda_initial: f64,
    pub lambda_factor: f64,
    /// Give up once damping grows past this
    pub lambda_max: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-10,
            relative_tolerance: 1e-12,
            gradient_tolerance: 1e-14,
            lambda_initial: 1e-3,
            lambda_factor: 10.0,
            lambda_max: 1e12,
        }
    }
}

/// Cooperative cancellation flag, shared between the caller and a running solve.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Converged,
    DidNotConverge,
    Cancelled,
}

/// Result of a solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub status: SolveStatus,
    /// Number of trial steps taken
    pub iterations: usize,
    /// sqrt of the weighted sum of squared residuals
    pub residual_norm: f64,
    /// Largest absolute residual of any active constraint
    pub max_residual: f64,
    /// Number of free DOFs the solver adjusted
    pub free_dofs: usize,
    /// Number of non-suppressed constraints
    pub active_constraints: usize,
    /// Active constraints whose residual is still above tolerance
    pub unsatisfied: Vec<(ConstraintId, f64)>,
}

impl SolveReport {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Turn a non-converged report into the matching error.
    pub fn into_result(self) -> SketchResult<SolveReport> {
        match self.status {
            SolveStatus::Converged => Ok(self),
            SolveStatus::DidNotConverge => Err(SketchError::DidNotConverge {
                iterations: self.iterations,
                residual: self.residual_norm,
            }),
            SolveStatus::Cancelled => Err(SketchError::Cancelled {
                iterations: self.iterations,
            }),
        }
    }
}

/// Residuals and Jacobian at one point.
struct System {
    residuals: DVector<f64>,
    jacobian: DMatrix<f64>,
}

impl System {
    fn objective(&self, weights: &DVector<f64>) -> f64 {
        self.residuals
            .iter()
            .zip(weights.iter())
            .map(|(r, w)| w * r * r)
            .sum()
    }
}

pub struct SketchSolver;

impl SketchSolver {
    /// Free independent DOFs reachable from active constraints, sorted by id.
    pub fn free_variables(graph: &Graph) -> SketchResult<Vec<DofId>> {
        let mut free = BTreeSet::new();
        for constraint in graph.constraints().filter(|c| c.is_active()) {
            for input in &constraint.residual.inputs {
                for root in graph.dofs().independent_roots(*input)? {
                    if graph.dofs().get(root)?.is_free() {
                        free.insert(root);
                    }
                }
            }
        }
        Ok(free.into_iter().collect())
    }

    fn evaluate(
        graph: &Graph,
        active: &[ConstraintId],
        columns: &HashMap<DofId, usize>,
    ) -> SketchResult<System> {
        let mut residuals = DVector::zeros(active.len());
        let mut jacobian = DMatrix::zeros(active.len(), columns.len());
        let mut memo = HashMap::new();
        for (row, id) in active.iter().enumerate() {
            let residual = &graph.constraint(*id)?.residual;
            let args = graph.dofs().values(&residual.inputs)?;
            residuals[row] = residual.function.evaluate(&args);

            let local = residual.function.gradient(&args);
            for (input, d_input) in residual.inputs.iter().zip(local) {
                if d_input == 0.0 {
                    continue;
                }
                let chained: BTreeMap<DofId, f64> = graph.dofs().gradient_memo(*input, &mut memo)?;
                for (root, d_root) in chained {
                    if let Some(col) = columns.get(&root) {
                        jacobian[(row, *col)] += d_input * d_root;
                    }
                }
            }
        }
        Ok(System { residuals, jacobian })
    }

    fn write_back(graph: &mut Graph, free: &[DofId], x: &DVector<f64>) -> SketchResult<()> {
        for (id, value) in free.iter().zip(x.iter()) {
            graph.dofs_mut().set_value(*id, *value)?;
        }
        Ok(())
    }

    /// Solve `(A + λI) δ = -g`, Cholesky first, LU if that fails.
    fn damped_step(a: &DMatrix<f64>, g: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
        let n = a.nrows();
        let damped = a + DMatrix::<f64>::identity(n, n) * lambda;
        let rhs = -g;
        if let Some(chol) = damped.clone().cholesky() {
            return Some(chol.solve(&rhs));
        }
        damped.lu().solve(&rhs)
    }

    /// Adjust the free DOFs of `graph` so that every active constraint is
    /// satisfied in the weighted least-squares sense.
    ///
    /// Values are written back through the normal DOF path so cached
    /// dependents stay correct. On failure or cancellation the graph holds
    /// the last accepted iterate.
    pub fn solve(graph: &mut Graph, config: &SolverConfig, cancel: &CancelToken) -> SketchResult<SolveReport> {
        let active: Vec<ConstraintId> = graph.constraints().filter(|c| c.is_active()).map(|c| c.id).collect();
        let free = Self::free_variables(graph)?;
        let columns: HashMap<DofId, usize> = free.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let weights = DVector::from_iterator(
            active.len(),
            active
                .iter()
                .map(|id| graph.constraint(*id).map(|c| c.weight))
                .collect::<SketchResult<Vec<_>>>()?,
        );

        let mut x = DVector::from_vec(graph.dofs().values(&free)?);
        let mut system = Self::evaluate(graph, &active, &columns)?;
        let mut phi = system.objective(&weights);
        let mut lambda = config.lambda_initial;
        let mut iterations = 0;

        debug!(
            "Solving {} constraints over {} free DOFs, initial objective {:e}",
            active.len(),
            free.len(),
            phi
        );

        let status = loop {
            if phi.sqrt() < config.tolerance {
                break SolveStatus::Converged;
            }
            if free.is_empty() {
                break SolveStatus::DidNotConverge;
            }
            if cancel.is_cancelled() {
                break SolveStatus::Cancelled;
            }
            if iterations >= config.max_iterations {
                break SolveStatus::DidNotConverge;
            }

            let jt_w = system.jacobian.transpose() * DMatrix::from_diagonal(&weights);
            let gradient = &jt_w * &system.residuals;
            if gradient.norm() < config.gradient_tolerance {
                // Stationary point with a non-zero residual
                break SolveStatus::Converged;
            }
            let normal = &jt_w * &system.jacobian;

            iterations += 1;
            let Some(step) = Self::damped_step(&normal, &gradient, lambda) else {
                lambda *= config.lambda_factor;
                if lambda > config.lambda_max {
                    break SolveStatus::DidNotConverge;
                }
                continue;
            };

            let trial = &x + &step;
            if trial.iter().any(|v| !v.is_finite()) {
                lambda *= config.lambda_factor;
                if lambda > config.lambda_max {
                    break SolveStatus::DidNotConverge;
                }
                continue;
            }
            Self::write_back(graph, &free, &trial)?;
            let trial_system = Self::evaluate(graph, &active, &columns)?;
            let trial_phi = trial_system.objective(&weights);

            let small_step = step.norm() < config.relative_tolerance * (x.norm() + config.relative_tolerance);
            if trial_phi.is_finite() && trial_phi < phi {
                debug!("iteration {}: accepted, objective {:e}, lambda {:e}", iterations, trial_phi, lambda);
                x = trial;
                system = trial_system;
                phi = trial_phi;
                lambda = (lambda / config.lambda_factor).max(f64::EPSILON);
            } else {
                debug!("iteration {}: rejected, lambda {:e}", iterations, lambda);
                Self::write_back(graph, &free, &x)?;
                lambda *= config.lambda_factor;
                if lambda > config.lambda_max {
                    break SolveStatus::DidNotConverge;
                }
            }
            if small_step {
                // No step of useful size improves the objective: locally stationary
                break SolveStatus::Converged;
            }
        };

        let unsatisfied = active
            .iter()
            .zip(system.residuals.iter())
            .filter(|(_, r)| r.abs() >= EPSILON)
            .map(|(id, r)| (*id, *r))
            .collect();
        let report = SolveReport {
            status,
            iterations,
            residual_norm: phi.sqrt(),
            max_residual: system.residuals.amax(),
            free_dofs: free.len(),
            active_constraints: active.len(),
            unsatisfied,
        };

        match status {
            SolveStatus::Converged => info!(
                "Solve converged in {} iterations (residual {:e})",
                iterations, report.residual_norm
            ),
            SolveStatus::DidNotConverge => warn!(
                "Solve did not converge after {} iterations (residual {:e})",
                iterations, report.residual_norm
            ),
            SolveStatus::Cancelled => info!("Solve cancelled after {} iterations", iterations),
        }
        Ok(report)
    }
}
