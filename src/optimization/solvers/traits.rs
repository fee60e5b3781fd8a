use crate::core::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverResult {
    pub success: bool,
    pub cost: f64,
    pub iterations: u32,
    pub message: String,
    pub params: Vec<f64>,
    pub cost_evals: usize,
    pub grad_evals: usize,
}

/// Callback interface for optimization progress
pub trait OptimizationCallback {
    /// Called at each iteration with the best parameters and cost so far
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> Result<()>;

    /// Check if optimization should stop early
    fn should_stop(&self) -> bool {
        false
    }
}

/// Callback that ignores progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl OptimizationCallback for NoopCallback {
    fn on_iteration(&mut self, _iteration: u32, _params: &[f64], _cost: f64) -> Result<()> {
        Ok(())
    }
}

/// Bounded minimization problem.
///
/// `cost` must be a pure function of `params`; solvers may call it from
/// several threads at once.
pub trait Problem: Sync {
    /// Evaluate the objective for given parameters
    fn cost(&self, params: &[f64]) -> Result<f64>;

    /// Number of parameters
    fn num_params(&self) -> usize;

    /// Parameter bounds (min, max) for each parameter
    fn bounds(&self) -> &[(f64, f64)];
}

/// Population search over the whole bounded space
pub trait GlobalOptimizer {
    fn name(&self) -> &str;

    fn minimize(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult>;
}

/// Refinement starting from a known point inside the bounds
pub trait LocalOptimizer {
    fn name(&self) -> &str;

    fn minimize(
        &mut self,
        problem: &dyn Problem,
        initial: &[f64],
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult>;
}
