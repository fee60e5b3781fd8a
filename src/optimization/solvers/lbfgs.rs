use super::traits::{LocalOptimizer, OptimizationCallback, Problem, SolverResult};
use crate::core::{FitError, Result};
use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, State, TerminationReason,
};
use argmin::solver::linesearch::condition::ArmijoCondition;
use argmin::solver::linesearch::BacktrackingLineSearch;
use argmin::solver::quasinewton::LBFGS;
use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Relative finite-difference step, scaled by each interval's width
const FD_STEP: f64 = 1e-6;

/// Starts are mapped at least this far (in `[-1, 1]` box units) from a bound,
/// where `dx/du` of the transform vanishes
const BOUND_MARGIN: f64 = 1e-4;

/// Fresh L-BFGS runs allowed after a run that stopped early while improving
const MAX_RESTARTS: usize = 10;

/// Bounded L-BFGS refinement.
///
/// argmin's L-BFGS is unconstrained, so the search runs on internal
/// coordinates `u` mapped onto the box by `x = lo + (hi - lo)(sin u + 1)/2`.
/// Every point handed to the problem lies inside the bounds.
///
/// Near a bound the transform flattens and bends the objective, which can
/// stall a run with stale curvature pairs. A run that still improved the
/// cost is followed by a fresh run from its best point.
pub struct LbfgsRefiner {
    max_iter: u64,
    cost_tolerance: f64,
    grad_tolerance: f64,
    memory: usize,
    armijo_c: f64,         // Armijo condition parameter
    backtrack_factor: f64, // Line search backtracking
}

impl LbfgsRefiner {
    pub fn new(max_iter: u64, cost_tolerance: f64) -> Self {
        Self {
            max_iter,
            cost_tolerance,
            grad_tolerance: 1e-10,
            memory: 10,
            armijo_c: 1e-4,
            backtrack_factor: 0.5,
        }
    }

    pub fn with_grad_tolerance(mut self, grad_tolerance: f64) -> Self {
        self.grad_tolerance = grad_tolerance;
        self
    }

    /// Number of correction pairs kept by L-BFGS (default: 10)
    pub fn with_memory(mut self, memory: usize) -> Self {
        self.memory = memory;
        self
    }

    fn clamp_params(&self, params: &mut [f64], bounds: &[(f64, f64)]) {
        for (value, &(min, max)) in params.iter_mut().zip(bounds) {
            *value = value.clamp(min, max);
        }
    }

    /// One argmin run; the best point seen is tracked by the objective
    fn run(
        &self,
        objective: BoundedObjective<'_, '_>,
        start: Vec<f64>,
        max_iter: u64,
    ) -> std::result::Result<(u64, Option<TerminationReason>), ArgminError> {
        let linesearch = BacktrackingLineSearch::new(ArmijoCondition::new(self.armijo_c)?)
            .rho(self.backtrack_factor)?;
        let solver = LBFGS::new(linesearch, self.memory)
            .with_tolerance_cost(self.cost_tolerance)?
            .with_tolerance_grad(self.grad_tolerance)?;

        let res = Executor::new(objective, solver)
            .configure(|state| state.param(start).max_iters(max_iter))
            .run()?;

        let state = res.state();
        Ok((state.get_iter(), state.get_termination_reason().cloned()))
    }
}

impl LocalOptimizer for LbfgsRefiner {
    fn name(&self) -> &str {
        "L-BFGS"
    }

    fn minimize(
        &mut self,
        problem: &dyn Problem,
        initial: &[f64],
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult> {
        let bounds = problem.bounds();
        if initial.len() != problem.num_params() || bounds.len() != problem.num_params() {
            return Err(FitError::invalid(format!(
                "initial point has {} values, problem expects {}",
                initial.len(),
                problem.num_params()
            )));
        }

        let mut start = initial.to_vec();
        self.clamp_params(&mut start, bounds);
        let start_cost = problem.cost(&start)?;

        let cost_evals = AtomicUsize::new(1);
        let grad_evals = AtomicUsize::new(0);
        let progress = RefCell::new(Progress::new(callback, start, start_cost));

        let mut iterations: u64 = 0;
        let mut outcome = (false, String::from("Not started"));
        let mut reference_cost = start_cost;

        for restart in 0..=MAX_RESTARTS {
            let internal_start: Vec<f64> = progress
                .borrow()
                .best
                .0
                .iter()
                .zip(bounds)
                .map(|(&x, &b)| to_internal(x, b))
                .collect();
            progress.borrow_mut().begin_run();

            let objective = BoundedObjective {
                problem,
                bounds,
                cost_evals: &cost_evals,
                grad_evals: &grad_evals,
                progress: &progress,
            };

            match self.run(objective, internal_start, self.max_iter - iterations) {
                Ok((iters, reason)) => {
                    iterations += iters;
                    outcome = describe(reason.as_ref());

                    let best_cost = progress.borrow().best.1;
                    let improved = best_cost < reference_cost - self.cost_tolerance;
                    reference_cost = best_cost;
                    if !improved || iterations >= self.max_iter {
                        break;
                    }
                    log::debug!(
                        "L-BFGS restart {} from cost {:.6e} ({})",
                        restart + 1,
                        best_cost,
                        outcome.1
                    );
                }
                Err(e) => {
                    if progress.borrow().stopped {
                        outcome = (false, "Stopped by callback".into());
                    } else {
                        log::warn!("L-BFGS refinement aborted, keeping best point: {}", e);
                        outcome = (false, format!("Aborted: {}", e));
                    }
                    break;
                }
            }
        }

        let Progress {
            callback,
            iteration,
            best: (params, cost),
            ..
        } = progress.into_inner();

        if iteration == 0 {
            callback.on_iteration(1, &params, cost)?;
        }

        let (success, message) = outcome;
        Ok(SolverResult {
            success,
            cost,
            iterations: u32::try_from(iterations).unwrap_or(u32::MAX),
            message,
            params,
            cost_evals: cost_evals.load(Ordering::Relaxed),
            grad_evals: grad_evals.load(Ordering::Relaxed),
        })
    }
}

fn describe(reason: Option<&TerminationReason>) -> (bool, String) {
    match reason {
        Some(TerminationReason::SolverConverged) => (true, "Converged".into()),
        Some(TerminationReason::TargetCostReached) => (true, "Target cost reached".into()),
        Some(TerminationReason::MaxItersReached) => (false, "Max iterations reached".into()),
        Some(other) => (false, format!("Terminated: {:?}", other)),
        None => (false, "Not terminated".into()),
    }
}

/// Map an internal coordinate onto `[min, max]`
fn to_bounded(u: f64, (min, max): (f64, f64)) -> f64 {
    if max <= min {
        return min;
    }
    (min + (max - min) * 0.5 * (u.sin() + 1.0)).clamp(min, max)
}

/// Inverse of [`to_bounded`], keeping [`BOUND_MARGIN`] away from either bound
fn to_internal(x: f64, (min, max): (f64, f64)) -> f64 {
    if max <= min {
        return 0.0;
    }
    let limit = 1.0 - BOUND_MARGIN;
    (2.0 * (x - min) / (max - min) - 1.0)
        .clamp(-limit, limit)
        .asin()
}

fn to_bounded_vec(u: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    u.iter().zip(bounds).map(|(&ui, &b)| to_bounded(ui, b)).collect()
}

/// Iteration bookkeeping shared by the runs of one refinement
struct Progress<'c> {
    callback: &'c mut dyn OptimizationCallback,
    iteration: u32,
    /// The first gradient of a run is taken at its start point, not after a step
    at_run_start: bool,
    /// Last (internal point, cost) argmin evaluated
    last: Option<(Vec<f64>, f64)>,
    /// Best bounded point and its cost
    best: (Vec<f64>, f64),
    stopped: bool,
}

impl<'c> Progress<'c> {
    fn new(callback: &'c mut dyn OptimizationCallback, start: Vec<f64>, start_cost: f64) -> Self {
        Self {
            callback,
            iteration: 0,
            at_run_start: true,
            last: None,
            best: (start, start_cost),
            stopped: false,
        }
    }

    fn begin_run(&mut self) {
        self.at_run_start = true;
        self.last = None;
    }

    fn record_cost(&mut self, u: &[f64], x: Vec<f64>, cost: f64) {
        if cost < self.best.1 {
            self.best = (x, cost);
        }
        self.last = Some((u.to_vec(), cost));
    }

    fn cached_cost(&self, u: &[f64]) -> Option<f64> {
        self.last
            .as_ref()
            .filter(|(last_u, _)| last_u.as_slice() == u)
            .map(|&(_, cost)| cost)
    }

    /// Called once per accepted L-BFGS step
    fn step(&mut self, x: &[f64], cost: f64) -> Result<()> {
        if self.at_run_start {
            self.at_run_start = false;
            return Ok(());
        }
        self.iteration += 1;
        self.callback.on_iteration(self.iteration, x, cost)?;
        if self.callback.should_stop() {
            self.stopped = true;
            return Err(FitError::Solver("stopped by callback".into()));
        }
        Ok(())
    }
}

/// Problem seen by argmin: cost and gradient over internal coordinates
struct BoundedObjective<'a, 'c> {
    problem: &'a dyn Problem,
    bounds: &'a [(f64, f64)],
    cost_evals: &'a AtomicUsize,
    grad_evals: &'a AtomicUsize,
    progress: &'a RefCell<Progress<'c>>,
}

impl BoundedObjective<'_, '_> {
    fn cost_at(&self, x: &[f64]) -> Result<f64> {
        self.cost_evals.fetch_add(1, Ordering::Relaxed);
        self.problem.cost(x)
    }

    /// Finite-difference gradient in bounded space, one-sided at a bound
    fn bounded_gradient(&self, x: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; x.len()];
        let mut probe = x.to_vec();

        for (i, &(min, max)) in self.bounds.iter().enumerate() {
            let span = max - min;
            if span <= 0.0 {
                continue;
            }
            let h = FD_STEP * span;
            let xi = x[i];

            let (upper, lower) = if xi + h > max {
                (xi, xi - h)
            } else if xi - h < min {
                (xi + h, xi)
            } else {
                (xi + h, xi - h)
            };

            probe[i] = upper;
            let c_plus = self.cost_at(&probe)?;
            probe[i] = lower;
            let c_minus = self.cost_at(&probe)?;
            probe[i] = xi;

            grad[i] = (c_plus - c_minus) / (upper - lower);
        }

        Ok(grad)
    }
}

impl CostFunction for BoundedObjective<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, u: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let x = to_bounded_vec(u, self.bounds);
        let cost = self.cost_at(&x)?;
        self.progress.borrow_mut().record_cost(u, x, cost);
        Ok(cost)
    }
}

impl Gradient for BoundedObjective<'_, '_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, u: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        self.grad_evals.fetch_add(1, Ordering::Relaxed);
        let x = to_bounded_vec(u, self.bounds);
        let grad_x = self.bounded_gradient(&x)?;

        let cached = self.progress.borrow().cached_cost(u);
        let cost = match cached {
            Some(cost) => cost,
            None => self.cost_at(&x)?,
        };
        self.progress.borrow_mut().step(&x, cost)?;

        // Chain rule through x = lo + (hi - lo)(sin u + 1)/2
        Ok(u.iter()
            .zip(self.bounds)
            .zip(grad_x)
            .map(|((&ui, &(min, max)), g)| g * 0.5 * (max - min) * ui.cos())
            .collect())
    }
}
