use super::lbfgs::LbfgsRefiner;
use super::traits::{
    GlobalOptimizer, LocalOptimizer, NoopCallback, OptimizationCallback, Problem, SolverResult,
};
use crate::core::{FitError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Smallest population that still leaves two donors besides the target and best
const MIN_POPULATION: usize = 5;

/// Differential evolution, DE/best/1/bin with dithered mutation.
///
/// Selection is deferred to the end of each generation, so serial and
/// parallel population evaluation give identical results for a given seed.
pub struct DifferentialEvolution {
    max_generations: u32,
    tolerance: f64,
    abs_tolerance: f64,
    population_factor: usize, // members per parameter
    mutation: (f64, f64),     // F dithered per generation in [lo, hi)
    crossover: f64,           // CR - binomial crossover probability
    seed: Option<u64>,
    parallel: bool,
    polisher: Option<LbfgsRefiner>,
}

impl DifferentialEvolution {
    pub fn new(max_generations: u32, tolerance: f64) -> Self {
        Self {
            max_generations,
            tolerance,
            abs_tolerance: 0.0,
            population_factor: 15,
            mutation: (0.5, 1.0),
            crossover: 0.7,
            seed: None,
            parallel: true,
            polisher: None,
        }
    }

    /// Population members per parameter (default: 15)
    pub fn with_population_factor(mut self, factor: usize) -> Self {
        self.population_factor = factor;
        self
    }

    /// Configure DE parameters (defaults: F in [0.5, 1.0), CR=0.7)
    pub fn with_de_params(mut self, mutation: (f64, f64), crossover: f64) -> Self {
        self.mutation = mutation;
        self.crossover = crossover;
        self
    }

    pub fn with_abs_tolerance(mut self, abs_tolerance: f64) -> Self {
        self.abs_tolerance = abs_tolerance;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run a local refinement from the best member once the search stops
    pub fn with_polish(mut self, polisher: LbfgsRefiner) -> Self {
        self.polisher = Some(polisher);
        self
    }

    pub fn population_size(&self, n_params: usize) -> usize {
        (self.population_factor * n_params).max(MIN_POPULATION)
    }

    fn check_settings(&self) -> Result<()> {
        let (lo, hi) = self.mutation;
        if !(lo >= 0.0 && lo <= hi && hi <= 2.0) {
            return Err(FitError::invalid(format!(
                "mutation range must satisfy 0 <= lo <= hi <= 2, got ({}, {})",
                lo, hi
            )));
        }
        if !(0.0..=1.0).contains(&self.crossover) {
            return Err(FitError::invalid(format!(
                "crossover probability must be in [0, 1], got {}",
                self.crossover
            )));
        }
        if !(self.tolerance >= 0.0) || !(self.abs_tolerance >= 0.0) {
            return Err(FitError::invalid("convergence tolerances must be non-negative"));
        }
        Ok(())
    }

    /// Latin hypercube sample: one member per stratum in every dimension
    fn initialize_population(
        &self,
        size: usize,
        bounds: &[(f64, f64)],
        rng: &mut StdRng,
    ) -> Vec<Vec<f64>> {
        let mut population = vec![vec![0.0; bounds.len()]; size];
        let mut strata: Vec<usize> = (0..size).collect();

        for (i, &(min, max)) in bounds.iter().enumerate() {
            strata.shuffle(rng);
            for (member, &stratum) in population.iter_mut().zip(&strata) {
                let u = (stratum as f64 + rng.r#gen::<f64>()) / size as f64;
                member[i] = (min + u * (max - min)).clamp(min, max);
            }
        }

        population
    }

    /// Two distinct donors, neither equal to `target`
    fn pick_donors(&self, target: usize, size: usize, rng: &mut StdRng) -> (usize, usize) {
        let mut r1 = rng.gen_range(0..size);
        while r1 == target {
            r1 = rng.gen_range(0..size);
        }
        let mut r2 = rng.gen_range(0..size);
        while r2 == target || r2 == r1 {
            r2 = rng.gen_range(0..size);
        }
        (r1, r2)
    }

    fn make_trial(
        &self,
        target: usize,
        best: usize,
        scale: f64,
        population: &[Vec<f64>],
        bounds: &[(f64, f64)],
        rng: &mut StdRng,
    ) -> Vec<f64> {
        let n = bounds.len();
        let (r1, r2) = self.pick_donors(target, population.len(), rng);
        let forced = rng.gen_range(0..n);

        let mut trial = population[target].clone();
        for i in 0..n {
            if i == forced || rng.r#gen::<f64>() < self.crossover {
                let (min, max) = bounds[i];
                let mut value =
                    population[best][i] + scale * (population[r1][i] - population[r2][i]);
                // Components leaving the box are re-drawn uniformly inside it
                if !(value >= min && value <= max) {
                    value = min + rng.r#gen::<f64>() * (max - min);
                }
                trial[i] = value.clamp(min, max);
            }
        }
        trial
    }

    fn evaluate_population(&self, problem: &dyn Problem, members: &[Vec<f64>]) -> Result<Vec<f64>> {
        if self.parallel {
            members.par_iter().map(|member| problem.cost(member)).collect()
        } else {
            members.iter().map(|member| problem.cost(member)).collect()
        }
    }

    fn polish(&mut self, problem: &dyn Problem, result: &mut SolverResult) {
        let Some(polisher) = self.polisher.as_mut() else {
            return;
        };

        match polisher.minimize(problem, &result.params, &mut NoopCallback) {
            Ok(polished) => {
                result.cost_evals += polished.cost_evals;
                result.grad_evals += polished.grad_evals;
                if polished.cost < result.cost {
                    log::debug!(
                        "DE polish improved cost {:.6e} -> {:.6e}",
                        result.cost,
                        polished.cost
                    );
                    result.cost = polished.cost;
                    result.params = polished.params;
                }
            }
            Err(e) => log::warn!("DE polish failed, keeping population best: {}", e),
        }
    }
}

fn best_index(costs: &[f64]) -> usize {
    costs
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Population spread relative to its mean cost
fn spread(costs: &[f64]) -> (f64, f64) {
    let n = costs.len() as f64;
    let mean = costs.iter().sum::<f64>() / n;
    let variance = costs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

impl GlobalOptimizer for DifferentialEvolution {
    fn name(&self) -> &str {
        "DifferentialEvolution"
    }

    fn minimize(
        &mut self,
        problem: &dyn Problem,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<SolverResult> {
        self.check_settings()?;
        let n = problem.num_params();
        let bounds = problem.bounds();
        if n == 0 || bounds.len() != n {
            return Err(FitError::invalid(format!(
                "problem declares {} parameters and {} bounds",
                n,
                bounds.len()
            )));
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let size = self.population_size(n);
        let mut population = self.initialize_population(size, bounds, &mut rng);
        let mut costs = self.evaluate_population(problem, &population)?;
        let mut cost_evals = size;

        let mut outcome: Option<(bool, u32, &str)> = None;

        for generation in 0..self.max_generations {
            let best = best_index(&costs);
            let (lo, hi) = self.mutation;
            let scale = if hi > lo { rng.gen_range(lo..hi) } else { lo };

            // Trials are generated serially so the RNG stream is fixed
            let trials: Vec<Vec<f64>> = (0..size)
                .map(|target| self.make_trial(target, best, scale, &population, bounds, &mut rng))
                .collect();
            let trial_costs = self.evaluate_population(problem, &trials)?;
            cost_evals += size;

            for (k, (trial, trial_cost)) in trials.into_iter().zip(trial_costs).enumerate() {
                if trial_cost <= costs[k] {
                    population[k] = trial;
                    costs[k] = trial_cost;
                }
            }

            let best = best_index(&costs);
            callback.on_iteration(generation + 1, &population[best], costs[best])?;

            if callback.should_stop() {
                outcome = Some((false, generation + 1, "Stopped by callback"));
                break;
            }

            let (mean, std) = spread(&costs);
            if std <= self.abs_tolerance + self.tolerance * mean.abs() {
                outcome = Some((true, generation + 1, "Converged"));
                break;
            }
        }

        let (success, iterations, message) =
            outcome.unwrap_or((false, self.max_generations, "Max iterations reached"));

        let best = best_index(&costs);
        let mut result = SolverResult {
            success,
            cost: costs[best],
            iterations,
            message: message.into(),
            params: population.swap_remove(best),
            cost_evals,
            grad_evals: 0,
        };

        self.polish(problem, &mut result);
        Ok(result)
    }
}
