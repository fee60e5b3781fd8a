use super::solvers::traits::OptimizationCallback;
use crate::core::{Result, PARAMETER_NAMES};

/// Iteration result for tracking optimization progress
#[derive(Debug, Clone, PartialEq)]
pub struct IterationResult {
    pub stage: &'static str,
    pub iteration: u32,
    pub params: Vec<f64>,
    pub cost: f64,
}

/// Records per-iteration progress of a fit and forwards it to the `log` facade
pub struct FitProgressCallback {
    stage: &'static str,
    max_iterations: Option<u32>,
    iteration_count: u32,
    history: Vec<IterationResult>,
    log_every: u32,
}

impl FitProgressCallback {
    pub fn new() -> Self {
        Self {
            stage: "fit",
            max_iterations: None,
            iteration_count: 0,
            history: Vec::new(),
            log_every: 100,
        }
    }

    /// Stop the running stage after this many iterations
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Emit a debug record every `every` iterations (default: 100)
    pub fn with_log_every(mut self, every: u32) -> Self {
        self.log_every = every.max(1);
        self
    }

    /// Label subsequent iterations; resets the per-stage iteration counter
    pub fn begin_stage(&mut self, stage: &'static str) {
        self.stage = stage;
        self.iteration_count = 0;
    }

    /// Get iteration history
    pub fn history(&self) -> &[IterationResult] {
        &self.history
    }

    pub fn stage_history(&self, stage: &str) -> impl Iterator<Item = &IterationResult> + '_ {
        let stage = stage.to_string();
        self.history.iter().filter(move |r| r.stage == stage)
    }

    fn log_iteration(&self, iteration: u32, params: &[f64], cost: f64) {
        if iteration % self.log_every != 0 && iteration != 1 {
            return;
        }
        let rendered: Vec<String> = PARAMETER_NAMES
            .iter()
            .zip(params)
            .map(|(name, value)| format!("{}={:.6e}", name, value))
            .collect();
        log::debug!(
            "[{}] iter {:5}: cost = {:.6e} ({})",
            self.stage,
            iteration,
            cost,
            rendered.join(", ")
        );
    }
}

impl Default for FitProgressCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationCallback for FitProgressCallback {
    fn on_iteration(&mut self, iteration: u32, params: &[f64], cost: f64) -> Result<()> {
        self.iteration_count = iteration;

        self.history.push(IterationResult {
            stage: self.stage,
            iteration,
            params: params.to_vec(),
            cost,
        });

        self.log_iteration(iteration, params, cost);
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.max_iterations
            .is_some_and(|max| self.iteration_count >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_history_per_stage() {
        let mut callback = FitProgressCallback::new();
        callback.begin_stage("global");
        callback.on_iteration(1, &[1.0], 10.0).unwrap();
        callback.on_iteration(2, &[0.5], 5.0).unwrap();
        callback.begin_stage("local");
        callback.on_iteration(1, &[0.4], 4.0).unwrap();

        assert_eq!(callback.history().len(), 3);
        assert_eq!(callback.stage_history("global").count(), 2);
        let last = callback.stage_history("local").last().unwrap();
        assert_eq!(last.cost, 4.0);
    }

    #[test]
    fn stops_at_iteration_cap() {
        let mut callback = FitProgressCallback::new().with_max_iterations(2);
        callback.on_iteration(1, &[0.0], 1.0).unwrap();
        assert!(!callback.should_stop());
        callback.on_iteration(2, &[0.0], 1.0).unwrap();
        assert!(callback.should_stop());

        callback.begin_stage("local");
        assert!(!callback.should_stop());
    }
}
