use crate::core::{FitError, Result};
use crate::optimization::{DifferentialEvolution, LbfgsRefiner};
use serde::{Deserialize, Serialize};

/// Stage 1: differential evolution settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSearchConfig {
    /// Population members per parameter
    pub population_size: usize,
    pub max_generations: u32,
    /// Relative tolerance on the spread of population costs
    pub tolerance: f64,
    pub abs_tolerance: f64,
    /// Dithering range of the mutation factor F
    pub mutation: (f64, f64),
    /// Binomial crossover probability CR
    pub crossover: f64,
    /// Refine the population best with L-BFGS before handing over
    pub polish: bool,
    /// Fixed seed for reproducible runs; entropy when unset
    pub seed: Option<u64>,
    /// Evaluate each generation on the rayon thread pool
    pub parallel: bool,
}

impl Default for GlobalSearchConfig {
    fn default() -> Self {
        Self {
            population_size: 25,
            max_generations: 3000,
            tolerance: 1e-8,
            abs_tolerance: 0.0,
            mutation: (0.5, 1.0),
            crossover: 0.7,
            polish: true,
            seed: None,
            parallel: true,
        }
    }
}

/// Stage 2: L-BFGS refinement settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSearchConfig {
    pub max_iterations: u64,
    /// Stop when the cost changes by less than this between iterations
    pub cost_tolerance: f64,
    pub gradient_tolerance: f64,
    /// L-BFGS history length
    pub memory: usize,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            cost_tolerance: 1e-12,
            gradient_tolerance: 1e-10,
            memory: 10,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub global: GlobalSearchConfig,
    pub local: LocalSearchConfig,
}

impl FitConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FitError::invalid(format!("bad fit configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FitError::invalid(format!("cannot serialize configuration: {}", e)))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.global.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let g = &self.global;
        if g.population_size == 0 {
            return Err(FitError::invalid("population size must be positive"));
        }
        if g.max_generations == 0 {
            return Err(FitError::invalid("max generations must be positive"));
        }
        if !(g.tolerance >= 0.0) || !(g.abs_tolerance >= 0.0) {
            return Err(FitError::invalid("global tolerances must be non-negative"));
        }
        if !(g.mutation.0 >= 0.0 && g.mutation.0 <= g.mutation.1 && g.mutation.1 <= 2.0) {
            return Err(FitError::invalid(format!(
                "mutation range must satisfy 0 <= lo <= hi <= 2, got {:?}",
                g.mutation
            )));
        }
        if !(0.0..=1.0).contains(&g.crossover) {
            return Err(FitError::invalid(format!(
                "crossover probability must be in [0, 1], got {}",
                g.crossover
            )));
        }

        let l = &self.local;
        if l.max_iterations == 0 {
            return Err(FitError::invalid("local max iterations must be positive"));
        }
        if !(l.cost_tolerance >= 0.0) || !(l.gradient_tolerance >= 0.0) {
            return Err(FitError::invalid("local tolerances must be non-negative"));
        }
        if l.memory == 0 {
            return Err(FitError::invalid("L-BFGS memory must be positive"));
        }
        Ok(())
    }

    pub fn local_optimizer(&self) -> LbfgsRefiner {
        LbfgsRefiner::new(self.local.max_iterations, self.local.cost_tolerance)
            .with_grad_tolerance(self.local.gradient_tolerance)
            .with_memory(self.local.memory)
    }

    pub fn global_optimizer(&self) -> DifferentialEvolution {
        let g = &self.global;
        let de = DifferentialEvolution::new(g.max_generations, g.tolerance)
            .with_abs_tolerance(g.abs_tolerance)
            .with_population_factor(g.population_size)
            .with_de_params(g.mutation, g.crossover)
            .with_seed(g.seed)
            .with_parallel(g.parallel);
        if g.polish {
            de.with_polish(self.local_optimizer())
        } else {
            de
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.global.population_size, 25);
        assert_eq!(config.global.max_generations, 3000);
        assert_eq!(config.local.max_iterations, 5000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            FitConfig::from_json(r#"{"global": {"seed": 42, "max_generations": 100}}"#).unwrap();
        assert_eq!(config.global.seed, Some(42));
        assert_eq!(config.global.max_generations, 100);
        assert_eq!(config.global.crossover, 0.7);
        assert_eq!(config.local, LocalSearchConfig::default());
    }

    #[test]
    fn json_round_trip_preserves_config() {
        let config = FitConfig::default().with_seed(9);
        let back = FitConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(FitConfig::from_json(r#"{"global": {"crossover": 1.5}}"#).is_err());
        assert!(FitConfig::from_json(r#"{"local": {"memory": 0}}"#).is_err());
        assert!(FitConfig::from_json("not json").is_err());
    }
}
