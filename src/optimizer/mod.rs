mod config;
mod report;

pub use config::{FitConfig, GlobalSearchConfig, LocalSearchConfig};
pub use report::{percent_errors, FitResult, FitWarning, PointRow, PowerPoint, StageSummary};

use crate::core::*;
use crate::optimization::{
    FitProgressCallback, GlobalOptimizer, LocalOptimizer, PolarizationProblem, SolverResult,
    DOMAIN_PENALTY,
};

/// Two-stage polarization curve fit: global search, then local refinement
#[derive(Clone, Debug, Default)]
pub struct PolarizationFitter {
    config: FitConfig,
}

impl PolarizationFitter {
    pub fn new(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn fit(
        &self,
        samples: &SampleSet,
        bounds: &Bounds,
        constants: &Constants,
    ) -> Result<FitResult> {
        let mut callback = FitProgressCallback::new();
        self.fit_with_callback(samples, bounds, constants, &mut callback)
    }

    /// Run the fit, reporting every iteration of both stages to `callback`
    pub fn fit_with_callback(
        &self,
        samples: &SampleSet,
        bounds: &Bounds,
        constants: &Constants,
        callback: &mut FitProgressCallback,
    ) -> Result<FitResult> {
        self.config.validate()?;
        let problem = PolarizationProblem::new(samples.clone(), bounds.clone(), *constants)?;

        problem.check_domain()?;
        log::info!("fitting {} samples over {} parameters", samples.len(), bounds.len());

        let mut warnings = Vec::new();

        // Stage 1
        callback.begin_stage("global");
        let mut global = self.config.global_optimizer();
        let stage1 = global.minimize(&problem, callback)?;
        log_stage(global.name(), &stage1);

        if !stage1.success {
            warnings.push(FitWarning::GlobalNotConverged {
                iterations: stage1.iterations,
                message: stage1.message.clone(),
            });
        }
        if is_degenerate(stage1.cost) {
            warnings.push(FitWarning::DegenerateObjective { cost: stage1.cost });
        }

        // Stage 2
        callback.begin_stage("local");
        let mut local = self.config.local_optimizer();
        let stage2 = local.minimize(&problem, &stage1.params, callback)?;
        log_stage(local.name(), &stage2);

        if !stage2.success {
            warnings.push(FitWarning::LocalNotConverged {
                iterations: stage2.iterations,
                message: stage2.message.clone(),
            });
        }

        for warning in &warnings {
            log::warn!("{}", warning);
        }

        let parameters = ParameterVector::from_slice(&stage2.params)?;
        let result = FitResult::compute(
            samples,
            constants,
            parameters,
            StageSummary::new(global.name(), &stage1),
            StageSummary::new(local.name(), &stage2),
            warnings,
        )?;

        log::info!(
            "fit finished: cost = {:.6e}, mean error = {:.4}%",
            result.cost,
            result.mean_percent_error
        );
        Ok(result)
    }
}

fn is_degenerate(cost: f64) -> bool {
    !cost.is_finite() || cost >= DOMAIN_PENALTY
}

fn log_stage(name: &str, result: &SolverResult) {
    log::info!(
        "{} finished: success = {}, cost = {:.6e}, iterations = {}, evals = {}/{} ({})",
        name,
        result.success,
        result.cost,
        result.iterations,
        result.cost_evals,
        result.grad_evals,
        result.message
    );
}

/// Fit with the default configuration
pub fn fit(samples: &SampleSet, bounds: &Bounds, constants: &Constants) -> Result<FitResult> {
    PolarizationFitter::default().fit(samples, bounds, constants)
}
