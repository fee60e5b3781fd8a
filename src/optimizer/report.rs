//! Post-processing of a finished fit.
//!
//! Everything here is derived once from the final parameters and never
//! mutated afterwards. Rendering (tables, plots) is left to the caller.

use crate::core::*;
use crate::optimization::{SolverResult, DOMAIN_PENALTY};
use crate::simulation::evaluate_point;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condensed record of one optimization stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub solver: String,
    pub success: bool,
    pub cost: f64,
    pub iterations: u32,
    pub message: String,
    pub cost_evals: usize,
    pub grad_evals: usize,
}

impl StageSummary {
    pub fn new(solver: &str, result: &SolverResult) -> Self {
        Self {
            solver: solver.to_string(),
            success: result.success,
            cost: result.cost,
            iterations: result.iterations,
            message: result.message.clone(),
            cost_evals: result.cost_evals,
            grad_evals: result.grad_evals,
        }
    }
}

/// Conditions worth reporting that did not abort the fit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FitWarning {
    /// Global search hit its generation cap before the population converged
    GlobalNotConverged { iterations: u32, message: String },
    /// Local refinement stopped without meeting its tolerances
    LocalNotConverged { iterations: u32, message: String },
    /// Global search ended on a penalized or non-finite objective value
    DegenerateObjective { cost: f64 },
}

impl fmt::Display for FitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalNotConverged {
                iterations,
                message,
            } => write!(
                f,
                "global search did not converge after {} generations: {}",
                iterations, message
            ),
            Self::LocalNotConverged {
                iterations,
                message,
            } => write!(
                f,
                "local refinement did not converge after {} iterations: {}",
                iterations, message
            ),
            Self::DegenerateObjective { cost } => {
                write!(f, "global search returned a degenerate objective ({:e})", cost)
            }
        }
    }
}

/// One row of the point-by-point comparison
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointRow {
    pub current: f64,
    pub temperature: f64,
    pub voltage_ref: f64,
    pub voltage_fit: f64,
    pub percent_error: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerPoint {
    pub current: f64,
    pub power: f64,
}

/// Final parameters with fit diagnostics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub parameters: ParameterVector,
    /// Sum of squared voltage residuals at `parameters`, or the domain
    /// penalty when the model is undefined at any sample
    pub cost: f64,
    /// NaN where the model is undefined at the final parameters
    pub voltage_fit: Vec<f64>,
    pub percent_error: Vec<f64>,
    pub mean_percent_error: f64,
    /// Electrical power `voltage_fit * current`, watts
    pub power: Vec<f64>,
    pub samples: SampleSet,
    pub constants: Constants,
    pub global: StageSummary,
    pub local: StageSummary,
    pub warnings: Vec<FitWarning>,
}

impl FitResult {
    /// Evaluate the model at the final parameters and derive error metrics.
    ///
    /// Samples where the model is out of its domain are kept as NaN rows so
    /// a degenerate fit can still be reported.
    pub fn compute(
        samples: &SampleSet,
        constants: &Constants,
        parameters: ParameterVector,
        global: StageSummary,
        local: StageSummary,
        warnings: Vec<FitWarning>,
    ) -> Result<Self> {
        let voltage_fit = samples
            .current()
            .iter()
            .zip(samples.temperature())
            .map(|(&i, &t)| match evaluate_point(i, t, &parameters, constants) {
                Err(e) if e.is_domain_error() => Ok(f64::NAN),
                other => other,
            })
            .collect::<Result<Vec<f64>>>()?;

        let percent_error = percent_errors(samples.voltage_ref(), &voltage_fit);
        let mean_percent_error = percent_error.iter().sum::<f64>() / percent_error.len() as f64;
        let cost = if voltage_fit.iter().all(|v| v.is_finite()) {
            samples
                .voltage_ref()
                .iter()
                .zip(&voltage_fit)
                .map(|(r, v)| (r - v).powi(2))
                .sum()
        } else {
            DOMAIN_PENALTY
        };
        let power = voltage_fit
            .iter()
            .zip(samples.current())
            .map(|(v, i)| v * i)
            .collect();

        Ok(Self {
            parameters,
            cost,
            voltage_fit,
            percent_error,
            mean_percent_error,
            power,
            samples: samples.clone(),
            constants: *constants,
            global,
            local,
            warnings,
        })
    }

    /// Parameters keyed by name, in display order
    pub fn named_parameters(&self) -> IndexMap<&'static str, f64> {
        PARAMETER_NAMES
            .iter()
            .copied()
            .zip(self.parameters.to_array())
            .collect()
    }

    pub fn point_table(&self) -> Vec<PointRow> {
        (0..self.samples.len())
            .map(|i| PointRow {
                current: self.samples.current()[i],
                temperature: self.samples.temperature()[i],
                voltage_ref: self.samples.voltage_ref()[i],
                voltage_fit: self.voltage_fit[i],
                percent_error: self.percent_error[i],
            })
            .collect()
    }

    pub fn power_curve(&self) -> Vec<PowerPoint> {
        self.samples
            .current()
            .iter()
            .zip(&self.power)
            .map(|(&current, &power)| PowerPoint { current, power })
            .collect()
    }

    /// True when neither stage reported non-convergence or degeneracy
    pub fn is_converged(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| FitError::invalid(format!("cannot serialize fit result: {}", e)))
    }
}

/// `|ref - fit| / |ref| * 100` per point
pub fn percent_errors(reference: &[f64], fitted: &[f64]) -> Vec<f64> {
    reference
        .iter()
        .zip(fitted)
        .map(|(r, v)| ((r - v) / r).abs() * 100.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(cost: f64) -> StageSummary {
        StageSummary {
            solver: "test".into(),
            success: true,
            cost,
            iterations: 1,
            message: "Converged".into(),
            cost_evals: 1,
            grad_evals: 0,
        }
    }

    #[test]
    fn percent_error_is_relative_to_reference() {
        let errors = percent_errors(&[50.0, -20.0], &[49.0, -21.0]);
        assert!((errors[0] - 2.0).abs() < 1e-12);
        assert!((errors[1] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn derived_tables_align_with_samples() {
        let samples = SampleSet::reference();
        let constants = Constants::default();
        let params = ParameterVector::from_slice(&Bounds::reference().center()).unwrap();
        let result =
            FitResult::compute(&samples, &constants, params, summary(1.0), summary(1.0), vec![])
                .unwrap();

        let table = result.point_table();
        assert_eq!(table.len(), samples.len());
        for (row, power) in table.iter().zip(result.power_curve()) {
            assert_eq!(row.current, power.current);
            assert!((power.power - row.voltage_fit * row.current).abs() < 1e-9);
        }
        let mean = result.percent_error.iter().sum::<f64>() / 5.0;
        assert!((result.mean_percent_error - mean).abs() < 1e-12);
        assert!(result.is_converged());
    }

    #[test]
    fn undefined_points_are_kept_as_nan_rows() {
        let mut params = ParameterVector::from_slice(&Bounds::reference().center()).unwrap();
        params.n = 25.0;
        let result = FitResult::compute(
            &SampleSet::reference(),
            &Constants::default(),
            params,
            summary(DOMAIN_PENALTY),
            summary(DOMAIN_PENALTY),
            vec![FitWarning::DegenerateObjective {
                cost: DOMAIN_PENALTY,
            }],
        )
        .unwrap();

        assert_eq!(result.cost, DOMAIN_PENALTY);
        assert!(result.voltage_fit[0].is_finite());
        assert!(result.voltage_fit[4].is_nan());
        assert!(result.point_table()[4].percent_error.is_nan());
    }

    #[test]
    fn named_parameters_follow_display_order() {
        let samples = SampleSet::reference();
        let params = ParameterVector::from_array([-1.0, 3e-3, 7e-5, -1.5e-4, 4e-4, 0.01, 0.05]);
        let result = FitResult::compute(
            &samples,
            &Constants::default(),
            params,
            summary(0.0),
            summary(0.0),
            vec![FitWarning::DegenerateObjective { cost: 1e10 }],
        )
        .unwrap();

        let names: Vec<&str> = result.named_parameters().keys().copied().collect();
        assert_eq!(names, vec!["x1", "x2", "x3", "x4", "Rint", "m", "n"]);
        assert_eq!(result.named_parameters()["Rint"], 4e-4);
        assert!(!result.is_converged());
    }
}
