use crate::core::*;
use crate::optimization::solvers::traits::Problem;
use crate::simulation::{check_domain, evaluate};

/// Objective value returned for parameter vectors outside the model's domain.
///
/// Large enough to lose against any physical fit, finite so population
/// statistics and line searches stay well defined.
pub const DOMAIN_PENALTY: f64 = 1e10;

/// Sum-of-squared-residuals fitting problem for one sample set
#[derive(Clone, Debug)]
pub struct PolarizationProblem {
    samples: SampleSet,
    bounds: Bounds,
    constants: Constants,
}

impl PolarizationProblem {
    pub fn new(samples: SampleSet, bounds: Bounds, constants: Constants) -> Result<Self> {
        validate_fit_inputs(&samples, &bounds, &constants)?;
        Ok(Self {
            samples,
            bounds,
            constants,
        })
    }

    pub fn samples(&self) -> &SampleSet {
        &self.samples
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    pub fn search_bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Predicted stack voltage at every sample
    pub fn predict(&self, params: &ParameterVector) -> Result<Vec<f64>> {
        evaluate(
            self.samples.current(),
            self.samples.temperature(),
            params,
            &self.constants,
        )
    }

    /// Strict objective: domain errors propagate instead of being penalized
    pub fn residual_sum_of_squares(&self, params: &[f64]) -> Result<f64> {
        let params = ParameterVector::from_slice(params)?;
        let predicted = self.predict(&params)?;
        Ok(self
            .samples
            .voltage_ref()
            .iter()
            .zip(&predicted)
            .map(|(reference, fit)| (reference - fit).powi(2))
            .sum())
    }

    /// Fail fast when a sample puts a logarithm argument out of range.
    ///
    /// Parameter-dependent failures are left to the penalty in [`Problem::cost`].
    pub fn check_domain(&self) -> Result<()> {
        check_domain(
            self.samples.current(),
            self.samples.temperature(),
            &self.constants,
        )
    }
}

impl Problem for PolarizationProblem {
    fn cost(&self, params: &[f64]) -> Result<f64> {
        match self.residual_sum_of_squares(params) {
            Ok(sse) if sse.is_finite() => Ok(sse),
            Ok(_) => Ok(DOMAIN_PENALTY),
            Err(e) if e.is_domain_error() => {
                log::trace!("penalizing {:?}: {}", params, e);
                Ok(DOMAIN_PENALTY)
            }
            Err(e) => Err(e),
        }
    }

    fn num_params(&self) -> usize {
        PARAMETER_COUNT
    }

    fn bounds(&self) -> &[(f64, f64)] {
        self.bounds.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reference_problem() -> PolarizationProblem {
        PolarizationProblem::new(
            SampleSet::reference(),
            Bounds::reference(),
            Constants::default(),
        )
        .unwrap()
    }

    #[test]
    fn objective_is_zero_on_exact_fit() {
        let base = reference_problem();
        let params = ParameterVector::from_slice(&Bounds::reference().center()).unwrap();
        let synthetic = base.predict(&params).unwrap();

        let samples = SampleSet::new(
            base.samples().current().to_vec(),
            base.samples().temperature().to_vec(),
            synthetic,
        )
        .unwrap();
        let problem =
            PolarizationProblem::new(samples, Bounds::reference(), Constants::default()).unwrap();

        assert_eq!(problem.cost(&params.to_vec()).unwrap(), 0.0);
    }

    #[test]
    fn domain_error_becomes_penalty() {
        let problem = reference_problem();
        let mut params = Bounds::reference().center();
        params[6] = 50.0; // exp(n I) overflows at 68 A
        assert_eq!(problem.cost(&params).unwrap(), DOMAIN_PENALTY);
        assert!(problem.residual_sum_of_squares(&params).unwrap_err().is_domain_error());
    }

    #[test]
    fn wrong_parameter_count_is_not_penalized() {
        let problem = reference_problem();
        let err = problem.cost(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, FitError::InvalidInput(_)));
    }

    #[test]
    fn negative_current_fails_domain_check() {
        let samples = SampleSet::new(vec![-1.0], vec![320.0], vec![50.0]).unwrap();
        let problem =
            PolarizationProblem::new(samples, Bounds::reference(), Constants::default()).unwrap();
        assert!(problem.check_domain().unwrap_err().is_domain_error());
    }

    #[test]
    fn overflowing_box_centre_passes_domain_check() {
        let mut intervals = Bounds::reference().as_slice().to_vec();
        intervals[6] = (0.03, 25.0);
        let problem = PolarizationProblem::new(
            SampleSet::reference(),
            Bounds::new(intervals).unwrap(),
            Constants::default(),
        )
        .unwrap();

        assert!(problem.check_domain().is_ok());
        let centre = problem.search_bounds().center();
        assert_eq!(problem.cost(&centre).unwrap(), DOMAIN_PENALTY);
    }

    #[test]
    fn inverted_bounds_fail_before_construction() {
        let mut intervals = Bounds::reference().as_slice().to_vec();
        intervals[4] = (8e-4, 1e-4);
        assert!(Bounds::new(intervals).is_err());
    }

    proptest! {
        #[test]
        fn objective_is_non_negative(
            unit in proptest::collection::vec(0.0f64..=1.0, PARAMETER_COUNT),
        ) {
            let problem = reference_problem();
            let params: Vec<f64> = unit
                .iter()
                .zip(problem.bounds())
                .map(|(u, &(min, max))| min + u * (max - min))
                .collect();
            prop_assert!(problem.cost(&params).unwrap() >= 0.0);
        }
    }
}
