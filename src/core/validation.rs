use super::error::{FitError, Result};
use super::types::{Bounds, Constants, SampleSet, PARAMETER_COUNT, PARAMETER_NAMES};

/// Check that every interval is finite and ordered (`min <= max`)
pub fn validate_bounds(intervals: &[(f64, f64)]) -> Result<()> {
    for (i, &(min, max)) in intervals.iter().enumerate() {
        let name = PARAMETER_NAMES.get(i).copied().unwrap_or("parameter");
        if !min.is_finite() || !max.is_finite() {
            return Err(FitError::invalid(format!(
                "bound {} ({}) is not finite: [{}, {}]",
                i, name, min, max
            )));
        }
        if min > max {
            return Err(FitError::invalid(format!(
                "bound {} ({}) has min > max: [{}, {}]",
                i, name, min, max
            )));
        }
    }
    Ok(())
}

/// Partial pressures must lie in (0, 1] and the stack needs at least one cell
pub fn validate_constants(constants: &Constants) -> Result<()> {
    for (name, value) in [("pH2", constants.p_h2), ("pO2", constants.p_o2)] {
        if !(value > 0.0 && value <= 1.0) {
            return Err(FitError::invalid(format!(
                "{} must be in (0, 1], got {}",
                name, value
            )));
        }
    }
    if constants.n_cells == 0 {
        return Err(FitError::invalid("cell count must be at least 1"));
    }
    Ok(())
}

/// Check sample alignment and the per-point physical ranges
pub fn validate_samples(samples: &SampleSet) -> Result<()> {
    let n = samples.current().len();
    if samples.temperature().len() != n || samples.voltage_ref().len() != n {
        return Err(FitError::invalid(format!(
            "sample sequences differ in length: current={}, temperature={}, voltage_ref={}",
            n,
            samples.temperature().len(),
            samples.voltage_ref().len()
        )));
    }
    if n == 0 {
        return Err(FitError::invalid("sample set is empty"));
    }

    for i in 0..n {
        let current = samples.current()[i];
        let temperature = samples.temperature()[i];
        let voltage = samples.voltage_ref()[i];

        if !current.is_finite() || !temperature.is_finite() || !voltage.is_finite() {
            return Err(FitError::invalid(format!("sample {} has a non-finite value", i)));
        }
        if temperature <= 0.0 {
            return Err(FitError::invalid(format!(
                "sample {} temperature must be positive, got {} K",
                i, temperature
            )));
        }
        // Percent error divides by the reference voltage
        if voltage == 0.0 {
            return Err(FitError::invalid(format!(
                "sample {} has a zero reference voltage",
                i
            )));
        }
    }
    Ok(())
}

/// Validate everything a fit needs before any optimizer iteration runs
pub fn validate_fit_inputs(
    samples: &SampleSet,
    bounds: &Bounds,
    constants: &Constants,
) -> Result<()> {
    validate_samples(samples)?;
    if bounds.len() != PARAMETER_COUNT {
        return Err(FitError::invalid(format!(
            "expected {} bounds ({}), got {}",
            PARAMETER_COUNT,
            PARAMETER_NAMES.join(", "),
            bounds.len()
        )));
    }
    validate_bounds(bounds.as_slice())?;
    validate_constants(constants)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_inputs_pass() {
        let result = validate_fit_inputs(
            &SampleSet::reference(),
            &Bounds::reference(),
            &Constants::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn wrong_bound_count_is_rejected() {
        let bounds = Bounds::new(vec![(0.0, 1.0); 3]).unwrap();
        let err = validate_fit_inputs(&SampleSet::reference(), &bounds, &Constants::default())
            .unwrap_err();
        assert!(matches!(err, FitError::InvalidInput(_)));
    }

    #[test]
    fn non_finite_bound_is_rejected() {
        assert!(validate_bounds(&[(0.0, f64::INFINITY)]).is_err());
        assert!(validate_bounds(&[(f64::NAN, 1.0)]).is_err());
    }

    #[test]
    fn empty_samples_are_rejected() {
        let err = SampleSet::new(vec![], vec![], vec![]).unwrap_err();
        assert_eq!(err, FitError::invalid("sample set is empty"));
    }

    #[test]
    fn non_positive_temperature_is_rejected() {
        assert!(SampleSet::new(vec![10.0], vec![0.0], vec![50.0]).is_err());
    }

    #[test]
    fn zero_reference_voltage_is_rejected() {
        assert!(SampleSet::new(vec![10.0], vec![300.0], vec![0.0]).is_err());
    }
}
