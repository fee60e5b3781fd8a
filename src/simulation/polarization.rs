//! Semi-empirical polarization model of a PEM fuel-cell stack.
//!
//! The cell voltage is the Nernst potential minus three loss magnitudes:
//!
//! ```text
//! v_nernst   = 1.229 - 8.5e-4 (T - 298.15) + 4.3085e-5 T (ln pH2 + 0.5 ln pO2)
//! c_o2       = pO2 / (5.08e6 exp(-498 / T))
//! activation = -(x1 + x2 T + x3 T ln c_o2 + x4 T ln(I + 1e-6))
//! ohmic      = Rint I
//! conc       = m exp(n I)
//! v_stack    = N (v_nernst - activation - ohmic - conc)
//! ```
//!
//! The bracketed activation term is the (negative) Amphlett overpotential, so
//! its loss magnitude is the negation. Every evaluation is a pure function of
//! its inputs.

use crate::core::{Constants, FitError, ParameterVector, Result};

/// Offset keeping `ln(I)` finite at zero current
pub const CURRENT_EPSILON: f64 = 1e-6;

/// Henry's-law constant for oxygen dissolution at the cathode interface
const HENRY_O2: f64 = 5.08e6;
const HENRY_O2_EXPONENT: f64 = -498.0;

const REVERSIBLE_POTENTIAL: f64 = 1.229;
const REFERENCE_TEMPERATURE: f64 = 298.15;
const ENTROPY_SLOPE: f64 = 8.5e-4;
const NERNST_SLOPE: f64 = 4.3085e-5;

/// Per-cell voltage terms at one operating point
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossBreakdown {
    pub nernst: f64,
    pub activation: f64,
    pub ohmic: f64,
    pub concentration: f64,
}

impl LossBreakdown {
    pub fn cell_voltage(&self) -> f64 {
        self.nernst - self.activation - self.ohmic - self.concentration
    }
}

/// Open-circuit (Nernst) potential of one cell
pub fn nernst_potential(temperature: f64, constants: &Constants) -> f64 {
    REVERSIBLE_POTENTIAL - ENTROPY_SLOPE * (temperature - REFERENCE_TEMPERATURE)
        + NERNST_SLOPE * temperature * (constants.p_h2.ln() + 0.5 * constants.p_o2.ln())
}

/// Oxygen concentration at the catalyst interface
fn oxygen_concentration(temperature: f64, constants: &Constants) -> f64 {
    constants.p_o2 / (HENRY_O2 * (HENRY_O2_EXPONENT / temperature).exp())
}

/// Logarithm arguments that depend only on the operating point
struct OperatingPoint {
    c_o2: f64,
    shifted_current: f64,
}

fn operating_point(
    index: usize,
    current: f64,
    temperature: f64,
    constants: &Constants,
) -> Result<OperatingPoint> {
    if !(constants.p_h2 > 0.0) || !(constants.p_o2 > 0.0) {
        return Err(FitError::domain(
            index,
            format!(
                "partial pressures must be positive (pH2={}, pO2={})",
                constants.p_h2, constants.p_o2
            ),
        ));
    }

    let c_o2 = oxygen_concentration(temperature, constants);
    if !(c_o2 > 0.0) || !c_o2.is_finite() {
        return Err(FitError::domain(
            index,
            format!(
                "oxygen concentration {} at T={} K is not a positive number",
                c_o2, temperature
            ),
        ));
    }

    let shifted_current = current + CURRENT_EPSILON;
    if !(shifted_current > 0.0) || !shifted_current.is_finite() {
        return Err(FitError::domain(
            index,
            format!("current {} A is below the logarithm guard", current),
        ));
    }

    Ok(OperatingPoint {
        c_o2,
        shifted_current,
    })
}

/// Check every logarithm argument of the model for a set of operating points.
///
/// Only samples and constants enter these arguments, so a failure here means
/// no parameter vector can be evaluated. Overflow of `exp(n I)` depends on the
/// parameters and is not checked.
pub fn check_domain(current: &[f64], temperature: &[f64], constants: &Constants) -> Result<()> {
    if current.len() != temperature.len() {
        return Err(FitError::invalid(format!(
            "current and temperature lengths differ: {} vs {}",
            current.len(),
            temperature.len()
        )));
    }
    for (i, (&c, &t)) in current.iter().zip(temperature).enumerate() {
        operating_point(i, c, t, constants)?;
    }
    Ok(())
}

/// Evaluate the loss terms for sample `index`.
///
/// Fails with [`FitError::DomainError`] when a logarithm argument is not a
/// positive finite number.
pub fn loss_breakdown(
    index: usize,
    current: f64,
    temperature: f64,
    params: &ParameterVector,
    constants: &Constants,
) -> Result<LossBreakdown> {
    let OperatingPoint {
        c_o2,
        shifted_current,
    } = operating_point(index, current, temperature, constants)?;

    let overpotential = params.x1
        + params.x2 * temperature
        + params.x3 * temperature * c_o2.ln()
        + params.x4 * temperature * shifted_current.ln();

    Ok(LossBreakdown {
        nernst: nernst_potential(temperature, constants),
        activation: -overpotential,
        ohmic: params.r_int * current,
        concentration: params.m * (params.n * current).exp(),
    })
}

/// Stack voltage for one operating point
pub fn evaluate_point(
    current: f64,
    temperature: f64,
    params: &ParameterVector,
    constants: &Constants,
) -> Result<f64> {
    stack_voltage(0, current, temperature, params, constants)
}

fn stack_voltage(
    index: usize,
    current: f64,
    temperature: f64,
    params: &ParameterVector,
    constants: &Constants,
) -> Result<f64> {
    let losses = loss_breakdown(index, current, temperature, params, constants)?;
    let voltage = f64::from(constants.n_cells) * losses.cell_voltage();
    if !voltage.is_finite() {
        return Err(FitError::domain(
            index,
            format!("model voltage is not finite at I={} A, T={} K", current, temperature),
        ));
    }
    Ok(voltage)
}

/// Predicted stack voltage for every (current, temperature) pair
pub fn evaluate(
    current: &[f64],
    temperature: &[f64],
    params: &ParameterVector,
    constants: &Constants,
) -> Result<Vec<f64>> {
    if current.len() != temperature.len() {
        return Err(FitError::invalid(format!(
            "current and temperature lengths differ: {} vs {}",
            current.len(),
            temperature.len()
        )));
    }

    current
        .iter()
        .zip(temperature)
        .enumerate()
        .map(|(i, (&c, &t))| stack_voltage(i, c, t, params, constants))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Bounds, SampleSet};
    use proptest::prelude::*;

    fn mid_params() -> ParameterVector {
        ParameterVector::from_slice(&Bounds::reference().center()).unwrap()
    }

    #[test]
    fn nernst_potential_at_reference_conditions() {
        let constants = Constants::default();
        let e = nernst_potential(306.55, &constants);
        // ln(0.65) + 0.5 ln(0.21) ≈ -1.2111
        let expected = 1.229 - 8.5e-4 * 8.4 + 4.3085e-5 * 306.55 * -1.211_107;
        assert!((e - expected).abs() < 1e-6, "got {}", e);
    }

    #[test]
    fn stack_voltage_scales_with_cell_count() {
        let params = mid_params();
        let one = Constants::new(0.65, 0.21, 1).unwrap();
        let sixty = Constants::default();
        let v1 = evaluate_point(20.0, 320.0, &params, &one).unwrap();
        let v60 = evaluate_point(20.0, 320.0, &params, &sixty).unwrap();
        assert!((v60 - 60.0 * v1).abs() < 1e-9);
    }

    #[test]
    fn breakdown_matches_voltage() {
        let params = mid_params();
        let constants = Constants::default();
        let losses = loss_breakdown(0, 35.4, 322.45, &params, &constants).unwrap();
        let v = evaluate_point(35.4, 322.45, &params, &constants).unwrap();
        assert!((v - 60.0 * losses.cell_voltage()).abs() < 1e-9);
        assert!(losses.activation > 0.0, "activation loss should be positive in the reference box");
        assert!((losses.ohmic - params.r_int * 35.4).abs() < 1e-15);
    }

    #[test]
    fn zero_current_is_finite() {
        let v = evaluate_point(0.0, 320.0, &mid_params(), &Constants::default()).unwrap();
        assert!(v.is_finite());
    }

    #[test]
    fn negative_current_below_guard_is_domain_error() {
        let err = evaluate_point(-1.0, 320.0, &mid_params(), &Constants::default()).unwrap_err();
        assert!(err.is_domain_error());
    }

    #[test]
    fn non_positive_pressure_is_domain_error() {
        let constants = Constants {
            p_h2: 0.65,
            p_o2: 0.0,
            n_cells: 60,
        };
        let err = evaluate_point(10.0, 320.0, &mid_params(), &constants).unwrap_err();
        assert!(err.is_domain_error());
    }

    #[test]
    fn concentration_overflow_is_domain_error() {
        let mut params = mid_params();
        params.n = 10.0;
        let err = evaluate_point(1.0e3, 320.0, &params, &Constants::default()).unwrap_err();
        assert_eq!(
            err,
            FitError::domain(0, "model voltage is not finite at I=1000 A, T=320 K")
        );
    }

    #[test]
    fn domain_error_reports_sample_index() {
        let err = evaluate(&[10.0, -5.0], &[320.0, 320.0], &mid_params(), &Constants::default())
            .unwrap_err();
        assert!(matches!(err, FitError::DomainError { index: 1, .. }));
    }

    #[test]
    fn domain_check_ignores_parameter_overflow() {
        let constants = Constants::default();
        assert!(check_domain(&[68.1, 0.0], &[330.45, 300.0], &constants).is_ok());

        let mut params = mid_params();
        params.n = 25.0;
        assert!(evaluate_point(68.1, 330.45, &params, &constants).is_err());
    }

    #[test]
    fn domain_check_flags_bad_operating_point() {
        let err = check_domain(&[10.0, -2.0], &[320.0, 320.0], &Constants::default()).unwrap_err();
        assert!(matches!(err, FitError::DomainError { index: 1, .. }));
    }

    #[test]
    fn mismatched_lengths_are_invalid_input() {
        let err = evaluate(&[10.0], &[], &mid_params(), &Constants::default()).unwrap_err();
        assert!(matches!(err, FitError::InvalidInput(_)));
    }

    #[test]
    fn evaluation_is_bit_identical_across_calls() {
        let samples = SampleSet::reference();
        let params = mid_params();
        let constants = Constants::default();
        let a = evaluate(samples.current(), samples.temperature(), &params, &constants).unwrap();
        let b = evaluate(samples.current(), samples.temperature(), &params, &constants).unwrap();
        let a_bits: Vec<u64> = a.iter().map(|v| v.to_bits()).collect();
        let b_bits: Vec<u64> = b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(a_bits, b_bits);
    }

    fn params_in_reference_box() -> impl Strategy<Value = ParameterVector> {
        let b = Bounds::reference();
        let s = b.as_slice();
        (
            s[0].0..=s[0].1,
            s[1].0..=s[1].1,
            s[2].0..=s[2].1,
            s[3].0..=s[3].1,
            s[4].0..=s[4].1,
            s[5].0..=s[5].1,
            s[6].0..=s[6].1,
        )
            .prop_map(|(x1, x2, x3, x4, r_int, m, n)| ParameterVector {
                x1,
                x2,
                x3,
                x4,
                r_int,
                m,
                n,
            })
    }

    proptest! {
        #[test]
        fn voltage_is_finite_inside_reference_box(
            params in params_in_reference_box(),
            current in -0.9e-6f64..200.0,
            temperature in 273.15f64..373.15,
            p_h2 in 1e-3f64..=1.0,
            p_o2 in 1e-3f64..=1.0,
        ) {
            let constants = Constants::new(p_h2, p_o2, 60).unwrap();
            let v = evaluate_point(current, temperature, &params, &constants).unwrap();
            prop_assert!(v.is_finite());
        }

        #[test]
        fn larger_resistance_lowers_voltage(
            params in params_in_reference_box(),
            current in 0.1f64..100.0,
            temperature in 290.0f64..350.0,
            delta in 1e-5f64..1e-3,
        ) {
            let constants = Constants::default();
            let mut higher = params;
            higher.r_int += delta;
            let v_low_r = evaluate_point(current, temperature, &params, &constants).unwrap();
            let v_high_r = evaluate_point(current, temperature, &higher, &constants).unwrap();
            prop_assert!(v_high_r < v_low_r);
        }
    }
}
