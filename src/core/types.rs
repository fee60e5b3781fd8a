use super::error::{FitError, Result};
use super::validation::{validate_bounds, validate_constants, validate_samples};
use serde::{Deserialize, Serialize};

/// Number of fitted model parameters
pub const PARAMETER_COUNT: usize = 7;

/// Parameter names in the fixed vector order
pub const PARAMETER_NAMES: [&str; PARAMETER_COUNT] = ["x1", "x2", "x3", "x4", "Rint", "m", "n"];

/// Human-readable labels, same order as [`PARAMETER_NAMES`]
pub const PARAMETER_LABELS: [&str; PARAMETER_COUNT] = [
    "x1",
    "x2",
    "x3",
    "x4",
    "Internal resistance",
    "m",
    "n",
];

// ===== PARAMETERS =====

/// Semi-empirical polarization model parameters.
///
/// `x1..x4` shape the activation overpotential, `r_int` is the internal
/// resistance in ohms, `m` and `n` shape the exponential concentration loss.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    pub x1: f64,
    pub x2: f64,
    pub x3: f64,
    pub x4: f64,
    pub r_int: f64,
    pub m: f64,
    pub n: f64,
}

impl ParameterVector {
    pub fn from_array(values: [f64; PARAMETER_COUNT]) -> Self {
        let [x1, x2, x3, x4, r_int, m, n] = values;
        Self {
            x1,
            x2,
            x3,
            x4,
            r_int,
            m,
            n,
        }
    }

    /// Build from a solver's flat parameter slice
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        let array: [f64; PARAMETER_COUNT] = values.try_into().map_err(|_| {
            FitError::invalid(format!(
                "expected {} parameters, got {}",
                PARAMETER_COUNT,
                values.len()
            ))
        })?;
        Ok(Self::from_array(array))
    }

    pub fn to_array(&self) -> [f64; PARAMETER_COUNT] {
        [
            self.x1, self.x2, self.x3, self.x4, self.r_int, self.m, self.n,
        ]
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.to_array().to_vec()
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl From<[f64; PARAMETER_COUNT]> for ParameterVector {
    fn from(values: [f64; PARAMETER_COUNT]) -> Self {
        Self::from_array(values)
    }
}

// ===== BOUNDS =====

/// Closed search interval per parameter, in [`PARAMETER_NAMES`] order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    intervals: Vec<(f64, f64)>,
}

impl Bounds {
    pub fn new(intervals: Vec<(f64, f64)>) -> Result<Self> {
        validate_bounds(&intervals)?;
        Ok(Self { intervals })
    }

    /// Search box used for kilowatt-class PEM stacks
    pub fn reference() -> Self {
        Self {
            intervals: vec![
                (-1.2, -0.8),
                (1e-3, 5e-3),
                (3.6e-5, 9.8e-5),
                (-2.6e-4, -0.954e-4),
                (1e-4, 8e-4),
                (1.972e-4, 0.2),
                (0.03, 0.5002),
            ],
        }
    }

    pub fn as_slice(&self) -> &[(f64, f64)] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Midpoint of every interval
    pub fn center(&self) -> Vec<f64> {
        self.intervals
            .iter()
            .map(|&(min, max)| 0.5 * (min + max))
            .collect()
    }

    pub fn contains(&self, params: &[f64]) -> bool {
        params.len() == self.intervals.len()
            && params
                .iter()
                .zip(&self.intervals)
                .all(|(&v, &(min, max))| v >= min && v <= max)
    }
}

// ===== CONSTANTS =====

/// Operating constants shared by every model evaluation of a run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constants {
    /// Hydrogen partial pressure (dimensionless)
    pub p_h2: f64,
    /// Oxygen partial pressure (dimensionless)
    pub p_o2: f64,
    /// Cells in series
    pub n_cells: u32,
}

impl Constants {
    pub fn new(p_h2: f64, p_o2: f64, n_cells: u32) -> Result<Self> {
        let constants = Self {
            p_h2,
            p_o2,
            n_cells,
        };
        validate_constants(&constants)?;
        Ok(constants)
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            p_h2: 0.65,
            p_o2: 0.21,
            n_cells: 60,
        }
    }
}

// ===== SAMPLES =====

/// Measured polarization points, aligned by index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    current: Vec<f64>,
    temperature: Vec<f64>,
    voltage_ref: Vec<f64>,
}

impl SampleSet {
    pub fn new(current: Vec<f64>, temperature: Vec<f64>, voltage_ref: Vec<f64>) -> Result<Self> {
        let samples = Self {
            current,
            temperature,
            voltage_ref,
        };
        validate_samples(&samples)?;
        Ok(samples)
    }

    /// Five-point stack characterization used as a reference data set
    pub fn reference() -> Self {
        Self {
            current: vec![11.2, 22.6, 35.4, 49.9, 68.1],
            temperature: vec![306.55, 315.85, 322.45, 326.25, 330.45],
            voltage_ref: vec![52.2, 51.1, 49.2, 47.0, 44.1],
        }
    }

    /// Load current per point, amperes
    pub fn current(&self) -> &[f64] {
        &self.current
    }

    /// Stack temperature per point, kelvin
    pub fn temperature(&self) -> &[f64] {
        &self.temperature
    }

    pub fn voltage_ref(&self) -> &[f64] {
        &self.voltage_ref
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
