use crate::core::*;
use crate::optimizer::{FitConfig, FitResult, PolarizationFitter};
use crate::simulation::evaluate;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn to_py_err(e: FitError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Fit outcome as seen from Python
#[pyclass(name = "FitReport")]
#[derive(Clone, Debug)]
pub struct PyFitReport {
    inner: FitResult,
}

#[pymethods]
impl PyFitReport {
    /// `(name, value)` pairs in display order
    #[getter]
    fn parameters(&self) -> Vec<(String, f64)> {
        self.inner
            .named_parameters()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    #[getter]
    fn cost(&self) -> f64 {
        self.inner.cost
    }

    #[getter]
    fn voltage_fit(&self) -> Vec<f64> {
        self.inner.voltage_fit.clone()
    }

    #[getter]
    fn percent_error(&self) -> Vec<f64> {
        self.inner.percent_error.clone()
    }

    #[getter]
    fn mean_percent_error(&self) -> f64 {
        self.inner.mean_percent_error
    }

    #[getter]
    fn power(&self) -> Vec<f64> {
        self.inner.power.clone()
    }

    #[getter]
    fn converged(&self) -> bool {
        self.inner.is_converged()
    }

    #[getter]
    fn warnings(&self) -> Vec<String> {
        self.inner.warnings.iter().map(|w| w.to_string()).collect()
    }

    /// Rows of `(current, temperature, voltage_ref, voltage_fit, percent_error)`
    fn point_table(&self) -> Vec<(f64, f64, f64, f64, f64)> {
        self.inner
            .point_table()
            .into_iter()
            .map(|r| (r.current, r.temperature, r.voltage_ref, r.voltage_fit, r.percent_error))
            .collect()
    }

    fn to_json(&self) -> PyResult<String> {
        self.inner.to_json().map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "FitReport(cost={:.6e}, mean_percent_error={:.4}, converged={})",
            self.inner.cost,
            self.inner.mean_percent_error,
            self.inner.is_converged()
        )
    }
}

#[pyfunction]
#[pyo3(signature = (
    current, temperature, voltage_ref, bounds=None, p_h2=0.65, p_o2=0.21, n_cells=60,
    seed=None, config_json=None
))]
#[allow(clippy::too_many_arguments)]
fn fit_polarization(
    py: Python<'_>,
    current: Vec<f64>,
    temperature: Vec<f64>,
    voltage_ref: Vec<f64>,
    bounds: Option<Vec<(f64, f64)>>,
    p_h2: f64,
    p_o2: f64,
    n_cells: u32,
    seed: Option<u64>,
    config_json: Option<String>,
) -> PyResult<PyFitReport> {
    let samples = SampleSet::new(current, temperature, voltage_ref).map_err(to_py_err)?;
    let bounds = match bounds {
        Some(intervals) => Bounds::new(intervals).map_err(to_py_err)?,
        None => Bounds::reference(),
    };
    let constants = Constants::new(p_h2, p_o2, n_cells).map_err(to_py_err)?;

    let mut config = match config_json {
        Some(json) => FitConfig::from_json(&json).map_err(to_py_err)?,
        None => FitConfig::default(),
    };
    if seed.is_some() {
        config.global.seed = seed;
    }

    let fitter = PolarizationFitter::new(config);
    let inner = py
        .allow_threads(|| fitter.fit(&samples, &bounds, &constants))
        .map_err(to_py_err)?;
    Ok(PyFitReport { inner })
}

#[pyfunction]
#[pyo3(signature = (current, temperature, params, p_h2=0.65, p_o2=0.21, n_cells=60))]
fn evaluate_voltage(
    current: Vec<f64>,
    temperature: Vec<f64>,
    params: Vec<f64>,
    p_h2: f64,
    p_o2: f64,
    n_cells: u32,
) -> PyResult<Vec<f64>> {
    let params = ParameterVector::from_slice(&params).map_err(to_py_err)?;
    let constants = Constants::new(p_h2, p_o2, n_cells).map_err(to_py_err)?;
    evaluate(&current, &temperature, &params, &constants).map_err(to_py_err)
}

#[pymodule]
fn pemfc_fit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyFitReport>()?;
    m.add_function(wrap_pyfunction!(fit_polarization, m)?)?;
    m.add_function(wrap_pyfunction!(evaluate_voltage, m)?)?;
    m.add("PARAMETER_NAMES", PARAMETER_NAMES.to_vec())?;
    Ok(())
}
