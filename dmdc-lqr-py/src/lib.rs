use numpy::ndarray::{Array1, Array2};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use ::dmdc_lqr as dl;

// ============================================================================
// Helper conversions
// ============================================================================

fn mat_to_faer(arr: &Array2<f64>) -> faer::Mat<f64> {
    let (nrows, ncols) = arr.dim();
    let mut m = faer::Mat::<f64>::zeros(nrows, ncols);
    for i in 0..nrows {
        for j in 0..ncols {
            m[(i, j)] = arr[[i, j]];
        }
    }
    m
}

fn faer_to_array2(m: &faer::Mat<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn err_to_py(e: dl::DmdcError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn read_model(a: PyReadonlyArray2<f64>, b: PyReadonlyArray2<f64>) -> PyResult<dl::LinearModel> {
    let a = mat_to_faer(&a.as_array().to_owned());
    let b = mat_to_faer(&b.as_array().to_owned());
    dl::LinearModel::new(a, b).map_err(err_to_py)
}

// ============================================================================
// DMDc class
// ============================================================================

/// DMDc identification result.
///
/// Identify by calling `DMDc(X, U)` with X of shape (n_states, T) and U of
/// shape (n_inputs, T - 1).
#[pyclass]
#[derive(Clone)]
struct DMDc {
    result: dl::DmdcResult,
}

#[pymethods]
impl DMDc {
    /// Identify x[k+1] = A x[k] + B u[k].
    ///
    /// Parameters
    /// ----------
    /// X : numpy.ndarray
    ///     State matrix (n_states x T).
    /// U : numpy.ndarray
    ///     Input matrix (n_inputs x T-1).
    /// threshold : float
    ///     Singular values strictly above this are retained.
    /// condition_bound : float
    ///     Condition number above which a warning is attached.
    #[new]
    #[pyo3(signature = (x, u, threshold=dl::DEFAULT_THRESHOLD, condition_bound=1e8))]
    fn new(
        x: PyReadonlyArray2<f64>,
        u: PyReadonlyArray2<f64>,
        threshold: f64,
        condition_bound: f64,
    ) -> PyResult<Self> {
        let states = mat_to_faer(&x.as_array().to_owned());
        let inputs = mat_to_faer(&u.as_array().to_owned());
        let config = dl::DmdcConfig {
            threshold,
            condition_bound,
            ..Default::default()
        };
        let result = dl::dmdc(&states, &inputs, &config).map_err(err_to_py)?;
        Ok(DMDc { result })
    }

    /// State transition matrix A (n x n).
    #[getter]
    fn a<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        faer_to_array2(&self.result.model.a).into_pyarray(py)
    }

    /// Input matrix B (n x m).
    #[getter]
    fn b<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        faer_to_array2(&self.result.model.b).into_pyarray(py)
    }

    /// Rank of the [X; U] decomposition.
    #[getter]
    fn rank(&self) -> usize {
        self.result.rank()
    }

    /// Rank of the X' decomposition.
    #[getter]
    fn output_rank(&self) -> usize {
        self.result.output_rank()
    }

    /// Data dimensions (n_states, n_inputs, T).
    #[getter]
    fn data_dim(&self) -> (usize, usize, usize) {
        self.result.data_dim
    }

    /// Relative one-step fit residual.
    #[getter]
    fn fit_residual(&self) -> f64 {
        self.result.fit_residual
    }

    /// Full singular value spectrum of [X; U].
    #[getter]
    fn singular_values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        Array1::from(self.result.omega_svd.spectrum.clone()).into_pyarray(py)
    }

    /// Advisory numerical warnings as strings.
    #[getter]
    fn warnings(&self) -> Vec<String> {
        self.result.warnings.iter().map(|w| w.to_string()).collect()
    }

    /// Reduced operators (A_tilde, B_tilde, basis) on the X' subspace.
    fn reduced<'py>(
        &self,
        py: Python<'py>,
    ) -> PyResult<(
        Bound<'py, PyArray2<f64>>,
        Bound<'py, PyArray2<f64>>,
        Bound<'py, PyArray2<f64>>,
    )> {
        let r = self.result.reduced_model().map_err(err_to_py)?;
        Ok((
            faer_to_array2(&r.a_tilde).into_pyarray(py),
            faer_to_array2(&r.b_tilde).into_pyarray(py),
            faer_to_array2(&r.basis).into_pyarray(py),
        ))
    }

    fn __repr__(&self) -> String {
        let (n, m, t) = self.result.data_dim;
        format!(
            "DMDc(n_states={n}, n_inputs={m}, samples={t}, rank={}, fit_residual={:.3e})",
            self.result.rank(),
            self.result.fit_residual
        )
    }
}

// ============================================================================
// Control functions
// ============================================================================

/// Discrete LQR gain for (A, B) with diagonal weights.
///
/// Returns (K, P, closed_loop_spectral_radius).
#[pyfunction]
#[pyo3(signature = (a, b, q_diag, r_diag, max_iter=100, tol=1e-12))]
fn dlqr<'py>(
    py: Python<'py>,
    a: PyReadonlyArray2<f64>,
    b: PyReadonlyArray2<f64>,
    q_diag: PyReadonlyArray1<f64>,
    r_diag: PyReadonlyArray1<f64>,
    max_iter: usize,
    tol: f64,
) -> PyResult<(Bound<'py, PyArray2<f64>>, Bound<'py, PyArray2<f64>>, f64)> {
    let model = read_model(a, b)?;
    let q = q_diag.as_array().to_vec();
    let r = r_diag.as_array().to_vec();
    let weights = dl::CostWeights::diagonal(&q, &r);
    let config = dl::LqrConfig { max_iter, tol };
    let gain = dl::dlqr(&model, &weights, &config).map_err(err_to_py)?;
    Ok((
        faer_to_array2(&gain.k).into_pyarray(py),
        faer_to_array2(&gain.p).into_pyarray(py),
        gain.spectral_radius,
    ))
}

/// Closed-loop rollout under u = K (x_ref - x).
///
/// Returns (states, controls) with shapes (n, T_ref + 1) and (m, T_ref).
#[pyfunction]
#[pyo3(signature = (a, b, k, reference, x0=None))]
fn simulate<'py>(
    py: Python<'py>,
    a: PyReadonlyArray2<f64>,
    b: PyReadonlyArray2<f64>,
    k: PyReadonlyArray2<f64>,
    reference: PyReadonlyArray2<f64>,
    x0: Option<PyReadonlyArray1<f64>>,
) -> PyResult<(Bound<'py, PyArray2<f64>>, Bound<'py, PyArray2<f64>>)> {
    let model = read_model(a, b)?;
    let k = mat_to_faer(&k.as_array().to_owned());
    let reference = mat_to_faer(&reference.as_array().to_owned());
    let x0 = x0.map(|v| v.as_array().to_vec());
    let traj = dl::simulate_closed_loop(&model, &k, &reference, x0.as_deref())
        .map_err(err_to_py)?;
    Ok((
        faer_to_array2(&traj.states).into_pyarray(py),
        faer_to_array2(&traj.controls).into_pyarray(py),
    ))
}

/// Tracking RMSE, max |error| and final error norm of a state history.
#[pyfunction]
fn tracking_metrics(
    states: PyReadonlyArray2<f64>,
    reference: PyReadonlyArray2<f64>,
) -> PyResult<(f64, f64, f64)> {
    let states = mat_to_faer(&states.as_array().to_owned());
    let reference = mat_to_faer(&reference.as_array().to_owned());
    let traj = dl::SimulatedTrajectory {
        states,
        controls: faer::Mat::<f64>::zeros(0, 0),
    };
    let metrics = dl::tracking_metrics(&traj, &reference).map_err(err_to_py)?;
    Ok((metrics.rmse, metrics.max_abs_error, metrics.final_error))
}

/// Check the PBH stabilizability of (A, B); raises ValueError if not stabilizable.
#[pyfunction]
fn check_stabilizable(a: PyReadonlyArray2<f64>, b: PyReadonlyArray2<f64>) -> PyResult<()> {
    let model = read_model(a, b)?;
    dl::check_stabilizable(&model.a, &model.b).map_err(err_to_py)
}

// ============================================================================
// Module
// ============================================================================

#[pymodule]
fn dmdc_lqr(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<DMDc>()?;
    m.add_function(wrap_pyfunction!(dlqr, m)?)?;
    m.add_function(wrap_pyfunction!(simulate, m)?)?;
    m.add_function(wrap_pyfunction!(tracking_metrics, m)?)?;
    m.add_function(wrap_pyfunction!(check_stabilizable, m)?)?;
    Ok(())
}
