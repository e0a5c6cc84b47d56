use faer::Mat;

use crate::lqr::feedback;
use crate::types::{DmdcError, LinearModel, TrackingMetrics};
use crate::utils::validate_matrix;

/// State rollout and the control sequence that produced it.
#[derive(Debug, Clone)]
pub struct SimulatedTrajectory {
    /// x[0..=T_ref] (n × (T_ref + 1)), including the initial state.
    pub states: Mat<f64>,
    /// u[k] = K·(x_ref[k] − x[k]) for k in 0..T_ref (m × T_ref).
    pub controls: Mat<f64>,
}

impl SimulatedTrajectory {
    /// Number of simulated steps T_ref.
    pub fn horizon(&self) -> usize {
        self.controls.ncols()
    }
}

/// Roll out x[k+1] = A·x[k] + B·K·(x_ref[k] − x[k]) over the reference horizon.
///
/// # Arguments
/// * `model` - Identified (A, B).
/// * `k` - Feedback gain (m × n).
/// * `reference` - Desired states (n × T_ref), one column per step.
/// * `x0` - Initial state. None uses the first reference column.
pub fn simulate_closed_loop(
    model: &LinearModel,
    k: &Mat<f64>,
    reference: &Mat<f64>,
    x0: Option<&[f64]>,
) -> Result<SimulatedTrajectory, DmdcError> {
    let n = model.n_states();
    let m = model.n_inputs();
    validate_matrix(reference, "simulation", 1, 1)?;
    if reference.nrows() != n {
        return Err(DmdcError::shape(
            "simulation",
            format!("reference has {} rows, model has {n} states", reference.nrows()),
        ));
    }
    if k.nrows() != m || k.ncols() != n {
        return Err(DmdcError::shape(
            "simulation",
            format!("gain is {}x{}, expected {m}x{n}", k.nrows(), k.ncols()),
        ));
    }
    let horizon = reference.ncols();

    let mut x: Vec<f64> = match x0 {
        Some(x0) if x0.len() != n => {
            return Err(DmdcError::shape(
                "simulation",
                format!("x0 has length {}, expected {n}", x0.len()),
            ));
        }
        Some(x0) => x0.to_vec(),
        None => (0..n).map(|i| reference[(i, 0)]).collect(),
    };

    let mut states = Mat::<f64>::zeros(n, horizon + 1);
    let mut controls = Mat::<f64>::zeros(m, horizon);
    for (i, &xi) in x.iter().enumerate() {
        states[(i, 0)] = xi;
    }

    for step in 0..horizon {
        let x_ref: Vec<f64> = (0..n).map(|i| reference[(i, step)]).collect();
        let u = feedback(k, &x_ref, &x)?;
        x = model.step(&x, &u)?;
        for (r, &ur) in u.iter().enumerate() {
            controls[(r, step)] = ur;
        }
        for (i, &xi) in x.iter().enumerate() {
            states[(i, step + 1)] = xi;
        }
    }

    Ok(SimulatedTrajectory { states, controls })
}

/// Compare x[k] against x_ref[k] for k in 0..T_ref.
pub fn tracking_metrics(
    trajectory: &SimulatedTrajectory,
    reference: &Mat<f64>,
) -> Result<TrackingMetrics, DmdcError> {
    let n = reference.nrows();
    let n_time = reference.ncols();
    if trajectory.states.nrows() != n || trajectory.states.ncols() < n_time || n_time == 0 {
        return Err(DmdcError::shape(
            "tracking metrics",
            format!(
                "trajectory is {}x{}, reference is {n}x{n_time}",
                trajectory.states.nrows(),
                trajectory.states.ncols()
            ),
        ));
    }

    let mut per_state_sq = vec![0.0; n];
    let mut max_abs_error = 0.0_f64;
    for k in 0..n_time {
        for i in 0..n {
            let e = trajectory.states[(i, k)] - reference[(i, k)];
            per_state_sq[i] += e * e;
            max_abs_error = max_abs_error.max(e.abs());
        }
    }
    let total_sq: f64 = per_state_sq.iter().sum();
    let per_state_rmse = per_state_sq
        .iter()
        .map(|s| (s / n_time as f64).sqrt())
        .collect();
    let final_error = (0..n)
        .map(|i| {
            let e = trajectory.states[(i, n_time - 1)] - reference[(i, n_time - 1)];
            e * e
        })
        .sum::<f64>()
        .sqrt();

    Ok(TrackingMetrics {
        rmse: (total_sq / (n * n_time) as f64).sqrt(),
        per_state_rmse,
        max_abs_error,
        final_error,
    })
}
