use faer::Mat;

use crate::types::DmdcError;
use crate::utils::validate_matrix;

/// One-step-shifted snapshot pair and the augmented regression input.
#[derive(Debug, Clone)]
pub struct Snapshots {
    /// X[:, 0..T-1] (n × (T-1)).
    pub x_now: Mat<f64>,
    /// X[:, 1..T] (n × (T-1)).
    pub x_next: Mat<f64>,
    /// Ω = [X_now; U] ((n+m) × (T-1)).
    pub omega: Mat<f64>,
}

impl Snapshots {
    /// State dimension n.
    pub fn n_states(&self) -> usize {
        self.x_now.nrows()
    }

    /// Input dimension m.
    pub fn n_inputs(&self) -> usize {
        self.omega.nrows() - self.x_now.nrows()
    }

    /// Number of snapshot pairs, T-1.
    pub fn n_pairs(&self) -> usize {
        self.x_now.ncols()
    }
}

/// Build the shifted state pair and Ω from states (n × T) and inputs (m × (T-1)).
///
/// Inputs act between consecutive state samples, so `inputs` must have
/// exactly one column fewer than `states`. Nothing is truncated to make
/// the shapes agree.
pub fn build_snapshots(states: &Mat<f64>, inputs: &Mat<f64>) -> Result<Snapshots, DmdcError> {
    validate_matrix(states, "regression", 1, 2)?;
    validate_matrix(inputs, "regression", 1, 0)?;

    let n = states.nrows();
    let m = inputs.nrows();
    let n_time = states.ncols();

    if inputs.ncols() != n_time - 1 {
        return Err(DmdcError::shape(
            "regression",
            format!(
                "state matrix is {n}x{n_time} so the input matrix needs {} columns, got {m}x{}",
                n_time - 1,
                inputs.ncols()
            ),
        ));
    }

    let x_now = states.subcols(0, n_time - 1).to_owned();
    let x_next = states.subcols(1, n_time - 1).to_owned();

    let mut omega = Mat::<f64>::zeros(n + m, n_time - 1);
    for j in 0..n_time - 1 {
        for i in 0..n {
            omega[(i, j)] = x_now[(i, j)];
        }
        for i in 0..m {
            omega[(n + i, j)] = inputs[(i, j)];
        }
    }

    Ok(Snapshots {
        x_now,
        x_next,
        omega,
    })
}
