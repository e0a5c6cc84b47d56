use faer::Mat;

use crate::types::{DmdcError, LinearModel, C64};
use crate::utils::{eigenvalues, numerical_rank, spectral_radius, validate_matrix};

impl LinearModel {
    /// Build a model, checking that A is square and B has n rows.
    pub fn new(a: Mat<f64>, b: Mat<f64>) -> Result<Self, DmdcError> {
        validate_matrix(&a, "linear model", 1, 1)?;
        validate_matrix(&b, "linear model", 1, 1)?;
        if a.nrows() != a.ncols() {
            return Err(DmdcError::shape(
                "linear model",
                format!("A is {}x{}, expected square", a.nrows(), a.ncols()),
            ));
        }
        if b.nrows() != a.nrows() {
            return Err(DmdcError::shape(
                "linear model",
                format!("B has {} rows, A has {}", b.nrows(), a.nrows()),
            ));
        }
        Ok(Self { a, b })
    }

    /// State dimension n.
    pub fn n_states(&self) -> usize {
        self.a.nrows()
    }

    /// Input dimension m.
    pub fn n_inputs(&self) -> usize {
        self.b.ncols()
    }

    /// One open-loop step: A·x + B·u.
    pub fn step(&self, x: &[f64], u: &[f64]) -> Result<Vec<f64>, DmdcError> {
        let (n, m) = (self.n_states(), self.n_inputs());
        if x.len() != n || u.len() != m {
            return Err(DmdcError::shape(
                "linear model",
                format!(
                    "step expects x of length {n} and u of length {m}, got {} and {}",
                    x.len(),
                    u.len()
                ),
            ));
        }
        Ok((0..n)
            .map(|i| {
                let ax: f64 = (0..n).map(|j| self.a[(i, j)] * x[j]).sum();
                let bu: f64 = (0..m).map(|j| self.b[(i, j)] * u[j]).sum();
                ax + bu
            })
            .collect())
    }

    /// Eigenvalues of A.
    pub fn eigenvalues(&self) -> Result<Vec<C64>, DmdcError> {
        eigenvalues(&self.a)
    }

    /// Spectral radius of A; below 1 means open-loop stable.
    pub fn spectral_radius(&self) -> Result<f64, DmdcError> {
        spectral_radius(&self.a)
    }

    /// Kalman controllability matrix [B, AB, …, Aⁿ⁻¹B] (n × n·m).
    pub fn controllability_matrix(&self) -> Mat<f64> {
        let (n, m) = (self.n_states(), self.n_inputs());
        let mut ctrb = Mat::<f64>::zeros(n, n * m);
        let mut block = self.b.clone();
        for k in 0..n {
            for j in 0..m {
                for i in 0..n {
                    ctrb[(i, k * m + j)] = block[(i, j)];
                }
            }
            if k + 1 < n {
                block = &self.a * &block;
            }
        }
        ctrb
    }

    /// Rank of the controllability matrix at relative tolerance `tol`.
    pub fn controllability_rank(&self, tol: f64) -> Result<usize, DmdcError> {
        numerical_rank(&self.controllability_matrix(), tol)
    }

    /// Whether the controllability matrix has full row rank.
    pub fn is_controllable(&self, tol: f64) -> Result<bool, DmdcError> {
        Ok(self.controllability_rank(tol)? == self.n_states())
    }
}
