use faer::linalg::solvers::Solve;
use faer::Mat;

use crate::types::{DmdcError, C64};

/// Validate that a matrix meets minimum dimension requirements and contains no NaN/Inf.
pub fn validate_matrix(
    x: &Mat<f64>,
    stage: &'static str,
    min_rows: usize,
    min_cols: usize,
) -> Result<(), DmdcError> {
    let (rows, cols) = (x.nrows(), x.ncols());
    if rows < min_rows {
        return Err(DmdcError::shape(
            stage,
            format!("matrix has {rows} rows, need at least {min_rows}"),
        ));
    }
    if cols < min_cols {
        return Err(DmdcError::shape(
            stage,
            format!("matrix has {cols} columns, need at least {min_cols}"),
        ));
    }
    for j in 0..cols {
        for i in 0..rows {
            if !x[(i, j)].is_finite() {
                return Err(DmdcError::InvalidInput(format!(
                    "{stage}: matrix contains NaN or Inf at ({i}, {j})"
                )));
            }
        }
    }
    Ok(())
}

/// Whether every entry is finite.
pub fn all_finite(x: &Mat<f64>) -> bool {
    (0..x.ncols()).all(|j| (0..x.nrows()).all(|i| x[(i, j)].is_finite()))
}

/// Eigenvalues of a square real matrix.
pub fn eigenvalues(a: &Mat<f64>) -> Result<Vec<C64>, DmdcError> {
    if a.nrows() != a.ncols() {
        return Err(DmdcError::shape(
            "eigenvalues",
            format!("matrix is {}x{}, expected square", a.nrows(), a.ncols()),
        ));
    }
    if a.nrows() == 0 {
        return Ok(Vec::new());
    }
    let eigen = a
        .as_ref()
        .eigen()
        .map_err(|e| DmdcError::EigenFailed(format!("{e:?}")))?;
    let diag = eigen.S().column_vector();
    Ok((0..diag.nrows())
        .map(|i| C64::new(diag[i].re, diag[i].im))
        .collect())
}

/// Largest eigenvalue magnitude.
pub fn spectral_radius(a: &Mat<f64>) -> Result<f64, DmdcError> {
    Ok(eigenvalues(a)?
        .iter()
        .map(|lambda| lambda.norm())
        .fold(0.0_f64, f64::max))
}

/// Numerical rank: singular values above `tol · σ_max`.
pub fn numerical_rank(x: &Mat<f64>, tol: f64) -> Result<usize, DmdcError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Ok(0);
    }
    let svd = x
        .thin_svd()
        .map_err(|e| DmdcError::SvdFailed(format!("{e:?}")))?;
    let s = svd.S().column_vector();
    let max_sv = (0..s.nrows()).map(|i| s[i]).fold(0.0_f64, f64::max);
    if max_sv == 0.0 {
        return Ok(0);
    }
    Ok((0..s.nrows()).filter(|&i| s[i] > tol * max_sv).count())
}

/// Solve A·X = B for X through a partially pivoted LU factorization.
///
/// `a` must be square; `b` may have any number of columns. A pivot of U at or
/// below `max|a| · n · ε` is treated as singular.
pub fn solve(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, DmdcError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(DmdcError::shape(
            "solve",
            format!("coefficient matrix is {}x{}, expected square", n, a.ncols()),
        ));
    }
    if b.nrows() != n {
        return Err(DmdcError::shape(
            "solve",
            format!("right-hand side has {} rows, expected {n}", b.nrows()),
        ));
    }
    if n == 0 {
        return Ok(Mat::<f64>::zeros(0, b.ncols()));
    }

    let lu = a.partial_piv_lu();
    let u = lu.U();
    let pivot_tol = a.norm_max() * n as f64 * f64::EPSILON;
    for i in 0..n {
        let pivot = u[(i, i)].abs();
        if pivot <= pivot_tol || !pivot.is_finite() {
            return Err(DmdcError::SolveFailed(format!(
                "singular matrix (pivot {pivot:e} in column {i})"
            )));
        }
    }

    Ok(lu.solve(b))
}

/// (A + Aᵀ) / 2.
pub fn symmetrize(a: &Mat<f64>) -> Mat<f64> {
    let n = a.nrows();
    let mut s = Mat::<f64>::zeros(n, n);
    for j in 0..n {
        for i in 0..n {
            s[(i, j)] = 0.5 * (a[(i, j)] + a[(j, i)]);
        }
    }
    s
}
