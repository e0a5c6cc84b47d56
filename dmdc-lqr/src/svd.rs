use faer::Mat;
use rayon::prelude::*;

use crate::types::{DmdcError, NumericalWarning};
use crate::utils::validate_matrix;

/// Rank-truncated singular value decomposition M ≈ U·Σ·Vᵀ.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    /// Left singular vectors (rows × r).
    pub u: Mat<f64>,
    /// Retained singular values (r), descending.
    pub s: Vec<f64>,
    /// Right singular vectors (cols × r), columns are right singular vectors.
    pub v: Mat<f64>,
    /// Full singular spectrum before truncation.
    pub spectrum: Vec<f64>,
    /// Number of singular values strictly above `threshold`.
    pub rank: usize,
    /// Threshold ε used for truncation.
    pub threshold: f64,
}

impl TruncatedSvd {
    /// No singular value survived truncation.
    pub fn is_degenerate(&self) -> bool {
        self.rank == 0
    }

    /// σ₁ / σ_r of the retained values, infinite when degenerate.
    pub fn condition_number(&self) -> f64 {
        match (self.s.first(), self.s.last()) {
            (Some(&first), Some(&last)) if last > 0.0 => first / last,
            _ => f64::INFINITY,
        }
    }

    /// Moore–Penrose pseudoinverse of the truncated diagonal Σ (r × r).
    ///
    /// Entries at or below the threshold map to zero, so this stays finite
    /// even if the retained spectrum is near-singular.
    pub fn sigma_pinv(&self) -> Mat<f64> {
        let r = self.rank;
        let mut inv = Mat::<f64>::zeros(r, r);
        for (i, &si) in self.s.iter().enumerate() {
            if si > self.threshold {
                inv[(i, i)] = 1.0 / si;
            }
        }
        inv
    }

    /// Singular values within `[ε / ratio, ε · ratio]`, retained or not.
    pub fn near_threshold(&self, matrix: &'static str, ratio: f64) -> Vec<NumericalWarning> {
        let lo = self.threshold / ratio;
        let hi = self.threshold * ratio;
        self.spectrum
            .iter()
            .enumerate()
            .filter(|&(_, &sv)| sv >= lo && sv <= hi)
            .map(|(index, &singular_value)| NumericalWarning::NearThreshold {
                matrix,
                index,
                singular_value,
                threshold: self.threshold,
            })
            .collect()
    }
}

/// Number of singular values strictly greater than `threshold`.
pub fn truncation_rank(singular_values: &[f64], threshold: f64) -> usize {
    singular_values.iter().filter(|&&s| s > threshold).count()
}

/// Economy SVD of `m`, truncated to the singular values above `threshold`.
///
/// The rank is never fixed in advance; it is a function of the spectrum
/// and the threshold only. A rank of zero is returned as-is and left to
/// the caller to reject.
pub fn truncated_svd(m: &Mat<f64>, threshold: f64) -> Result<TruncatedSvd, DmdcError> {
    validate_matrix(m, "truncated svd", 1, 1)?;
    if threshold.is_nan() || threshold < 0.0 {
        return Err(DmdcError::InvalidInput(format!(
            "threshold must be non-negative, got {threshold}"
        )));
    }

    let svd = m
        .thin_svd()
        .map_err(|e| DmdcError::SvdFailed(format!("{e:?}")))?;
    let u_full = svd.U();
    let v_full = svd.V();
    let s_col = svd.S().column_vector();

    let spectrum: Vec<f64> = (0..s_col.nrows()).map(|i| s_col[i]).collect();
    let rank = truncation_rank(&spectrum, threshold);

    Ok(TruncatedSvd {
        u: u_full.subcols(0, rank).to_owned(),
        s: spectrum[..rank].to_vec(),
        v: v_full.subcols(0, rank).to_owned(),
        spectrum,
        rank,
        threshold,
    })
}

/// Truncation rank of `m` at each threshold, from a single factorization.
pub fn rank_profile(m: &Mat<f64>, thresholds: &[f64]) -> Result<Vec<(f64, usize)>, DmdcError> {
    let svd = truncated_svd(m, 0.0)?;
    let spectrum = &svd.spectrum;
    Ok(thresholds
        .par_iter()
        .map(|&eps| (eps, truncation_rank(spectrum, eps)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: f64, b: f64, eps: f64) {
        assert!(
            (a - b).abs() < eps,
            "expected {a} ≈ {b} (diff = {})",
            (a - b).abs()
        );
    }

    /// 3×4 matrix with singular values 5, 2, 1e-3.
    fn known_spectrum() -> Mat<f64> {
        let mut m = Mat::<f64>::zeros(3, 4);
        m[(0, 1)] = 5.0;
        m[(1, 0)] = 2.0;
        m[(2, 3)] = 1e-3;
        m
    }

    #[test]
    fn test_truncation_rank_strict() {
        let s = [3.0, 1.0, 1e-10, 0.0];
        assert_eq!(truncation_rank(&s, 1e-10), 2);
        assert_eq!(truncation_rank(&s, 0.0), 3);
        assert_eq!(truncation_rank(&s, 10.0), 0);
    }

    #[test]
    fn test_truncated_svd_shapes() {
        let m = known_spectrum();
        let svd = truncated_svd(&m, 1e-2).unwrap();
        assert_eq!(svd.rank, 2);
        assert_eq!(svd.u.nrows(), 3);
        assert_eq!(svd.u.ncols(), 2);
        assert_eq!(svd.v.nrows(), 4);
        assert_eq!(svd.v.ncols(), 2);
        assert_eq!(svd.spectrum.len(), 3);
        assert_near(svd.s[0], 5.0, 1e-12);
        assert_near(svd.s[1], 2.0, 1e-12);
    }

    #[test]
    fn test_truncated_svd_reconstructs() {
        let m = known_spectrum();
        let svd = truncated_svd(&m, 1e-10).unwrap();
        assert_eq!(svd.rank, 3);

        let mut sigma = Mat::<f64>::zeros(3, 3);
        for i in 0..3 {
            sigma[(i, i)] = svd.s[i];
        }
        let vt = svd.v.transpose().to_owned();
        let recon = &(&svd.u * &sigma) * &vt;
        for i in 0..3 {
            for j in 0..4 {
                assert_near(recon[(i, j)], m[(i, j)], 1e-12);
            }
        }
    }

    #[test]
    fn test_zero_matrix_has_zero_rank() {
        let m = Mat::<f64>::zeros(4, 6);
        let svd = truncated_svd(&m, 1e-10).unwrap();
        assert!(svd.is_degenerate());
        assert_eq!(svd.u.ncols(), 0);
        assert!(svd.condition_number().is_infinite());
    }

    #[test]
    fn test_sigma_pinv_is_inverse_on_retained() {
        let svd = truncated_svd(&known_spectrum(), 1e-10).unwrap();
        let pinv = svd.sigma_pinv();
        assert_near(pinv[(0, 0)], 0.2, 1e-12);
        assert_near(pinv[(1, 1)], 0.5, 1e-12);
        assert_near(pinv[(2, 2)], 1e3, 1e-6);
        assert_eq!(pinv[(0, 1)], 0.0);
    }

    #[test]
    fn test_condition_number() {
        let svd = truncated_svd(&known_spectrum(), 1e-2).unwrap();
        assert_near(svd.condition_number(), 2.5, 1e-12);
    }

    #[test]
    fn test_near_threshold_flags() {
        let svd = truncated_svd(&known_spectrum(), 5e-4).unwrap();
        let warnings = svd.near_threshold("m", 10.0);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            NumericalWarning::NearThreshold { index: 2, .. }
        ));
    }

    #[test]
    fn test_rank_profile_monotone() {
        let thresholds = [0.0, 1e-4, 1e-2, 1.0, 3.0, 10.0];
        let profile = rank_profile(&known_spectrum(), &thresholds).unwrap();
        let ranks: Vec<usize> = profile.iter().map(|&(_, r)| r).collect();
        assert_eq!(ranks, vec![3, 3, 2, 2, 1, 0]);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        assert!(truncated_svd(&known_spectrum(), -1.0).is_err());
    }
}
