use faer::Mat;
use log::{debug, warn};

use crate::regression::build_snapshots;
use crate::svd::{truncated_svd, TruncatedSvd};
use crate::types::{DmdcConfig, DmdcError, LinearModel, NumericalWarning};

/// Result of a DMDc identification.
#[derive(Debug, Clone)]
pub struct DmdcResult {
    /// Identified (A, B).
    pub model: LinearModel,
    /// Truncated SVD of Ω = [X_now; U]; its factors define A and B.
    pub omega_svd: TruncatedSvd,
    /// Truncated SVD of X_next; spans the reduced output space.
    pub output_svd: TruncatedSvd,
    /// ‖X_next − A·X_now − B·U‖_F / ‖X_next‖_F.
    pub fit_residual: f64,
    /// Advisory numerical diagnostics.
    pub warnings: Vec<NumericalWarning>,
    /// (n_states, n_inputs, n_samples).
    pub data_dim: (usize, usize, usize),
}

/// DMDc operator pair projected onto the leading left singular vectors of X_next.
#[derive(Debug, Clone)]
pub struct ReducedModel {
    /// Ã = Ûᵀ·A·Û (r × r).
    pub a_tilde: Mat<f64>,
    /// B̃ = Ûᵀ·B (r × m).
    pub b_tilde: Mat<f64>,
    /// Û (n × r).
    pub basis: Mat<f64>,
}

impl DmdcResult {
    /// Rank r̃ of the Ω decomposition.
    pub fn rank(&self) -> usize {
        self.omega_svd.rank
    }

    /// Rank r of the X_next decomposition.
    pub fn output_rank(&self) -> usize {
        self.output_svd.rank
    }

    /// Project (A, B) onto the X_next basis Û.
    pub fn reduced_model(&self) -> Result<ReducedModel, DmdcError> {
        let out = &self.output_svd;
        if out.is_degenerate() {
            return Err(DmdcError::DegenerateModel {
                matrix: "x_next",
                rows: out.u.nrows(),
                cols: out.v.nrows(),
                threshold: out.threshold,
            });
        }
        let basis = out.u.clone();
        let a_tilde = &(basis.transpose() * &self.model.a) * &basis;
        let b_tilde = basis.transpose() * &self.model.b;
        Ok(ReducedModel {
            a_tilde,
            b_tilde,
            basis,
        })
    }
}

/// Identify a linear model x[k+1] = A·x[k] + B·u[k] with DMDc.
///
/// # Arguments
/// * `states` - State matrix (n × T), columns are time-ordered.
/// * `inputs` - Input matrix (m × (T-1)); column k acts between x[k] and x[k+1].
/// * `config` - Truncation threshold and diagnostic bounds.
///
/// # Algorithm
/// 1. Ω = [X_now; U], truncated SVD Ω ≈ Ũ Σ̃ Ṽᵀ (rank r̃)
/// 2. Truncated SVD X_next ≈ Û Σ̂ V̂ᵀ (rank r)
/// 3. Split Ũ by rows: U1 = Ũ[0..n, :], U2 = Ũ[n..n+m, :]
/// 4. A = X_next Ṽ Σ̃⁺ U1ᵀ, B = X_next Ṽ Σ̃⁺ U2ᵀ
pub fn dmdc(
    states: &Mat<f64>,
    inputs: &Mat<f64>,
    config: &DmdcConfig,
) -> Result<DmdcResult, DmdcError> {
    let snap = build_snapshots(states, inputs)?;
    let (n, m, n_pairs) = (snap.n_states(), snap.n_inputs(), snap.n_pairs());

    let omega_svd = truncated_svd(&snap.omega, config.threshold)?;
    debug!(
        "dmdc: omega {}x{} rank {} (threshold {:e})",
        n + m,
        n_pairs,
        omega_svd.rank,
        config.threshold
    );
    if omega_svd.is_degenerate() {
        return Err(DmdcError::DegenerateModel {
            matrix: "omega",
            rows: n + m,
            cols: n_pairs,
            threshold: config.threshold,
        });
    }

    let output_svd = truncated_svd(&snap.x_next, config.threshold)?;
    debug!("dmdc: x_next {n}x{n_pairs} rank {}", output_svd.rank);

    let rank = omega_svd.rank;
    let u1t = omega_svd.u.subrows(0, n).transpose().to_owned();
    let u2t = omega_svd.u.subrows(n, m).transpose().to_owned();

    // X_next Ṽ Σ̃⁺ (n × r̃), shared by A and B
    let projected = &(&snap.x_next * &omega_svd.v) * &omega_svd.sigma_pinv();
    let a = &projected * &u1t;
    let b = &projected * &u2t;

    let mut warnings = omega_svd.near_threshold("omega", config.near_threshold_ratio);
    warnings.extend(output_svd.near_threshold("x_next", config.near_threshold_ratio));
    let condition_number = omega_svd.condition_number();
    if condition_number > config.condition_bound {
        warnings.push(NumericalWarning::IllConditioned {
            matrix: "omega",
            condition_number,
            bound: config.condition_bound,
        });
    }
    for w in &warnings {
        warn!("dmdc: {w}");
    }

    let residual = &(&snap.x_next - &(&a * &snap.x_now)) - &(&b * inputs);
    let next_norm = snap.x_next.norm_l2();
    let fit_residual = if next_norm > 0.0 {
        residual.norm_l2() / next_norm
    } else {
        residual.norm_l2()
    };
    debug!("dmdc: rank {rank}, relative fit residual {fit_residual:e}");

    Ok(DmdcResult {
        model: LinearModel { a, b },
        omega_svd,
        output_svd,
        fit_residual,
        warnings,
        data_dim: (n, m, n_pairs + 1),
    })
}
