use faer::Mat;
use log::debug;

use crate::types::{CostWeights, DmdcError, LinearModel, LqrConfig, C64};
use crate::utils::{all_finite, eigenvalues, numerical_rank, solve, symmetrize, validate_matrix};

/// Relative tolerance for the PBH rank test.
const PBH_RANK_TOL: f64 = 1e-10;

/// Relative weight added to Q when seeding the Newton refinement.
const SEED_REGULARIZATION: f64 = 1e-6;

/// Static state-feedback gain from the discrete infinite-horizon LQR problem.
#[derive(Debug, Clone)]
pub struct LqrGain {
    /// Feedback gain K (m × n); the control law is u = K·(x_ref − x).
    pub k: Mat<f64>,
    /// Stabilizing solution P of the DARE (n × n).
    pub p: Mat<f64>,
    /// Eigenvalues of A − B·K.
    pub closed_loop_eigenvalues: Vec<C64>,
    /// Largest closed-loop eigenvalue magnitude, strictly below 1.
    pub spectral_radius: f64,
    /// Riccati iterations taken, doubling and Newton steps together.
    pub iterations: usize,
    /// ‖AᵀPA − AᵀPB·K + Q − P‖_F at the returned P.
    pub riccati_residual: f64,
}

/// Control for one sample: u = K·(x_ref − x).
pub fn feedback(k: &Mat<f64>, x_ref: &[f64], x: &[f64]) -> Result<Vec<f64>, DmdcError> {
    let (m, n) = (k.nrows(), k.ncols());
    if x_ref.len() != n || x.len() != n {
        return Err(DmdcError::shape(
            "lqr control",
            format!(
                "gain expects states of length {n}, got x_ref {} and x {}",
                x_ref.len(),
                x.len()
            ),
        ));
    }
    Ok((0..m)
        .map(|i| (0..n).map(|j| k[(i, j)] * (x_ref[j] - x[j])).sum())
        .collect())
}

/// Stabilizing DARE solution together with the gain it induces.
#[derive(Debug, Clone)]
pub struct DareSolution {
    /// P (n × n), symmetric positive semidefinite.
    pub p: Mat<f64>,
    /// K = (R + BᵀPB)⁻¹BᵀPA.
    pub k: Mat<f64>,
    /// Eigenvalues of A − B·K.
    pub closed_loop_eigenvalues: Vec<C64>,
    /// Largest closed-loop eigenvalue magnitude, strictly below 1.
    pub spectral_radius: f64,
    /// Doubling and Newton steps taken.
    pub iterations: usize,
}

/// Gain induced by a candidate P and the spectrum of the loop it closes.
struct ClosedLoop {
    k: Mat<f64>,
    eigenvalues: Vec<C64>,
    spectral_radius: f64,
}

impl ClosedLoop {
    fn from_riccati(
        a: &Mat<f64>,
        b: &Mat<f64>,
        r: &Mat<f64>,
        p: &Mat<f64>,
    ) -> Result<Self, DmdcError> {
        let bt = b.transpose().to_owned();
        let pb = p * b;
        let s = r + &(&bt * &pb);
        let k = solve(&s, &(&bt * &(p * a)))?;
        let eigenvalues = eigenvalues(&(a - &(b * &k)))?;
        let spectral_radius = eigenvalues
            .iter()
            .map(|lambda| lambda.norm())
            .fold(0.0_f64, f64::max);
        Ok(Self {
            k,
            eigenvalues,
            spectral_radius,
        })
    }

    fn into_solution(self, p: Mat<f64>, iterations: usize) -> DareSolution {
        DareSolution {
            p,
            k: self.k,
            closed_loop_eigenvalues: self.eigenvalues,
            spectral_radius: self.spectral_radius,
            iterations,
        }
    }
}

/// Synthesize the discrete LQR gain for an identified model.
///
/// Solves P = AᵀPA − AᵀPB(R + BᵀPB)⁻¹BᵀPA + Q for the stabilizing P, then
/// K = (R + BᵀPB)⁻¹BᵀPA. Fails with `UnstabilizableSystem` if (A, B) has an
/// uncontrollable mode on or outside the unit circle. A semidefinite Q that
/// leaves unstable modes unweighted is fine as long as (A, B) is stabilizable.
pub fn dlqr(
    model: &LinearModel,
    weights: &CostWeights,
    config: &LqrConfig,
) -> Result<LqrGain, DmdcError> {
    let (a, b) = (&model.a, &model.b);
    let (q, r) = (&weights.q, &weights.r);

    let DareSolution {
        p,
        k,
        closed_loop_eigenvalues,
        spectral_radius,
        iterations,
    } = solve_dare(a, b, q, r, config)?;

    let at = a.transpose().to_owned();
    let pa = &p * a;
    let pb = &p * b;
    let residual = &(&(&(&at * &pa) - &(&(&at * &pb) * &k)) + q) - &p;
    let riccati_residual = residual.norm_l2();

    debug!(
        "dlqr: {iterations} Riccati steps, closed-loop spectral radius {spectral_radius:.6}, residual {riccati_residual:e}"
    );

    Ok(LqrGain {
        k,
        p,
        closed_loop_eigenvalues,
        spectral_radius,
        iterations,
        riccati_residual,
    })
}

/// Solve the discrete algebraic Riccati equation for its stabilizing solution.
///
/// # Algorithm
/// The structure-preserving doubling algorithm runs first:
/// A₀ = A, G₀ = BR⁻¹Bᵀ, H₀ = Q, and with Wₖ = I + GₖHₖ:
/// - Aₖ₊₁ = Aₖ Wₖ⁻¹ Aₖ
/// - Gₖ₊₁ = Gₖ + Aₖ Wₖ⁻¹ Gₖ Aₖᵀ
/// - Hₖ₊₁ = Hₖ + Aₖᵀ Hₖ Wₖ⁻¹ Aₖ
///
/// Hₖ converges quadratically to the stabilizing P whenever (A, Q) is
/// detectable. With a semidefinite Q that leaves an unstable mode unweighted
/// it lands on a smaller, non-stabilizing solution instead. In that case the
/// doubling is repeated with Q + δI to obtain a stabilizing gain K₀, and
/// Newton (Hewer) steps on the true Q take over:
/// - Pⱼ = (A − BKⱼ)ᵀ Pⱼ (A − BKⱼ) + Q + KⱼᵀRKⱼ
/// - Kⱼ₊₁ = (R + BᵀPⱼB)⁻¹BᵀPⱼA
///
/// Every Kⱼ stays stabilizing and Pⱼ decreases to the stabilizing solution.
pub fn solve_dare(
    a: &Mat<f64>,
    b: &Mat<f64>,
    q: &Mat<f64>,
    r: &Mat<f64>,
    config: &LqrConfig,
) -> Result<DareSolution, DmdcError> {
    let n = a.nrows();
    let m = b.ncols();
    validate_matrix(a, "lqr", 1, 1)?;
    validate_matrix(b, "lqr", 1, 1)?;
    if a.ncols() != n || b.nrows() != n {
        return Err(DmdcError::shape(
            "lqr",
            format!("A is {n}x{} and B is {}x{m}", a.ncols(), b.nrows()),
        ));
    }
    validate_weight(q, "Q", n, false)?;
    validate_weight(r, "R", m, true)?;
    check_stabilizable(a, b)?;

    let spent = match doubling(a, b, q, r, config) {
        Ok((p, steps)) => {
            let closed = ClosedLoop::from_riccati(a, b, r, &p)?;
            if closed.spectral_radius < 1.0 {
                return Ok(closed.into_solution(p, steps));
            }
            debug!(
                "dare: doubling solution leaves spectral radius {:.6}, refining",
                closed.spectral_radius
            );
            steps
        }
        Err(DmdcError::RiccatiNotConverged { iterations, change }) => {
            debug!("dare: doubling stalled after {iterations} steps (change {change:e}), refining");
            iterations
        }
        Err(e) => return Err(e),
    };

    let delta = SEED_REGULARIZATION * q.norm_l2().max(1.0);
    let mut q_seed = q.clone();
    for i in 0..n {
        q_seed[(i, i)] += delta;
    }
    let (p_seed, seed_steps) = doubling(a, b, &q_seed, r, config)?;
    let seed = ClosedLoop::from_riccati(a, b, r, &p_seed)?;
    newton(a, b, q, r, seed, config, spent + seed_steps)
}

/// Doubling iteration from H₀ = Q; returns the limit of Hₖ and the steps taken.
fn doubling(
    a: &Mat<f64>,
    b: &Mat<f64>,
    q: &Mat<f64>,
    r: &Mat<f64>,
    config: &LqrConfig,
) -> Result<(Mat<f64>, usize), DmdcError> {
    let n = a.nrows();
    let identity = Mat::<f64>::identity(n, n);
    let r_inv_bt = solve(r, &b.transpose().to_owned())?;
    let mut g = b * &r_inv_bt;
    let mut h = q.clone();
    let mut ak = a.clone();
    let mut change = f64::INFINITY;

    for iteration in 1..=config.max_iter {
        let w = &identity + &(&g * &h);
        let w_inv_a = solve(&w, &ak)?;
        let w_inv_g = solve(&w, &g)?;
        let akt = ak.transpose().to_owned();

        let h_next = &h + &(&(&akt * &h) * &w_inv_a);
        let g_next = &g + &(&(&ak * &w_inv_g) * &akt);
        let a_next = &ak * &w_inv_a;

        if !all_finite(&h_next) || !all_finite(&g_next) {
            return Err(DmdcError::RiccatiNotConverged {
                iterations: iteration,
                change: f64::INFINITY,
            });
        }

        change = (&h_next - &h).norm_l2();
        let scale = h_next.norm_l2().max(1.0);
        h = symmetrize(&h_next);
        g = symmetrize(&g_next);
        ak = a_next;

        if change <= config.tol * scale {
            return Ok((h, iteration));
        }
    }

    Err(DmdcError::RiccatiNotConverged {
        iterations: config.max_iter,
        change,
    })
}

/// Hewer's iteration from a stabilizing gain.
fn newton(
    a: &Mat<f64>,
    b: &Mat<f64>,
    q: &Mat<f64>,
    r: &Mat<f64>,
    mut closed: ClosedLoop,
    config: &LqrConfig,
    mut iterations: usize,
) -> Result<DareSolution, DmdcError> {
    let mut previous: Option<Mat<f64>> = None;
    let mut change = f64::INFINITY;

    for _ in 0..config.max_iter {
        if closed.spectral_radius >= 1.0 {
            return Err(DmdcError::UnstabilizableSystem(format!(
                "no stabilizing Riccati solution for these weights (closed-loop spectral radius {:.6})",
                closed.spectral_radius
            )));
        }
        iterations += 1;

        let a_cl = a - &(b * &closed.k);
        let kt = closed.k.transpose().to_owned();
        let weight = q + &(&(&kt * r) * &closed.k);
        let p = solve_stein(&a_cl, &weight, config)?;
        let next = ClosedLoop::from_riccati(a, b, r, &p)?;

        if let Some(prev) = &previous {
            change = (&p - prev).norm_l2();
            if change <= config.tol * p.norm_l2().max(1.0) && next.spectral_radius < 1.0 {
                return Ok(next.into_solution(p, iterations));
            }
        }
        previous = Some(p);
        closed = next;
    }

    Err(DmdcError::RiccatiNotConverged { iterations, change })
}

/// Solve X = ΦᵀXΦ + W for Schur-stable Φ by squaring: X ← X + ΦₖᵀXΦₖ, Φₖ₊₁ = Φₖ².
fn solve_stein(phi: &Mat<f64>, w: &Mat<f64>, config: &LqrConfig) -> Result<Mat<f64>, DmdcError> {
    let mut x = w.clone();
    let mut phi_k = phi.clone();
    let mut change = f64::INFINITY;

    for iteration in 1..=config.max_iter {
        let increment = &(&phi_k.transpose().to_owned() * &x) * &phi_k;
        x = symmetrize(&(&x + &increment));
        if !all_finite(&x) {
            return Err(DmdcError::RiccatiNotConverged {
                iterations: iteration,
                change: f64::INFINITY,
            });
        }
        change = increment.norm_l2();
        if change <= config.tol * x.norm_l2().max(1.0) {
            return Ok(x);
        }
        phi_k = &phi_k * &phi_k;
    }

    Err(DmdcError::RiccatiNotConverged {
        iterations: config.max_iter,
        change,
    })
}

/// PBH test: every eigenvalue λ of A with |λ| ≥ 1 needs rank [λI − A, B] = n.
///
/// The complex rank is read off the real embedding
/// [[Re M, −Im M], [Im M, Re M]], whose rank is twice that of M.
pub fn check_stabilizable(a: &Mat<f64>, b: &Mat<f64>) -> Result<(), DmdcError> {
    let n = a.nrows();
    let m = b.ncols();
    for lambda in eigenvalues(a)? {
        if lambda.norm() < 1.0 {
            continue;
        }
        let cols = n + m;
        let mut embed = Mat::<f64>::zeros(2 * n, 2 * cols);
        for i in 0..n {
            for j in 0..n {
                let shift = if i == j { lambda.re } else { 0.0 };
                let re = shift - a[(i, j)];
                embed[(i, j)] = re;
                embed[(n + i, cols + j)] = re;
            }
            for j in 0..m {
                embed[(i, n + j)] = b[(i, j)];
                embed[(n + i, cols + n + j)] = b[(i, j)];
            }
            // Im M = [βI, 0]
            embed[(i, cols + i)] = -lambda.im;
            embed[(n + i, i)] = lambda.im;
        }
        let rank = numerical_rank(&embed, PBH_RANK_TOL)?;
        if rank < 2 * n {
            return Err(DmdcError::UnstabilizableSystem(format!(
                "mode λ = {lambda} (|λ| = {:.6}) is not reachable from the inputs",
                lambda.norm()
            )));
        }
    }
    Ok(())
}

fn validate_weight(
    w: &Mat<f64>,
    name: &str,
    dim: usize,
    positive_definite: bool,
) -> Result<(), DmdcError> {
    if w.nrows() != dim || w.ncols() != dim {
        return Err(DmdcError::shape(
            "lqr",
            format!("{name} is {}x{}, expected {dim}x{dim}", w.nrows(), w.ncols()),
        ));
    }
    validate_matrix(w, "lqr", dim, dim)?;
    let scale = w.norm_l2().max(1.0);
    for i in 0..dim {
        for j in (i + 1)..dim {
            if (w[(i, j)] - w[(j, i)]).abs() > 1e-12 * scale {
                return Err(DmdcError::InvalidInput(format!(
                    "{name} is not symmetric at ({i}, {j})"
                )));
            }
        }
        let d = w[(i, i)];
        if positive_definite && d <= 0.0 {
            return Err(DmdcError::InvalidInput(format!(
                "{name}[{i},{i}] = {d} must be positive"
            )));
        }
        if !positive_definite && d < 0.0 {
            return Err(DmdcError::InvalidInput(format!(
                "{name}[{i},{i}] = {d} must be non-negative"
            )));
        }
    }
    Ok(())
}
