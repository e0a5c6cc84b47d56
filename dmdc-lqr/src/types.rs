use faer::Mat;

/// Default singular-value threshold for rank truncation.
pub const DEFAULT_THRESHOLD: f64 = 1e-10;

/// Error types for identification, synthesis and simulation.
#[derive(Debug, thiserror::Error)]
pub enum DmdcError {
    #[error("shape mismatch in {stage}: {detail}")]
    ShapeMismatch { stage: &'static str, detail: String },

    #[error(
        "degenerate model: {matrix} ({rows}x{cols}) has no singular value above {threshold:e}"
    )]
    DegenerateModel {
        matrix: &'static str,
        rows: usize,
        cols: usize,
        threshold: f64,
    },

    #[error("unstabilizable system: {0}")]
    UnstabilizableSystem(String),

    #[error("Riccati iteration did not converge after {iterations} iterations (change {change:e})")]
    RiccatiNotConverged { iterations: usize, change: f64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("SVD computation failed: {0}")]
    SvdFailed(String),

    #[error("eigendecomposition failed: {0}")]
    EigenFailed(String),

    #[error("linear solve failed: {0}")]
    SolveFailed(String),
}

impl DmdcError {
    pub(crate) fn shape(stage: &'static str, detail: impl Into<String>) -> Self {
        DmdcError::ShapeMismatch {
            stage,
            detail: detail.into(),
        }
    }
}

/// Advisory numerical diagnostics. Attached to results, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericalWarning {
    /// A singular value lies within the configured ratio of the threshold,
    /// so the truncation rank is sensitive to noise.
    NearThreshold {
        matrix: &'static str,
        index: usize,
        singular_value: f64,
        threshold: f64,
    },
    /// The retained singular values span more than the configured bound.
    IllConditioned {
        matrix: &'static str,
        condition_number: f64,
        bound: f64,
    },
}

impl std::fmt::Display for NumericalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericalWarning::NearThreshold {
                matrix,
                index,
                singular_value,
                threshold,
            } => write!(
                f,
                "{matrix}: singular value #{index} = {singular_value:e} is close to threshold {threshold:e}"
            ),
            NumericalWarning::IllConditioned {
                matrix,
                condition_number,
                bound,
            } => write!(
                f,
                "{matrix}: condition number {condition_number:e} exceeds {bound:e}"
            ),
        }
    }
}

/// Configuration for DMDc identification.
#[derive(Debug, Clone)]
pub struct DmdcConfig {
    /// Singular values strictly above this are retained.
    pub threshold: f64,
    /// Condition number of the retained Σ̃ above which a warning is attached.
    pub condition_bound: f64,
    /// A singular value within `[ε / ratio, ε · ratio]` is reported as near the threshold.
    pub near_threshold_ratio: f64,
}

impl Default for DmdcConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            condition_bound: 1e8,
            near_threshold_ratio: 10.0,
        }
    }
}

/// Configuration for the discrete algebraic Riccati solver.
#[derive(Debug, Clone)]
pub struct LqrConfig {
    /// Maximum number of doubling or Newton steps per stage.
    pub max_iter: usize,
    /// Relative change in P below which the iteration stops.
    pub tol: f64,
}

impl Default for LqrConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-12,
        }
    }
}

/// Identified discrete-time model x[k+1] = A·x[k] + B·u[k].
#[derive(Debug, Clone)]
pub struct LinearModel {
    /// State-transition matrix (n × n).
    pub a: Mat<f64>,
    /// Input matrix (n × m).
    pub b: Mat<f64>,
}

/// Quadratic cost weights for LQR synthesis.
#[derive(Debug, Clone)]
pub struct CostWeights {
    /// State weight (n × n).
    pub q: Mat<f64>,
    /// Control weight (m × m).
    pub r: Mat<f64>,
}

impl CostWeights {
    /// Build diagonal weights from their diagonal entries.
    pub fn diagonal(q_diag: &[f64], r_diag: &[f64]) -> Self {
        Self {
            q: diag(q_diag),
            r: diag(r_diag),
        }
    }
}

fn diag(values: &[f64]) -> Mat<f64> {
    let n = values.len();
    let mut m = Mat::<f64>::zeros(n, n);
    for (i, &v) in values.iter().enumerate() {
        m[(i, i)] = v;
    }
    m
}

/// Complex number type (re, im).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct C64 {
    pub re: f64,
    pub im: f64,
}

impl C64 {
    /// Create a new complex number.
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    /// Magnitude |z| = sqrt(re² + im²).
    pub fn norm(&self) -> f64 {
        self.re.hypot(self.im)
    }
}

impl std::fmt::Display for C64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.im >= 0.0 {
            write!(f, "{:.6}+{:.6}i", self.re, self.im)
        } else {
            write!(f, "{:.6}-{:.6}i", self.re, -self.im)
        }
    }
}

/// Error metrics of a closed-loop rollout against its reference.
#[derive(Debug, Clone)]
pub struct TrackingMetrics {
    /// Root mean square error over all states and samples.
    pub rmse: f64,
    /// Per-state RMSE.
    pub per_state_rmse: Vec<f64>,
    /// Largest absolute error of any state at any sample.
    pub max_abs_error: f64,
    /// Euclidean norm of the error at the last compared sample.
    pub final_error: f64,
}
