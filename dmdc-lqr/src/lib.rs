//! # dmdc-lqr
//!
//! Data-driven linear models and optimal feedback for multirotors.
//!
//! This library identifies a discrete-time model x[k+1] = A·x[k] + B·u[k]
//! from recorded state and input trajectories, then designs and checks a
//! static LQR gain for it:
//!
//! - **Regression matrices** ([`build_snapshots`]): shifted state pair and Ω = [X; U]
//! - **Truncated SVD** ([`truncated_svd`]): threshold-based rank selection
//! - **DMDc** ([`dmdc()`]): recover A and B through the pseudoinverse of the truncated Σ
//! - **LQR** ([`dlqr`], [`solve_dare`]): stabilizing DARE solution and gain K
//! - **Closed loop** ([`simulate_closed_loop`], [`evaluate`]): reference tracking rollouts
//! - **Pipeline** ([`run_pipeline`], [`PipelineConfig`]): all of the above from a TOML config
//!
//! ## Quick Start
//!
//! ```rust
//! use dmdc_lqr::{dlqr, dmdc, simulate_closed_loop, CostWeights, DmdcConfig, LqrConfig};
//!
//! // Scalar system x[k+1] = 0.9 x[k] + 0.5 u[k] driven by a varying input
//! let n = 40;
//! let mut x = faer::Mat::<f64>::zeros(1, n);
//! let mut u = faer::Mat::<f64>::zeros(1, n - 1);
//! x[(0, 0)] = 1.0;
//! for k in 0..n - 1 {
//!     u[(0, k)] = (0.3 * k as f64).sin();
//!     x[(0, k + 1)] = 0.9 * x[(0, k)] + 0.5 * u[(0, k)];
//! }
//!
//! let result = dmdc(&x, &u, &DmdcConfig::default()).unwrap();
//! let weights = CostWeights::diagonal(&[1.0], &[0.1]);
//! let gain = dlqr(&result.model, &weights, &LqrConfig::default()).unwrap();
//!
//! let reference = faer::Mat::<f64>::zeros(1, 20);
//! let traj = simulate_closed_loop(&result.model, &gain.k, &reference, Some(&[1.0])).unwrap();
//! assert_eq!(traj.states.ncols(), 21);
//! ```
//!
//! ## References
//!
//! - Proctor, Brunton & Kutz (2016), *SIAM J. Appl. Dyn. Syst.*, 15(1), 142-161
//! - Chu, Fan, Lin & Wang (2004), *Int. J. Control*, 77(8), 767-788
//! - Hewer (1971), *IEEE Trans. Autom. Control*, 16(4), 382-384

pub mod config;
pub mod types;

pub mod dmdc;
pub mod lqr;
pub mod model;
pub mod pipeline;
pub mod regression;
pub mod simulate;
pub mod svd;
pub mod utils;

pub use config::{ConfigError, ControlConfig, IdentificationConfig, PipelineConfig};
pub use dmdc::{dmdc, DmdcResult, ReducedModel};
pub use lqr::{check_stabilizable, dlqr, feedback, solve_dare, DareSolution, LqrGain};
pub use pipeline::{
    evaluate, rollout, run_pipeline, Dataset, Evaluation, PipelineReport, PipelineSettings,
    Rollout,
};
pub use regression::{build_snapshots, Snapshots};
pub use simulate::{simulate_closed_loop, tracking_metrics, SimulatedTrajectory};
pub use svd::{rank_profile, truncated_svd, truncation_rank, TruncatedSvd};
pub use types::{
    CostWeights, DmdcConfig, DmdcError, LinearModel, LqrConfig, NumericalWarning, TrackingMetrics,
    C64, DEFAULT_THRESHOLD,
};
