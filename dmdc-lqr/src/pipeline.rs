use faer::Mat;
use log::{info, warn};

use crate::dmdc::{dmdc, DmdcResult};
use crate::lqr::{dlqr, LqrGain};
use crate::simulate::{simulate_closed_loop, tracking_metrics, SimulatedTrajectory};
use crate::types::{
    CostWeights, DmdcConfig, DmdcError, LinearModel, LqrConfig, NumericalWarning, TrackingMetrics,
};

/// Recorded trajectories used for identification.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// State matrix (n × T).
    pub states: Mat<f64>,
    /// Input matrix (m × (T-1)).
    pub inputs: Mat<f64>,
    /// Reference the vehicle was flown against (n × T_ref).
    pub reference: Mat<f64>,
}

/// One closed-loop rollout and how well it tracked its reference.
#[derive(Debug, Clone)]
pub struct Rollout {
    pub trajectory: SimulatedTrajectory,
    pub metrics: TrackingMetrics,
}

/// Rollouts of the same (A, B, K) against two references.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Against the reference of the identification dataset.
    pub training: Rollout,
    /// Against the held-out reference.
    pub validation: Rollout,
}

/// Settings for a full identification → synthesis → evaluation run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub dmdc: DmdcConfig,
    pub weights: CostWeights,
    pub lqr: LqrConfig,
}

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub identification: DmdcResult,
    pub gain: LqrGain,
    pub evaluation: Evaluation,
}

impl PipelineReport {
    /// Identified (A, B).
    pub fn model(&self) -> &LinearModel {
        &self.identification.model
    }

    /// Advisory warnings raised along the way.
    pub fn warnings(&self) -> &[NumericalWarning] {
        &self.identification.warnings
    }
}

/// Simulate one reference and score the result.
pub fn rollout(
    model: &LinearModel,
    gain: &LqrGain,
    reference: &Mat<f64>,
) -> Result<Rollout, DmdcError> {
    let trajectory = simulate_closed_loop(model, &gain.k, reference, None)?;
    let metrics = tracking_metrics(&trajectory, reference)?;
    Ok(Rollout {
        trajectory,
        metrics,
    })
}

/// Run the closed loop against the training reference and a held-out one.
///
/// Both rollouts share the same model and gain; only the reference differs.
pub fn evaluate(
    model: &LinearModel,
    gain: &LqrGain,
    training_reference: &Mat<f64>,
    validation_reference: &Mat<f64>,
) -> Result<Evaluation, DmdcError> {
    let training = rollout(model, gain, training_reference)?;
    let validation = rollout(model, gain, validation_reference)?;
    Ok(Evaluation {
        training,
        validation,
    })
}

/// Identify (A, B), synthesize K, and evaluate on both references.
pub fn run_pipeline(
    identification: &Dataset,
    validation_reference: &Mat<f64>,
    settings: &PipelineSettings,
) -> Result<PipelineReport, DmdcError> {
    let result = dmdc(&identification.states, &identification.inputs, &settings.dmdc)?;
    let (n, m, n_time) = result.data_dim;
    info!(
        "identified {n}-state / {m}-input model from {n_time} samples: rank {} (output rank {}), fit residual {:.3e}",
        result.rank(),
        result.output_rank(),
        result.fit_residual
    );

    let gain = dlqr(&result.model, &settings.weights, &settings.lqr)?;
    info!(
        "lqr gain: closed-loop spectral radius {:.6} after {} doubling steps",
        gain.spectral_radius, gain.iterations
    );

    let evaluation = evaluate(
        &result.model,
        &gain,
        &identification.reference,
        validation_reference,
    )?;
    info!(
        "tracking rmse: training {:.4e}, validation {:.4e}",
        evaluation.training.metrics.rmse, evaluation.validation.metrics.rmse
    );
    if !result.warnings.is_empty() {
        warn!("{} numerical warning(s) during identification", result.warnings.len());
    }

    Ok(PipelineReport {
        identification: result,
        gain,
        evaluation,
    })
}
