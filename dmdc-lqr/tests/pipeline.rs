//! End-to-end identification, synthesis and closed-loop tests.

use approx::assert_abs_diff_eq;
use dmdc_lqr::*;
use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DT: f64 = 0.1;
const DRAG: f64 = 0.98;

/// Near-hover translational dynamics: [x, y, z, vx, vy, vz] driven by
/// [roll, pitch, yaw, thrust].
fn hover_system() -> (Mat<f64>, Mat<f64>) {
    let mut a = Mat::<f64>::zeros(6, 6);
    for i in 0..3 {
        a[(i, i)] = 1.0;
        a[(i, i + 3)] = DT;
        a[(i + 3, i + 3)] = DRAG;
    }
    let mut b = Mat::<f64>::zeros(6, 4);
    // roll tilts into -y, pitch into +x, thrust lifts
    b[(4, 0)] = -DT;
    b[(3, 1)] = DT;
    b[(5, 3)] = DT;
    // yaw leaks slightly into the horizontal axes
    b[(3, 2)] = 0.02 * DT;
    b[(4, 2)] = 0.05 * DT;
    (a, b)
}

fn excite(a: &Mat<f64>, b: &Mat<f64>, n_time: usize) -> (Mat<f64>, Mat<f64>) {
    let n = a.nrows();
    let m = b.ncols();
    let mut x = Mat::<f64>::zeros(n, n_time);
    let mut u = Mat::<f64>::zeros(m, n_time - 1);
    for k in 0..n_time - 1 {
        let t = k as f64;
        for j in 0..m {
            let jf = j as f64;
            u[(j, k)] = ((0.31 + 0.47 * jf) * t).sin() + 0.5 * ((1.3 + 0.29 * jf) * t + jf).cos();
        }
        for i in 0..n {
            let mut val = 0.0;
            for j in 0..n {
                val += a[(i, j)] * x[(j, k)];
            }
            for j in 0..m {
                val += b[(i, j)] * u[(j, k)];
            }
            x[(i, k + 1)] = val;
        }
    }
    (x, u)
}

fn hold_reference(position: [f64; 3], n_time: usize) -> Mat<f64> {
    let mut r = Mat::<f64>::zeros(6, n_time);
    for k in 0..n_time {
        for i in 0..3 {
            r[(i, k)] = position[i];
        }
    }
    r
}

fn weights() -> CostWeights {
    CostWeights::diagonal(&[1.0; 6], &[0.1; 4])
}

// ============================================================================
// Identification
// ============================================================================

#[test]
fn dmdc_reconstructs_noise_free_hover_model() {
    let (a_true, b_true) = hover_system();
    let (x, u) = excite(&a_true, &b_true, 200);
    let result = dmdc(&x, &u, &DmdcConfig::default()).unwrap();

    assert_eq!(result.data_dim, (6, 4, 200));
    assert_eq!(result.rank(), 10);
    for i in 0..6 {
        for j in 0..6 {
            assert_abs_diff_eq!(result.model.a[(i, j)], a_true[(i, j)], epsilon = 1e-6);
        }
        for j in 0..4 {
            assert_abs_diff_eq!(result.model.b[(i, j)], b_true[(i, j)], epsilon = 1e-6);
        }
    }
    assert!(result.fit_residual < 1e-8);
}

#[test]
fn rank_is_monotone_in_threshold() {
    let (a_true, b_true) = hover_system();
    let (x, u) = excite(&a_true, &b_true, 120);
    let snap = build_snapshots(&x, &u).unwrap();

    let thresholds = [0.0, 1e-10, 1e-6, 1e-3, 1e-1, 1.0, 10.0, 1e6];
    let profile = rank_profile(&snap.omega, &thresholds).unwrap();
    assert_eq!(profile.len(), thresholds.len());
    for pair in profile.windows(2) {
        assert!(pair[0].1 >= pair[1].1, "rank grew: {pair:?}");
    }
    assert_eq!(profile.last().map(|p| p.1), Some(0));
}

#[test]
fn shape_mismatch_reported_before_any_decomposition() {
    let x = Mat::<f64>::zeros(6, 50);
    let u = Mat::<f64>::zeros(4, 48);
    match dmdc(&x, &u, &DmdcConfig::default()) {
        Err(DmdcError::ShapeMismatch { stage, .. }) => assert_eq!(stage, "regression"),
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
}

#[test]
fn all_zero_data_is_degenerate() {
    let x = Mat::<f64>::zeros(6, 50);
    let u = Mat::<f64>::zeros(4, 49);
    assert!(matches!(
        dmdc(&x, &u, &DmdcConfig::default()),
        Err(DmdcError::DegenerateModel { matrix: "omega", .. })
    ));
}

#[test]
fn non_finite_samples_rejected() {
    let (a_true, b_true) = hover_system();
    let (mut x, u) = excite(&a_true, &b_true, 30);
    x[(2, 7)] = f64::NAN;
    assert!(matches!(
        dmdc(&x, &u, &DmdcConfig::default()),
        Err(DmdcError::InvalidInput(_))
    ));
}

// ============================================================================
// Synthesis
// ============================================================================

#[test]
fn gain_stabilizes_identified_model() {
    let (a_true, b_true) = hover_system();
    let (x, u) = excite(&a_true, &b_true, 200);
    let result = dmdc(&x, &u, &DmdcConfig::default()).unwrap();
    assert!(result.model.is_controllable(1e-10).unwrap());

    let gain = dlqr(&result.model, &weights(), &LqrConfig::default()).unwrap();
    assert_eq!((gain.k.nrows(), gain.k.ncols()), (4, 6));
    assert!(gain.spectral_radius < 1.0);
    assert!(gain.riccati_residual < 1e-6);

    let a_cl = &result.model.a - &(&result.model.b * &gain.k);
    let rho = utils::spectral_radius(&a_cl).unwrap();
    assert_abs_diff_eq!(rho, gain.spectral_radius, epsilon = 1e-10);

    // P is symmetric and positive definite along the axes
    for i in 0..6 {
        assert!(gain.p[(i, i)] > 0.0);
        for j in 0..6 {
            assert_abs_diff_eq!(gain.p[(i, j)], gain.p[(j, i)], epsilon = 1e-9);
        }
    }
}

#[test]
fn unreachable_drifting_mode_is_unstabilizable() {
    let (mut a, mut b) = hover_system();
    // z axis loses its actuator and gains a slow divergence
    b[(5, 3)] = 0.0;
    a[(5, 5)] = 1.01;
    let model = LinearModel::new(a, b).unwrap();
    assert!(matches!(
        dlqr(&model, &weights(), &LqrConfig::default()),
        Err(DmdcError::UnstabilizableSystem(_))
    ));
}

#[test]
fn velocity_weights_may_be_zero() {
    let (a, b) = hover_system();
    let model = LinearModel::new(a, b).unwrap();
    let weights = CostWeights::diagonal(&[1.0, 1.0, 1.0, 0.0, 0.0, 0.0], &[0.1; 4]);
    let gain = dlqr(&model, &weights, &LqrConfig::default()).unwrap();

    assert!(gain.spectral_radius < 1.0);
    assert!(gain.riccati_residual < 1e-6);
    let a_cl = &model.a - &(&model.b * &gain.k);
    assert_abs_diff_eq!(
        utils::spectral_radius(&a_cl).unwrap(),
        gain.spectral_radius,
        epsilon = 1e-10
    );
}

#[test]
fn unweighted_drifting_mode_is_still_stabilized() {
    let (mut a, b) = hover_system();
    // altitude settles on its own while vertical speed slowly diverges,
    // and neither carries any state weight
    a[(2, 2)] = 0.9;
    a[(5, 5)] = 1.01;
    let model = LinearModel::new(a, b).unwrap();
    let weights = CostWeights::diagonal(&[1.0, 1.0, 0.0, 1.0, 1.0, 0.0], &[0.1; 4]);
    let gain = dlqr(&model, &weights, &LqrConfig::default()).unwrap();

    assert!(gain.spectral_radius < 1.0);
    assert!(gain.riccati_residual < 1e-6);
    // the cheapest stabilizing law mirrors 1.01 inside the unit circle
    assert!(gain
        .closed_loop_eigenvalues
        .iter()
        .any(|lambda| (lambda.norm() - 1.0 / 1.01).abs() < 1e-6));
    for i in 0..6 {
        assert!(gain.p[(i, i)] >= 0.0);
        for j in 0..6 {
            assert_abs_diff_eq!(gain.p[(i, j)], gain.p[(j, i)], epsilon = 1e-9);
        }
    }
}

// ============================================================================
// Closed loop
// ============================================================================

#[test]
fn rollout_is_deterministic() {
    let (a, b) = hover_system();
    let model = LinearModel::new(a, b).unwrap();
    let gain = dlqr(&model, &weights(), &LqrConfig::default()).unwrap();

    let mut reference = Mat::<f64>::zeros(6, 150);
    for k in 0..150 {
        let t = k as f64 * DT;
        reference[(0, k)] = t.cos();
        reference[(1, k)] = t.sin();
        reference[(2, k)] = 1.0 + 0.1 * t;
    }
    let first = simulate_closed_loop(&model, &gain.k, &reference, None).unwrap();
    let second = simulate_closed_loop(&model, &gain.k, &reference, None).unwrap();
    for i in 0..6 {
        for k in 0..=150 {
            assert_eq!(first.states[(i, k)].to_bits(), second.states[(i, k)].to_bits());
        }
    }
    for i in 0..4 {
        for k in 0..150 {
            assert_eq!(
                first.controls[(i, k)].to_bits(),
                second.controls[(i, k)].to_bits()
            );
        }
    }
}

#[test]
fn constant_hold_reference_is_tracked() {
    let (a_true, b_true) = hover_system();
    let (x, u) = excite(&a_true, &b_true, 200);
    let result = dmdc(&x, &u, &DmdcConfig::default()).unwrap();
    let gain = dlqr(&result.model, &weights(), &LqrConfig::default()).unwrap();

    let reference = hold_reference([1.0, -0.5, 2.0], 400);
    let traj =
        simulate_closed_loop(&result.model, &gain.k, &reference, Some(&[0.0; 6])).unwrap();
    let metrics = tracking_metrics(&traj, &reference).unwrap();

    assert!(metrics.max_abs_error >= 2.0);
    assert!(metrics.final_error < 1e-6, "final error {}", metrics.final_error);
    for i in 0..3 {
        assert_abs_diff_eq!(traj.states[(i, 400)], reference[(i, 399)], epsilon = 1e-6);
    }
}

#[test]
fn evaluate_shares_gain_across_references() {
    let (a, b) = hover_system();
    let model = LinearModel::new(a, b).unwrap();
    let gain = dlqr(&model, &weights(), &LqrConfig::default()).unwrap();

    let training = hold_reference([0.5, 0.5, 1.0], 100);
    let mut validation = Mat::<f64>::zeros(6, 80);
    for k in 0..80 {
        let t = k as f64 * DT;
        validation[(0, k)] = (0.5 * t).sin();
        validation[(1, k)] = 0.5 * t.sin();
    }

    let eval = evaluate(&model, &gain, &training, &validation).unwrap();
    assert_eq!(eval.training.trajectory.horizon(), 100);
    assert_eq!(eval.validation.trajectory.horizon(), 80);
    // both rollouts start on their reference
    assert_eq!(eval.training.trajectory.states[(2, 0)], 1.0);
    assert_eq!(eval.validation.trajectory.states[(0, 0)], 0.0);
    assert!(eval.training.metrics.rmse.is_finite());
    assert!(eval.validation.metrics.rmse.is_finite());
}

// ============================================================================
// Full pipeline
// ============================================================================

#[test]
fn pipeline_on_perturbed_data() {
    let (a_true, b_true) = hover_system();
    let (mut x, u) = excite(&a_true, &b_true, 300);
    let mut rng = StdRng::seed_from_u64(7);
    for i in 0..6 {
        for k in 0..300 {
            x[(i, k)] += 1e-4 * rng.gen_range(-1.0..1.0);
        }
    }

    let dataset = Dataset {
        states: x,
        inputs: u,
        reference: hold_reference([1.0, 1.0, 1.0], 200),
    };
    let validation = hold_reference([-1.0, 0.5, 1.5], 200);
    let config = PipelineConfig::from_toml_str(
        r#"
        [control]
        q_diag = [1.0, 1.0, 1.0, 1.0, 1.0, 1.0]
        r_diag = [0.1, 0.1, 0.1, 0.1]
        "#,
    )
    .unwrap();

    let report = run_pipeline(&dataset, &validation, &config.settings()).unwrap();
    assert_eq!(report.model().n_states(), 6);
    assert_eq!(report.model().n_inputs(), 4);
    assert!(report.gain.spectral_radius < 1.0);
    assert!(report.identification.fit_residual < 1e-2);
    assert!(report.evaluation.training.metrics.final_error < 5e-2);
    assert!(report.evaluation.validation.metrics.final_error < 5e-2);
}
