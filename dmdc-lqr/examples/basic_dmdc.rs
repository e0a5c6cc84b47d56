//! Basic DMDc example: identify a damped oscillator, design an LQR gain, track a step.

use dmdc_lqr::{
    dlqr, dmdc, simulate_closed_loop, tracking_metrics, CostWeights, DmdcConfig, LqrConfig,
};

fn main() {
    // Lightly damped oscillator driven by one force input
    let n = 200;
    let (w, zeta, dt) = (2.0_f64, 0.05_f64, 0.05_f64);
    let mut x = faer::Mat::<f64>::zeros(2, n);
    let mut u = faer::Mat::<f64>::zeros(1, n - 1);
    x[(0, 0)] = 1.0;
    for k in 0..n - 1 {
        let t = k as f64 * dt;
        u[(0, k)] = (0.7 * t).sin() + 0.4 * (3.1 * t).cos();
        let (pos, vel) = (x[(0, k)], x[(1, k)]);
        x[(0, k + 1)] = pos + dt * vel;
        x[(1, k + 1)] = vel + dt * (-w * w * pos - 2.0 * zeta * w * vel + u[(0, k)]);
    }

    // Identify (A, B)
    let result = dmdc(&x, &u, &DmdcConfig::default()).unwrap();
    println!("DMDc Identification");
    println!("  Rank: {} (output rank {})", result.rank(), result.output_rank());
    println!("  Fit residual: {:.3e}", result.fit_residual);
    println!(
        "  A = [[{:.4}, {:.4}], [{:.4}, {:.4}]]",
        result.model.a[(0, 0)],
        result.model.a[(0, 1)],
        result.model.a[(1, 0)],
        result.model.a[(1, 1)]
    );
    println!("  B = [{:.4}, {:.4}]", result.model.b[(0, 0)], result.model.b[(1, 0)]);

    // Synthesize K
    let weights = CostWeights::diagonal(&[10.0, 1.0], &[0.1]);
    let gain = dlqr(&result.model, &weights, &LqrConfig::default()).unwrap();
    println!("\nLQR");
    println!("  K = [{:.4}, {:.4}]", gain.k[(0, 0)], gain.k[(0, 1)]);
    println!("  Closed-loop spectral radius: {:.6}", gain.spectral_radius);
    println!("  Riccati iterations: {}", gain.iterations);

    // Track a position step of 0.5
    let mut reference = faer::Mat::<f64>::zeros(2, 300);
    for k in 0..300 {
        reference[(0, k)] = 0.5;
    }
    let traj = simulate_closed_loop(&result.model, &gain.k, &reference, Some(&[0.0, 0.0])).unwrap();
    let metrics = tracking_metrics(&traj, &reference).unwrap();
    println!("\nStep tracking over {} steps:", traj.horizon());
    println!("  RMSE: {:.4}", metrics.rmse);
    println!("  Final error: {:.4e}", metrics.final_error);
    println!("  x[0]: {:.4} -> {:.4}", traj.states[(0, 0)], traj.states[(0, 300)]);
}
