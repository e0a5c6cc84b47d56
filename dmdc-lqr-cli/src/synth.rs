//! Synthetic near-hover multirotor flights.
//!
//! State is [x, y, z, vx, vy, vz], input is [roll, pitch, yaw rate, thrust]
//! with thrust measured as vertical acceleration above hover. Heading is a
//! hidden state, so the recorded data is only approximately linear.

use faer::Mat;
use rand::Rng;
use rand_distr::{Distribution, Normal};

pub const N_STATES: usize = 6;
pub const N_INPUTS: usize = 4;

const GRAVITY: f64 = 9.81;
const LINEAR_DRAG: f64 = 0.05;
const QUADRATIC_DRAG: f64 = 0.02;
const MAX_TILT: f64 = 0.35;
const MAX_THRUST: f64 = 4.0;

const KP: f64 = 1.2;
const KD: f64 = 1.8;
const K_YAW: f64 = 0.8;

/// Dither standard deviations for [roll, pitch, yaw rate, thrust].
const DITHER: [f64; N_INPUTS] = [0.03, 0.03, 0.05, 0.3];

/// Recorded state and input history of one flight.
#[derive(Debug, Clone)]
pub struct Flight {
    /// n × T
    pub states: Mat<f64>,
    /// m × (T-1)
    pub inputs: Mat<f64>,
}

/// Rising helix around the origin, used as the identification reference.
pub fn helix(samples: usize, dt: f64) -> Mat<f64> {
    let (radius, omega, climb) = (1.5, 0.4, 0.05);
    let mut r = Mat::<f64>::zeros(N_STATES, samples);
    for k in 0..samples {
        let t = k as f64 * dt;
        let (s, c) = (omega * t).sin_cos();
        r[(0, k)] = radius * c;
        r[(1, k)] = radius * s;
        r[(2, k)] = 1.0 + climb * t;
        r[(3, k)] = -radius * omega * s;
        r[(4, k)] = radius * omega * c;
        r[(5, k)] = climb;
    }
    r
}

/// Level figure-eight, used as the held-out reference.
pub fn figure_eight(samples: usize, dt: f64) -> Mat<f64> {
    let (radius, omega, height) = (1.2, 0.5, 1.5);
    let mut r = Mat::<f64>::zeros(N_STATES, samples);
    for k in 0..samples {
        let t = k as f64 * dt;
        r[(0, k)] = radius * (omega * t).sin();
        r[(1, k)] = 0.5 * radius * (2.0 * omega * t).sin();
        r[(2, k)] = height;
        r[(3, k)] = radius * omega * (omega * t).cos();
        r[(4, k)] = radius * omega * (2.0 * omega * t).cos();
    }
    r
}

/// Fly the reference with a dithered PD controller and record everything.
pub fn fly<R: Rng>(reference: &Mat<f64>, dt: f64, rng: &mut R) -> anyhow::Result<Flight> {
    let samples = reference.ncols();
    anyhow::ensure!(samples >= 2, "need at least 2 samples, got {samples}");
    anyhow::ensure!(
        reference.nrows() == N_STATES,
        "reference has {} rows, expected {N_STATES}",
        reference.nrows()
    );

    let dither = DITHER
        .iter()
        .map(|&sd| Normal::new(0.0, sd))
        .collect::<Result<Vec<_>, _>>()?;

    let mut states = Mat::<f64>::zeros(N_STATES, samples);
    let mut inputs = Mat::<f64>::zeros(N_INPUTS, samples - 1);
    for i in 0..N_STATES {
        states[(i, 0)] = reference[(i, 0)];
    }
    let mut heading = 0.0_f64;

    for k in 0..samples - 1 {
        let mut accel = [0.0; 3];
        for (axis, a) in accel.iter_mut().enumerate() {
            let e = reference[(axis, k)] - states[(axis, k)];
            let ev = reference[(axis + 3, k)] - states[(axis + 3, k)];
            let feedforward = (reference[(axis + 3, k + 1)] - reference[(axis + 3, k)]) / dt;
            *a = feedforward + KP * e + KD * ev;
        }

        // tilt commands in the body frame
        let (s, c) = heading.sin_cos();
        let pitch = ((accel[0] * c + accel[1] * s) / GRAVITY).clamp(-MAX_TILT, MAX_TILT);
        let roll = ((accel[0] * s - accel[1] * c) / GRAVITY).clamp(-MAX_TILT, MAX_TILT);
        let yaw_rate = -K_YAW * heading;
        let thrust = accel[2].clamp(-MAX_THRUST, MAX_THRUST);

        let command = [roll, pitch, yaw_rate, thrust];
        for (j, (&u, d)) in command.iter().zip(&dither).enumerate() {
            inputs[(j, k)] = u + d.sample(rng);
        }

        let (roll, pitch, yaw_rate, thrust) = (
            inputs[(0, k)],
            inputs[(1, k)],
            inputs[(2, k)],
            inputs[(3, k)],
        );
        let world = [
            GRAVITY * (pitch * c + roll * s),
            GRAVITY * (pitch * s - roll * c),
            thrust,
        ];
        for axis in 0..3 {
            let v = states[(axis + 3, k)];
            let drag = LINEAR_DRAG * v + QUADRATIC_DRAG * v * v.abs();
            states[(axis, k + 1)] = states[(axis, k)] + dt * v;
            states[(axis + 3, k + 1)] = v + dt * (world[axis] - drag);
        }
        heading += dt * yaw_rate;
    }

    Ok(Flight { states, inputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_reference_shapes_and_start() {
        let r = helix(50, 0.02);
        assert_eq!((r.nrows(), r.ncols()), (N_STATES, 50));
        assert_abs_diff_eq!(r[(0, 0)], 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(r[(2, 0)], 1.0, epsilon = 1e-12);

        let f = figure_eight(30, 0.02);
        assert_eq!(f.ncols(), 30);
        assert_abs_diff_eq!(f[(0, 0)], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f[(2, 29)], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_flight_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let flight = fly(&helix(200, 0.02), 0.02, &mut rng).unwrap();
        assert_eq!((flight.states.nrows(), flight.states.ncols()), (6, 200));
        assert_eq!((flight.inputs.nrows(), flight.inputs.ncols()), (4, 199));
    }

    #[test]
    fn test_flight_follows_reference() {
        let mut rng = StdRng::seed_from_u64(3);
        let reference = figure_eight(1500, 0.02);
        let flight = fly(&reference, 0.02, &mut rng).unwrap();
        for axis in 0..3 {
            let e = (flight.states[(axis, 1499)] - reference[(axis, 1499)]).abs();
            assert!(e < 0.5, "axis {axis} error {e}");
        }
    }

    #[test]
    fn test_flight_is_seeded() {
        let reference = helix(100, 0.02);
        let a = fly(&reference, 0.02, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = fly(&reference, 0.02, &mut StdRng::seed_from_u64(9)).unwrap();
        for i in 0..N_STATES {
            assert_eq!(a.states[(i, 99)].to_bits(), b.states[(i, 99)].to_bits());
        }
    }

    #[test]
    fn test_short_reference_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(fly(&helix(1, 0.02), 0.02, &mut rng).is_err());
    }
}
