use faer::Mat;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Standard deviation of all entries of `m` taken together.
pub fn matrix_std(m: &Mat<f64>) -> f64 {
    let count = (m.nrows() * m.ncols()) as f64;
    if count == 0.0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            sum += m[(i, j)];
        }
    }
    let mean = sum / count;
    let mut var = 0.0;
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            let d = m[(i, j)] - mean;
            var += d * d;
        }
    }
    (var / count).sqrt()
}

/// Add zero-mean Gaussian noise with σ = `scale` · std(m) to every entry.
pub fn perturb<R: Rng>(m: &Mat<f64>, scale: f64, rng: &mut R) -> anyhow::Result<Mat<f64>> {
    let sigma = scale * matrix_std(m);
    let mut out = m.clone();
    if sigma == 0.0 {
        return Ok(out);
    }
    let normal = Normal::new(0.0, sigma)?;
    for j in 0..out.ncols() {
        for i in 0..out.nrows() {
            out[(i, j)] += normal.sample(rng);
        }
    }
    Ok(out)
}
