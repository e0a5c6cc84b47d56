mod config;
mod noise;
mod synth;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dmdc_lqr::{run_pipeline, Dataset, PipelineReport};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::RunConfig;

#[derive(Parser, Debug)]
#[command(name = "dmdc-lqr")]
#[command(about = "Identify a multirotor model with DMDc and validate an LQR gain on synthetic flights", long_about = None)]
struct Args {
    /// Pipeline configuration (TOML); defaults apply to anything left out
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override [data].seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override [data].samples
    #[arg(long)]
    samples: Option<usize>,

    /// Print the effective configuration and exit
    #[arg(long, default_value_t = false)]
    print_config: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RunConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.data.seed = seed;
        }
        if let Some(samples) = self.samples {
            config.data.samples = samples;
        }
        config.validate().context("after command-line overrides")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = args.load_config()?;
    if args.print_config {
        print!("{}", toml::to_string(&config)?);
        return Ok(());
    }

    let report = run(&config)?;
    summarize(&report);
    Ok(())
}

/// Fly the training reference, corrupt the recording, and run the pipeline.
fn run(config: &RunConfig) -> anyhow::Result<PipelineReport> {
    let data = &config.data;
    let dt = config.pipeline.sample_period;
    let mut rng = StdRng::seed_from_u64(data.seed);

    let training_reference = synth::helix(data.samples, dt);
    let validation_reference = synth::figure_eight(data.validation_samples, dt);

    let flight = synth::fly(&training_reference, dt, &mut rng).context("synthesizing flight")?;
    info!(
        "flew {} samples ({:.1} s) with seed {}",
        data.samples,
        data.samples as f64 * dt,
        data.seed
    );

    let dataset = Dataset {
        states: noise::perturb(&flight.states, data.state_noise, &mut rng)?,
        inputs: noise::perturb(&flight.inputs, data.input_noise, &mut rng)?,
        reference: training_reference,
    };

    run_pipeline(&dataset, &validation_reference, &config.pipeline.settings()).context("pipeline failed")
}

fn summarize(report: &PipelineReport) {
    let model = report.model();
    info!(
        "model: {} states, {} inputs, open-loop spectral radius {}",
        model.n_states(),
        model.n_inputs(),
        model
            .spectral_radius()
            .map(|rho| format!("{rho:.6}"))
            .unwrap_or_else(|e| format!("unavailable ({e})"))
    );
    info!(
        "gain: closed-loop spectral radius {:.6}, Riccati residual {:.3e}",
        report.gain.spectral_radius, report.gain.riccati_residual
    );

    let eval = &report.evaluation;
    for (name, rollout) in [("training", &eval.training), ("validation", &eval.validation)] {
        let m = &rollout.metrics;
        info!(
            "{name}: rmse {:.4}, max |e| {:.4}, final |e| {:.4}",
            m.rmse, m.max_abs_error, m.final_error
        );
    }
    for w in report.warnings() {
        warn!("{w}");
    }
}
