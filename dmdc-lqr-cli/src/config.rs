//! Run configuration: the library's pipeline tables plus `[data]`.

use std::path::Path;

use anyhow::Context;
use dmdc_lqr::PipelineConfig;
use serde::{Deserialize, Serialize};

/// `[data]` table: how the synthetic flights are produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub seed: u64,
    /// Samples in the identification run.
    pub samples: usize,
    /// Samples in the held-out validation reference.
    pub validation_samples: usize,
    /// Noise standard deviation as a fraction of the state matrix's std.
    pub state_noise: f64,
    /// Noise standard deviation as a fraction of the input matrix's std.
    pub input_noise: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            samples: 1000,
            validation_samples: 1000,
            state_noise: 0.1,
            input_noise: 0.01,
        }
    }
}

impl DataConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.samples >= 2 && self.validation_samples > 0,
            "data.samples must be at least 2 and data.validation_samples positive, got {} and {}",
            self.samples,
            self.validation_samples
        );
        for (name, s) in [("state_noise", self.state_noise), ("input_noise", self.input_noise)] {
            anyhow::ensure!(
                s.is_finite() && s >= 0.0,
                "data.{name} must be non-negative, got {s}"
            );
        }
        Ok(())
    }
}

/// Everything one invocation needs, read from a single TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunConfig {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    pub data: DataConfig,
}

impl RunConfig {
    /// Split off `[data]` and hand the remaining tables to the library.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut table: toml::Table = s.parse().context("parsing configuration")?;
        let data: DataConfig = match table.remove("data") {
            Some(value) => value.try_into().context("parsing [data]")?,
            None => DataConfig::default(),
        };
        let pipeline = PipelineConfig::from_toml_table(table)?;
        let config = Self { pipeline, data };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate()?;
        self.data.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.data.state_noise, 0.1);
        assert_eq!(config.data.input_noise, 0.01);
        assert_eq!(config.pipeline.sample_period, 0.02);
    }

    #[test]
    fn test_data_and_pipeline_tables_share_a_file() {
        let text = r#"
            sample_period = 0.01

            [data]
            seed = 7
            samples = 400

            [control]
            tol = 1e-10
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        assert_eq!(config.data.seed, 7);
        assert_eq!(config.data.samples, 400);
        assert_eq!(config.data.validation_samples, 1000);
        assert_eq!(config.pipeline.sample_period, 0.01);
        assert_eq!(config.pipeline.control.tol, 1e-10);
    }

    #[test]
    fn test_invalid_data_rejected() {
        assert!(RunConfig::from_toml_str("[data]\nsamples = 1\n").is_err());
        assert!(RunConfig::from_toml_str("[data]\nstate_noise = -0.1\n").is_err());
        assert!(RunConfig::from_toml_str("[data]\nframes = 10\n").is_err());
        assert!(RunConfig::from_toml_str("[identification]\nrank = 4\n").is_err());
    }

    #[test]
    fn test_round_trip() {
        let mut config = RunConfig::default();
        config.data.seed = 3;
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
    }
}
