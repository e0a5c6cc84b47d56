use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineSettings;
use crate::types::{CostWeights, DmdcConfig, LqrConfig};

/// Errors raised while loading a pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `[identification]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentificationConfig {
    pub threshold: f64,
    pub condition_bound: f64,
    pub near_threshold_ratio: f64,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        let d = DmdcConfig::default();
        Self {
            threshold: d.threshold,
            condition_bound: d.condition_bound,
            near_threshold_ratio: d.near_threshold_ratio,
        }
    }
}

/// `[control]` table. Q and R are diagonal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
    pub q_diag: Vec<f64>,
    pub r_diag: Vec<f64>,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        let d = LqrConfig::default();
        Self {
            // position, velocity
            q_diag: vec![1.0, 1.0, 1.0, 0.001, 0.001, 0.001],
            // roll, pitch, yaw, thrust
            r_diag: vec![0.001; 4],
            max_iter: d.max_iter,
            tol: d.tol,
        }
    }
}

/// Pipeline configuration as read from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Sample period in seconds.
    pub sample_period: f64,
    pub identification: IdentificationConfig,
    pub control: ControlConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_period: 0.02,
            identification: IdentificationConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Self::from_toml_table(s.parse()?)
    }

    /// Deserialize and validate an already parsed document.
    ///
    /// Front ends that keep their own tables in the same file remove them
    /// before handing the rest over.
    pub fn from_toml_table(table: toml::Table) -> Result<Self, ConfigError> {
        let config: Self = table.try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Range checks that do not depend on the data.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = &self.identification;
        if !(id.threshold.is_finite() && id.threshold >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "identification.threshold must be finite and non-negative, got {}",
                id.threshold
            )));
        }
        if id.condition_bound.is_nan() || id.condition_bound <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "identification.condition_bound must exceed 1, got {}",
                id.condition_bound
            )));
        }
        if id.near_threshold_ratio.is_nan() || id.near_threshold_ratio < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "identification.near_threshold_ratio must be at least 1, got {}",
                id.near_threshold_ratio
            )));
        }

        let ctl = &self.control;
        if ctl.q_diag.is_empty() || ctl.r_diag.is_empty() {
            return Err(ConfigError::Invalid(
                "control.q_diag and control.r_diag must be non-empty".into(),
            ));
        }
        if let Some(q) = ctl.q_diag.iter().find(|q| !(q.is_finite() && **q >= 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "control.q_diag entries must be non-negative, got {q}"
            )));
        }
        if let Some(r) = ctl.r_diag.iter().find(|r| !(r.is_finite() && **r > 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "control.r_diag entries must be positive, got {r}"
            )));
        }
        if ctl.max_iter == 0 {
            return Err(ConfigError::Invalid("control.max_iter must be positive".into()));
        }
        if self.sample_period.is_nan() || self.sample_period <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sample_period must be positive, got {}",
                self.sample_period
            )));
        }
        Ok(())
    }

    /// Convert into the typed settings the pipeline runs on.
    pub fn settings(&self) -> PipelineSettings {
        let id = &self.identification;
        let ctl = &self.control;
        PipelineSettings {
            dmdc: DmdcConfig {
                threshold: id.threshold,
                condition_bound: id.condition_bound,
                near_threshold_ratio: id.near_threshold_ratio,
            },
            weights: CostWeights::diagonal(&ctl.q_diag, &ctl.r_diag),
            lqr: LqrConfig {
                max_iter: ctl.max_iter,
                tol: ctl.tol,
            },
        }
    }
}
