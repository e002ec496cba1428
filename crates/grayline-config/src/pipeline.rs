use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;

/// Five minutes: a generous ceiling applied to every step.
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_OUTPUT_QUALITY: u8 = 90;
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid config: {message}")]
  Invalid { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub upload_dir: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub working_dir: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub processed_dir: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub database_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub step_timeout_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_retry_attempts: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_backoff: Option<RetryBackoff>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retry_initial_delay_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_quality: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_concurrent_runs: Option<usize>,
}

impl PipelineConfig {
  /// Load a config file. The file must contain a JSON object.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  /// Fill every unset location from `data_dir`.
  pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
    self
      .upload_dir
      .get_or_insert_with(|| data_dir.join("uploads"));
    self
      .working_dir
      .get_or_insert_with(|| data_dir.join("working"));
    self
      .processed_dir
      .get_or_insert_with(|| data_dir.join("processed"));
    self
      .database_url
      .get_or_insert_with(|| format!("sqlite://{}", data_dir.join("grayline.db").display()));
    self
  }

  /// Reject values that would make the pipeline unable to make progress.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.step_timeout_ms == Some(0) {
      return Err(ConfigError::Invalid {
        message: "step_timeout_ms must be greater than zero".to_string(),
      });
    }
    if self.max_retry_attempts == Some(0) {
      return Err(ConfigError::Invalid {
        message: "max_retry_attempts must be at least 1".to_string(),
      });
    }
    if self.max_concurrent_runs == Some(0) {
      return Err(ConfigError::Invalid {
        message: "max_concurrent_runs must be at least 1".to_string(),
      });
    }
    if let Some(quality) = self.output_quality.filter(|q| !(1..=100).contains(q)) {
      return Err(ConfigError::Invalid {
        message: format!("output_quality must be within 1..=100, got {quality}"),
      });
    }
    Ok(())
  }

  pub fn step_timeout_ms(&self) -> u64 {
    self.step_timeout_ms.unwrap_or(DEFAULT_STEP_TIMEOUT_MS)
  }

  pub fn max_retry_attempts(&self) -> u32 {
    self
      .max_retry_attempts
      .unwrap_or(DEFAULT_MAX_RETRY_ATTEMPTS)
  }

  pub fn retry_backoff(&self) -> RetryBackoff {
    self.retry_backoff.unwrap_or_default()
  }

  pub fn retry_initial_delay_ms(&self) -> u64 {
    self
      .retry_initial_delay_ms
      .unwrap_or(DEFAULT_RETRY_INITIAL_DELAY_MS)
  }

  pub fn output_quality(&self) -> u8 {
    self.output_quality.unwrap_or(DEFAULT_OUTPUT_QUALITY)
  }

  pub fn max_concurrent_runs(&self) -> usize {
    self
      .max_concurrent_runs
      .unwrap_or(DEFAULT_MAX_CONCURRENT_RUNS)
  }
}
