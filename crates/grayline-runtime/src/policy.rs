use std::time::Duration;

use grayline_config::{PipelineConfig, RetryBackoff};

/// How often and how patiently a failed step is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts per invocation, including the first.
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub initial_delay: Duration,
}

impl RetryPolicy {
  /// No retries: one attempt only.
  pub fn none() -> Self {
    Self {
      max_attempts: 1,
      backoff: RetryBackoff::Constant,
      initial_delay: Duration::ZERO,
    }
  }

  /// Delay before the attempt following failed attempt number `attempt` (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let attempt = attempt.max(1);
    match self.backoff {
      RetryBackoff::Constant => self.initial_delay,
      RetryBackoff::Linear => self.initial_delay.saturating_mul(attempt),
      RetryBackoff::Exponential => {
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
      }
    }
  }
}

/// Settings for [`crate::LocalStepRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
  pub step_timeout: Duration,
  pub retry: RetryPolicy,
}

impl Default for RunnerConfig {
  fn default() -> Self {
    Self::from(&PipelineConfig::default())
  }
}

impl From<&PipelineConfig> for RunnerConfig {
  fn from(config: &PipelineConfig) -> Self {
    Self {
      step_timeout: Duration::from_millis(config.step_timeout_ms()),
      retry: RetryPolicy {
        max_attempts: config.max_retry_attempts().max(1),
        backoff: config.retry_backoff(),
        initial_delay: Duration::from_millis(config.retry_initial_delay_ms()),
      },
    }
  }
}
