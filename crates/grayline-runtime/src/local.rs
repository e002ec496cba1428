//! In-process durable step runner.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grayline_store::{RunStore, StepRecord};
use tracing::{error, info, instrument, warn};

use crate::error::{RuntimeError, StepError};
use crate::outcome::{StepFailure, StepOutcome};
use crate::policy::RunnerConfig;
use crate::step::{DurableStepRunner, Step};

/// Runs steps in the current process, journaling every attempt to a
/// [`RunStore`].
///
/// A step that has a `succeeded` record for the run is not executed again.
/// Attempt numbers continue from whatever the log already holds, so a
/// resumed run appends to its history instead of overwriting it.
pub struct LocalStepRunner {
  store: Arc<dyn RunStore>,
  config: RunnerConfig,
}

impl LocalStepRunner {
  pub fn new(store: Arc<dyn RunStore>, config: RunnerConfig) -> Self {
    Self { store, config }
  }

  pub fn config(&self) -> &RunnerConfig {
    &self.config
  }

  async fn attempt(&self, run_id: &str, step: &dyn Step) -> Result<(), StepError> {
    match tokio::time::timeout(self.config.step_timeout, step.execute(run_id)).await {
      Ok(result) => result,
      Err(_) => Err(StepError::Timeout {
        after_ms: millis(self.config.step_timeout),
      }),
    }
  }
}

fn millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl DurableStepRunner for LocalStepRunner {
  #[instrument(
    name = "step_invoke",
    skip(self, run_id, step),
    fields(run_id = %run_id, step = %step.name())
  )]
  async fn invoke(&self, run_id: &str, step: &dyn Step) -> Result<StepOutcome, RuntimeError> {
    let name = step.name();

    if let Some(done) = self.store.find_succeeded_step(run_id, name).await? {
      info!(attempt = done.attempt, "step_skipped");
      return Ok(StepOutcome::Success);
    }

    let previous = self.store.count_attempts(run_id, name).await?;
    let max_attempts = self.config.retry.max_attempts.max(1);

    let mut attempt = 0;
    loop {
      attempt += 1;
      let record = StepRecord::started(run_id, name, previous + attempt);
      self.store.record_step(&record).await?;
      info!(attempt = record.attempt, "step_started");

      let err = match self.attempt(run_id, step).await {
        Ok(()) => {
          self.store.record_step(&record.succeed()).await?;
          info!("step_completed");
          return Ok(StepOutcome::Success);
        }
        Err(e) => e,
      };

      let failure = StepFailure::from(&err);
      self.store.record_step(&record.fail(failure.detail())).await?;

      if !err.is_retryable() || attempt >= max_attempts {
        error!(attempt, kind = %failure.kind, error = %err, "step_failed");
        return Ok(StepOutcome::Failure(failure));
      }

      let delay = self.config.retry.delay_for(attempt);
      warn!(
        attempt,
        error = %err,
        delay_ms = millis(delay),
        "step_retrying"
      );
      tokio::time::sleep(delay).await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FailureKind;
  use crate::policy::RetryPolicy;
  use grayline_config::RetryBackoff;
  use grayline_store::{MemoryStore, StepName, StepStatus};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  /// Fails with `error` for the first `failures` calls, then succeeds.
  struct ScriptedStep {
    failures: u32,
    error: fn() -> StepError,
    calls: AtomicU32,
  }

  impl ScriptedStep {
    fn new(failures: u32, error: fn() -> StepError) -> Self {
      Self {
        failures,
        error,
        calls: AtomicU32::new(0),
      }
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Step for ScriptedStep {
    fn name(&self) -> StepName {
      StepName::Copy
    }

    async fn execute(&self, _run_id: &str) -> Result<(), StepError> {
      let call = self.calls.fetch_add(1, Ordering::SeqCst);
      if call < self.failures {
        Err((self.error)())
      } else {
        Ok(())
      }
    }
  }

  struct SlowStep;

  #[async_trait]
  impl Step for SlowStep {
    fn name(&self) -> StepName {
      StepName::Grayscale
    }

    async fn execute(&self, _run_id: &str) -> Result<(), StepError> {
      tokio::time::sleep(Duration::from_secs(5)).await;
      Ok(())
    }
  }

  fn stage_io() -> StepError {
    StepError::StageIo {
      message: "disk unavailable".to_string(),
    }
  }

  fn corrupt() -> StepError {
    StepError::CorruptData {
      message: "bad header".to_string(),
    }
  }

  fn runner(store: Arc<MemoryStore>, max_attempts: u32) -> LocalStepRunner {
    LocalStepRunner::new(
      store,
      RunnerConfig {
        step_timeout: Duration::from_millis(50),
        retry: RetryPolicy {
          max_attempts,
          backoff: RetryBackoff::Constant,
          initial_delay: Duration::from_millis(1),
        },
      },
    )
  }

  #[test]
  fn test_millis_saturates() {
    assert_eq!(millis(Duration::from_millis(1_500)), 1_500);
    assert_eq!(millis(Duration::MAX), u64::MAX);
  }

  #[tokio::test]
  async fn test_success_is_recorded() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 3);
    let step = ScriptedStep::new(0, stage_io);

    let outcome = runner.invoke("r1", &step).await.unwrap();
    assert_eq!(outcome, StepOutcome::Success);
    assert_eq!(step.calls(), 1);

    let log = store.list_steps("r1").await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].status, StepStatus::Succeeded);
    assert_eq!(log[0].attempt, 1);
  }

  #[tokio::test]
  async fn test_transient_failures_are_retried() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 3);
    let step = ScriptedStep::new(2, stage_io);

    let outcome = runner.invoke("r1", &step).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(step.calls(), 3);

    let statuses: Vec<_> = store
      .list_steps("r1")
      .await
      .unwrap()
      .into_iter()
      .map(|r| r.status)
      .collect();
    assert_eq!(
      statuses,
      vec![StepStatus::Failed, StepStatus::Failed, StepStatus::Succeeded]
    );
  }

  #[tokio::test]
  async fn test_retries_stop_at_max_attempts() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 2);
    let step = ScriptedStep::new(10, stage_io);

    let outcome = runner.invoke("r1", &step).await.unwrap();
    let StepOutcome::Failure(failure) = outcome else {
      panic!("expected failure");
    };
    assert_eq!(failure.kind, FailureKind::StageIo);
    assert_eq!(failure.detail(), "stage_io: disk unavailable");
    assert_eq!(step.calls(), 2);
  }

  #[tokio::test]
  async fn test_permanent_failures_are_not_retried() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 5);
    let step = ScriptedStep::new(10, corrupt);

    let outcome = runner.invoke("r1", &step).await.unwrap();
    assert!(matches!(
      outcome,
      StepOutcome::Failure(StepFailure {
        kind: FailureKind::CorruptData,
        ..
      })
    ));
    assert_eq!(step.calls(), 1);

    let log = store.list_steps("r1").await.unwrap();
    assert_eq!(log[0].error.as_deref(), Some("corrupt_data: bad header"));
  }

  #[tokio::test]
  async fn test_timeout_becomes_failure() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 1);

    let outcome = runner.invoke("r1", &SlowStep).await.unwrap();
    let StepOutcome::Failure(failure) = outcome else {
      panic!("expected timeout");
    };
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(
      store.list_steps("r1").await.unwrap()[0].status,
      StepStatus::Failed
    );
  }

  #[tokio::test]
  async fn test_succeeded_step_is_not_run_again() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 3);
    let step = ScriptedStep::new(0, stage_io);

    runner.invoke("r1", &step).await.unwrap();
    let outcome = runner.invoke("r1", &step).await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(step.calls(), 1);
    assert_eq!(store.list_steps("r1").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_attempts_continue_after_earlier_invocation() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 1);
    let step = ScriptedStep::new(1, stage_io);

    let first = runner.invoke("r1", &step).await.unwrap();
    assert!(!first.is_success());
    let second = runner.invoke("r1", &step).await.unwrap();
    assert!(second.is_success());

    let attempts: Vec<_> = store
      .list_steps("r1")
      .await
      .unwrap()
      .into_iter()
      .map(|r| r.attempt)
      .collect();
    assert_eq!(attempts, vec![1, 2]);
  }

  #[tokio::test]
  async fn test_runs_are_journaled_separately() {
    let store = Arc::new(MemoryStore::new());
    let runner = runner(store.clone(), 1);
    let step = ScriptedStep::new(0, stage_io);

    runner.invoke("a", &step).await.unwrap();
    runner.invoke("b", &step).await.unwrap();
    assert_eq!(step.calls(), 2);
    assert_eq!(store.list_steps("a").await.unwrap().len(), 1);
    assert_eq!(store.list_steps("b").await.unwrap().len(), 1);
  }
}
