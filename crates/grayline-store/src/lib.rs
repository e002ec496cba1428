//! Grayline Store
//!
//! This crate provides the storage trait and implementations for pipeline
//! runs and their step logs. Data is persisted to SQLite, or kept in memory
//! for tests.
//!
//! The [`RunStore`] trait defines operations for:
//! - Creating runs and moving them between steps
//! - Reading a run's current record (the status snapshot)
//! - Appending and querying step attempts (the durable step log)
//!
//! Every transition rewrites `current_step`, `status` and `error` together, so
//! readers never observe a mix of two transitions.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{PipelineRun, RunStep, StepName, StepRecord, StepStatus};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record with the same key already exists.
  #[error("already exists: {0}")]
  Conflict(String),

  /// The run is not in the state the caller expected to move it from.
  #[error("run {run_id} is {actual}, expected {expected}")]
  StaleState {
    run_id: String,
    expected: RunStep,
    actual: RunStep,
  },

  /// The run is completed or failed and can no longer change.
  #[error("run {run_id} is {step} and can no longer change")]
  Terminal { run_id: String, step: RunStep },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying schema migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for pipeline runs and step attempts.
#[async_trait]
pub trait RunStore: Send + Sync {
  /// Create a new run. Fails with [`Error::Conflict`] if the id is taken.
  async fn create_run(&self, run: &PipelineRun) -> Result<(), Error>;

  /// Get a run by ID.
  async fn get_run(&self, run_id: &str) -> Result<PipelineRun, Error>;

  /// Move a run from `from` to `to`, replacing its status text and error in
  /// one write.
  ///
  /// The write only happens if the persisted step is still `from` and is not
  /// terminal. Otherwise nothing changes and [`Error::StaleState`] or
  /// [`Error::Terminal`] is returned.
  async fn update_run_step(
    &self,
    run_id: &str,
    from: RunStep,
    to: RunStep,
    status: &str,
    error: Option<&str>,
  ) -> Result<(), Error>;

  /// List the most recently created runs.
  async fn list_runs(&self, limit: u32) -> Result<Vec<PipelineRun>, Error>;

  /// List runs that have not reached a terminal step, oldest first.
  async fn list_incomplete_runs(&self) -> Result<Vec<PipelineRun>, Error>;

  /// Insert or replace one step attempt.
  async fn record_step(&self, record: &StepRecord) -> Result<(), Error>;

  /// List all step attempts for a run, in the order they started.
  async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, Error>;

  /// Find the attempt that completed `step` for a run, if any.
  async fn find_succeeded_step(
    &self,
    run_id: &str,
    step: StepName,
  ) -> Result<Option<StepRecord>, Error> {
    Ok(
      self
        .list_steps(run_id)
        .await?
        .into_iter()
        .find(|r| r.step == step && r.status == StepStatus::Succeeded),
    )
  }

  /// Number of attempts already made at `step` for a run.
  async fn count_attempts(&self, run_id: &str, step: StepName) -> Result<u32, Error> {
    let count = self
      .list_steps(run_id)
      .await?
      .iter()
      .filter(|r| r.step == step)
      .count();
    Ok(u32::try_from(count).unwrap_or(u32::MAX))
  }
}

/// The error for a conditional update that matched no row.
pub(crate) fn rejected_update(run_id: &str, expected: RunStep, actual: RunStep) -> Error {
  if actual.is_terminal() {
    Error::Terminal {
      run_id: run_id.to_string(),
      step: actual,
    }
  } else {
    Error::StaleState {
      run_id: run_id.to_string(),
      expected,
      actual,
    }
  }
}
