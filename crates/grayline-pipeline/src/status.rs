//! Read-only status projection of persisted runs.

use std::sync::Arc;

use grayline_store::{PipelineRun, RunStep, RunStore};
use serde::Serialize;

use crate::error::PipelineError;

/// What a status query reports for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatus {
  pub id: String,
  pub step: RunStep,
  pub status: String,
  /// Empty unless the run failed.
  pub error: String,
}

impl From<PipelineRun> for RunStatus {
  fn from(run: PipelineRun) -> Self {
    Self {
      id: run.run_id,
      step: run.current_step,
      status: run.status,
      error: run.error.unwrap_or_default(),
    }
  }
}

/// Answers status queries from the persisted run records.
///
/// Every transition writes step, status and error in a single update, so a
/// snapshot never mixes two transitions. Queries have no side effects.
#[derive(Clone)]
pub struct StatusProjector {
  runs: Arc<dyn RunStore>,
}

impl StatusProjector {
  pub fn new(runs: Arc<dyn RunStore>) -> Self {
    Self { runs }
  }

  pub async fn snapshot(&self, run_id: &str) -> Result<RunStatus, PipelineError> {
    Ok(self.runs.get_run(run_id).await?.into())
  }

  /// Snapshots of the most recently created runs.
  pub async fn list(&self, limit: u32) -> Result<Vec<RunStatus>, PipelineError> {
    Ok(
      self
        .runs
        .list_runs(limit)
        .await?
        .into_iter()
        .map(RunStatus::from)
        .collect(),
    )
  }
}
