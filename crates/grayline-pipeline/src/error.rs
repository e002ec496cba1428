use grayline_runtime::RuntimeError;
use grayline_store::RunStep;

/// Errors that can occur while creating, driving or querying runs.
///
/// A step that fails is not an error here: it moves the run to `Failed` and
/// the terminal record is returned normally.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  #[error("run not found: {run_id}")]
  RunNotFound { run_id: String },

  #[error("run already exists: {run_id}")]
  RunAlreadyExists { run_id: String },

  #[error("invalid run id '{run_id}': {message}")]
  InvalidRunId { run_id: String, message: String },

  #[error("run {run_id} cannot move from {from} to {to}")]
  InvalidTransition {
    run_id: String,
    from: RunStep,
    to: RunStep,
  },

  #[error("pipeline runner channel closed")]
  RunnerClosed,

  #[error("store error: {0}")]
  Store(#[source] grayline_store::Error),

  #[error(transparent)]
  Runtime(#[from] RuntimeError),
}

impl From<grayline_store::Error> for PipelineError {
  fn from(e: grayline_store::Error) -> Self {
    match e {
      grayline_store::Error::NotFound(run_id) => PipelineError::RunNotFound { run_id },
      grayline_store::Error::Conflict(run_id) => PipelineError::RunAlreadyExists { run_id },
      other => PipelineError::Store(other),
    }
  }
}
