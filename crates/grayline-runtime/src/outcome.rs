use crate::error::{FailureKind, StepError};

/// Why a step ultimately failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
  pub kind: FailureKind,
  pub message: String,
}

impl StepFailure {
  /// The text written into a failed run's error: `"<kind>: <message>"`.
  pub fn detail(&self) -> String {
    format!("{}: {}", self.kind, self.message)
  }
}

impl From<&StepError> for StepFailure {
  fn from(e: &StepError) -> Self {
    Self {
      kind: e.kind(),
      message: e.to_string(),
    }
  }
}

/// Final result of invoking a step through a runner, after any retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
  Success,
  Failure(StepFailure),
}

impl StepOutcome {
  pub fn is_success(&self) -> bool {
    matches!(self, StepOutcome::Success)
  }
}
