use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Where a pipeline run currently is.
///
/// `Starting → CopyingImage → ConvertingGrayscale → Completed`, with `Failed`
/// reachable from every non-terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RunStep {
  Starting,
  CopyingImage,
  ConvertingGrayscale,
  Completed,
  Failed,
}

impl RunStep {
  /// Completed and Failed are permanent.
  pub fn is_terminal(self) -> bool {
    matches!(self, RunStep::Completed | RunStep::Failed)
  }

  /// Whether the state machine may move from `self` to `next`.
  pub fn can_transition_to(self, next: RunStep) -> bool {
    use RunStep::*;

    match (self, next) {
      (Completed | Failed, _) => false,
      (_, Failed) => true,
      (Starting, CopyingImage) => true,
      (CopyingImage, ConvertingGrayscale) => true,
      (ConvertingGrayscale, Completed) => true,
      _ => false,
    }
  }

  /// Human-readable description used as the run's status text.
  pub fn description(self) -> &'static str {
    match self {
      RunStep::Starting => "starting",
      RunStep::CopyingImage => "copying image",
      RunStep::ConvertingGrayscale => "converting image to grayscale",
      RunStep::Completed => "completed",
      RunStep::Failed => "failed",
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      RunStep::Starting => "starting",
      RunStep::CopyingImage => "copying_image",
      RunStep::ConvertingGrayscale => "converting_grayscale",
      RunStep::Completed => "completed",
      RunStep::Failed => "failed",
    }
  }
}

impl fmt::Display for RunStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A durable unit of pipeline work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepName {
  Copy,
  Grayscale,
}

impl StepName {
  pub fn as_str(self) -> &'static str {
    match self {
      StepName::Copy => "copy",
      StepName::Grayscale => "grayscale",
    }
  }
}

impl fmt::Display for StepName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Status of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum StepStatus {
  Running,
  Succeeded,
  Failed,
}

/// A pipeline run as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PipelineRun {
  pub run_id: String,
  pub current_step: RunStep,
  pub status: String,
  pub error: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
  /// A fresh run in the `Starting` step.
  pub fn new(run_id: impl Into<String>) -> Self {
    let now = Utc::now();
    Self {
      run_id: run_id.into(),
      current_step: RunStep::Starting,
      status: RunStep::Starting.description().to_string(),
      error: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.current_step.is_terminal()
  }
}

/// One attempt at a step, as stored in the step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StepRecord {
  pub run_id: String,
  pub step: StepName,
  pub attempt: u32,
  pub status: StepStatus,
  pub error: Option<String>,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl StepRecord {
  /// A new attempt that has just started.
  pub fn started(run_id: impl Into<String>, step: StepName, attempt: u32) -> Self {
    Self {
      run_id: run_id.into(),
      step,
      attempt,
      status: StepStatus::Running,
      error: None,
      started_at: Utc::now(),
      completed_at: None,
    }
  }

  /// Mark the attempt as succeeded.
  pub fn succeed(mut self) -> Self {
    self.status = StepStatus::Succeeded;
    self.error = None;
    self.completed_at = Some(Utc::now());
    self
  }

  /// Mark the attempt as failed with `error`.
  pub fn fail(mut self, error: impl Into<String>) -> Self {
    self.status = StepStatus::Failed;
    self.error = Some(error.into());
    self.completed_at = Some(Utc::now());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use RunStep::*;

  const ALL: [RunStep; 5] = [
    Starting,
    CopyingImage,
    ConvertingGrayscale,
    Completed,
    Failed,
  ];

  #[test]
  fn test_forward_transitions() {
    assert!(Starting.can_transition_to(CopyingImage));
    assert!(CopyingImage.can_transition_to(ConvertingGrayscale));
    assert!(ConvertingGrayscale.can_transition_to(Completed));
  }

  #[test]
  fn test_failed_reachable_from_non_terminal() {
    for step in [Starting, CopyingImage, ConvertingGrayscale] {
      assert!(step.can_transition_to(Failed), "{step} -> failed");
    }
  }

  #[test]
  fn test_terminal_steps_have_no_exits() {
    for from in [Completed, Failed] {
      for to in ALL {
        assert!(!from.can_transition_to(to), "{from} -> {to}");
      }
    }
  }

  #[test]
  fn test_no_skipping_or_going_back() {
    assert!(!Starting.can_transition_to(ConvertingGrayscale));
    assert!(!Starting.can_transition_to(Completed));
    assert!(!CopyingImage.can_transition_to(Completed));
    assert!(!ConvertingGrayscale.can_transition_to(CopyingImage));
    assert!(!CopyingImage.can_transition_to(CopyingImage));
  }

  #[test]
  fn test_new_run_starts_without_error() {
    let run = PipelineRun::new("abc");
    assert_eq!(run.current_step, Starting);
    assert_eq!(run.status, "starting");
    assert!(run.error.is_none());
    assert!(!run.is_terminal());
  }

  #[test]
  fn test_step_record_lifecycle() {
    let record = StepRecord::started("abc", StepName::Copy, 1);
    assert_eq!(record.status, StepStatus::Running);
    assert!(record.completed_at.is_none());

    let failed = record.clone().fail("boom");
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("boom"));

    let succeeded = record.succeed();
    assert_eq!(succeeded.status, StepStatus::Succeeded);
    assert!(succeeded.completed_at.is_some());
  }

  #[test]
  fn test_serde_names() {
    assert_eq!(
      serde_json::to_string(&ConvertingGrayscale).unwrap(),
      "\"converting_grayscale\""
    );
    assert_eq!(serde_json::to_string(&StepName::Grayscale).unwrap(), "\"grayscale\"");
  }
}
