//! Step and runtime errors.

use std::fmt;

use grayline_image::CodecError;

/// Classification of a step failure, as recorded in a run's error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
  UnsupportedFormat,
  CorruptData,
  Encode,
  StageIo,
  Timeout,
}

impl FailureKind {
  pub fn as_str(self) -> &'static str {
    match self {
      FailureKind::UnsupportedFormat => "unsupported_format",
      FailureKind::CorruptData => "corrupt_data",
      FailureKind::Encode => "encode",
      FailureKind::StageIo => "stage_io",
      FailureKind::Timeout => "timeout",
    }
  }

  /// Whether another attempt could plausibly succeed.
  pub fn is_retryable(self) -> bool {
    matches!(self, FailureKind::StageIo | FailureKind::Timeout)
  }
}

impl fmt::Display for FailureKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors a step body can fail with.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
  /// The input bytes are not a supported image format.
  #[error("{message}")]
  UnsupportedFormat { message: String },

  /// The input claims a supported format but cannot be decoded.
  #[error("{message}")]
  CorruptData { message: String },

  /// The output image could not be serialized.
  #[error("{message}")]
  Encode { message: String },

  /// Reading or writing a stage failed.
  #[error("{message}")]
  StageIo { message: String },

  /// The step did not finish within its time bound.
  #[error("step did not finish within {after_ms}ms")]
  Timeout { after_ms: u64 },
}

impl StepError {
  pub fn kind(&self) -> FailureKind {
    match self {
      StepError::UnsupportedFormat { .. } => FailureKind::UnsupportedFormat,
      StepError::CorruptData { .. } => FailureKind::CorruptData,
      StepError::Encode { .. } => FailureKind::Encode,
      StepError::StageIo { .. } => FailureKind::StageIo,
      StepError::Timeout { .. } => FailureKind::Timeout,
    }
  }

  pub fn is_retryable(&self) -> bool {
    self.kind().is_retryable()
  }
}

impl From<CodecError> for StepError {
  fn from(e: CodecError) -> Self {
    let message = e.to_string();
    match e {
      CodecError::UnsupportedFormat { .. } => StepError::UnsupportedFormat { message },
      CodecError::CorruptData { .. } => StepError::CorruptData { message },
      CodecError::Encode { .. } => StepError::Encode { message },
    }
  }
}

impl From<grayline_artifact::Error> for StepError {
  fn from(e: grayline_artifact::Error) -> Self {
    StepError::StageIo {
      message: e.to_string(),
    }
  }
}

/// Errors from the runner itself, as opposed to the step it runs.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The step log could not be read or written.
  #[error("step log error: {0}")]
  Store(#[from] grayline_store::Error),
}
