use std::fmt;

use crate::Error;

/// The storage areas an image moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
  /// Raw bytes as received.
  Upload,
  /// Private copy the pipeline works on.
  Working,
  /// Published result.
  Processed,
}

impl Stage {
  pub const ALL: [Stage; 3] = [Stage::Upload, Stage::Working, Stage::Processed];

  pub fn as_str(self) -> &'static str {
    match self {
      Stage::Upload => "upload",
      Stage::Working => "working",
      Stage::Processed => "processed",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Key of one staged object: a stage plus a run identifier.
///
/// Identifiers are restricted to `[A-Za-z0-9_-]` so a key can never escape
/// its stage when mapped onto a filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey {
  stage: Stage,
  id: String,
}

impl StageKey {
  /// Build a key, validating the identifier.
  pub fn new(stage: Stage, id: impl Into<String>) -> Result<Self, Error> {
    let id = id.into();
    let valid = !id.is_empty()
      && id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
      return Err(Error::InvalidKey(id));
    }
    Ok(Self { stage, id })
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// The same identifier in another stage.
  pub fn with_stage(&self, stage: Stage) -> Self {
    Self {
      stage,
      id: self.id.clone(),
    }
  }
}

impl fmt::Display for StageKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.stage, self.id)
  }
}
