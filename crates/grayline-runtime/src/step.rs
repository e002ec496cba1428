use async_trait::async_trait;
use grayline_store::StepName;

use crate::error::{RuntimeError, StepError};
use crate::outcome::StepOutcome;

/// One durable unit of pipeline work.
///
/// Implementations must be idempotent: running a step twice for the same run
/// leaves the same state as running it once.
#[async_trait]
pub trait Step: Send + Sync {
  fn name(&self) -> StepName;

  async fn execute(&self, run_id: &str) -> Result<(), StepError>;
}

/// Invokes steps with durable, at-least-once semantics.
///
/// The outcome is recorded before `invoke` returns. `Err` means the runner
/// itself could not do its bookkeeping; a failing step is `Ok(Failure)`.
#[async_trait]
pub trait DurableStepRunner: Send + Sync {
  async fn invoke(&self, run_id: &str, step: &dyn Step) -> Result<StepOutcome, RuntimeError>;
}
