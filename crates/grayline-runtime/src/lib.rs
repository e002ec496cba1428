//! Grayline Runtime
//!
//! Durable execution of pipeline steps. A [`Step`] is one unit of work keyed
//! by run id; a [`DurableStepRunner`] invokes it with at-least-once semantics,
//! bounded by a timeout and retried per policy, and records the outcome
//! before returning it.
//!
//! [`LocalStepRunner`] is the in-process implementation. It keeps a step log
//! in a [`grayline_store::RunStore`] so that a step which already succeeded
//! for a run is never executed again, even across process restarts.

mod error;
mod local;
mod outcome;
mod policy;
mod step;

pub use error::{FailureKind, RuntimeError, StepError};
pub use local::LocalStepRunner;
pub use outcome::{StepFailure, StepOutcome};
pub use policy::{RetryPolicy, RunnerConfig};
pub use step::{DurableStepRunner, Step};
