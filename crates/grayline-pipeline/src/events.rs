//! Run events and notifiers for observability.
//!
//! Events are emitted as a run moves through the pipeline so consumers can
//! log progress, stream it somewhere, or assert on it in tests.

use grayline_store::{RunStep, StepName};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
  /// Execution of a run has begun (or resumed) from `from`.
  RunStarted { run_id: String, from: RunStep },

  /// A step was entered; the run's persisted state is now `state`.
  StepStarted {
    run_id: String,
    step: StepName,
    state: RunStep,
  },

  /// A step completed successfully.
  StepCompleted { run_id: String, step: StepName },

  /// A step failed for good.
  StepFailed {
    run_id: String,
    step: StepName,
    error: String,
  },

  /// The run reached `Completed`.
  RunCompleted { run_id: String },

  /// The run reached `Failed`.
  RunFailed { run_id: String, error: String },
}

/// Trait for receiving run events.
pub trait RunNotifier: Send + Sync {
  fn notify(&self, event: RunEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RunNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {}
}

/// A notifier that sends events to an unbounded channel.
///
/// Event volume is a handful per run, so the channel is unbounded and a slow
/// consumer never stalls a run.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }

  /// A notifier together with the receiving end of its channel.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl RunNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
