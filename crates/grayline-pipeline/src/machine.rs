//! Pipeline state machine.
//!
//! A run moves `Starting → CopyingImage → ConvertingGrayscale → Completed`,
//! or to `Failed` from any non-terminal state. Each transition is persisted
//! before the step it announces is invoked, so a restarted process can pick
//! the run up where it stopped.

use std::sync::Arc;

use grayline_artifact::{Stage, StageKey, Store as StageStore};
use grayline_config::PipelineConfig;
use grayline_runtime::{DurableStepRunner, LocalStepRunner, RunnerConfig, Step, StepOutcome};
use grayline_store::{PipelineRun, RunStep, RunStore, StepName};
use tracing::{debug, info, instrument, warn};

use crate::error::PipelineError;
use crate::events::{NoopNotifier, RunEvent, RunNotifier};
use crate::state;
use crate::status::StatusProjector;
use crate::steps::{CopyImageStep, GrayscaleImageStep};

/// Drives pipeline runs to a terminal state.
///
/// Generic over `N: RunNotifier` like the rest of the event plumbing. Use
/// `ImagePipeline::new()` to discard events, or `with_notifier()` to observe
/// them.
pub struct ImagePipeline<N: RunNotifier = NoopNotifier> {
  runs: Arc<dyn RunStore>,
  runner: Arc<dyn DurableStepRunner>,
  copy: CopyImageStep,
  grayscale: GrayscaleImageStep,
  notifier: N,
}

impl ImagePipeline<NoopNotifier> {
  pub fn new(
    runs: Arc<dyn RunStore>,
    stages: Arc<dyn StageStore>,
    runner: Arc<dyn DurableStepRunner>,
  ) -> Self {
    Self::with_notifier(runs, stages, runner, NoopNotifier)
  }

  /// A pipeline that runs its steps in-process with a [`LocalStepRunner`]
  /// configured from `config`.
  pub fn local(
    config: &PipelineConfig,
    runs: Arc<dyn RunStore>,
    stages: Arc<dyn StageStore>,
  ) -> Self {
    let runner = Arc::new(LocalStepRunner::new(
      runs.clone(),
      RunnerConfig::from(config),
    ));
    Self::new(runs, stages.clone(), runner)
      .with_grayscale_step(GrayscaleImageStep::with_quality(stages, config.output_quality()))
  }
}

impl<N: RunNotifier> ImagePipeline<N> {
  pub fn with_notifier(
    runs: Arc<dyn RunStore>,
    stages: Arc<dyn StageStore>,
    runner: Arc<dyn DurableStepRunner>,
    notifier: N,
  ) -> Self {
    Self {
      runs,
      runner,
      copy: CopyImageStep::new(stages.clone()),
      grayscale: GrayscaleImageStep::new(stages),
      notifier,
    }
  }

  /// Replace the notifier, keeping everything else.
  pub fn notify_with<M: RunNotifier>(self, notifier: M) -> ImagePipeline<M> {
    ImagePipeline {
      runs: self.runs,
      runner: self.runner,
      copy: self.copy,
      grayscale: self.grayscale,
      notifier,
    }
  }

  pub fn with_grayscale_step(mut self, step: GrayscaleImageStep) -> Self {
    self.grayscale = step;
    self
  }

  /// A status projector reading the same run records.
  pub fn status(&self) -> StatusProjector {
    StatusProjector::new(self.runs.clone())
  }

  /// Create a run record in `Starting`, then drive it to a terminal state.
  pub async fn start(&self, run_id: &str) -> Result<PipelineRun, PipelineError> {
    self.create(run_id).await?;
    self.execute(run_id).await
  }

  /// Create a run record in `Starting` without executing it.
  pub async fn create(&self, run_id: &str) -> Result<PipelineRun, PipelineError> {
    StageKey::new(Stage::Upload, run_id).map_err(|e| PipelineError::InvalidRunId {
      run_id: run_id.to_string(),
      message: e.to_string(),
    })?;

    let run = PipelineRun::new(run_id);
    self.runs.create_run(&run).await?;
    info!(run_id = %run_id, "run_created");
    Ok(run)
  }

  /// Drive an existing run from its persisted state to a terminal state.
  ///
  /// Returns the terminal record. A run that is already terminal is returned
  /// unchanged. `Err` means the run could not be driven at all (unknown id,
  /// storage failure); it is left in its last persisted state.
  #[instrument(name = "run_execute", skip(self, run_id), fields(run_id = %run_id))]
  pub async fn execute(&self, run_id: &str) -> Result<PipelineRun, PipelineError> {
    let run = self.runs.get_run(run_id).await?;
    if run.is_terminal() {
      debug!(step = %run.current_step, "run already terminal");
      return Ok(run);
    }

    info!(from = %run.current_step, "run_started");
    self.notifier.notify(RunEvent::RunStarted {
      run_id: run_id.to_string(),
      from: run.current_step,
    });

    let mut current = run.current_step;
    for &(target, name) in state::remaining(current) {
      current = self.transition(run_id, current, target, None).await?;
      self.notifier.notify(RunEvent::StepStarted {
        run_id: run_id.to_string(),
        step: name,
        state: target,
      });

      match self.runner.invoke(run_id, self.step(name)).await? {
        StepOutcome::Success => {
          self.notifier.notify(RunEvent::StepCompleted {
            run_id: run_id.to_string(),
            step: name,
          });
        }
        StepOutcome::Failure(failure) => {
          let detail = failure.detail();
          self
            .transition(run_id, current, RunStep::Failed, Some(&detail))
            .await?;
          warn!(step = %name, error = %detail, "run_failed");
          self.notifier.notify(RunEvent::StepFailed {
            run_id: run_id.to_string(),
            step: name,
            error: detail.clone(),
          });
          self.notifier.notify(RunEvent::RunFailed {
            run_id: run_id.to_string(),
            error: detail,
          });
          return Ok(self.runs.get_run(run_id).await?);
        }
      }
    }

    self
      .transition(run_id, current, RunStep::Completed, None)
      .await?;
    info!("run_completed");
    self.notifier.notify(RunEvent::RunCompleted {
      run_id: run_id.to_string(),
    });
    Ok(self.runs.get_run(run_id).await?)
  }

  /// Re-drive a run after a restart. Steps that already succeeded are not
  /// executed again.
  pub async fn resume(&self, run_id: &str) -> Result<PipelineRun, PipelineError> {
    info!(run_id = %run_id, "run_resumed");
    self.execute(run_id).await
  }

  /// Resume every run that has not reached a terminal state, oldest first.
  pub async fn resume_incomplete(&self) -> Result<Vec<PipelineRun>, PipelineError> {
    let pending = self.runs.list_incomplete_runs().await?;
    let mut finished = Vec::with_capacity(pending.len());
    for run in pending {
      finished.push(self.resume(&run.run_id).await?);
    }
    Ok(finished)
  }

  fn step(&self, name: StepName) -> &dyn Step {
    match name {
      StepName::Copy => &self.copy,
      StepName::Grayscale => &self.grayscale,
    }
  }

  /// Persist a move from `from` to `to`. Re-entering the current state is a
  /// no-op so that interrupted steps can be resumed.
  ///
  /// The store only applies the move if the run is still in `from`, so a
  /// driver holding a stale view never overwrites a newer or terminal state.
  async fn transition(
    &self,
    run_id: &str,
    from: RunStep,
    to: RunStep,
    error: Option<&str>,
  ) -> Result<RunStep, PipelineError> {
    if from == to {
      return Ok(to);
    }
    if !from.can_transition_to(to) {
      return Err(PipelineError::InvalidTransition {
        run_id: run_id.to_string(),
        from,
        to,
      });
    }
    match self
      .runs
      .update_run_step(run_id, from, to, to.description(), error)
      .await
    {
      Ok(()) => {}
      // Another driver moved the run first; its state wins
      Err(
        grayline_store::Error::StaleState { actual, .. }
        | grayline_store::Error::Terminal { step: actual, .. },
      ) => {
        warn!(from = %actual, to = %to, "run moved by another driver");
        return Err(PipelineError::InvalidTransition {
          run_id: run_id.to_string(),
          from: actual,
          to,
        });
      }
      Err(e) => return Err(e.into()),
    }
    debug!(from = %from, to = %to, "run transitioned");
    Ok(to)
  }
}
