//! Pipeline runner with channel-based submission.
//!
//! The `PipelineRunner` owns an mpsc channel of run ids and drives each
//! received run on its own task, at most `max_concurrent` at a time.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::events::{NoopNotifier, RunNotifier};
use crate::machine::ImagePipeline;

/// A runner that executes pipeline runs in response to submitted run ids.
///
/// # Usage
///
/// ```ignore
/// let runner = PipelineRunner::new(pipeline, 4);
///
/// // Get a handle for producers (CLI, watchers, etc.)
/// let submitter = runner.submitter();
///
/// // Start the execution loop, then feed it
/// let cancel = CancellationToken::new();
/// let driver = tokio::spawn(runner.start(cancel));
/// submitter.submit(&run_id).await?;
///
/// // Dropping the last handle lets the loop finish
/// drop(submitter);
/// driver.await?;
/// ```
pub struct PipelineRunner<N: RunNotifier + 'static = NoopNotifier> {
  sender: mpsc::Sender<String>,
  receiver: mpsc::Receiver<String>,
  pipeline: Arc<ImagePipeline<N>>,
  limit: Arc<Semaphore>,
}

impl<N: RunNotifier + 'static> PipelineRunner<N> {
  /// Create a new runner driving at most `max_concurrent` runs at once.
  pub fn new(pipeline: Arc<ImagePipeline<N>>, max_concurrent: usize) -> Self {
    Self::with_buffer_size(pipeline, max_concurrent, 100)
  }

  /// Create a new runner with a custom channel buffer size.
  pub fn with_buffer_size(
    pipeline: Arc<ImagePipeline<N>>,
    max_concurrent: usize,
    buffer_size: usize,
  ) -> Self {
    let (sender, receiver) = mpsc::channel(buffer_size);
    Self {
      sender,
      receiver,
      pipeline,
      limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
    }
  }

  /// Get a sender handle for submitting existing runs.
  pub fn sender(&self) -> mpsc::Sender<String> {
    self.sender.clone()
  }

  /// Get a handle that creates runs and queues them on this runner.
  ///
  /// The queue holds `buffer_size` ids; beyond that `submit` waits for the
  /// loop started by [`PipelineRunner::start`] to take them off.
  pub fn submitter(&self) -> RunSubmitter<N> {
    RunSubmitter {
      pipeline: self.pipeline.clone(),
      sender: self.sender.clone(),
    }
  }

  /// Start the execution loop.
  ///
  /// Runs until the cancellation token is triggered or every sender is
  /// dropped. Runs already started are awaited before returning; ids still
  /// queued when cancelled are left in `Starting` for a later resume.
  pub async fn start(self, cancel: CancellationToken) {
    let Self {
      sender,
      mut receiver,
      pipeline,
      limit,
    } = self;
    // Only external senders keep the loop alive
    drop(sender);

    info!("starting pipeline runner");
    let mut tasks = JoinSet::new();

    loop {
      tokio::select! {
          _ = cancel.cancelled() => {
              info!("pipeline runner cancelled");
              break;
          }
          Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
          run_id = receiver.recv() => {
              match run_id {
                  Some(run_id) => {
                      let pipeline = pipeline.clone();
                      let limit = limit.clone();
                      tasks.spawn(async move {
                          let Ok(_permit) = limit.acquire_owned().await else {
                              return;
                          };
                          match pipeline.execute(&run_id).await {
                              Ok(run) => {
                                  info!(
                                      run_id = %run.run_id,
                                      step = %run.current_step,
                                      "run finished"
                                  );
                              }
                              Err(e) => {
                                  error!(run_id = %run_id, error = %e, "run execution failed");
                              }
                          }
                      });
                  }
                  None => {
                      info!("pipeline runner channel closed");
                      break;
                  }
              }
          }
      }
    }

    while tasks.join_next().await.is_some() {}
    info!("pipeline runner stopped");
  }

  pub fn pipeline(&self) -> &ImagePipeline<N> {
    &self.pipeline
  }
}

/// Creates runs and queues them on a [`PipelineRunner`].
pub struct RunSubmitter<N: RunNotifier + 'static = NoopNotifier> {
  pipeline: Arc<ImagePipeline<N>>,
  sender: mpsc::Sender<String>,
}

impl<N: RunNotifier + 'static> Clone for RunSubmitter<N> {
  fn clone(&self) -> Self {
    Self {
      pipeline: self.pipeline.clone(),
      sender: self.sender.clone(),
    }
  }
}

impl<N: RunNotifier + 'static> RunSubmitter<N> {
  /// Create a run in `Starting` and queue it for execution.
  ///
  /// If the runner has stopped, the run stays in `Starting` for a later
  /// resume and [`PipelineError::RunnerClosed`] is returned.
  pub async fn submit(&self, run_id: &str) -> Result<(), PipelineError> {
    self.pipeline.create(run_id).await?;
    self
      .sender
      .send(run_id.to_string())
      .await
      .map_err(|_| PipelineError::RunnerClosed)
  }
}
