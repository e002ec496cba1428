use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{Error, PipelineRun, RunStep, RunStore, StepRecord, rejected_update};

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
  runs: RwLock<HashMap<String, PipelineRun>>,
  steps: RwLock<Vec<StepRecord>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RunStore for MemoryStore {
  async fn create_run(&self, run: &PipelineRun) -> Result<(), Error> {
    let mut runs = self.runs.write().await;
    if runs.contains_key(&run.run_id) {
      return Err(Error::Conflict(run.run_id.clone()));
    }
    runs.insert(run.run_id.clone(), run.clone());
    Ok(())
  }

  async fn get_run(&self, run_id: &str) -> Result<PipelineRun, Error> {
    self
      .runs
      .read()
      .await
      .get(run_id)
      .cloned()
      .ok_or_else(|| Error::NotFound(run_id.to_string()))
  }

  async fn update_run_step(
    &self,
    run_id: &str,
    from: RunStep,
    to: RunStep,
    status: &str,
    error: Option<&str>,
  ) -> Result<(), Error> {
    let mut runs = self.runs.write().await;
    let run = runs
      .get_mut(run_id)
      .ok_or_else(|| Error::NotFound(run_id.to_string()))?;
    if run.current_step != from || run.current_step.is_terminal() {
      return Err(rejected_update(run_id, from, run.current_step));
    }
    run.current_step = to;
    run.status = status.to_string();
    run.error = error.map(str::to_string);
    run.updated_at = Utc::now();
    Ok(())
  }

  async fn list_runs(&self, limit: u32) -> Result<Vec<PipelineRun>, Error> {
    let mut runs: Vec<_> = self.runs.read().await.values().cloned().collect();
    runs.sort_by(|a, b| {
      b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.run_id.cmp(&b.run_id))
    });
    runs.truncate(limit as usize);
    Ok(runs)
  }

  async fn list_incomplete_runs(&self) -> Result<Vec<PipelineRun>, Error> {
    let mut runs: Vec<_> = self
      .runs
      .read()
      .await
      .values()
      .filter(|r| !r.is_terminal())
      .cloned()
      .collect();
    runs.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.run_id.cmp(&b.run_id))
    });
    Ok(runs)
  }

  async fn record_step(&self, record: &StepRecord) -> Result<(), Error> {
    let mut steps = self.steps.write().await;
    match steps.iter_mut().find(|r| {
      r.run_id == record.run_id && r.step == record.step && r.attempt == record.attempt
    }) {
      Some(existing) => *existing = record.clone(),
      None => steps.push(record.clone()),
    }
    Ok(())
  }

  async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, Error> {
    Ok(
      self
        .steps
        .read()
        .await
        .iter()
        .filter(|r| r.run_id == run_id)
        .cloned()
        .collect(),
    )
  }
}
