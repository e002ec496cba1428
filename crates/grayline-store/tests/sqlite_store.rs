use grayline_store::{
  Error, PipelineRun, RunStep, RunStore, SqliteStore, StepName, StepRecord, StepStatus,
};

async fn store() -> SqliteStore {
  SqliteStore::in_memory().await.unwrap()
}

#[tokio::test]
async fn test_create_and_get_run() {
  let store = store().await;
  let run = PipelineRun::new("run-1");
  store.create_run(&run).await.unwrap();

  let loaded = store.get_run("run-1").await.unwrap();
  assert_eq!(loaded.run_id, "run-1");
  assert_eq!(loaded.current_step, RunStep::Starting);
  assert_eq!(loaded.status, "starting");
  assert!(loaded.error.is_none());
}

#[tokio::test]
async fn test_get_missing_run() {
  let store = store().await;
  let err = store.get_run("missing").await.unwrap_err();
  assert!(matches!(err, Error::NotFound(id) if id == "missing"));
}

#[tokio::test]
async fn test_duplicate_run_conflicts() {
  let store = store().await;
  store.create_run(&PipelineRun::new("dup")).await.unwrap();
  let err = store.create_run(&PipelineRun::new("dup")).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_update_writes_step_status_and_error_together() {
  let store = store().await;
  store.create_run(&PipelineRun::new("r")).await.unwrap();

  store
    .update_run_step(
      "r",
      RunStep::Starting,
      RunStep::Failed,
      "failed",
      Some("corrupt_data: bad"),
    )
    .await
    .unwrap();
  let run = store.get_run("r").await.unwrap();
  assert_eq!(run.current_step, RunStep::Failed);
  assert_eq!(run.status, "failed");
  assert_eq!(run.error.as_deref(), Some("corrupt_data: bad"));
  assert!(run.updated_at >= run.created_at);
}

#[tokio::test]
async fn test_update_missing_run() {
  let store = store().await;
  let err = store
    .update_run_step(
      "ghost",
      RunStep::Starting,
      RunStep::CopyingImage,
      "copying image",
      None,
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_update_from_stale_step_is_rejected() {
  let store = store().await;
  store.create_run(&PipelineRun::new("r")).await.unwrap();
  store
    .update_run_step("r", RunStep::Starting, RunStep::CopyingImage, "copying image", None)
    .await
    .unwrap();

  // A second writer still believes the run is starting
  let err = store
    .update_run_step("r", RunStep::Starting, RunStep::Failed, "failed", Some("late"))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::StaleState {
      expected: RunStep::Starting,
      actual: RunStep::CopyingImage,
      ..
    }
  ));

  let run = store.get_run("r").await.unwrap();
  assert_eq!(run.current_step, RunStep::CopyingImage);
  assert!(run.error.is_none());
}

#[tokio::test]
async fn test_terminal_run_is_never_rewritten() {
  let store = store().await;
  store.create_run(&PipelineRun::new("done")).await.unwrap();
  store
    .update_run_step("done", RunStep::Starting, RunStep::Completed, "completed", None)
    .await
    .unwrap();

  for (from, to) in [
    (RunStep::CopyingImage, RunStep::Failed),
    (RunStep::Completed, RunStep::Failed),
    (RunStep::Completed, RunStep::CopyingImage),
  ] {
    let err = store
      .update_run_step("done", from, to, to.description(), Some("timeout: late"))
      .await
      .unwrap_err();
    assert!(
      matches!(err, Error::Terminal { step: RunStep::Completed, .. }),
      "{from} -> {to}: {err}"
    );
  }

  let run = store.get_run("done").await.unwrap();
  assert_eq!(run.current_step, RunStep::Completed);
  assert_eq!(run.status, "completed");
  assert!(run.error.is_none());
}

#[tokio::test]
async fn test_list_incomplete_skips_terminal_runs() {
  let store = store().await;
  for id in ["a", "b", "c"] {
    store.create_run(&PipelineRun::new(id)).await.unwrap();
  }
  store
    .update_run_step("a", RunStep::Starting, RunStep::Completed, "completed", None)
    .await
    .unwrap();
  store
    .update_run_step(
      "b",
      RunStep::Starting,
      RunStep::ConvertingGrayscale,
      "converting image to grayscale",
      None,
    )
    .await
    .unwrap();

  let mut ids: Vec<_> = store
    .list_incomplete_runs()
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.run_id)
    .collect();
  ids.sort();
  assert_eq!(ids, vec!["b", "c"]);

  assert_eq!(store.list_runs(2).await.unwrap().len(), 2);
  assert_eq!(store.list_runs(10).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_step_log() {
  let store = store().await;
  store.create_run(&PipelineRun::new("r")).await.unwrap();

  let first = StepRecord::started("r", StepName::Copy, 1);
  store.record_step(&first).await.unwrap();
  store.record_step(&first.fail("stage_io: disk full")).await.unwrap();

  assert!(
    store
      .find_succeeded_step("r", StepName::Copy)
      .await
      .unwrap()
      .is_none()
  );

  let second = StepRecord::started("r", StepName::Copy, 2);
  store.record_step(&second).await.unwrap();
  store.record_step(&second.succeed()).await.unwrap();

  let found = store
    .find_succeeded_step("r", StepName::Copy)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.attempt, 2);
  assert_eq!(found.status, StepStatus::Succeeded);

  let steps = store.list_steps("r").await.unwrap();
  assert_eq!(steps.len(), 2);
  assert_eq!(steps[0].status, StepStatus::Failed);
  assert_eq!(steps[0].error.as_deref(), Some("stage_io: disk full"));
  assert_eq!(store.count_attempts("r", StepName::Copy).await.unwrap(), 2);
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let url = format!("sqlite://{}", dir.path().join("runs.db").display());

  {
    let store = SqliteStore::connect(&url).await.unwrap();
    store.create_run(&PipelineRun::new("persisted")).await.unwrap();
    store
      .update_run_step(
        "persisted",
        RunStep::Starting,
        RunStep::CopyingImage,
        "copying image",
        None,
      )
      .await
      .unwrap();
    store.pool().close().await;
  }

  let store = SqliteStore::connect(&url).await.unwrap();
  let run = store.get_run("persisted").await.unwrap();
  assert_eq!(run.current_step, RunStep::CopyingImage);
  assert_eq!(store.list_incomplete_runs().await.unwrap().len(), 1);
}
