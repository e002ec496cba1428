use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

use crate::{Error, PipelineRun, RunStep, RunStore, StepName, StepRecord, rejected_update};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if missing) the database at `url` and run migrations.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A private in-memory database, migrated and ready to use.
  ///
  /// The pool is pinned to one connection that never expires, since each
  /// SQLite in-memory connection is its own database.
  pub async fn in_memory() -> Result<Self, Error> {
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect("sqlite::memory:")
      .await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }
}

#[async_trait]
impl RunStore for SqliteStore {
  async fn create_run(&self, run: &PipelineRun) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            INSERT INTO pipeline_runs (run_id, current_step, status, error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&run.run_id)
    .bind(run.current_step)
    .bind(&run.status)
    .bind(&run.error)
    .bind(run.created_at)
    .bind(run.updated_at)
    .execute(&self.pool)
    .await;

    match result {
      Ok(_) => Ok(()),
      Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
        Err(Error::Conflict(run.run_id.clone()))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn get_run(&self, run_id: &str) -> Result<PipelineRun, Error> {
    sqlx::query_as(
      r#"
            SELECT run_id, current_step, status, error, created_at, updated_at
            FROM pipeline_runs
            WHERE run_id = ?
            "#,
    )
    .bind(run_id)
    .fetch_optional(&self.pool)
    .await?
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
    let result = sqlx::query(
      r#"
            UPDATE pipeline_runs
            SET current_step = ?, status = ?, error = ?, updated_at = ?
            WHERE run_id = ? AND current_step = ?
              AND current_step NOT IN ('completed', 'failed')
            "#,
    )
    .bind(to)
    .bind(status)
    .bind(error)
    .bind(Utc::now())
    .bind(run_id)
    .bind(from)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      let current = self.get_run(run_id).await?;
      return Err(rejected_update(run_id, from, current.current_step));
    }
    Ok(())
  }

  async fn list_runs(&self, limit: u32) -> Result<Vec<PipelineRun>, Error> {
    let runs = sqlx::query_as(
      r#"
            SELECT run_id, current_step, status, error, created_at, updated_at
            FROM pipeline_runs
            ORDER BY created_at DESC, run_id
            LIMIT ?
            "#,
    )
    .bind(limit)
    .fetch_all(&self.pool)
    .await?;
    Ok(runs)
  }

  async fn list_incomplete_runs(&self) -> Result<Vec<PipelineRun>, Error> {
    let runs = sqlx::query_as(
      r#"
            SELECT run_id, current_step, status, error, created_at, updated_at
            FROM pipeline_runs
            WHERE current_step NOT IN ('completed', 'failed')
            ORDER BY created_at, run_id
            "#,
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(runs)
  }

  async fn record_step(&self, record: &StepRecord) -> Result<(), Error> {
    sqlx::query(
      r#"
            INSERT OR REPLACE INTO pipeline_steps (run_id, step, attempt, status, error, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(&record.run_id)
    .bind(record.step)
    .bind(record.attempt)
    .bind(record.status)
    .bind(&record.error)
    .bind(record.started_at)
    .bind(record.completed_at)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn list_steps(&self, run_id: &str) -> Result<Vec<StepRecord>, Error> {
    let steps = sqlx::query_as(
      r#"
            SELECT run_id, step, attempt, status, error, started_at, completed_at
            FROM pipeline_steps
            WHERE run_id = ?
            ORDER BY started_at, attempt
            "#,
    )
    .bind(run_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(steps)
  }

  async fn find_succeeded_step(
    &self,
    run_id: &str,
    step: StepName,
  ) -> Result<Option<StepRecord>, Error> {
    let record = sqlx::query_as(
      r#"
            SELECT run_id, step, attempt, status, error, started_at, completed_at
            FROM pipeline_steps
            WHERE run_id = ? AND step = ? AND status = 'succeeded'
            ORDER BY attempt DESC
            LIMIT 1
            "#,
    )
    .bind(run_id)
    .bind(step)
    .fetch_optional(&self.pool)
    .await?;
    Ok(record)
  }
}
