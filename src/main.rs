use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use grayline_artifact::{FsStore, Stage, StageKey, Store};
use grayline_config::PipelineConfig;
use grayline_pipeline::{ImagePipeline, PipelineRunner, RunStatus};
use grayline_store::{RunStep, SqliteStore};

/// Grayline - durable grayscale conversion for uploaded images
#[derive(Parser)]
#[command(name = "grayline")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.grayline)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Path to a JSON config file (default: <data-dir>/grayline.json if present)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Log at debug level unless RUST_LOG says otherwise
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Upload one or more images and convert them to grayscale
  Submit {
    /// Image files to convert; `-` reads a single image from stdin
    #[arg(required = true)]
    files: Vec<PathBuf>,
  },

  /// Show the status of a run
  Status {
    run_id: String,
  },

  /// Finish every run interrupted by a previous process
  Resume,

  /// List recent runs
  List {
    /// Maximum number of runs to show
    #[arg(long, default_value_t = 20)]
    limit: u32,
  },

  /// Write the converted image of a completed run to a file
  Download {
    run_id: String,

    /// Destination file
    out_file: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".grayline"),
  };

  let Some(command) = cli.command else {
    println!("grayline - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run(command, data_dir, cli.config).await })
}

fn init_tracing(verbose: bool) {
  let default_level = if verbose { "debug" } else { "info" };
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

/// Everything a command needs, opened from the data directory.
struct App {
  config: PipelineConfig,
  stages: Arc<FsStore>,
  pipeline: Arc<ImagePipeline>,
}

async fn open(data_dir: &Path, config_file: Option<PathBuf>) -> Result<App> {
  tokio::fs::create_dir_all(data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

  let config_file = config_file.or_else(|| {
    let default = data_dir.join("grayline.json");
    default.exists().then_some(default)
  });
  let config = match config_file {
    Some(path) => PipelineConfig::load(&path)?,
    None => PipelineConfig::default(),
  }
  .with_data_dir(data_dir);

  let stages = Arc::new(FsStore::with_dirs(
    config.upload_dir.clone().unwrap_or_default(),
    config.working_dir.clone().unwrap_or_default(),
    config.processed_dir.clone().unwrap_or_default(),
  ));
  stages
    .ensure_dirs()
    .await
    .context("failed to create stage directories")?;

  let database_url = config.database_url.clone().unwrap_or_default();
  let runs = Arc::new(
    SqliteStore::connect(&database_url)
      .await
      .with_context(|| format!("failed to open run database: {}", database_url))?,
  );

  let pipeline = Arc::new(ImagePipeline::local(&config, runs, stages.clone()));

  Ok(App {
    config,
    stages,
    pipeline,
  })
}

async fn run(command: Commands, data_dir: PathBuf, config_file: Option<PathBuf>) -> Result<()> {
  let app = open(&data_dir, config_file).await?;

  match command {
    Commands::Submit { files } => submit(&app, files).await,
    Commands::Status { run_id } => {
      let status = app
        .pipeline
        .status()
        .snapshot(&run_id)
        .await
        .context("failed to query run status")?;
      print_json(&status)
    }
    Commands::Resume => {
      let runs = app
        .pipeline
        .resume_incomplete()
        .await
        .context("failed to resume runs")?;
      eprintln!("Resumed {} run(s)", runs.len());
      let statuses: Vec<RunStatus> = runs.into_iter().map(RunStatus::from).collect();
      print_json(&statuses)
    }
    Commands::List { limit } => {
      let statuses = app
        .pipeline
        .status()
        .list(limit)
        .await
        .context("failed to list runs")?;
      print_json(&statuses)
    }
    Commands::Download { run_id, out_file } => download(&app, &run_id, &out_file).await,
  }
}

async fn submit(app: &App, files: Vec<PathBuf>) -> Result<()> {
  let runner = PipelineRunner::new(app.pipeline.clone(), app.config.max_concurrent_runs());
  let submitter = runner.submitter();

  let cancel = CancellationToken::new();
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      eprintln!("Interrupted; unfinished runs can be finished with `grayline resume`");
      on_signal.cancel();
    }
  });
  let driver = tokio::spawn(runner.start(cancel));

  let mut run_ids = Vec::with_capacity(files.len());
  for file in &files {
    let data = if file.as_os_str() == "-" {
      read_image_from_stdin()?
    } else {
      tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read image file: {}", file.display()))?
    };

    let run_id = uuid::Uuid::new_v4().to_string();
    let key = StageKey::new(Stage::Upload, run_id.as_str())?;
    app
      .stages
      .write(&key, Bytes::from(data))
      .await
      .with_context(|| format!("failed to stage upload for {}", file.display()))?;
    submitter
      .submit(&run_id)
      .await
      .with_context(|| format!("failed to submit run for {}", file.display()))?;
    eprintln!("Submitted {} as {}", file.display(), run_id);
    run_ids.push(run_id);
  }

  // The runner stops once its queue is drained and no submitter is left
  drop(submitter);
  driver.await.context("pipeline runner task failed")?;

  let projector = app.pipeline.status();
  let mut statuses = Vec::with_capacity(run_ids.len());
  for run_id in &run_ids {
    statuses.push(projector.snapshot(run_id).await?);
  }

  if statuses.len() == 1 {
    print_json(&statuses[0])
  } else {
    print_json(&statuses)
  }
}

async fn download(app: &App, run_id: &str, out_file: &Path) -> Result<()> {
  let status = app
    .pipeline
    .status()
    .snapshot(run_id)
    .await
    .context("failed to query run status")?;
  if status.step != RunStep::Completed {
    bail!(
      "run {} is not completed (status: {})",
      run_id,
      status.status
    );
  }

  let key = StageKey::new(Stage::Processed, run_id)?;
  let data = app
    .stages
    .read(&key)
    .await
    .with_context(|| format!("failed to read processed image for run {}", run_id))?;
  tokio::fs::write(out_file, &data)
    .await
    .with_context(|| format!("failed to write {}", out_file.display()))?;

  eprintln!("Wrote {} bytes to {}", data.len(), out_file.display());
  Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn read_image_from_stdin() -> Result<Vec<u8>> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    bail!("refusing to read image data from a terminal; pipe a file into stdin");
  }

  let mut input = Vec::new();
  io::stdin()
    .read_to_end(&mut input)
    .context("failed to read image from stdin")?;
  Ok(input)
}
