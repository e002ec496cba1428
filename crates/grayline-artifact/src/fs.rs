use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{ByteStream, Error, Stage, StageKey, Store};

/// Filesystem-based staged store.
///
/// Each stage maps to its own directory and each object is stored at
/// `{stage_dir}/{id}`. Directories are created on first write.
///
/// Writes go to a temporary sibling file that is renamed into place, so a
/// reader never sees a partially written object and a repeated write simply
/// replaces the previous one.
pub struct FsStore {
  upload_dir: PathBuf,
  working_dir: PathBuf,
  processed_dir: PathBuf,
}

impl FsStore {
  /// Create a store with one subdirectory per stage under `base_path`.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    let base: PathBuf = base_path.into();
    Self::with_dirs(
      base.join(Stage::Upload.as_str()),
      base.join(Stage::Working.as_str()),
      base.join(Stage::Processed.as_str()),
    )
  }

  /// Create a store with explicit per-stage directories.
  pub fn with_dirs(
    upload_dir: impl Into<PathBuf>,
    working_dir: impl Into<PathBuf>,
    processed_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      upload_dir: upload_dir.into(),
      working_dir: working_dir.into(),
      processed_dir: processed_dir.into(),
    }
  }

  /// Directory backing `stage`.
  pub fn stage_dir(&self, stage: Stage) -> &Path {
    match stage {
      Stage::Upload => &self.upload_dir,
      Stage::Working => &self.working_dir,
      Stage::Processed => &self.processed_dir,
    }
  }

  /// Path of the object stored under `key`.
  pub fn key_to_path(&self, key: &StageKey) -> PathBuf {
    self.stage_dir(key.stage()).join(key.id())
  }

  /// Create all stage directories.
  pub async fn ensure_dirs(&self) -> Result<(), Error> {
    for stage in Stage::ALL {
      fs::create_dir_all(self.stage_dir(stage)).await?;
    }
    Ok(())
  }

  /// Temporary path next to `path`, unique per write.
  fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
  }

  async fn prepare_parent(path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await?;
    }
    Ok(())
  }
}

fn not_found_or_io(key: &StageKey, e: std::io::Error) -> Error {
  if e.kind() == std::io::ErrorKind::NotFound {
    Error::NotFound(key.clone())
  } else {
    Error::Io(e)
  }
}

#[async_trait]
impl Store for FsStore {
  async fn get(&self, key: &StageKey) -> Result<ByteStream, Error> {
    let path = self.key_to_path(key);
    let file = File::open(&path)
      .await
      .map_err(|e| not_found_or_io(key, e))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    Ok(Box::pin(stream))
  }

  async fn put(&self, key: &StageKey, data: ByteStream) -> Result<(), Error> {
    let path = self.key_to_path(key);
    Self::prepare_parent(&path).await?;

    let tmp = Self::temp_path(&path);
    let written = async {
      let mut file = File::create(&tmp).await?;
      let mut stream = std::pin::pin!(data);

      while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        file.write_all(&bytes).await?;
      }

      file.flush().await?;
      file.sync_all().await?;
      Ok::<_, Error>(())
    }
    .await;

    if let Err(e) = written {
      let _ = fs::remove_file(&tmp).await;
      return Err(e);
    }

    fs::rename(&tmp, &path).await?;
    debug!(key = %key, path = %path.display(), "stored object");
    Ok(())
  }

  async fn delete(&self, key: &StageKey) -> Result<(), Error> {
    let path = self.key_to_path(key);
    fs::remove_file(&path)
      .await
      .map_err(|e| not_found_or_io(key, e))
  }

  async fn exists(&self, key: &StageKey) -> Result<bool, Error> {
    Ok(fs::try_exists(self.key_to_path(key)).await?)
  }

  async fn copy(&self, src: &StageKey, dst: &StageKey) -> Result<(), Error> {
    let src_path = self.key_to_path(src);
    let dst_path = self.key_to_path(dst);
    Self::prepare_parent(&dst_path).await?;

    let tmp = Self::temp_path(&dst_path);
    if let Err(e) = fs::copy(&src_path, &tmp).await {
      let _ = fs::remove_file(&tmp).await;
      return Err(not_found_or_io(src, e));
    }

    fs::rename(&tmp, &dst_path).await?;
    debug!(src = %src, dst = %dst, "copied object");
    Ok(())
  }
}
