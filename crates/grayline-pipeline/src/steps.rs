//! Step bodies for the grayscale pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use grayline_artifact::{Stage, StageKey, Store as StageStore};
use grayline_image::{CodecError, OUTPUT_FORMAT, OUTPUT_QUALITY, decode, encode, grayscale};
use grayline_runtime::{Step, StepError};
use grayline_store::StepName;
use tracing::debug;

/// Copies `upload/<id>` to `working/<id>` unchanged.
pub struct CopyImageStep {
  stages: Arc<dyn StageStore>,
}

impl CopyImageStep {
  pub fn new(stages: Arc<dyn StageStore>) -> Self {
    Self { stages }
  }
}

#[async_trait]
impl Step for CopyImageStep {
  fn name(&self) -> StepName {
    StepName::Copy
  }

  async fn execute(&self, run_id: &str) -> Result<(), StepError> {
    let src = StageKey::new(Stage::Upload, run_id)?;
    let dst = src.with_stage(Stage::Working);
    self.stages.copy(&src, &dst).await?;
    debug!(src = %src, dst = %dst, "image copied");
    Ok(())
  }
}

/// Converts `working/<id>` to gray and publishes it as `processed/<id>`.
pub struct GrayscaleImageStep {
  stages: Arc<dyn StageStore>,
  quality: u8,
}

impl GrayscaleImageStep {
  pub fn new(stages: Arc<dyn StageStore>) -> Self {
    Self::with_quality(stages, OUTPUT_QUALITY)
  }

  pub fn with_quality(stages: Arc<dyn StageStore>, quality: u8) -> Self {
    Self { stages, quality }
  }

  pub fn quality(&self) -> u8 {
    self.quality
  }
}

#[async_trait]
impl Step for GrayscaleImageStep {
  fn name(&self) -> StepName {
    StepName::Grayscale
  }

  async fn execute(&self, run_id: &str) -> Result<(), StepError> {
    let src = StageKey::new(Stage::Working, run_id)?;
    let dst = src.with_stage(Stage::Processed);

    let input = self.stages.read(&src).await?;
    let input_len = input.len();
    let quality = self.quality;
    // A blocking task cannot be aborted: if the attempt times out, the
    // conversion runs to completion on its thread and the result is dropped.
    // Nothing is written, since the write below is never reached.
    let output = tokio::task::spawn_blocking(move || to_grayscale(&input, quality))
      .await
      .map_err(|e| StepError::Encode {
        message: format!("grayscale worker did not finish: {e}"),
      })??;

    debug!(
      src = %src,
      dst = %dst,
      input_bytes = input_len,
      output_bytes = output.len(),
      "image converted"
    );
    self.stages.write(&dst, Bytes::from(output)).await?;
    Ok(())
  }
}

fn to_grayscale(bytes: &[u8], quality: u8) -> Result<Vec<u8>, CodecError> {
  let image = decode(bytes, None)?;
  let gray = grayscale::transform(&image);
  encode(&gray, OUTPUT_FORMAT, Some(quality))
}
