//! Grayline Config
//!
//! This crate contains the serializable configuration for a Grayline
//! deployment: where each stage keeps its images, where run records are
//! persisted, and how steps are bounded and retried.
//!
//! Configuration can be loaded from a JSON file (via CLI with
//! `--config=grayline.json`). Every field is optional; missing values fall back
//! to defaults rooted at the data directory.

mod enums;
mod pipeline;

pub use enums::RetryBackoff;
pub use pipeline::{ConfigError, PipelineConfig};
