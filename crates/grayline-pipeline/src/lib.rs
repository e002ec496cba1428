//! Grayline Pipeline
//!
//! The grayscale image pipeline: a run copies an uploaded image into the
//! working stage, converts it to gray and publishes it to the processed stage.
//!
//! - [`ImagePipeline`] drives a run through its states, invoking each step
//!   through a [`grayline_runtime::DurableStepRunner`] and persisting every
//!   transition
//! - [`CopyImageStep`] / [`GrayscaleImageStep`] are the step bodies
//! - [`StatusProjector`] answers status queries from the persisted record
//! - [`PipelineRunner`] accepts run ids over a channel and drives them
//!   concurrently

mod error;
mod events;
mod machine;
mod runner;
mod state;
mod status;
mod steps;

pub use error::PipelineError;
pub use events::{ChannelNotifier, NoopNotifier, RunEvent, RunNotifier};
pub use machine::ImagePipeline;
pub use runner::{PipelineRunner, RunSubmitter};
pub use status::{RunStatus, StatusProjector};
pub use steps::{CopyImageStep, GrayscaleImageStep};
