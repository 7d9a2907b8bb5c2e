//! Services separating byte handling and progress reporting from the stages

pub mod codec;
pub mod progress;

pub use codec::ImageCodec;
pub use progress::{ItemEvent, LogProgressReporter, NoOpProgressReporter, PipelineStage, ProgressReporter};

#[cfg(feature = "cli")]
pub use progress::{create_cli_progress_reporter, BarProgressReporter};
