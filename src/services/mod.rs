//! Service layer shared by the dispatcher, batch runner and video runner
//!
//! Services hold no processing policy of their own: format selection and
//! encoding, media I/O, scratch file ownership and progress reporting.

pub mod format;
pub mod io;
pub mod progress;
pub mod scratch;

pub use format::{OutputFormat, OutputFormatHandler};
pub use io::{ImageIOService, SourceImage};
pub use progress::{
    video_progress_channel, ConsoleProgressReporter, ProgressEstimator,
    ProgressReporter, VideoProgressPublisher,
};
pub use scratch::{ScratchFile, ScratchManager};
