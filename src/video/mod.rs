//! Video processing
//!
//! Frame decoding and encoding sit behind the [`VideoCodec`] trait so the
//! runner can be driven by the ffmpeg-based codec in production and by an
//! in-memory codec in tests. Frames cross the boundary as packed RGB8
//! buffers.

pub mod ffmpeg;
pub mod runner;

pub use ffmpeg::FfmpegCodec;
pub use runner::{VideoJob, VideoRunner};

use crate::{error::Result, types::VideoDescriptor};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Container extension of processed videos
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Sequential frame source
pub trait FrameReader: Send {
    /// Next decoded frame, `None` once the stream is exhausted
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Sequential frame sink
pub trait FrameWriter: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and close the container
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Encoder options for one output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    /// Mathematically lossless video instead of the default quality preset
    pub lossless: bool,
    /// File whose audio track is muxed into the output, if it has one
    pub audio_source: Option<PathBuf>,
}

/// Video container access
pub trait VideoCodec: Send + Sync {
    /// Read stream properties
    fn probe(&self, path: &Path) -> Result<VideoDescriptor>;

    fn open_reader(&self, path: &Path, descriptor: &VideoDescriptor) -> Result<Box<dyn FrameReader>>;

    fn open_writer(
        &self,
        path: &Path,
        descriptor: &VideoDescriptor,
        settings: &EncodeSettings,
    ) -> Result<Box<dyn FrameWriter>>;
}
