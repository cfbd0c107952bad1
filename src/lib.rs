#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Watermark Remover
//!
//! Region inpainting engine for removing watermarks from images, batches of
//! images and videos.
//!
//! A caller selects a rectangle in source-pixel coordinates and a set of
//! [`RemovalOptions`]; the engine fills the rectangle either with a local,
//! deterministic algorithm or through a remote generative image service.
//!
//! ## Features
//!
//! - **Single images**: one output per call, with an inline `data:` preview
//! - **Batches**: sequential runs with per-file failure isolation and resume
//! - **Videos**: background frame-by-frame jobs with progress polling and
//!   cooperative cancellation, encoded through ffmpeg
//! - **Scratch files**: every output lives in a session scratch directory
//!   until it is exported, and is swept by [`WatermarkRemover::cleanup_all`]
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use watermark_remover::{EngineConfig, Region, RemovalOptions, WatermarkRemover};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = WatermarkRemover::new(EngineConfig::default())?;
//! let options = RemovalOptions::builder().dilate_pixels(4).build()?;
//!
//! let result = engine
//!     .process_one("photo.jpg", Region::new(20, 400, 180, 40), &options)
//!     .await?;
//! engine.export(&result.output_path, "photo-clean.jpg").await?;
//! println!("{}% smaller", result.size_reduction_percent());
//! # Ok(())
//! # }
//! ```
//!
//! ## Video jobs
//!
//! ```rust,no_run
//! use watermark_remover::{EngineConfig, Region, RemovalOptions, WatermarkRemover};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = WatermarkRemover::new(EngineConfig::default())?;
//! let job = engine.start_video("clip.mp4", Region::new(10, 10, 120, 32), &RemovalOptions::default())?;
//!
//! while !job.state().is_terminal() {
//!     if let Some(progress) = job.poll_progress() {
//!         println!("{:.1}%", progress.percent);
//!     }
//!     tokio::time::sleep(Duration::from_millis(500)).await;
//! }
//! let result = job.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface and progress bars
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log output for the CLI

pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod inpaint;
pub mod processor;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;
pub mod video;

pub use batch::BatchRunner;
pub use config::{
    CloudConfig, EngineConfig, EngineConfigBuilder, InpaintAlgorithm, RemovalMethod,
    RemovalOptions, RemovalOptionsBuilder,
};
pub use credentials::{CredentialStore, JsonFileCredentialStore, MemoryCredentialStore};
pub use engine::WatermarkRemover;
pub use error::{CloudError, CloudErrorKind, ErrorKind, InpaintError, RemovalError, Result};
pub use inpaint::{
    CloudInpaint, GeminiInpainter, InpaintBackends, Inpainter, LocalInpaint, LocalParams,
    PatchInpainter,
};
pub use processor::{PreviewMode, RemovalProcessor};
pub use services::{
    ConsoleProgressReporter, ImageIOService, OutputFormat,
    OutputFormatHandler, ProgressReporter, ScratchManager,
};
pub use types::{
    BatchEvent, BatchItem, BatchItemUpdate, BatchProgress, BatchStatus, BatchSummary, ImageInfo,
    ProcessResult, Region, VideoDescriptor, VideoJobState, VideoProcessResult, VideoProgress,
};
pub use utils::{NumericValidator, RegionValidator};
pub use video::{
    EncodeSettings, FfmpegCodec, FrameReader, FrameWriter, VideoCodec, VideoJob, VideoRunner,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Inpaint a decoded image in memory with the local algorithm
///
/// The region is validated (and clamped) against the image first. No files
/// are written.
///
/// # Errors
/// - Invalid options or region
/// - Local inpainter failure
///
/// # Examples
///
/// ```rust
/// use image::{DynamicImage, RgbImage};
/// use watermark_remover::{remove_watermark_from_image, Region, RemovalOptions};
///
/// # fn example() -> watermark_remover::Result<()> {
/// let image = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
/// let cleaned = remove_watermark_from_image(&image, Region::new(8, 8, 16, 4), &RemovalOptions::default())?;
/// assert_eq!(cleaned.width(), 64);
/// # Ok(())
/// # }
/// ```
pub fn remove_watermark_from_image(
    image: &image::DynamicImage,
    region: Region,
    options: &RemovalOptions,
) -> Result<image::DynamicImage> {
    options.validate()?;
    let region = RegionValidator::validate(region, image.width(), image.height())?;
    let params = LocalParams::from(options);
    Ok(PatchInpainter::new().inpaint(image, region, &params)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn test_remove_watermark_from_image_clamps_region() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([9, 9, 9])));
        let cleaned =
            remove_watermark_from_image(&image, Region::new(90, 90, 20, 20), &RemovalOptions::default())
                .unwrap();
        assert_eq!((cleaned.width(), cleaned.height()), (100, 100));
    }

    #[test]
    fn test_remove_watermark_from_image_rejects_zero_width() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(100, 100));
        let err =
            remove_watermark_from_image(&image, Region::new(10, 10, 0, 5), &RemovalOptions::default())
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
