//! Single-item removal processor
//!
//! This module provides the `RemovalProcessor` that turns one
//! (media, region, options) triple into one [`ProcessResult`]. The batch
//! runner calls the same logic per item, so interactive and batch runs
//! behave identically apart from the inline preview.

use crate::{
    config::RemovalOptions,
    credentials::CredentialStore,
    error::{RemovalError, Result},
    inpaint::{InpaintBackends, Inpainter},
    services::{ImageIOService, OutputFormatHandler, ScratchManager},
    types::{ProcessResult, Region},
    utils::RegionValidator,
};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Scratch file prefix for processed images
const OUTPUT_PREFIX: &str = "processed";

/// Whether a processing call builds an inline preview of its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewMode {
    /// Attach a `data:` URL; used for interactive single-image calls
    Inline,
    /// Consumers read the output by path
    Skip,
}

/// Dispatcher that validates, inpaints, encodes and registers one output
#[derive(Clone)]
pub struct RemovalProcessor {
    backends: InpaintBackends,
    credentials: Arc<dyn CredentialStore>,
    scratch: ScratchManager,
    jpeg_quality: u8,
}

impl RemovalProcessor {
    pub fn new(
        backends: InpaintBackends,
        credentials: Arc<dyn CredentialStore>,
        scratch: ScratchManager,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            backends,
            credentials,
            scratch,
            jpeg_quality,
        }
    }

    #[must_use]
    pub fn scratch(&self) -> &ScratchManager {
        &self.scratch
    }

    #[must_use]
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    #[must_use]
    pub fn backends(&self) -> &InpaintBackends {
        &self.backends
    }

    /// Validate options and select the inpainter for a run
    ///
    /// # Errors
    /// - Options out of range
    /// - Cloud method without a stored credential
    pub fn prepare(&self, options: &RemovalOptions) -> Result<Inpainter> {
        self.backends.select(options, self.credentials.as_ref())
    }

    /// Process one image with its inline preview
    ///
    /// # Errors
    /// - `Validation`: bad options, bad region, missing credential
    /// - `Io`: unreadable source, undecodable data, write failure
    /// - Inpainter failure
    pub async fn process_one<P: AsRef<Path>>(
        &self,
        path: P,
        region: Region,
        options: &RemovalOptions,
    ) -> Result<ProcessResult> {
        let inpainter = self.prepare(options)?;
        self.process_with(&inpainter, path.as_ref(), region, options, PreviewMode::Inline)
            .await
    }

    /// Process one image with an already selected inpainter
    ///
    /// The output is written to a new scratch file; on any failure nothing
    /// stays registered.
    ///
    /// # Errors
    /// - `Validation`: region outside the image
    /// - `Io`: unreadable source, undecodable data, write failure
    /// - Inpainter failure
    #[instrument(
        name = "process",
        skip(self, inpainter, path, region, options),
        fields(path = %path.display(), method = %inpainter.method(), region = %region)
    )]
    pub async fn process_with(
        &self,
        inpainter: &Inpainter,
        path: &Path,
        region: Region,
        options: &RemovalOptions,
        preview: PreviewMode,
    ) -> Result<ProcessResult> {
        let start = Instant::now();

        let source = ImageIOService::load_source(path).await?;
        let (width, height) = source.dimensions();
        let region = RegionValidator::validate(region, width, height)?;
        debug!(width, height, format = ?source.format, "Loaded source image");

        let inpainted = inpainter.inpaint(&source, region).await?;

        let format = OutputFormatHandler::resolve(source.format, options.lossless);
        let jpeg_quality = self.jpeg_quality;
        let bytes = tokio::task::spawn_blocking(move || {
            OutputFormatHandler::encode(&inpainted, format, jpeg_quality)
        })
        .await
        .map_err(|e| RemovalError::internal(format!("Encode task failed: {}", e)))??;

        let output = self.scratch.allocate(OUTPUT_PREFIX, format.extension())?;
        ImageIOService::write_bytes(output.path(), &bytes).await?;

        let preview = match preview {
            PreviewMode::Inline => Some(ImageIOService::to_data_url(&bytes, format)),
            PreviewMode::Skip => None,
        };

        let result = ProcessResult {
            output_path: output.persist(),
            preview,
            original_size_bytes: source.size_bytes(),
            processed_size_bytes: bytes.len() as u64,
        };

        info!(
            output = %result.output_path.display(),
            original_bytes = result.original_size_bytes,
            processed_bytes = result.processed_size_bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Watermark removed"
        );

        Ok(result)
    }
}
