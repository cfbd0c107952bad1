//! Session facade
//!
//! [`WatermarkRemover`] wires the configured collaborators together and is
//! the single entry point a frontend talks to. Each session allocates into
//! its own locked scratch subdirectory; creating one sweeps sessions that no
//! live process holds.

use crate::{
    batch::BatchRunner,
    config::{EngineConfig, RemovalOptions},
    credentials::{CredentialStore, JsonFileCredentialStore},
    error::{RemovalError, Result},
    inpaint::InpaintBackends,
    processor::RemovalProcessor,
    services::{ImageIOService, OutputFormat, OutputFormatHandler, ScratchManager},
    types::{
        BatchEvent, BatchItem, BatchSummary, ImageInfo, ProcessResult, Region, VideoDescriptor,
        VideoJobState, VideoProgress,
    },
    video::{FfmpegCodec, VideoCodec, VideoJob, VideoRunner},
};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One processing session
pub struct WatermarkRemover {
    config: EngineConfig,
    processor: RemovalProcessor,
    batch: BatchRunner,
    video: VideoRunner,
}

impl WatermarkRemover {
    /// Session with the default collaborators: the settings-file credential
    /// store, the patch and Gemini inpainters and the ffmpeg codec
    ///
    /// # Errors
    /// - Invalid configuration
    /// - No user config directory for the credential store
    /// - Scratch session cannot be created or swept
    pub fn new(config: EngineConfig) -> Result<Self> {
        let credentials = Arc::new(JsonFileCredentialStore::default_location()?);
        let backends = InpaintBackends::from_config(&config.cloud)?;
        let codec = Arc::new(FfmpegCodec::from_config(&config));
        Self::with_components(config, credentials, backends, codec)
    }

    /// Session with explicit collaborators
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Scratch session cannot be created or swept
    pub fn with_components(
        config: EngineConfig,
        credentials: Arc<dyn CredentialStore>,
        backends: InpaintBackends,
        codec: Arc<dyn VideoCodec>,
    ) -> Result<Self> {
        config.validate()?;

        let scratch = ScratchManager::open_session(config.scratch_dir())?;
        let orphans = scratch.cleanup_all()?;
        if orphans > 0 {
            info!(orphans, root = %scratch.root().display(), "Removed scratch files from earlier sessions");
        }

        let processor = RemovalProcessor::new(backends, credentials, scratch, config.jpeg_quality);
        let batch = BatchRunner::new(processor.clone());
        let video = VideoRunner::new(
            codec,
            processor.clone(),
            config.progress_interval_frames,
            config.preserve_audio,
        );

        Ok(Self {
            config,
            processor,
            batch,
            video,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn scratch(&self) -> &ScratchManager {
        self.processor.scratch()
    }

    /// Remove a watermark from one image
    ///
    /// # Errors
    /// See [`RemovalProcessor::process_one`]
    pub async fn process_one<P: AsRef<Path>>(
        &self,
        path: P,
        region: Region,
        options: &RemovalOptions,
    ) -> Result<ProcessResult> {
        self.processor.process_one(path, region, options).await
    }

    /// Run a batch with one region and one set of options
    ///
    /// # Errors
    /// See [`BatchRunner::run`]
    pub async fn run_batch<F>(
        &self,
        items: &mut [BatchItem],
        region: Region,
        options: &RemovalOptions,
        on_update: F,
    ) -> Result<BatchSummary>
    where
        F: FnMut(BatchEvent),
    {
        self.batch.run(items, region, options, on_update).await
    }

    /// Start a background video job
    ///
    /// # Errors
    /// See [`VideoRunner::start`]
    pub fn start_video<P: AsRef<Path>>(
        &self,
        path: P,
        region: Region,
        options: &RemovalOptions,
    ) -> Result<VideoJob> {
        self.video.start(path, region, options)
    }

    #[must_use]
    pub fn poll_video(&self) -> Option<VideoProgress> {
        self.video.poll_progress()
    }

    pub fn cancel_video(&self) {
        self.video.cancel();
    }

    #[must_use]
    pub fn video_state(&self) -> VideoJobState {
        self.video.state()
    }

    /// Remove this session's scratch files and any stale session's
    ///
    /// # Errors
    /// Returns `RemovalError::Io` when the scratch directory cannot be listed
    pub fn cleanup_all(&self) -> Result<usize> {
        self.scratch().cleanup_all()
    }

    /// Copy a produced file to its final destination
    ///
    /// The scratch file stays registered and is removed by the next cleanup.
    /// Returns the number of bytes copied.
    ///
    /// # Errors
    /// Returns `RemovalError::Io` when the source is missing or the copy fails
    pub async fn export<P: AsRef<Path>, Q: AsRef<Path>>(&self, scratch_path: P, destination: Q) -> Result<u64> {
        let source = scratch_path.as_ref();
        let destination = destination.as_ref();
        if !self.scratch().is_registered(source) {
            debug!(path = %source.display(), "Exporting a file the scratch manager does not track");
        }
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RemovalError::file_io_error("create destination directory", parent, &e))?;
        }
        let bytes = tokio::fs::copy(source, destination)
            .await
            .map_err(|e| RemovalError::file_io_error("export", source, &e))?;
        info!(from = %source.display(), to = %destination.display(), bytes, "Exported result");
        Ok(bytes)
    }

    /// # Errors
    /// See [`ImageIOService::image_info`]
    pub fn image_info<P: AsRef<Path>>(&self, path: P) -> Result<ImageInfo> {
        ImageIOService::image_info(path)
    }

    /// Probe a video container
    ///
    /// # Errors
    /// Missing file or a container the codec cannot read
    pub async fn video_info<P: AsRef<Path>>(&self, path: P) -> Result<VideoDescriptor> {
        let codec = Arc::clone(self.video.codec());
        let path = path.as_ref().to_path_buf();
        blocking(move || codec.probe(&path)).await
    }

    /// First frame of a video as a PNG `data:` URL, for region selection
    ///
    /// # Errors
    /// Missing file, unreadable container or a video without frames
    pub async fn extract_video_frame<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let codec = Arc::clone(self.video.codec());
        let path: PathBuf = path.as_ref().to_path_buf();
        blocking(move || {
            let descriptor = codec.probe(&path)?;
            let frame = codec.open_reader(&path, &descriptor)?.next_frame()?.ok_or_else(|| {
                RemovalError::codec(format!("'{}' contains no frames", path.display()))
            })?;
            let png = OutputFormatHandler::encode(&DynamicImage::ImageRgb8(frame), OutputFormat::Png, 100)?;
            Ok(ImageIOService::to_data_url(&png, OutputFormat::Png))
        })
        .await
    }

    /// # Errors
    /// Returns an error when the credential store cannot be written
    pub fn set_api_key(&self, key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(RemovalError::validation("API key must not be empty"));
        }
        self.processor.credentials().set(key)
    }

    #[must_use]
    pub fn api_key_configured(&self) -> bool {
        self.processor.credentials().is_configured()
    }

    /// # Errors
    /// Returns an error when the credential store cannot be written
    pub fn clear_api_key(&self) -> Result<()> {
        self.processor.credentials().clear()
    }

    /// Check the stored key against the cloud service
    ///
    /// # Errors
    /// - `RemovalError::MissingCredential` when no key is stored
    /// - Cloud failure (unauthorized, network, ...)
    pub async fn test_cloud_connection(&self) -> Result<bool> {
        let key = self.api_key()?;
        Ok(self.processor.backends().cloud.test_connection(&key).await?)
    }

    /// Image-capable models available to the stored key
    ///
    /// # Errors
    /// - `RemovalError::MissingCredential` when no key is stored
    /// - Cloud failure
    pub async fn list_cloud_models(&self) -> Result<Vec<String>> {
        let key = self.api_key()?;
        Ok(self.processor.backends().cloud.list_models(&key).await?)
    }

    fn api_key(&self) -> Result<String> {
        self.processor
            .credentials()
            .get()?
            .ok_or(RemovalError::MissingCredential)
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RemovalError::internal(format!("Blocking task failed: {}", e)))?
}
