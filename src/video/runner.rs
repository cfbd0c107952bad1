//! Background video job runner
//!
//! One job runs at a time. The frame loop runs on the blocking pool,
//! checks the cancellation token before each decoded frame is processed and
//! publishes progress through a watch channel. The scratch output is guarded
//! for the whole loop, so cancellation or a failed frame removes the partial
//! file before the job reaches its terminal state.

use super::{EncodeSettings, VideoCodec, OUTPUT_EXTENSION};
use crate::{
    config::{RemovalMethod, RemovalOptions},
    error::{RemovalError, Result},
    inpaint::Inpainter,
    processor::RemovalProcessor,
    services::{video_progress_channel, ScratchManager, VideoProgressPublisher},
    types::{Region, VideoJobState, VideoProcessResult, VideoProgress},
    utils::RegionValidator,
};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

/// Scratch file prefix for processed videos
const OUTPUT_PREFIX: &str = "processed_video";

/// Handle to one background video job
pub struct VideoJob {
    id: String,
    cancel: CancellationToken,
    progress: watch::Receiver<Option<VideoProgress>>,
    state: watch::Receiver<VideoJobState>,
    handle: JoinHandle<Result<VideoProcessResult>>,
}

impl std::fmt::Debug for VideoJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoJob")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VideoJob {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest published snapshot; `None` before the first publish and after
    /// the job ends
    #[must_use]
    pub fn poll_progress(&self) -> Option<VideoProgress> {
        self.progress.borrow().clone()
    }

    /// Receiver for observers that prefer awaiting changes over polling
    #[must_use]
    pub fn subscribe_progress(&self) -> watch::Receiver<Option<VideoProgress>> {
        self.progress.clone()
    }

    /// Request cooperative cancellation; honoured before the next frame
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn state(&self) -> VideoJobState {
        *self.state.borrow()
    }

    /// Wait for the job to finish
    ///
    /// # Errors
    /// - `RemovalError::Cancelled` when cancellation was requested
    /// - The first probe, codec, region or inpainting error
    pub async fn wait(self) -> Result<VideoProcessResult> {
        self.handle
            .await
            .map_err(|e| RemovalError::internal(format!("Video task failed: {}", e)))?
    }
}

/// Observer side of the current job, kept by the runner
struct JobSlot {
    cancel: CancellationToken,
    progress: watch::Receiver<Option<VideoProgress>>,
    state: watch::Receiver<VideoJobState>,
}

/// Everything the blocking frame loop needs
struct FrameLoop {
    codec: Arc<dyn VideoCodec>,
    scratch: ScratchManager,
    inpainter: Inpainter,
    source: PathBuf,
    region: Region,
    lossless: bool,
    preserve_audio: bool,
    cancel: CancellationToken,
}

impl FrameLoop {
    fn run(&self, publisher: &VideoProgressPublisher) -> Result<VideoProcessResult> {
        let descriptor = self.codec.probe(&self.source)?;
        let region = RegionValidator::validate(self.region, descriptor.width, descriptor.height)?;
        debug!(
            width = descriptor.width,
            height = descriptor.height,
            frames = descriptor.frame_count,
            "Starting frame loop"
        );

        let output = self.scratch.allocate(OUTPUT_PREFIX, OUTPUT_EXTENSION)?;
        let mut reader = self.codec.open_reader(&self.source, &descriptor)?;
        let settings = EncodeSettings {
            lossless: self.lossless,
            audio_source: (self.preserve_audio && descriptor.has_audio).then(|| self.source.clone()),
        };
        let mut writer = self.codec.open_writer(output.path(), &descriptor, &settings)?;

        let mut total_frames = descriptor.frame_count;
        let mut processed: u32 = 0;

        while let Some(frame) = reader.next_frame()? {
            if self.cancel.is_cancelled() {
                info!(processed, "Video job cancelled");
                return Err(RemovalError::Cancelled);
            }

            let cleaned = self
                .inpainter
                .inpaint_frame(&DynamicImage::ImageRgb8(frame), region)?
                .into_rgb8();
            writer.write_frame(&cleaned)?;

            processed += 1;
            total_frames = total_frames.max(processed);
            publisher.publish(processed, total_frames);
        }

        if self.cancel.is_cancelled() {
            info!(processed, "Video job cancelled");
            return Err(RemovalError::Cancelled);
        }
        if processed == 0 {
            return Err(RemovalError::codec(format!(
                "No frames could be decoded from '{}'",
                self.source.display()
            )));
        }

        writer.finish()?;
        drop(reader);

        let output_path = output.persist();
        let result = VideoProcessResult {
            original_size_bytes: file_size(&self.source),
            processed_size_bytes: file_size(&output_path),
            output_path,
            frames_processed: processed,
            duration_seconds: publisher.elapsed_seconds(),
        };
        info!(
            output = %result.output_path.display(),
            frames = result.frames_processed,
            seconds = result.duration_seconds,
            "Video processed"
        );
        Ok(result)
    }
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Starts video jobs and tracks the current one
pub struct VideoRunner {
    codec: Arc<dyn VideoCodec>,
    processor: RemovalProcessor,
    progress_interval_frames: u32,
    preserve_audio: bool,
    current: Mutex<Option<JobSlot>>,
}

impl VideoRunner {
    pub fn new(
        codec: Arc<dyn VideoCodec>,
        processor: RemovalProcessor,
        progress_interval_frames: u32,
        preserve_audio: bool,
    ) -> Self {
        Self {
            codec,
            processor,
            progress_interval_frames: progress_interval_frames.max(1),
            preserve_audio,
            current: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn codec(&self) -> &Arc<dyn VideoCodec> {
        &self.codec
    }

    /// Start processing `path` in the background
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - `RemovalError::Busy` while another job is running
    /// - `RemovalError::Unsupported` for the cloud method
    /// - Invalid options
    pub fn start<P: AsRef<Path>>(
        &self,
        path: P,
        region: Region,
        options: &RemovalOptions,
    ) -> Result<VideoJob> {
        if options.method == RemovalMethod::Cloud {
            return Err(RemovalError::unsupported(
                "Cloud inpainting is not available for video; use the local method",
            ));
        }
        let inpainter = self.processor.prepare(options)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RemovalError::internal(format!("No async runtime: {}", e)))?;

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current
            .as_ref()
            .is_some_and(|slot| *slot.state.borrow() == VideoJobState::Running)
        {
            return Err(RemovalError::Busy);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = video_progress_channel();
        let (state_tx, state_rx) = watch::channel(VideoJobState::Running);

        let frame_loop = FrameLoop {
            codec: Arc::clone(&self.codec),
            scratch: self.processor.scratch().clone(),
            inpainter,
            source: path.as_ref().to_path_buf(),
            region,
            lossless: options.lossless,
            preserve_audio: self.preserve_audio,
            cancel: cancel.clone(),
        };
        let interval = self.progress_interval_frames;
        let span = info_span!(
            "video job",
            id = %id,
            path = %frame_loop.source.display(),
            region = %region
        );

        let handle = runtime.spawn_blocking(move || {
            let _entered = span.enter();
            let publisher = VideoProgressPublisher::new(progress_tx, interval);
            let outcome = frame_loop.run(&publisher);
            drop(publisher);

            let terminal = match &outcome {
                Ok(_) => VideoJobState::Completed,
                Err(RemovalError::Cancelled) => VideoJobState::Cancelled,
                Err(e) => {
                    warn!(error = %e, "Video job failed");
                    VideoJobState::Failed
                },
            };
            state_tx.send_replace(terminal);
            outcome
        });

        *current = Some(JobSlot {
            cancel: cancel.clone(),
            progress: progress_rx.clone(),
            state: state_rx.clone(),
        });

        Ok(VideoJob {
            id,
            cancel,
            progress: progress_rx,
            state: state_rx,
            handle,
        })
    }

    /// Progress of the current job, if one is running
    #[must_use]
    pub fn poll_progress(&self) -> Option<VideoProgress> {
        self.with_slot(|slot| slot.progress.borrow().clone()).flatten()
    }

    /// Cancel the current job; no-op when nothing is running
    pub fn cancel(&self) {
        self.with_slot(|slot| slot.cancel.cancel());
    }

    /// State of the most recent job, `Idle` before the first
    #[must_use]
    pub fn state(&self) -> VideoJobState {
        self.with_slot(|slot| *slot.state.borrow())
            .unwrap_or(VideoJobState::Idle)
    }

    fn with_slot<T>(&self, f: impl FnOnce(&JobSlot) -> T) -> Option<T> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }
}
