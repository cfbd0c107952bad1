//! Progress reporting service
//!
//! This module separates progress reporting concerns from business logic.
//! Video jobs publish the latest [`VideoProgress`] snapshot through a
//! `tokio::sync::watch` channel so any number of observers can poll it
//! without slowing the frame loop; batch runs emit [`BatchEvent`]s that
//! frontends render through a [`ProgressReporter`].

use crate::types::{BatchEvent, VideoProgress};
use instant::Instant;
use tokio::sync::watch;

/// Estimates completion and time remaining for a frame loop
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    start_time: Instant,
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    /// Seconds since the estimator was created
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Snapshot for `current_frame` of `total_frames` at the current instant
    #[must_use]
    pub fn snapshot(&self, current_frame: u32, total_frames: u32) -> VideoProgress {
        Self::estimate(current_frame, total_frames, self.elapsed_seconds())
    }

    /// Pure estimate given elapsed wall time
    ///
    /// `remaining = max(0, elapsed / percent * 100 - elapsed)`; unknown while
    /// no progress has been made.
    #[must_use]
    pub fn estimate(current_frame: u32, total_frames: u32, elapsed_seconds: f64) -> VideoProgress {
        let percent = if total_frames == 0 {
            0.0
        } else {
            (f64::from(current_frame) / f64::from(total_frames) * 100.0).min(100.0)
        };

        let estimated_remaining_seconds = if percent > 0.0 {
            let estimated_total = elapsed_seconds / percent * 100.0;
            Some((estimated_total - elapsed_seconds).max(0.0))
        } else {
            None
        };

        VideoProgress {
            current_frame,
            total_frames,
            percent: percent as f32,
            estimated_remaining_seconds,
        }
    }
}

/// Create the single-slot progress channel for one video job
#[must_use]
pub fn video_progress_channel() -> (watch::Sender<Option<VideoProgress>>, watch::Receiver<Option<VideoProgress>>) {
    watch::channel(None)
}

/// Writer side of a video job's progress slot
///
/// Publishes every `interval` frames and always on the last frame. The slot
/// is reset to `None` when the publisher is dropped, so a finished, failed
/// or cancelled job never leaves a stale snapshot behind.
pub struct VideoProgressPublisher {
    sender: watch::Sender<Option<VideoProgress>>,
    estimator: ProgressEstimator,
    interval: u32,
}

impl VideoProgressPublisher {
    #[must_use]
    pub fn new(sender: watch::Sender<Option<VideoProgress>>, interval: u32) -> Self {
        Self {
            sender,
            estimator: ProgressEstimator::new(),
            interval: interval.max(1),
        }
    }

    /// Record that `current_frame` of `total_frames` frames are done
    ///
    /// Returns whether a snapshot was published.
    pub fn publish(&self, current_frame: u32, total_frames: u32) -> bool {
        let is_last = current_frame >= total_frames;
        if current_frame % self.interval != 0 && !is_last {
            return false;
        }

        let snapshot = self.estimator.snapshot(current_frame, total_frames);
        log::trace!(
            "Frame {}/{} ({:.1}%)",
            snapshot.current_frame,
            snapshot.total_frames,
            snapshot.percent
        );
        self.sender.send_replace(Some(snapshot));
        true
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.estimator.elapsed_seconds()
    }

    /// Reset the slot to "no job running"
    pub fn clear(&self) {
        self.sender.send_replace(None);
    }
}

impl Drop for VideoProgressPublisher {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Trait for rendering progress in a frontend
pub trait ProgressReporter: Send + Sync {
    /// Report a batch event as it is emitted
    fn report_batch_event(&self, event: &BatchEvent);

    /// Report the latest video progress snapshot
    fn report_video_progress(&self, progress: &VideoProgress);
}

/// Console progress reporter that logs progress
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Format seconds to a human-readable string
    fn format_eta(eta_seconds: Option<f64>) -> String {
        match eta_seconds {
            Some(seconds) if seconds < 60.0 => format!("{:.0}s", seconds),
            Some(seconds) => {
                let total = seconds.round() as u64;
                format!("{}m {}s", total / 60, total % 60)
            },
            None => "calculating...".to_string(),
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_batch_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::Progress(progress) => log::info!(
                "[{}/{}] {}",
                progress.current_index + 1,
                progress.total_count,
                progress.current_name
            ),
            BatchEvent::ItemUpdated { id, update } => {
                if let Some(error) = &update.error {
                    log::warn!("Item {} failed: {}", id, error);
                } else if self.verbose {
                    log::debug!("Item {} is now {:?}", id, update.status);
                }
            },
            BatchEvent::Finished(summary) => log::info!(
                "Batch finished: {} completed, {} failed, {} skipped",
                summary.completed,
                summary.failed,
                summary.skipped
            ),
        }
    }

    fn report_video_progress(&self, progress: &VideoProgress) {
        if self.verbose {
            log::info!(
                "[{:.1}%] frame {}/{} - ETA: {}",
                progress.percent,
                progress.current_frame,
                progress.total_frames,
                Self::format_eta(progress.estimated_remaining_seconds)
            );
        } else {
            log::info!("[{:.0}%] Processing video", progress.percent);
        }
    }
}
