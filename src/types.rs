//! Core data model shared by the dispatcher, batch runner and video runner

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rectangular watermark footprint in source-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, saturating
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}) {}x{}", self.x, self.y, self.width, self.height)
    }
}

impl std::str::FromStr for Region {
    type Err = crate::error::RemovalError;

    /// Parse `x,y,width,height`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, width, height] = parts.as_slice() else {
            return Err(crate::error::RemovalError::validation(format!(
                "Region must be x,y,width,height, got '{}'",
                s
            )));
        };
        let parse = |name: &str, value: &str| {
            value.parse::<u32>().map_err(|_| {
                crate::error::RemovalError::validation(format!(
                    "Region {} must be a non-negative integer, got '{}'",
                    name, value
                ))
            })
        };
        Ok(Self::new(
            parse("x", *x)?,
            parse("y", *y)?,
            parse("width", *width)?,
            parse("height", *height)?,
        ))
    }
}

/// Outcome of one single-item removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    /// Scratch file holding the processed output
    pub output_path: PathBuf,
    /// `data:` URL of the output, only for interactive single-image calls
    pub preview: Option<String>,
    pub original_size_bytes: u64,
    pub processed_size_bytes: u64,
}

impl ProcessResult {
    /// Size change as `round((1 - processed/original) * 100)`; negative when the output grew
    #[must_use]
    pub fn size_reduction_percent(&self) -> i64 {
        if self.original_size_bytes == 0 {
            return 0;
        }
        let ratio = self.processed_size_bytes as f64 / self.original_size_bytes as f64;
        ((1.0 - ratio) * 100.0).round() as i64
    }
}

/// Basic image metadata for region selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub path: PathBuf,
}

/// Batch item lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    /// Completed and failed items are not reprocessed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

/// One file in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub source_path: PathBuf,
    pub display_name: String,
    pub status: BatchStatus,
    pub error: Option<String>,
    pub processed_path: Option<PathBuf>,
}

impl BatchItem {
    /// Create a pending item with a fresh id
    pub fn new<P: AsRef<Path>>(source_path: P) -> Self {
        let source_path = source_path.as_ref().to_path_buf();
        let display_name = source_path
            .file_name()
            .map_or_else(|| source_path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_path,
            display_name,
            status: BatchStatus::Pending,
            error: None,
            processed_path: None,
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: &BatchItemUpdate) {
        self.status = update.status;
        self.error.clone_from(&update.error);
        self.processed_path.clone_from(&update.processed_path);
    }
}

/// Partial item state emitted with each transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemUpdate {
    pub status: BatchStatus,
    pub error: Option<String>,
    pub processed_path: Option<PathBuf>,
}

impl BatchItemUpdate {
    #[must_use]
    pub fn processing() -> Self {
        Self {
            status: BatchStatus::Processing,
            error: None,
            processed_path: None,
        }
    }

    #[must_use]
    pub fn completed(processed_path: PathBuf) -> Self {
        Self {
            status: BatchStatus::Completed,
            error: None,
            processed_path: Some(processed_path),
        }
    }

    #[must_use]
    pub fn failed(error: String) -> Self {
        Self {
            status: BatchStatus::Failed,
            error: Some(error),
            processed_path: None,
        }
    }
}

/// Which item a batch is working on; recomputed per item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// 0-based position of the item in the batch list
    pub current_index: usize,
    pub total_count: usize,
    pub current_name: String,
}

/// Counts reported when a batch run ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    /// Items already terminal before the run started
    pub skipped: usize,
}

/// Events emitted by the batch runner in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// An item is about to be processed
    Progress(BatchProgress),
    /// An item changed status
    ItemUpdated { id: String, update: BatchItemUpdate },
    /// The run ended; progress is cleared
    Finished(BatchSummary),
}

/// Video stream properties, read once at job start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u32,
    pub duration_seconds: f64,
    pub codec: String,
    pub has_audio: bool,
}

/// Latest progress snapshot of a running video job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProgress {
    pub current_frame: u32,
    pub total_frames: u32,
    pub percent: f32,
    pub estimated_remaining_seconds: Option<f64>,
}

/// Outcome of a completed video job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoProcessResult {
    pub output_path: PathBuf,
    pub frames_processed: u32,
    pub duration_seconds: f64,
    pub original_size_bytes: u64,
    pub processed_size_bytes: u64,
}

/// Video job state machine; terminal states are final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoJobState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl VideoJobState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}
