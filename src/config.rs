//! Configuration types for watermark removal operations

use crate::error::{RemovalError, Result};
use crate::utils::NumericValidator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Local inpainting algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InpaintAlgorithm {
    /// Fast marching fill from the mask boundary inward
    #[default]
    Telea,
    /// Boundary fill followed by diffusion sweeps
    NavierStokes,
}

impl std::fmt::Display for InpaintAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Telea => write!(f, "telea"),
            Self::NavierStokes => write!(f, "navier_stokes"),
        }
    }
}

impl std::str::FromStr for InpaintAlgorithm {
    type Err = RemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "telea" => Ok(Self::Telea),
            "navier_stokes" | "navier-stokes" | "ns" => Ok(Self::NavierStokes),
            other => Err(RemovalError::validation(format!(
                "Unknown inpainting algorithm '{}'. Use telea or navier_stokes",
                other
            ))),
        }
    }
}

/// Where the inpainting happens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RemovalMethod {
    /// Deterministic offline algorithm
    #[default]
    Local,
    /// Remote AI inpainting service
    Cloud,
}

impl std::fmt::Display for RemovalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Maximum mask dilation in pixels
pub const MAX_DILATE_PIXELS: u32 = 10;
/// Accepted inpaint radius range
pub const INPAINT_RADIUS_RANGE: std::ops::RangeInclusive<f32> = 1.0..=15.0;

/// Tunable removal configuration shared by single, batch and video runs
///
/// `algorithm`, `dilate_pixels` and `inpaint_radius` only apply to
/// [`RemovalMethod::Local`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalOptions {
    pub algorithm: InpaintAlgorithm,
    pub dilate_pixels: u32,
    pub inpaint_radius: f32,
    pub method: RemovalMethod,
    /// Force a lossless output container even when the source was lossy
    pub lossless: bool,
}

impl Default for RemovalOptions {
    fn default() -> Self {
        Self {
            algorithm: InpaintAlgorithm::Telea,
            dilate_pixels: 3,
            inpaint_radius: 5.0,
            method: RemovalMethod::Local,
            lossless: false,
        }
    }
}

impl RemovalOptions {
    #[must_use]
    pub fn builder() -> RemovalOptionsBuilder {
        RemovalOptionsBuilder::new()
    }

    /// Check option ranges
    ///
    /// # Errors
    /// - `dilate_pixels` above 10
    /// - `inpaint_radius` outside 1.0-15.0 or not finite
    pub fn validate(&self) -> Result<()> {
        if self.dilate_pixels > MAX_DILATE_PIXELS {
            return Err(RemovalError::config_value_error(
                "dilate pixels",
                self.dilate_pixels,
                "0-10",
            ));
        }
        NumericValidator::validate_in_range(
            "inpaint radius",
            self.inpaint_radius,
            &INPAINT_RADIUS_RANGE,
        )?;
        Ok(())
    }
}

/// Builder for `RemovalOptions`
pub struct RemovalOptionsBuilder {
    options: RemovalOptions,
}

impl RemovalOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            options: RemovalOptions::default(),
        }
    }

    #[must_use]
    pub fn algorithm(mut self, algorithm: InpaintAlgorithm) -> Self {
        self.options.algorithm = algorithm;
        self
    }

    #[must_use]
    pub fn dilate_pixels(mut self, pixels: u32) -> Self {
        self.options.dilate_pixels = pixels;
        self
    }

    #[must_use]
    pub fn inpaint_radius(mut self, radius: f32) -> Self {
        self.options.inpaint_radius = radius;
        self
    }

    #[must_use]
    pub fn method(mut self, method: RemovalMethod) -> Self {
        self.options.method = method;
        self
    }

    #[must_use]
    pub fn lossless(mut self, lossless: bool) -> Self {
        self.options.lossless = lossless;
        self
    }

    /// Build and validate the options
    ///
    /// # Errors
    /// Returns `RemovalError::Validation` for out-of-range values
    pub fn build(self) -> Result<RemovalOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

impl Default for RemovalOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote inpainting service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL of the generative API (without the model path)
    pub endpoint: String,
    /// Image editing model name
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash-image".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Session-wide engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scratch directory for intermediate outputs (None = system temp)
    pub scratch_dir: Option<PathBuf>,
    /// JPEG quality (0-100) used when the output stays JPEG
    pub jpeg_quality: u8,
    /// Publish video progress every N frames (the last frame always publishes)
    pub progress_interval_frames: u32,
    /// Keep the source audio track in processed videos
    pub preserve_audio: bool,
    /// ffmpeg executable
    pub ffmpeg_path: PathBuf,
    /// ffprobe executable
    pub ffprobe_path: PathBuf,
    pub cloud: CloudConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            jpeg_quality: 90,
            progress_interval_frames: 1,
            preserve_audio: true,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            cloud: CloudConfig::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Load configuration from a JSON file; missing fields use defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Values fail validation
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RemovalError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            RemovalError::validation(format!("Invalid config file '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolved scratch directory
    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("watermark-remover"))
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// Returns `RemovalError::Validation` for out-of-range values
    pub fn validate(&self) -> Result<()> {
        NumericValidator::validate_quality(self.jpeg_quality)?;
        NumericValidator::validate_positive(self.progress_interval_frames, "Progress interval (frames)")?;
        NumericValidator::validate_positive(self.cloud.timeout_secs, "Cloud timeout (seconds)")?;
        Ok(())
    }
}

/// Builder for `EngineConfig`
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    #[must_use]
    pub fn scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(0, 100);
        self
    }

    #[must_use]
    pub fn progress_interval_frames(mut self, frames: u32) -> Self {
        self.config.progress_interval_frames = frames.max(1);
        self
    }

    #[must_use]
    pub fn preserve_audio(mut self, preserve: bool) -> Self {
        self.config.preserve_audio = preserve;
        self
    }

    #[must_use]
    pub fn ffmpeg_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    #[must_use]
    pub fn ffprobe_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.ffprobe_path = path.into();
        self
    }

    #[must_use]
    pub fn cloud(mut self, cloud: CloudConfig) -> Self {
        self.config.cloud = cloud;
        self
    }

    /// Build the engine configuration
    ///
    /// # Errors
    /// Returns `RemovalError::Validation` for out-of-range values
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
