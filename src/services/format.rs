//! Output format handling service
//!
//! Decides the output container for a processed image (including the
//! lossless override) and encodes pixel buffers into bytes.

use crate::error::{RemovalError, Result};
use image::{
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        tiff::TiffEncoder,
    },
    DynamicImage, ImageFormat,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Image container formats the engine reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// PNG, always lossless
    Png,
    /// JPEG, lossy
    Jpeg,
    /// WebP; sources may be lossy, output is encoded losslessly
    WebP,
    /// TIFF, lossless
    Tiff,
}

impl OutputFormat {
    /// Map a detected `image` format to a supported container
    #[must_use]
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Tiff => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Guess the container from a file extension
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
        }
    }

    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Tiff => "image/tiff",
        }
    }

    /// Whether a source in this container may carry lossy compression
    #[must_use]
    pub fn is_lossy(self) -> bool {
        matches!(self, Self::Jpeg | Self::WebP)
    }
}

/// Service for output format selection and encoding
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Pick the output container for a source format
    ///
    /// Without `lossless` the source container is kept. With `lossless`,
    /// JPEG becomes PNG and WebP is written in lossless mode; PNG and TIFF
    /// are already lossless.
    ///
    /// # Examples
    /// ```rust
    /// use watermark_remover::services::{OutputFormat, OutputFormatHandler};
    ///
    /// assert_eq!(OutputFormatHandler::resolve(OutputFormat::Jpeg, true), OutputFormat::Png);
    /// assert_eq!(OutputFormatHandler::resolve(OutputFormat::Jpeg, false), OutputFormat::Jpeg);
    /// ```
    #[must_use]
    pub fn resolve(source: OutputFormat, lossless: bool) -> OutputFormat {
        if !lossless {
            return source;
        }
        match source {
            OutputFormat::Jpeg => OutputFormat::Png,
            other => other,
        }
    }

    /// Encode an image into the given container
    ///
    /// # Errors
    /// - Encoder failures
    /// - WebP requested while the `webp-support` feature is disabled
    pub fn encode(image: &DynamicImage, format: OutputFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());

        let result = match format {
            OutputFormat::Png => {
                let encoder = PngEncoder::new_with_quality(
                    &mut cursor,
                    CompressionType::Best,
                    FilterType::Adaptive,
                );
                image.write_with_encoder(encoder)
            },
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut cursor, jpeg_quality.clamp(1, 100));
                rgb.write_with_encoder(encoder)
            },
            OutputFormat::WebP => Self::encode_webp(image, &mut cursor)?,
            OutputFormat::Tiff => {
                let encoder = TiffEncoder::new(&mut cursor);
                image.write_with_encoder(encoder)
            },
        };

        result.map_err(|e| {
            RemovalError::codec(format!("Failed to encode {:?} output: {}", format, e))
        })?;

        Ok(cursor.into_inner())
    }

    #[cfg(feature = "webp-support")]
    fn encode_webp(
        image: &DynamicImage,
        cursor: &mut Cursor<Vec<u8>>,
    ) -> Result<image::ImageResult<()>> {
        use image::codecs::webp::WebPEncoder;

        let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
        Ok(rgba.write_with_encoder(WebPEncoder::new_lossless(cursor)))
    }

    #[cfg(not(feature = "webp-support"))]
    fn encode_webp(
        _image: &DynamicImage,
        _cursor: &mut Cursor<Vec<u8>>,
    ) -> Result<image::ImageResult<()>> {
        Err(RemovalError::unsupported(
            "WebP output requires the webp-support feature",
        ))
    }

    /// Whether a path looks like a video container
    pub fn is_video_path<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "mp4" | "mov" | "mkv" | "avi" | "webm" | "m4v"
                )
            })
    }
}
