//! Image I/O operations service
//!
//! Reads source media, detects its container from content (falling back to
//! the file extension) and builds inline previews.

use crate::{
    error::{RemovalError, Result},
    services::format::OutputFormat,
    types::ImageInfo,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// A decoded source image together with the bytes it came from
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub image: DynamicImage,
}

impl SourceImage {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Read a source image and decode it on the blocking pool
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Unsupported or corrupt image data
    pub async fn load_source<P: AsRef<Path>>(path: P) -> Result<SourceImage> {
        let path_ref = path.as_ref();
        let bytes = tokio::fs::read(path_ref)
            .await
            .map_err(|e| RemovalError::file_io_error("read image file", path_ref, &e))?;

        let path_buf = path_ref.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let format = Self::detect_format(&bytes, &path_buf)?;
            let image = Self::decode(&bytes, &path_buf)?;
            Ok(SourceImage {
                bytes,
                format,
                image,
            })
        })
        .await
        .map_err(|e| RemovalError::internal(format!("Decode task failed: {}", e)))?
    }

    /// Detect the container from magic bytes, then from the extension
    ///
    /// # Errors
    /// Returns `RemovalError::Codec` when neither identifies a supported format
    pub fn detect_format(bytes: &[u8], path: &Path) -> Result<OutputFormat> {
        if let Some(format) = image::guess_format(bytes)
            .ok()
            .and_then(OutputFormat::from_image_format)
        {
            return Ok(format);
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown");
        log::debug!(
            "Content-based format detection failed for {}, trying extension '{}'",
            path.display(),
            extension
        );

        OutputFormat::from_extension(extension).ok_or_else(|| {
            RemovalError::codec(format!(
                "Unsupported image format for '{}' (extension: {}). Supported formats: PNG, JPEG, WebP, TIFF",
                path.display(),
                extension
            ))
        })
    }

    /// Decode image bytes
    ///
    /// # Errors
    /// Returns `RemovalError::Codec` for corrupt or unsupported data
    pub fn decode(bytes: &[u8], path: &Path) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            RemovalError::codec(format!(
                "Failed to decode image '{}' ({} bytes): {}",
                path.display(),
                bytes.len(),
                e
            ))
        })
    }

    /// Read only the dimensions of an image file
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Unsupported or corrupt image header
    pub fn image_info<P: AsRef<Path>>(path: P) -> Result<ImageInfo> {
        let path_ref = path.as_ref();
        let (width, height) = image::image_dimensions(path_ref).map_err(|e| match e {
            image::ImageError::IoError(io) => {
                RemovalError::file_io_error("read image file", path_ref, &io)
            },
            other => RemovalError::codec(format!(
                "Failed to read dimensions of '{}': {}",
                path_ref.display(),
                other
            )),
        })?;
        Ok(ImageInfo {
            width,
            height,
            path: path_ref.to_path_buf(),
        })
    }

    /// Build a `data:` URL preview for encoded bytes
    #[must_use]
    pub fn to_data_url(bytes: &[u8], format: OutputFormat) -> String {
        format!("data:{};base64,{}", format.mime_type(), BASE64.encode(bytes))
    }

    /// Write bytes, creating the parent directory when needed
    ///
    /// # Errors
    /// Returns `RemovalError::Io` when the directory or file cannot be written
    pub async fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RemovalError::file_io_error("create output directory", parent, &e))?;
        }
        tokio::fs::write(path_ref, bytes)
            .await
            .map_err(|e| RemovalError::file_io_error("write output file", path_ref, &e))
    }
}
