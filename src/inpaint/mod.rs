//! Inpainter variants
//!
//! An [`Inpainter`] is selected once per run from [`RemovalOptions::method`]
//! and then reused for every item or frame of that run. The variant set is
//! closed: [`Inpainter::Local`] wraps a deterministic offline algorithm and
//! [`Inpainter::Cloud`] wraps a remote service plus the credential checked at
//! selection time. Concrete algorithms and clients are injected through the
//! [`LocalInpaint`] and [`CloudInpaint`] traits.

pub mod cloud;
pub mod local;

pub use cloud::GeminiInpainter;
pub use local::PatchInpainter;

use crate::{
    config::{CloudConfig, InpaintAlgorithm, RemovalMethod, RemovalOptions},
    credentials::CredentialStore,
    error::{CloudError, InpaintError, RemovalError, Result},
    services::SourceImage,
    types::Region,
};
use async_trait::async_trait;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::sync::Arc;

/// Parameters of the local algorithm, taken from `RemovalOptions`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalParams {
    pub algorithm: InpaintAlgorithm,
    pub dilate_pixels: u32,
    pub inpaint_radius: f32,
}

impl From<&RemovalOptions> for LocalParams {
    fn from(options: &RemovalOptions) -> Self {
        Self {
            algorithm: options.algorithm,
            dilate_pixels: options.dilate_pixels,
            inpaint_radius: options.inpaint_radius,
        }
    }
}

impl Default for LocalParams {
    fn default() -> Self {
        Self::from(&RemovalOptions::default())
    }
}

/// Deterministic offline inpainting
///
/// Implementations must return an image with the input's dimensions and must
/// produce identical output for identical input.
pub trait LocalInpaint: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Fill `region` of `image`
    ///
    /// # Errors
    /// Returns `InpaintError::Local` when the algorithm cannot run
    fn inpaint(
        &self,
        image: &DynamicImage,
        region: Region,
        params: &LocalParams,
    ) -> std::result::Result<DynamicImage, InpaintError>;
}

/// Remote AI inpainting service
#[async_trait]
pub trait CloudInpaint: Send + Sync {
    /// Send an encoded image and return the encoded result
    ///
    /// # Errors
    /// Returns a `CloudError` classified as unauthorized, rate limited,
    /// network or service failure
    async fn inpaint(
        &self,
        image: &[u8],
        mime_type: &str,
        region: Region,
        api_key: &str,
    ) -> std::result::Result<Vec<u8>, CloudError>;

    /// Check that the service accepts `api_key`
    async fn test_connection(&self, api_key: &str) -> std::result::Result<bool, CloudError>;

    /// Names of image-capable models available to `api_key`
    async fn list_models(&self, api_key: &str) -> std::result::Result<Vec<String>, CloudError>;
}

/// Inpainter selected for one run
#[derive(Clone)]
pub enum Inpainter {
    Local {
        backend: Arc<dyn LocalInpaint>,
        params: LocalParams,
    },
    Cloud {
        backend: Arc<dyn CloudInpaint>,
        api_key: String,
    },
}

impl std::fmt::Debug for Inpainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { backend, params } => f
                .debug_struct("Local")
                .field("backend", &backend.name())
                .field("params", params)
                .finish(),
            Self::Cloud { .. } => f.debug_struct("Cloud").finish_non_exhaustive(),
        }
    }
}

impl Inpainter {
    #[must_use]
    pub fn method(&self) -> RemovalMethod {
        match self {
            Self::Local { .. } => RemovalMethod::Local,
            Self::Cloud { .. } => RemovalMethod::Cloud,
        }
    }

    /// Inpaint a decoded source image
    ///
    /// The local algorithm runs on the blocking pool. Cloud output is decoded
    /// from the returned bytes and resized back to the source dimensions when
    /// the service changed them.
    ///
    /// # Errors
    /// - Inpainter failure
    /// - Cloud output that cannot be decoded
    pub async fn inpaint(&self, source: &SourceImage, region: Region) -> Result<DynamicImage> {
        match self {
            Self::Local { backend, params } => {
                let backend = Arc::clone(backend);
                let params = *params;
                let image = source.image.clone();
                tokio::task::spawn_blocking(move || backend.inpaint(&image, region, &params))
                    .await
                    .map_err(|e| RemovalError::internal(format!("Inpainting task failed: {}", e)))?
                    .map_err(RemovalError::from)
            },
            Self::Cloud { backend, api_key } => {
                let bytes = backend
                    .inpaint(&source.bytes, source.format.mime_type(), region, api_key)
                    .await?;
                let target = source.dimensions();
                tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
                    let result = image::load_from_memory(&bytes).map_err(|e| {
                        RemovalError::from(CloudError::service(format!(
                            "Service returned an undecodable image: {}",
                            e
                        )))
                    })?;
                    Ok(Self::match_dimensions(result, target))
                })
                .await
                .map_err(|e| RemovalError::internal(format!("Decode task failed: {}", e)))?
            },
        }
    }

    /// Inpaint one frame synchronously; only the local variant processes frames
    ///
    /// # Errors
    /// - `RemovalError::Unsupported` for the cloud variant
    /// - Local inpainter failure
    pub fn inpaint_frame(&self, frame: &DynamicImage, region: Region) -> Result<DynamicImage> {
        match self {
            Self::Local { backend, params } => Ok(backend.inpaint(frame, region, params)?),
            Self::Cloud { .. } => Err(RemovalError::unsupported(
                "Cloud inpainting is not available for video",
            )),
        }
    }

    fn match_dimensions(image: DynamicImage, (width, height): (u32, u32)) -> DynamicImage {
        if image.dimensions() == (width, height) {
            return image;
        }
        tracing::warn!(
            returned_width = image.width(),
            returned_height = image.height(),
            width,
            height,
            "Cloud result dimensions differ from source, resizing"
        );
        image.resize_exact(width, height, FilterType::Lanczos3)
    }
}

/// The concrete local and cloud backends available to a session
#[derive(Clone)]
pub struct InpaintBackends {
    pub local: Arc<dyn LocalInpaint>,
    pub cloud: Arc<dyn CloudInpaint>,
}

impl InpaintBackends {
    pub fn new(local: Arc<dyn LocalInpaint>, cloud: Arc<dyn CloudInpaint>) -> Self {
        Self { local, cloud }
    }

    /// Default backends: [`PatchInpainter`] and [`GeminiInpainter`]
    ///
    /// # Errors
    /// Returns `RemovalError::Internal` when the HTTP client cannot be built
    pub fn from_config(cloud: &CloudConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(PatchInpainter::new()),
            Arc::new(GeminiInpainter::new(cloud.clone())?),
        ))
    }

    /// Select the inpainter for a run
    ///
    /// # Errors
    /// - Options out of range
    /// - `RemovalError::MissingCredential` when the cloud method has no stored key
    pub fn select(
        &self,
        options: &RemovalOptions,
        credentials: &dyn CredentialStore,
    ) -> Result<Inpainter> {
        options.validate()?;
        match options.method {
            RemovalMethod::Local => Ok(Inpainter::Local {
                backend: Arc::clone(&self.local),
                params: LocalParams::from(options),
            }),
            RemovalMethod::Cloud => {
                let api_key = credentials.get()?.ok_or(RemovalError::MissingCredential)?;
                Ok(Inpainter::Cloud {
                    backend: Arc::clone(&self.cloud),
                    api_key,
                })
            },
        }
    }
}
