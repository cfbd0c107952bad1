//! Error types for watermark removal operations

use std::fmt;
use thiserror::Error;

/// Result type alias for watermark removal operations
pub type Result<T> = std::result::Result<T, RemovalError>;

/// Failure categories reported by the cloud inpainting service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudErrorKind {
    /// The credential was rejected
    Unauthorized,
    /// The service refused the request because of its rate limit
    RateLimited,
    /// The request never produced an HTTP response (DNS, TLS, timeout, ...)
    Network,
    /// The service answered but did not return a usable image
    Service,
}

impl fmt::Display for CloudErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Network => write!(f, "network error"),
            Self::Service => write!(f, "service error"),
        }
    }
}

/// Error returned by the cloud inpainting variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cloud inpainting {kind}: {message}")]
pub struct CloudError {
    pub kind: CloudErrorKind,
    pub message: String,
}

impl CloudError {
    pub fn new<S: Into<String>>(kind: CloudErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(CloudErrorKind::Unauthorized, message)
    }

    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::new(CloudErrorKind::RateLimited, message)
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::new(CloudErrorKind::Network, message)
    }

    pub fn service<S: Into<String>>(message: S) -> Self {
        Self::new(CloudErrorKind::Service, message)
    }
}

/// Error returned by an inpainter variant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InpaintError {
    /// The local algorithm failed; fatal for the current item or frame
    #[error("Local inpainting failed: {0}")]
    Local(String),

    /// The remote service failed; surfaced verbatim, never retried
    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl InpaintError {
    pub fn local<S: Into<String>>(msg: S) -> Self {
        Self::Local(msg.into())
    }
}

/// Machine-checkable error category, independent of the message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad region, options, or an unmet precondition; caller's fault
    Validation,
    /// Read, write or codec failure
    Io,
    /// Local inpainting algorithm failure
    LocalInpainter,
    /// Cloud inpainting failure
    Cloud(CloudErrorKind),
    /// Work stopped because cancellation was requested
    Cancelled,
    /// Unexpected condition inside the engine
    Internal,
}

/// Comprehensive error type for watermark removal operations
#[derive(Error, Debug)]
pub enum RemovalError {
    /// Invalid region or removal options
    #[error("Validation error: {0}")]
    Validation(String),

    /// Cloud method selected but no credential is stored
    #[error("Cloud API key not configured. Set it before using cloud inpainting.")]
    MissingCredential,

    /// A valid but unsupported combination of inputs
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Decode or encode failure for images and videos
    #[error("Codec error: {0}")]
    Codec(String),

    /// Inpainter failure
    #[error(transparent)]
    Inpainter(#[from] InpaintError),

    /// Another video job is still running
    #[error("A video job is already running")]
    Busy,

    /// Processing cancelled by the caller
    #[error("Processing cancelled")]
    Cancelled,

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RemovalError {
    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new unsupported-combination error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new codec error
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        Self::Codec(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: fmt::Display>(parameter: &str, value: T, valid_range: &str) -> Self {
        Self::Validation(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Machine-checkable category of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::MissingCredential | Self::Unsupported(_) | Self::Busy => {
                ErrorKind::Validation
            },
            Self::Io(_) | Self::Codec(_) => ErrorKind::Io,
            Self::Inpainter(InpaintError::Local(_)) => ErrorKind::LocalInpainter,
            Self::Inpainter(InpaintError::Cloud(e)) => ErrorKind::Cloud(e.kind),
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<image::ImageError> for RemovalError {
    fn from(error: image::ImageError) -> Self {
        match error {
            image::ImageError::IoError(e) => Self::Io(e),
            other => Self::Codec(other.to_string()),
        }
    }
}

impl From<CloudError> for RemovalError {
    fn from(error: CloudError) -> Self {
        Self::Inpainter(InpaintError::Cloud(error))
    }
}
