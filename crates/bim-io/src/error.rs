//! Error types for I/O operations.
//!
//! Every call boundary of a [`FormatHandle`](crate::FormatHandle) returns an
//! [`IoResult`]. Low-level stream and parse failures are converted to one of
//! these variants inside the plugin; corrupt input never panics.

use std::io;
use thiserror::Error;

/// I/O operation error.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failure of the underlying file or memory medium. Never retried.
    #[error("stream error: {0}")]
    Stream(#[from] io::Error),

    /// No registered plugin accepted the magic bytes.
    #[error("no format recognizes {0}")]
    FormatMismatch(String),

    /// A plugin accepted the magic bytes but the header is invalid or
    /// unsupported.
    #[error("unrecognized header: {0}")]
    UnrecognizedHeader(String),

    /// Canonical model failure: buffer allocation, addressing or layout.
    #[error("bitmap error: {0}")]
    Bitmap(#[from] bim_core::Error),

    /// Capability flag is false, or the handle is not open.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Opening a handle failed; the handle has been torn down.
    #[error("failed to open {format}: {source}")]
    OpenFailed {
        /// Format short name, or "unknown" before detection.
        format: String,
        /// Underlying failure.
        #[source]
        source: Box<IoError>,
    },

    /// The abort flag was raised during a decode.
    #[error("aborted: {0}")]
    Aborted(String),
}

impl IoError {
    /// Wraps `source` in [`IoError::OpenFailed`].
    pub fn open_failed(format: impl Into<String>, source: IoError) -> Self {
        Self::OpenFailed {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Shorthand for [`IoError::UnrecognizedHeader`].
    pub fn header(msg: impl Into<String>) -> Self {
        Self::UnrecognizedHeader(msg.into())
    }

    /// Shorthand for [`IoError::UnsupportedOperation`].
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    /// Returns `true` for allocation failures, including ones wrapped by
    /// [`IoError::OpenFailed`].
    pub fn is_allocation_error(&self) -> bool {
        match self {
            Self::Bitmap(e) => e.is_allocation_error(),
            Self::OpenFailed { source, .. } => source.is_allocation_error(),
            _ => false,
        }
    }

    /// Returns `true` for [`IoError::UnsupportedOperation`].
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }

    /// Returns the innermost error behind any [`IoError::OpenFailed`] layers.
    pub fn root(&self) -> &IoError {
        match self {
            Self::OpenFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for I/O operations.
pub type IoResult<T> = Result<T, IoError>;
