//! Error types for the canonical pixel model.
//!
//! The [`Error`] enum covers failures that can occur while describing,
//! allocating or addressing image buffers:
//! - Descriptor validation (depth, sample count, palette)
//! - Buffer allocation (overflow, configured limits)
//! - Plane and scanline addressing
//! - Layout conversion with undersized buffers
//!
//! # Usage
//!
//! ```rust
//! use bim_core::{Error, Result};
//!
//! fn check_depth(depth: u32) -> Result<()> {
//!     if !bim_core::SUPPORTED_DEPTHS.contains(&depth) {
//!         return Err(Error::InvalidDepth { depth });
//!     }
//!     Ok(())
//! }
//! assert!(check_depth(12).is_err());
//! ```
//!
//! # Used By
//!
//! - [`crate::info::ImageInfo::validate`]
//! - [`crate::bitmap::ImageBitmap`]
//! - [`crate::layout`]
//! - `bim-io`, wrapped in its `IoError::Bitmap` variant

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the canonical pixel model.
#[derive(Debug, Error)]
pub enum Error {
    /// Memory allocation failed or was refused.
    ///
    /// Returned when the geometry overflows `usize`, exceeds the configured
    /// [`AllocLimits`](crate::AllocLimits), or the allocator refuses the
    /// request.
    #[error("failed to allocate {requested} bytes: {reason}")]
    AllocationFailed {
        /// Bytes requested (saturated at `u64::MAX` on overflow)
        requested: u64,
        /// Failure reason
        reason: String,
    },

    /// Invalid image dimensions.
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: u64,
        /// Requested height
        height: u64,
        /// Reason why dimensions are invalid
        reason: String,
    },

    /// Bit depth outside {1, 2, 4, 8, 16, 32, 64}.
    #[error("unsupported bit depth: {depth}")]
    InvalidDepth {
        /// Offending depth
        depth: u32,
    },

    /// Sample count of zero.
    #[error("invalid sample count: {samples}")]
    InvalidSamples {
        /// Offending sample count
        samples: u32,
    },

    /// Palette present on an image that cannot carry one.
    #[error("invalid palette: {reason}")]
    InvalidLut {
        /// Reason the palette was rejected
        reason: String,
    },

    /// Plane or row index outside the bitmap.
    #[error("sample {sample}, row {row} out of bounds for {samples} samples x {height} rows")]
    OutOfBounds {
        /// Requested sample plane
        sample: u32,
        /// Requested row
        row: u64,
        /// Number of planes
        samples: u32,
        /// Number of rows
        height: u64,
    },

    /// A caller-supplied buffer is smaller than the geometry requires.
    #[error("{what} buffer too small: need {needed} elements, got {actual}")]
    BufferTooSmall {
        /// Which buffer (e.g. "interleaved", "plane")
        what: &'static str,
        /// Elements required
        needed: usize,
        /// Elements supplied
        actual: usize,
    },
}

impl Error {
    /// Creates an [`Error::AllocationFailed`] error.
    #[inline]
    pub fn allocation_failed(requested: u64, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(width: u64, height: u64, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::BufferTooSmall`] error.
    #[inline]
    pub fn buffer_too_small(what: &'static str, needed: usize, actual: usize) -> Self {
        Self::BufferTooSmall {
            what,
            needed,
            actual,
        }
    }

    /// Returns `true` if this is an allocation error.
    #[inline]
    pub fn is_allocation_error(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }

    /// Returns `true` if this is an addressing error.
    #[inline]
    pub fn is_bounds_error(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. } | Self::BufferTooSmall { .. })
    }
}
