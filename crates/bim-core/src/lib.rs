//! # bim-core
//!
//! Canonical pixel model shared by every format plugin in `bim-io`.
//!
//! - [`ImageInfo`] - geometry and sample type descriptor for one image/page
//! - [`ImageBitmap`] - owned planar pixel storage, one buffer per sample
//! - [`AllocLimits`] - upper bound applied to every bitmap allocation
//! - [`layout`] - planar/interleaved sample conversion
//!
//! ## Canonical Layout
//!
//! Whatever the on-disk layout (interleaved RGB, bottom-up rows, big-endian
//! words), a decoded page always ends up in the same shape: one plane per
//! sample, row-major, each row `ceil(width * depth / 8)` bytes, rows packed
//! without padding.
//!
//! ```text
//! plane 0: [row 0][row 1]...[row h-1]
//! plane 1: [row 0][row 1]...[row h-1]
//! ...
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//! bim-core (this crate)
//!    ^
//!    |
//!    +-- bim-io (streams, headers, tags, registry, plugins)
//!           ^
//!           +-- bim-cli (bimcnv)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bitmap;
pub mod error;
pub mod info;
pub mod layout;

pub use bitmap::{AllocLimits, ImageBitmap, DEFAULT_MAX_ALLOC_BYTES};
pub use error::{Error, Result};
pub use info::{
    line_size_in_bytes, ImageInfo, ImageMode, Lut, PixelType, ResolutionUnit, SUPPORTED_DEPTHS,
};

/// Prelude module for convenient imports.
///
/// ```
/// use bim_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bitmap::{AllocLimits, ImageBitmap};
    pub use crate::error::{Error, Result};
    pub use crate::info::{ImageInfo, ImageMode, Lut, PixelType, ResolutionUnit};
    pub use crate::layout::{interleave, planarize};
}
