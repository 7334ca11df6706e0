//! # bim-io
//!
//! Scientific image I/O built around a plugin registry.
//!
//! Every format lives behind the [`FormatPlugin`] trait. The
//! [`FormatRegistry`] sniffs magic bytes to pick a plugin, the plugin opens
//! a [`FormatSession`], and [`FormatHandle`] drives the session through
//! open, page reads or writes, metadata and close. Decoded pages always land
//! in the canonical planar layout of [`bim_core::ImageBitmap`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bim_core::ImageBitmap;
//! use bim_io::{FormatHandle, OpenOptions};
//!
//! let mut image = FormatHandle::open_path("scan.ibw", OpenOptions::default())?;
//! println!("{} pages", image.num_pages()?);
//!
//! let mut page = ImageBitmap::default();
//! image.read_page(0, &mut page)?;
//!
//! for (key, value) in &image.metadata()? {
//!     println!("{key}: {value}");
//! }
//! # Ok::<(), bim_io::IoError>(())
//! ```
//!
//! # Building Blocks
//!
//! - [`stream`] - seekable file or memory stream with bounds-checked reads
//! - [`swap`] - byte order detection and bulk swapping
//! - [`header`] - declarative binary header records
//! - [`text`] - line scanner for text-tagged headers
//! - [`tags`] - ordered key/value metadata store
//!
//! # Supported Formats
//!
//! | Format | Read | Write | Depth | Notes |
//! |--------|------|-------|-------|-------|
//! | IBW | Yes | No | 8 (normalized) | Igor Pro binary wave v5 |
//! | NanoScope | Yes | No | 16 | One page per image section |
//! | NRRD | Yes | Yes | 8 - 64, float | Raw encoding, multipage |
//!
//! # Feature Flags
//!
//! - `ibw` - Igor binary waves (default)
//! - `nanoscope` - NanoScope II/III (default)
//! - `nrrd` - NRRD volumes (default)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod date;
pub mod error;
pub mod formats;
pub mod handle;
pub mod header;
pub mod plugin;
pub mod registry;
pub mod stream;
pub mod swap;
pub mod tags;
pub mod text;

pub use error::{IoError, IoResult};
pub use handle::{FormatHandle, OpenOptions, append_standard_tags};
pub use plugin::{
    FormatConstraints, FormatHeader, FormatItem, FormatPlugin, FormatSession, MetadataSource,
    PageContext, ProgressFn,
};
pub use registry::{DetectedFormat, FormatRegistry};
pub use stream::{IoMode, Stream};
pub use swap::Endianness;
pub use tags::{TagStore, TagValue};
