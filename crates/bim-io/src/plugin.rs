//! Format plugin contract.
//!
//! A format is two objects:
//!
//! - a [`FormatPlugin`], registered once, that describes the format
//!   ([`FormatHeader`]), sniffs magic bytes and opens sessions;
//! - a [`FormatSession`], owned by one [`FormatHandle`](crate::FormatHandle),
//!   that holds everything parsed at open time and serves page and metadata
//!   requests. It is dropped with the handle.
//!
//! The handle owns the [`Stream`] and lends it to the session on every
//! call, so a session never outlives or leaks its medium. Capability flags
//! and write constraints are enforced by the handle before a session
//! method is reached; the default method bodies only exist for formats
//! that leave a capability out.

use crate::error::{IoError, IoResult};
use crate::handle::OpenOptions;
use crate::stream::{IoMode, Stream};
use crate::tags::TagStore;
use bim_core::{AllocLimits, ImageBitmap, ImageInfo};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Limits a format places on images it can write.
///
/// Zero in a `max_*` field means unlimited; zero in a `min_*` field means
/// no lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatConstraints {
    /// Maximum width in pixels.
    pub max_width: u64,
    /// Maximum height in pixels.
    pub max_height: u64,
    /// Maximum number of pages.
    pub max_pages: u64,
    /// Minimum samples per pixel.
    pub min_samples: u32,
    /// Maximum samples per pixel.
    pub max_samples: u32,
    /// Minimum bits per sample.
    pub min_depth: u32,
    /// Maximum bits per sample.
    pub max_depth: u32,
    /// Palettes are dropped or rejected.
    pub lut_unsupported: bool,
}

impl FormatConstraints {
    /// No limits.
    pub const NONE: Self = Self {
        max_width: 0,
        max_height: 0,
        max_pages: 0,
        min_samples: 0,
        max_samples: 0,
        min_depth: 0,
        max_depth: 0,
        lut_unsupported: false,
    };

    /// Checks that `info` can be written as page number `page`.
    pub fn check(&self, info: &ImageInfo, page: u64) -> IoResult<()> {
        let fail = |what: String| Err(IoError::unsupported(what));
        if self.max_width > 0 && info.width > self.max_width {
            return fail(format!("width {} exceeds {}", info.width, self.max_width));
        }
        if self.max_height > 0 && info.height > self.max_height {
            return fail(format!("height {} exceeds {}", info.height, self.max_height));
        }
        if self.max_pages > 0 && page >= self.max_pages {
            return fail(format!("page {page} exceeds the {} page limit", self.max_pages));
        }
        if (self.min_samples > 0 && info.samples < self.min_samples)
            || (self.max_samples > 0 && info.samples > self.max_samples)
        {
            return fail(format!(
                "{} samples outside {}..={}",
                info.samples, self.min_samples, self.max_samples
            ));
        }
        if (self.min_depth > 0 && info.depth < self.min_depth)
            || (self.max_depth > 0 && info.depth > self.max_depth)
        {
            return fail(format!(
                "{} bits per sample outside {}..={}",
                info.depth, self.min_depth, self.max_depth
            ));
        }
        if self.lut_unsupported && !info.lut.is_empty() {
            return fail("palette not supported".into());
        }
        Ok(())
    }
}

/// One sub-format served by a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatItem {
    /// Short name without spaces ("IBW").
    pub short_name: &'static str,
    /// Descriptive name.
    pub long_name: &'static str,
    /// Lowercase extensions without dots.
    pub extensions: &'static [&'static str],
    /// Pages can be decoded.
    pub can_read: bool,
    /// Pages can be encoded.
    pub can_write: bool,
    /// Metadata can be extracted.
    pub can_read_meta: bool,
    /// Metadata can be embedded on write.
    pub can_write_meta: bool,
    /// More than one page can be written.
    pub can_write_multipage: bool,
    /// Write limits.
    pub constraints: FormatConstraints,
}

impl FormatItem {
    /// Case-insensitive extension check.
    pub fn has_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Static description of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    /// Plugin name.
    pub name: &'static str,
    /// Plugin version.
    pub version: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Bytes needed to recognize a file.
    pub magic_size: usize,
    /// Sub-formats, addressed by the index `validate` returns.
    pub formats: &'static [FormatItem],
}

/// Progress report callback: `(done, total)` rows of the current page.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Per-call context lent to a session by its handle.
pub struct PageContext<'a> {
    limits: AllocLimits,
    abort: &'a AtomicBool,
    progress: Option<&'a ProgressFn>,
}

impl<'a> PageContext<'a> {
    /// Creates a context polling `abort`.
    pub fn new(limits: AllocLimits, abort: &'a AtomicBool) -> Self {
        Self {
            limits,
            abort,
            progress: None,
        }
    }

    /// Attaches a progress callback.
    pub fn with_progress(mut self, progress: Option<&'a ProgressFn>) -> Self {
        self.progress = progress;
        self
    }

    /// Allocation limits for page buffers.
    #[inline]
    pub fn limits(&self) -> AllocLimits {
        self.limits
    }

    /// Returns `true` once the abort flag is raised.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Fails with [`IoError::Aborted`] if the abort flag is raised.
    #[inline]
    pub fn check_abort(&self, what: &str) -> IoResult<()> {
        if self.is_aborted() {
            return Err(IoError::Aborted(what.to_string()));
        }
        Ok(())
    }

    /// Reports progress, if a callback is attached.
    #[inline]
    pub fn report(&self, done: u64, total: u64) {
        if let Some(f) = self.progress {
            f(done, total);
        }
    }
}

impl fmt::Debug for PageContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageContext")
            .field("limits", &self.limits)
            .field("aborted", &self.is_aborted())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// A registered format.
pub trait FormatPlugin: Send + Sync {
    /// Static description.
    fn header(&self) -> &FormatHeader;

    /// Returns the sub-format index if `magic` (and possibly `file_name`)
    /// is recognized.
    ///
    /// `magic` holds at least `header().magic_size` bytes unless the whole
    /// stream is shorter; a shorter slice must be rejected without reading
    /// past its end.
    fn validate(&self, magic: &[u8], file_name: &str) -> Option<usize>;

    /// Parses the stream (read) or prepares it (write) and returns the
    /// session serving the handle.
    fn open(
        &self,
        stream: &mut Stream,
        sub_format: usize,
        mode: IoMode,
        options: &OpenOptions,
    ) -> IoResult<Box<dyn FormatSession>>;
}

/// Open state of one handle.
pub trait FormatSession: Send {
    /// Number of addressable pages.
    fn num_pages(&self) -> u64;

    /// Descriptor of `page`.
    fn image_info(&self, page: u64) -> IoResult<ImageInfo>;

    /// Decodes `page` into `bitmap`, reallocating it as needed.
    fn read_page(
        &mut self,
        _stream: &mut Stream,
        _page: u64,
        _bitmap: &mut ImageBitmap,
        _ctx: &PageContext<'_>,
    ) -> IoResult<()> {
        Err(IoError::unsupported("format cannot read pages"))
    }

    /// Encodes `bitmap` as page number `page`.
    fn write_page(
        &mut self,
        _stream: &mut Stream,
        _page: u64,
        _bitmap: &ImageBitmap,
        _ctx: &PageContext<'_>,
    ) -> IoResult<()> {
        Err(IoError::unsupported("format cannot write pages"))
    }

    /// Adds format-native tags to `tags`.
    fn append_metadata(&mut self, _stream: &mut Stream, _tags: &mut TagStore) -> IoResult<()> {
        Err(IoError::unsupported("format cannot read metadata"))
    }

    /// Byte order of the raw sample data, if meaningful.
    fn raw_endian(&self) -> Option<crate::Endianness> {
        None
    }

    /// Flushes pending output; called once by the handle on close.
    fn finish(&mut self, _stream: &mut Stream) -> IoResult<()> {
        Ok(())
    }
}

/// External metadata extractor (EXIF, IPTC, ...) merged by the handle at
/// lower precedence than format-native tags.
pub trait MetadataSource: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Adds whatever the source finds in `stream` to `tags`.
    fn extract(&self, stream: &mut Stream, tags: &mut TagStore) -> IoResult<()>;
}
