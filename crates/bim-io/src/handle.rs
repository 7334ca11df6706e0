//! Open image handle.
//!
//! [`FormatHandle`] runs the lifecycle every caller goes through:
//!
//! ```text
//! open ──> { num_pages | image_info | read_page | write_page }* ──> metadata* ──> close
//! ```
//!
//! It owns the [`Stream`] and the plugin's [`FormatSession`], checks
//! capability flags and write constraints before dispatch, and tears
//! everything down if opening fails. Any call on a handle that is not open
//! returns [`IoError::UnsupportedOperation`]; `close` may be called any
//! number of times and also runs on drop.
//!
//! # Example
//!
//! ```rust
//! use bim_core::{AllocLimits, ImageBitmap, ImageInfo, PixelType};
//! use bim_io::{FormatHandle, OpenOptions};
//!
//! // Write one page of NRRD into memory...
//! let info = ImageInfo::new(4, 2, 1, 8, PixelType::Unsigned);
//! let mut page = ImageBitmap::allocate(&info, &AllocLimits::default())?;
//! page.plane_mut(0)?.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
//!
//! let mut out = FormatHandle::create_memory("NRRD", OpenOptions::default())?;
//! out.write_page(&page)?;
//! let bytes = out.finish_into_bytes()?;
//!
//! // ...and read it back.
//! let mut input = FormatHandle::open_bytes(bytes, OpenOptions::default())?;
//! let mut back = ImageBitmap::default();
//! input.read_page(0, &mut back)?;
//! assert_eq!(back.plane(0)?, page.plane(0)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::{IoError, IoResult};
use crate::plugin::{FormatItem, FormatSession, MetadataSource, PageContext, ProgressFn};
use crate::registry::{DetectedFormat, FormatRegistry};
use crate::stream::{IoMode, Stream};
use crate::swap::Endianness;
use crate::tags::{TagStore, keys};
use bim_core::{AllocLimits, ImageBitmap, ImageInfo};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Settings carried into a handle and its plugin session.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Bound on every page buffer allocation.
    pub limits: AllocLimits,
    /// Free-form `key value key value ...` plugin options.
    pub options: String,
    /// Byte order override for formats whose sample order is not declared
    /// in the file, or the order to write with.
    pub byte_order_hint: Option<Endianness>,
    /// Short format name to write; defaults to the output extension.
    pub format: Option<String>,
}

impl OpenOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets allocation limits.
    pub fn with_limits(mut self, limits: AllocLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the free-form option string.
    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = options.into();
        self
    }

    /// Sets the byte order hint.
    pub fn with_byte_order(mut self, order: Endianness) -> Self {
        self.byte_order_hint = Some(order);
        self
    }

    /// Selects the output format by short name.
    pub fn with_format(mut self, name: impl Into<String>) -> Self {
        self.format = Some(name.into());
        self
    }

    /// Value following `key` in the option string.
    ///
    /// ```rust
    /// use bim_io::OpenOptions;
    ///
    /// let o = OpenOptions::new().with_options("endian big quality 90");
    /// assert_eq!(o.option("quality"), Some("90"));
    /// assert_eq!(o.option("fps"), None);
    /// ```
    pub fn option(&self, key: &str) -> Option<&str> {
        let tokens: Vec<&str> = self.options.split_whitespace().collect();
        tokens
            .chunks(2)
            .find(|pair| pair[0].eq_ignore_ascii_case(key))
            .and_then(|pair| pair.get(1).copied())
    }
}

struct OpenState {
    format: DetectedFormat,
    session: Box<dyn FormatSession>,
    stream: Stream,
    mode: IoMode,
    current_page: u64,
    pages_written: u64,
}

/// An open image, readable or writable page by page.
pub struct FormatHandle {
    state: Option<OpenState>,
    options: OpenOptions,
    abort: Arc<AtomicBool>,
    progress: Option<Arc<ProgressFn>>,
    sources: Vec<Arc<dyn MetadataSource>>,
}

impl FormatHandle {
    /// Creates a closed handle.
    pub fn new(options: OpenOptions) -> Self {
        Self {
            state: None,
            options,
            abort: Arc::new(AtomicBool::new(false)),
            progress: None,
            sources: Vec::new(),
        }
    }

    /// Opens `path` for reading with the global registry.
    pub fn open_path(path: impl AsRef<Path>, options: OpenOptions) -> IoResult<Self> {
        let mut h = Self::new(options);
        h.open(FormatRegistry::global(), path.as_ref(), IoMode::Read)?;
        Ok(h)
    }

    /// Opens an in-memory image for reading with the global registry.
    pub fn open_bytes(data: Vec<u8>, options: OpenOptions) -> IoResult<Self> {
        let mut h = Self::new(options);
        h.open_stream(FormatRegistry::global(), Stream::from_bytes(data), IoMode::Read)?;
        Ok(h)
    }

    /// Creates `path` for writing. The format is taken from
    /// [`OpenOptions::format`] or else from the extension.
    pub fn create(path: impl AsRef<Path>, options: OpenOptions) -> IoResult<Self> {
        let mut h = Self::new(options);
        h.open(FormatRegistry::global(), path.as_ref(), IoMode::Write)?;
        Ok(h)
    }

    /// Creates an in-memory image of format `name` for writing.
    pub fn create_memory(name: &str, options: OpenOptions) -> IoResult<Self> {
        let mut h = Self::new(options.with_format(name));
        h.open_stream(FormatRegistry::global(), Stream::memory_writer(), IoMode::Write)?;
        Ok(h)
    }

    /// Opens `path` in `mode` against `registry`, closing any image the
    /// handle held before.
    pub fn open(&mut self, registry: &FormatRegistry, path: &Path, mode: IoMode) -> IoResult<()> {
        self.close()?;
        if mode == IoMode::Write {
            // resolve the writer before the file is created or truncated
            self.writer_format(registry, Some(path), &path.display().to_string())
                .map_err(|e| IoError::open_failed("unknown", e))?;
        }
        let stream = Stream::open(path, mode).map_err(|e| IoError::open_failed("unknown", e))?;
        self.open_stream(registry, stream, mode)
    }

    /// Opens an already constructed stream.
    pub fn open_stream(
        &mut self,
        registry: &FormatRegistry,
        mut stream: Stream,
        mode: IoMode,
    ) -> IoResult<()> {
        self.close()?;
        let format = match mode {
            IoMode::Read => Self::sniff(registry, &mut stream),
            IoMode::Write => self.writer_format(registry, stream.path(), stream.file_name()),
        }
        .map_err(|e| IoError::open_failed("unknown", e))?;

        let name = format.item().short_name;
        let session = Self::start_session(&format, &mut stream, mode, &self.options)
            .map_err(|e| IoError::open_failed(name, e))?;

        tracing::debug!(format = name, ?mode, file = stream.file_name(), "opened image");
        self.state = Some(OpenState {
            format,
            session,
            stream,
            mode,
            current_page: 0,
            pages_written: 0,
        });
        Ok(())
    }

    fn sniff(registry: &FormatRegistry, stream: &mut Stream) -> IoResult<DetectedFormat> {
        let magic = stream.peek(registry.max_magic_size())?;
        registry.detect(&magic, stream.file_name())
    }

    fn writer_format(
        &self,
        registry: &FormatRegistry,
        path: Option<&Path>,
        file_name: &str,
    ) -> IoResult<DetectedFormat> {
        let found = match &self.options.format {
            Some(name) => registry.find_by_name(name),
            None => path
                .and_then(|p| p.extension())
                .and_then(|e| e.to_str())
                .and_then(|ext| registry.find_by_extension(ext)),
        };
        let format = found.ok_or_else(|| {
            IoError::FormatMismatch(
                self.options
                    .format
                    .clone()
                    .unwrap_or_else(|| file_name.to_string()),
            )
        })?;
        if !format.item().can_write {
            return Err(IoError::unsupported(format!(
                "{} cannot be written",
                format.item().short_name
            )));
        }
        Ok(format)
    }

    fn start_session(
        format: &DetectedFormat,
        stream: &mut Stream,
        mode: IoMode,
        options: &OpenOptions,
    ) -> IoResult<Box<dyn FormatSession>> {
        let item = format.item();
        if mode == IoMode::Read && !item.can_read {
            return Err(IoError::unsupported(format!(
                "{} cannot be read",
                item.short_name
            )));
        }
        let session = format
            .plugin()
            .open(stream, format.sub_format(), mode, options)?;
        if mode == IoMode::Read {
            if session.num_pages() == 0 {
                return Err(IoError::header("image has no pages"));
            }
            session.image_info(0)?.validate_opened()?;
        }
        Ok(session)
    }

    /// Returns `true` while an image is open.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    fn state(&self) -> IoResult<&OpenState> {
        self.state
            .as_ref()
            .ok_or_else(|| IoError::unsupported("handle is not open"))
    }

    fn state_mut(&mut self) -> IoResult<&mut OpenState> {
        self.state
            .as_mut()
            .ok_or_else(|| IoError::unsupported("handle is not open"))
    }

    /// Description of the open format.
    pub fn format(&self) -> IoResult<&FormatItem> {
        Ok(self.state()?.format.item())
    }

    /// Mode the image was opened in.
    pub fn mode(&self) -> IoResult<IoMode> {
        Ok(self.state()?.mode)
    }

    /// Options the handle was created with.
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// Number of pages (pages written so far in write mode).
    pub fn num_pages(&self) -> IoResult<u64> {
        Ok(self.state()?.session.num_pages())
    }

    /// Descriptor of `page`.
    pub fn image_info(&self, page: u64) -> IoResult<ImageInfo> {
        self.state()?.session.image_info(page)
    }

    /// Shared abort flag. Raising it makes running and future page decodes
    /// fail with [`IoError::Aborted`] until [`FormatHandle::reset_abort`].
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Lowers the abort flag.
    pub fn reset_abort(&self) {
        self.abort.store(false, Ordering::Relaxed);
    }

    /// Installs a `(done, total)` progress callback for page decodes.
    pub fn set_progress(&mut self, f: impl Fn(u64, u64) + Send + Sync + 'static) {
        self.progress = Some(Arc::new(f));
    }

    /// Adds an external metadata extractor, consulted after the format's
    /// own tags.
    pub fn add_metadata_source(&mut self, source: Arc<dyn MetadataSource>) {
        self.sources.push(source);
    }

    /// Decodes `page` into `bitmap`.
    ///
    /// Page numbers past the end are clamped to the last page.
    pub fn read_page(&mut self, page: u64, bitmap: &mut ImageBitmap) -> IoResult<()> {
        let limits = self.options.limits;
        let abort = Arc::clone(&self.abort);
        let progress = self.progress.clone();
        let state = self.state_mut()?;
        if state.mode != IoMode::Read {
            return Err(IoError::unsupported("handle is open for writing"));
        }
        let page = page.min(state.session.num_pages().saturating_sub(1));
        let ctx = PageContext::new(limits, &abort).with_progress(progress.as_deref());
        ctx.check_abort("read_page")?;
        state
            .session
            .read_page(&mut state.stream, page, bitmap, &ctx)?;
        state.current_page = page;
        Ok(())
    }

    /// Appends `bitmap` as the next page.
    pub fn write_page(&mut self, bitmap: &ImageBitmap) -> IoResult<()> {
        let limits = self.options.limits;
        let abort = Arc::clone(&self.abort);
        let state = self.state_mut()?;
        if state.mode != IoMode::Write {
            return Err(IoError::unsupported("handle is open for reading"));
        }
        let item = state.format.item();
        if state.pages_written > 0 && !item.can_write_multipage {
            return Err(IoError::unsupported(format!(
                "{} stores a single page",
                item.short_name
            )));
        }
        if bitmap.is_empty() {
            return Err(IoError::unsupported("cannot write an empty bitmap"));
        }
        item.constraints.check(bitmap.info(), state.pages_written)?;

        let ctx = PageContext::new(limits, &abort);
        let page = state.pages_written;
        state
            .session
            .write_page(&mut state.stream, page, bitmap, &ctx)?;
        state.pages_written += 1;
        state.current_page = page;
        Ok(())
    }

    /// Collects metadata for the current page.
    ///
    /// Format-native tags come first, then the standard geometry tags, then
    /// tags from external sources; later stages never overwrite earlier
    /// ones. Failures inside a stage are logged and leave the store
    /// partially filled.
    pub fn metadata(&mut self) -> IoResult<TagStore> {
        let sources = self.sources.clone();
        let state = self.state_mut()?;
        let item = *state.format.item();
        if !item.can_read_meta {
            return Err(IoError::unsupported(format!(
                "{} has no readable metadata",
                item.short_name
            )));
        }

        let mut tags = TagStore::new();
        if let Err(e) = state
            .session
            .append_metadata(&mut state.stream, &mut tags)
        {
            tracing::warn!(format = item.short_name, error = %e, "format metadata incomplete");
        }

        let info = state.session.image_info(state.current_page)?;
        append_standard_tags(&mut tags, &info, &item, state.session.raw_endian());

        for source in &sources {
            let mut found = TagStore::new();
            if let Err(e) = source.extract(&mut state.stream, &mut found) {
                tracing::warn!(source = source.name(), error = %e, "metadata source failed");
            }
            tags.append_tags(&found, "");
        }
        Ok(tags)
    }

    /// Finishes any pending output and releases the image. Calling it on a
    /// closed handle does nothing.
    pub fn close(&mut self) -> IoResult<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        if state.mode == IoMode::Write {
            state.session.finish(&mut state.stream)?;
            state.stream.flush()?;
        }
        tracing::debug!(format = state.format.item().short_name, "closed image");
        Ok(())
    }

    /// Closes a memory-backed writer and returns the encoded bytes.
    pub fn finish_into_bytes(mut self) -> IoResult<Vec<u8>> {
        let mut state = self.state.take().ok_or_else(|| IoError::unsupported("handle is not open"))?;
        if state.mode == IoMode::Write {
            state.session.finish(&mut state.stream)?;
        }
        state
            .stream
            .into_bytes()
            .ok_or_else(|| IoError::unsupported("handle is not memory backed"))
    }
}

impl std::fmt::Debug for FormatHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("FormatHandle");
        match &self.state {
            Some(state) => s
                .field("format", &state.format.item().short_name)
                .field("mode", &state.mode)
                .field("file", &state.stream.file_name())
                .field("current_page", &state.current_page),
            None => s.field("open", &false),
        };
        s.field("sources", &self.sources.len()).finish()
    }
}

impl Drop for FormatHandle {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close image");
        }
    }
}

/// Adds the format-independent tags for `info` without touching keys the
/// format already set.
pub fn append_standard_tags(
    tags: &mut TagStore,
    info: &ImageInfo,
    item: &FormatItem,
    raw_endian: Option<Endianness>,
) {
    tags.append_tag(keys::FORMAT, item.short_name);
    tags.append_tag(keys::IMAGE_NUM_X, info.width);
    tags.append_tag(keys::IMAGE_NUM_Y, info.height);
    tags.append_tag(keys::IMAGE_NUM_Z, info.number_z);
    tags.append_tag(keys::IMAGE_NUM_T, info.number_t);
    tags.append_tag(keys::IMAGE_NUM_C, info.samples);
    tags.append_tag(keys::IMAGE_NUM_P, info.number_pages);
    tags.append_tag(keys::PIXEL_DEPTH, info.depth);
    tags.append_tag(keys::PIXEL_FORMAT, info.pixel_type.name());
    tags.append_tag(keys::IMAGE_MODE, info.image_mode.name());
    if let Some(order) = raw_endian {
        tags.append_tag(keys::RAW_ENDIAN, order.name());
    }
    if let Some(factor) = info.res_units.to_microns() {
        tags.append_tag(keys::PIXEL_RESOLUTION_X, info.x_res * factor);
        tags.append_tag(keys::PIXEL_RESOLUTION_Y, info.y_res * factor);
        tags.append_tag(keys::PIXEL_RESOLUTION_UNIT_X, keys::UNIT_MICRONS);
        tags.append_tag(keys::PIXEL_RESOLUTION_UNIT_Y, keys::UNIT_MICRONS);
    }
}
