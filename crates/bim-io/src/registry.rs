//! Format registry and magic-byte dispatch.
//!
//! The registry holds the plugins in registration order and answers three
//! questions:
//!
//! - which plugin recognizes these magic bytes ([`FormatRegistry::detect`]),
//! - which plugin writes a given format name or extension
//!   ([`FormatRegistry::find_by_name`], [`FormatRegistry::find_by_extension`]),
//! - how many bytes a caller must sniff ([`FormatRegistry::max_magic_size`]).
//!
//! Registration happens once, before the first detection. After that the
//! registry is read-only and freely shared between threads; a late
//! [`FormatRegistry::register`] fails with
//! [`IoError::UnsupportedOperation`].
//!
//! # Example
//!
//! ```rust
//! use bim_io::FormatRegistry;
//!
//! let registry = FormatRegistry::global();
//! let found = registry.detect(b"NRRD0004\ntype: uint8\n", "a.nrrd")?;
//! assert_eq!(found.item().short_name, "NRRD");
//! # Ok::<(), bim_io::IoError>(())
//! ```

use crate::error::{IoError, IoResult};
use crate::plugin::{FormatHeader, FormatItem, FormatPlugin};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Result of a successful lookup: the plugin and the sub-format it serves.
#[derive(Clone)]
pub struct DetectedFormat {
    plugin: Arc<dyn FormatPlugin>,
    sub_format: usize,
}

impl DetectedFormat {
    /// The plugin.
    #[inline]
    pub fn plugin(&self) -> &Arc<dyn FormatPlugin> {
        &self.plugin
    }

    /// Index into the plugin's [`FormatHeader::formats`].
    #[inline]
    pub fn sub_format(&self) -> usize {
        self.sub_format
    }

    /// Description of the matched sub-format.
    ///
    /// A plugin returning an out-of-range index falls back to its first
    /// item; registration guarantees at least one.
    pub fn item(&self) -> &FormatItem {
        let formats = self.plugin.header().formats;
        formats.get(self.sub_format).unwrap_or(&formats[0])
    }
}

impl fmt::Debug for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectedFormat")
            .field("plugin", &self.plugin.header().name)
            .field("format", &self.item().short_name)
            .finish()
    }
}

/// Ordered collection of format plugins.
pub struct FormatRegistry {
    plugins: Vec<Arc<dyn FormatPlugin>>,
    sealed: AtomicBool,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            sealed: AtomicBool::new(false),
        }
    }

    /// Creates a registry with every built-in format enabled by features.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_builtin_formats();
        registry
    }

    /// Shared registry with the built-in formats.
    pub fn global() -> &'static FormatRegistry {
        static INSTANCE: OnceLock<FormatRegistry> = OnceLock::new();
        INSTANCE.get_or_init(Self::with_builtin)
    }

    fn register_builtin_formats(&mut self) {
        // A fresh registry is never sealed and the built-in headers are
        // well formed, so these cannot fail.
        #[cfg(feature = "ibw")]
        let _ = self.register(crate::formats::ibw::IbwFormat::new());
        #[cfg(feature = "nanoscope")]
        let _ = self.register(crate::formats::nanoscope::NanoscopeFormat::new());
        #[cfg(feature = "nrrd")]
        let _ = self.register(crate::formats::nrrd::NrrdFormat::new());
    }

    /// Appends a plugin. Later plugins are consulted after earlier ones.
    pub fn register(&mut self, plugin: impl FormatPlugin + 'static) -> IoResult<()> {
        self.register_arc(Arc::new(plugin))
    }

    /// Appends a shared plugin.
    pub fn register_arc(&mut self, plugin: Arc<dyn FormatPlugin>) -> IoResult<()> {
        if self.is_sealed() {
            return Err(IoError::unsupported(format!(
                "cannot register {} after detection started",
                plugin.header().name
            )));
        }
        if plugin.header().formats.is_empty() {
            return Err(IoError::unsupported(format!(
                "plugin {} declares no formats",
                plugin.header().name
            )));
        }
        tracing::debug!(plugin = plugin.header().name, "registered format plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Returns `true` once a detection has run.
    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Number of plugins.
    #[inline]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Largest magic size any plugin declares.
    pub fn max_magic_size(&self) -> usize {
        self.plugins
            .iter()
            .map(|p| p.header().magic_size)
            .max()
            .unwrap_or(0)
    }

    /// Finds the first plugin accepting `magic`.
    ///
    /// A plugin is skipped when `magic` is shorter than its declared magic
    /// size.
    pub fn detect(&self, magic: &[u8], file_name: &str) -> IoResult<DetectedFormat> {
        self.sealed.store(true, Ordering::Release);
        for plugin in &self.plugins {
            let header = plugin.header();
            if magic.len() < header.magic_size {
                continue;
            }
            if let Some(sub_format) = plugin.validate(magic, file_name) {
                tracing::debug!(
                    plugin = header.name,
                    sub_format,
                    file = file_name,
                    "format detected"
                );
                return Ok(DetectedFormat {
                    plugin: Arc::clone(plugin),
                    sub_format,
                });
            }
        }
        let what = if file_name.is_empty() {
            format!("{} byte header", magic.len())
        } else {
            file_name.to_string()
        };
        Err(IoError::FormatMismatch(what))
    }

    /// Looks up a sub-format by short name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<DetectedFormat> {
        self.find(|item| item.short_name.eq_ignore_ascii_case(name))
    }

    /// Looks up a sub-format by file extension (case-insensitive).
    pub fn find_by_extension(&self, ext: &str) -> Option<DetectedFormat> {
        self.find(|item| item.has_extension(ext))
    }

    /// Returns `true` if any plugin claims `ext`.
    pub fn supports_extension(&self, ext: &str) -> bool {
        self.find_by_extension(ext).is_some()
    }

    fn find(&self, pred: impl Fn(&FormatItem) -> bool) -> Option<DetectedFormat> {
        self.plugins.iter().find_map(|plugin| {
            plugin
                .header()
                .formats
                .iter()
                .position(&pred)
                .map(|sub_format| DetectedFormat {
                    plugin: Arc::clone(plugin),
                    sub_format,
                })
        })
    }

    /// Iterates over every sub-format with its plugin header.
    pub fn formats(&self) -> impl Iterator<Item = (&FormatHeader, &FormatItem)> {
        self.plugins.iter().flat_map(|p| {
            let header = p.header();
            header.formats.iter().map(move |item| (header, item))
        })
    }

    /// Short names of every sub-format, in registration order.
    pub fn format_names(&self) -> Vec<&'static str> {
        self.plugins
            .iter()
            .flat_map(|p| p.header().formats.iter().map(|f| f.short_name))
            .collect()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.format_names())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}
