//! Ordered metadata tag store.
//!
//! Keys are slash-separated paths (`custom/Scanner list/Scan rate`,
//! `pixel_resolution_x`); values are [`TagValue`]s. Iteration follows
//! insertion order, and overwriting a key keeps its original position, so
//! dumps are stable across runs.
//!
//! Two write disciplines coexist:
//!
//! - [`TagStore::set`] overwrites. Plugins use it for the tags they own.
//! - [`TagStore::append_tag`] only inserts absent keys. The handle uses it
//!   for the standard tags and collaborator metadata, so format-native
//!   values always win.
//!
//! # Example
//!
//! ```rust
//! use bim_io::TagStore;
//!
//! let mut tags = TagStore::new();
//! tags.set("A/B", "x");
//! tags.set("A/B", "y");
//! assert!(!tags.append_tag("A/B", "z"));
//! assert_eq!(tags.get_str("A/B"), Some("y"));
//! assert_eq!(tags.len(), 1);
//! ```

mod value;

pub use value::TagValue;

use std::collections::HashMap;

/// Well-known tag names.
pub mod keys {
    /// Acquisition time, `YYYY-MM-DD HH:MM:SS`.
    pub const DATE_TIME: &str = "date_time";
    /// Short name of the format that decoded the image.
    pub const FORMAT: &str = "format";
    /// Per-page name template for single-channel images.
    pub const IMAGE_NAME_TEMPLATE: &str = "image_{}_name";
    /// Width in pixels.
    pub const IMAGE_NUM_X: &str = "image_num_x";
    /// Height in pixels.
    pub const IMAGE_NUM_Y: &str = "image_num_y";
    /// Number of z slices.
    pub const IMAGE_NUM_Z: &str = "image_num_z";
    /// Number of time points.
    pub const IMAGE_NUM_T: &str = "image_num_t";
    /// Samples per pixel.
    pub const IMAGE_NUM_C: &str = "image_num_c";
    /// Number of pages.
    pub const IMAGE_NUM_P: &str = "image_num_p";
    /// Bits per sample.
    pub const PIXEL_DEPTH: &str = "image_pixel_depth";
    /// Sample interpretation name.
    pub const PIXEL_FORMAT: &str = "image_pixel_format";
    /// Image mode name.
    pub const IMAGE_MODE: &str = "image_mode";
    /// Byte order of raw sample data in the file.
    pub const RAW_ENDIAN: &str = "raw_endian";
    /// Physical pixel width.
    pub const PIXEL_RESOLUTION_X: &str = "pixel_resolution_x";
    /// Physical pixel height.
    pub const PIXEL_RESOLUTION_Y: &str = "pixel_resolution_y";
    /// Unit of [`PIXEL_RESOLUTION_X`].
    pub const PIXEL_RESOLUTION_UNIT_X: &str = "pixel_resolution_unit_x";
    /// Unit of [`PIXEL_RESOLUTION_Y`].
    pub const PIXEL_RESOLUTION_UNIT_Y: &str = "pixel_resolution_unit_y";
    /// Unit value for physical sizes.
    pub const UNIT_MICRONS: &str = "microns";
    /// Namespace for header fields without a standard meaning.
    pub const CUSTOM_PREFIX: &str = "custom/";
}

/// Insertion-ordered key/value store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagStore {
    entries: Vec<(String, TagValue)>,
    index: HashMap<String, usize>,
}

impl TagStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tags.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no tags are stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks if `key` is present.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Sets `key`, replacing any previous value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => self.push(key, value),
        }
    }

    /// Inserts `key` only if absent. Returns `true` if it was inserted.
    pub fn append_tag(&mut self, key: impl Into<String>, value: impl Into<TagValue>) -> bool {
        let key = key.into();
        if self.index.contains_key(&key) {
            return false;
        }
        self.push(key, value.into());
        true
    }

    /// Inserts `value` under the first free key produced by substituting
    /// 0, 1, 2, ... for `{}` in `template`. Returns the key used.
    ///
    /// ```rust
    /// use bim_io::TagStore;
    ///
    /// let mut tags = TagStore::new();
    /// assert_eq!(tags.append_indexed("image_{}_name", "Height"), "image_0_name");
    /// assert_eq!(tags.append_indexed("image_{}_name", "Phase"), "image_1_name");
    /// ```
    ///
    /// A template without `{}` is used as is first, then suffixed with
    /// ` 1`, ` 2`, ...
    pub fn append_indexed(&mut self, template: &str, value: impl Into<TagValue>) -> String {
        let candidate = |i: usize| {
            if template.contains("{}") {
                template.replacen("{}", &i.to_string(), 1)
            } else if i == 0 {
                template.to_string()
            } else {
                format!("{template} {i}")
            }
        };
        // len + 1 distinct candidates, at most len of them taken
        let key = (0..=self.entries.len())
            .map(candidate)
            .find(|k| !self.index.contains_key(k))
            .unwrap_or_else(|| candidate(self.entries.len() + 1));
        self.push(key.clone(), value.into());
        key
    }

    fn push(&mut self, key: String, value: TagValue) {
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
    }

    /// Looks up a value.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    /// String value, only if stored as a string.
    #[inline]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(TagValue::as_str)
    }

    /// Value rendered as text, or `default`.
    pub fn as_string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map_or_else(|| default.to_string(), ToString::to_string)
    }

    /// Value coerced to `i64`, or `default`.
    pub fn as_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(TagValue::as_i64).unwrap_or(default)
    }

    /// Value coerced to `u64`, or `default`.
    pub fn as_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(TagValue::as_u64).unwrap_or(default)
    }

    /// Value coerced to `f64`, or `default`.
    pub fn as_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(TagValue::as_f64).unwrap_or(default)
    }

    /// Value coerced to `bool`, or `default`.
    pub fn as_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(TagValue::as_bool).unwrap_or(default)
    }

    /// Removes `key`, keeping the order of the remaining tags.
    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        let i = self.index.remove(key)?;
        let (_, value) = self.entries.remove(i);
        for (_, pos) in self.index.iter_mut() {
            if *pos > i {
                *pos -= 1;
            }
        }
        Some(value)
    }

    /// Drops every tag.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over tags whose key starts with `prefix`.
    pub fn iter_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a TagValue)> + 'a {
        self.iter().filter(move |(k, _)| k.starts_with(prefix))
    }

    /// Copies every tag of `other` under `prefix`, overwriting.
    pub fn set_values(&mut self, other: &TagStore, prefix: &str) {
        for (k, v) in other.iter() {
            self.set(format!("{prefix}{k}"), v.clone());
        }
    }

    /// Copies tags of `other` under `prefix` that are not yet present.
    pub fn append_tags(&mut self, other: &TagStore, prefix: &str) {
        for (k, v) in other.iter() {
            self.append_tag(format!("{prefix}{k}"), v.clone());
        }
    }

    /// Promotes `key<sep>value` lines of `text` to tags under `prefix`.
    ///
    /// A `[name]` line scopes the following keys as `name/key`. Values
    /// wrapped in double quotes lose the quotes; lines without `sep` are
    /// skipped. Keys and values are trimmed, and existing tags are
    /// overwritten.
    ///
    /// ```rust
    /// use bim_io::TagStore;
    ///
    /// let mut tags = TagStore::new();
    /// tags.parse_ini("Version: 4\n[Scanner list]\nScan rate: \"1.5\"\n", ":", "custom/");
    /// assert_eq!(tags.get_str("custom/Version"), Some("4"));
    /// assert_eq!(tags.get_str("custom/Scanner list/Scan rate"), Some("1.5"));
    /// ```
    pub fn parse_ini(&mut self, text: &str, sep: &str, prefix: &str) {
        let mut section = String::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if line.len() >= 2 && line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].to_string();
                continue;
            }
            let Some((key, value)) = line.split_once(sep) else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            let path = if section.is_empty() {
                format!("{prefix}{key}")
            } else {
                format!("{prefix}{section}/{key}")
            };
            self.set(path, value);
        }
    }
}

impl<'a> IntoIterator for &'a TagStore {
    type Item = (&'a str, &'a TagValue);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a TagValue)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
