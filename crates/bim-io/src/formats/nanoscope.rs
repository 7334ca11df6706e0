//! NanoScope II/III scanning probe microscope reader.
//!
//! The file starts with a text header of `\key: value` lines grouped by
//! `\*section` markers and terminated by `\*File list end`. Every
//! `\*... image list` section describes one image; its raw 16-bit signed
//! samples live at `\Data offset:`, stored bottom row first.
//!
//! ```text
//! \*File list
//! \Date: 06:32:07 PM Thu Dec 09 2004
//! \*Ciao image list
//! \Data offset: 8192
//! \Samps/line: 512
//! \Number of lines: 512
//! \Scan size: 15 15 ~m
//! \@2:Image Data: S [Height] "Height"
//! \*File list end
//! ```
//!
//! Each image section becomes one page of 16-bit unsigned samples.

use crate::date::{ClockTime, format_date_time, month_from_name};
use crate::error::{IoError, IoResult};
use crate::handle::OpenOptions;
use crate::plugin::{
    FormatConstraints, FormatHeader, FormatItem, FormatPlugin, FormatSession, PageContext,
};
use crate::stream::{IoMode, Stream};
use crate::swap::{Endianness, swap_array16};
use crate::tags::{TagStore, keys};
use crate::text::{self, LineKind, LineReader};
use bim_core::{ImageBitmap, ImageInfo, PixelType, ResolutionUnit};
use std::io::{Seek, SeekFrom};

/// Header start of an image file.
pub const NANOSCOPE_MAGIC: &[u8] = b"\\*File list";
/// Header start of a force curve file.
pub const NANOSCOPE_MAGIC_FORCE: &[u8] = b"\\*Force file list";
/// Bytes compared by [`NanoscopeFormat::validate`].
pub const NANOSCOPE_COMPARE_SIZE: usize = 11;
/// Bytes requested for detection.
pub const NANOSCOPE_MAGIC_SIZE: usize = 12;

/// Offset that maps stored signed samples onto the unsigned range.
pub const SIGNED_BIAS: u16 = 32767;

const TAG_DATA_OFFSET: &str = "\\Data offset:";
const TAG_SAMPS_LINE: &str = "\\Samps/line:";
const TAG_NUM_LINES: &str = "\\Number of lines:";
const TAG_SCAN_SIZE: &str = "\\Scan size:";
const TAG_IMAGE_DATA: &str = "\\@2:Image Data:";

/// Plugin settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NanoscopeOptions {
    /// Byte order of the stored samples.
    pub data_byte_order: Endianness,
}

impl Default for NanoscopeOptions {
    fn default() -> Self {
        Self {
            data_byte_order: Endianness::Big,
        }
    }
}

const NANOSCOPE_ITEMS: &[FormatItem] = &[FormatItem {
    short_name: "NANOSCOPE",
    long_name: "NanoScope II/III",
    extensions: &["nan"],
    can_read: true,
    can_write: false,
    can_read_meta: true,
    can_write_meta: false,
    can_write_multipage: false,
    constraints: FormatConstraints {
        min_samples: 1,
        max_samples: 1,
        min_depth: 16,
        max_depth: 16,
        ..FormatConstraints::NONE
    },
}];

const NANOSCOPE_HEADER: FormatHeader = FormatHeader {
    name: "NANOSCOPE",
    version: "1.0.0",
    description: "Digital Instruments NanoScope",
    magic_size: NANOSCOPE_MAGIC_SIZE,
    formats: NANOSCOPE_ITEMS,
};

/// NanoScope plugin.
#[derive(Debug, Clone, Default)]
pub struct NanoscopeFormat {
    options: NanoscopeOptions,
}

impl NanoscopeFormat {
    /// Plugin with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin with explicit options.
    pub fn with_options(options: NanoscopeOptions) -> Self {
        Self { options }
    }
}

impl FormatPlugin for NanoscopeFormat {
    fn header(&self) -> &FormatHeader {
        &NANOSCOPE_HEADER
    }

    fn validate(&self, magic: &[u8], _file_name: &str) -> Option<usize> {
        if magic.len() < NANOSCOPE_MAGIC_SIZE {
            return None;
        }
        let head = &magic[..NANOSCOPE_COMPARE_SIZE];
        (head == &NANOSCOPE_MAGIC[..NANOSCOPE_COMPARE_SIZE]
            || head == &NANOSCOPE_MAGIC_FORCE[..NANOSCOPE_COMPARE_SIZE])
            .then_some(0)
    }

    fn open(
        &self,
        stream: &mut Stream,
        _sub_format: usize,
        mode: IoMode,
        options: &OpenOptions,
    ) -> IoResult<Box<dyn FormatSession>> {
        if mode != IoMode::Read {
            return Err(IoError::unsupported("NanoScope is read-only"));
        }
        let order = options
            .byte_order_hint
            .unwrap_or(self.options.data_byte_order);
        Ok(Box::new(NanoscopeSession::open(stream, order)?))
    }
}

/// One `image list` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NanoscopeImage {
    /// `\Samps/line:`.
    pub width: i64,
    /// `\Number of lines:`.
    pub height: i64,
    /// `\Data offset:`.
    pub data_offset: i64,
    /// Scan extent along x, micrometers.
    pub scan_x: f64,
    /// Scan extent along y, micrometers.
    pub scan_y: f64,
    /// Quoted name from `\@2:Image Data:`.
    pub data_type: String,
    /// Section name, e.g. "Ciao image list".
    pub section: String,
    /// Unparsed lines of this section.
    pub meta_text: String,
}

impl NanoscopeImage {
    fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data_offset > 0
    }
}

/// Parsed header.
#[derive(Debug)]
pub struct NanoscopeSession {
    images: Vec<NanoscopeImage>,
    meta_text: String,
    order: Endianness,
}

impl NanoscopeSession {
    fn open(stream: &mut Stream, order: Endianness) -> IoResult<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let (mut images, mut meta_text) = parse_header(&mut LineReader::new(&mut *stream))?;

        let before = images.len();
        images.retain(|img| {
            if img.is_valid() {
                return true;
            }
            tracing::warn!(
                section = %img.section,
                width = img.width,
                height = img.height,
                offset = img.data_offset,
                "dropping incomplete NanoScope image"
            );
            meta_text.push_str(&img.meta_text);
            false
        });
        if images.is_empty() {
            return Err(IoError::header(format!(
                "no usable image among {before} NanoScope sections"
            )));
        }

        tracing::debug!(images = images.len(), ?order, "parsed NanoScope header");
        Ok(Self {
            images,
            meta_text,
            order,
        })
    }

    /// Image sections that passed validation.
    pub fn images(&self) -> &[NanoscopeImage] {
        &self.images
    }

    /// Header text outside image sections.
    pub fn meta_text(&self) -> &str {
        &self.meta_text
    }

    fn image(&self, page: u64) -> &NanoscopeImage {
        let last = self.images.len() - 1;
        &self.images[(page as usize).min(last)]
    }
}

/// Walks the header lines, splitting them into image sections and the
/// global text.
fn parse_header<R: std::io::Read>(
    reader: &mut LineReader<R>,
) -> IoResult<(Vec<NanoscopeImage>, String)> {
    let mut images: Vec<NanoscopeImage> = Vec::new();
    let mut meta_text = String::new();

    while let Some(line) = reader.next_line()? {
        let line = line.trim_end();
        match text::classify(line) {
            LineKind::End => break,
            LineKind::ImageSection => {
                images.push(NanoscopeImage {
                    section: text::key_name(line).to_string(),
                    ..NanoscopeImage::default()
                });
            }
            kind => match images.last_mut() {
                None => push_line(&mut meta_text, kind, line),
                Some(img) => parse_image_line(img, kind, line),
            },
        }
    }
    Ok((images, meta_text))
}

fn push_line(text_out: &mut String, kind: LineKind, line: &str) {
    if kind == LineKind::Key {
        text_out.push('[');
        text_out.push_str(text::key_name(line));
        text_out.push_str("]\n");
    } else {
        text_out.push_str(text::tag_body(line));
        text_out.push('\n');
    }
}

fn parse_image_line(img: &mut NanoscopeImage, kind: LineKind, line: &str) {
    if let Some(v) = text::tag_int(line, TAG_DATA_OFFSET) {
        img.data_offset = v;
        return;
    }
    if let Some(v) = text::tag_int(line, TAG_SAMPS_LINE) {
        img.width = v;
        return;
    }
    if let Some(v) = text::tag_int(line, TAG_NUM_LINES) {
        img.height = v;
        return;
    }
    push_line(&mut img.meta_text, kind, line);

    if let Some((x, y, unit)) = text::tag_two_doubles_and_rest(line, TAG_SCAN_SIZE) {
        let scale = if unit.starts_with("nm") { 1.0e-3 } else { 1.0 };
        img.scan_x = x * scale;
        img.scan_y = y * scale;
    }
    if line.starts_with(TAG_IMAGE_DATA) {
        if let Some(name) = text::quoted_value(line) {
            img.data_type = name.to_string();
        }
    }
}

/// `Date: 06:32:07 PM Thu Dec 09 2004`.
fn header_date_time(text: &str) -> Option<String> {
    let rest = text
        .lines()
        .find_map(|l| l.find("Date: ").map(|i| &l[i + "Date: ".len()..]))?;
    let t: Vec<&str> = rest.split_whitespace().collect();
    let time = ClockTime::parse(t.first()?, t.get(1).copied())?;
    let month = month_from_name(t.get(3)?)?;
    let day: u32 = t.get(4)?.parse().ok()?;
    let year: i32 = t.get(5)?.parse().ok()?;
    Some(format_date_time(year, month, day, time))
}

impl FormatSession for NanoscopeSession {
    fn num_pages(&self) -> u64 {
        self.images.len() as u64
    }

    fn image_info(&self, page: u64) -> IoResult<ImageInfo> {
        let img = self.image(page);
        let mut info = ImageInfo::new(
            img.width as u64,
            img.height as u64,
            1,
            16,
            PixelType::Unsigned,
        );
        info.number_pages = self.num_pages();
        info.res_units = ResolutionUnit::Microns;
        info.x_res = img.scan_x / img.width as f64;
        info.y_res = img.scan_y / img.height as f64;
        Ok(info)
    }

    fn read_page(
        &mut self,
        stream: &mut Stream,
        page: u64,
        bitmap: &mut ImageBitmap,
        ctx: &PageContext<'_>,
    ) -> IoResult<()> {
        let info = self.image_info(page)?;
        let img = self.image(page);
        bitmap.ensure(&info, &ctx.limits())?;

        let count = info.width * info.height;
        let mut raw = stream.read_vec_at(img.data_offset as u64, count * 2)?;
        if self.order.needs_swap(Endianness::native()) {
            swap_array16(&mut raw);
        }
        let plane = bitmap.plane_mut(0)?;
        for (src, dst) in raw.chunks_exact(2).zip(plane.chunks_exact_mut(2)) {
            let u = u16::from_ne_bytes([src[0], src[1]]).wrapping_add(SIGNED_BIAS);
            dst.copy_from_slice(&u.to_ne_bytes());
        }

        // rows are stored bottom-up
        let h = info.height;
        let pairs = h / 2;
        for y in 0..pairs {
            ctx.check_abort("NanoScope read")?;
            ctx.report(y, pairs);
            bitmap.swap_lines(0, y, h - 1 - y)?;
        }
        ctx.report(pairs, pairs);
        Ok(())
    }

    fn append_metadata(&mut self, _stream: &mut Stream, tags: &mut TagStore) -> IoResult<()> {
        let date = header_date_time(&self.meta_text).or_else(|| {
            self.images
                .iter()
                .find_map(|img| header_date_time(&img.meta_text))
        });
        if let Some(date) = date {
            tags.append_tag(keys::DATE_TIME, date);
        }

        for (i, img) in self.images.iter().enumerate() {
            if !img.data_type.is_empty() {
                tags.set(
                    keys::IMAGE_NAME_TEMPLATE.replacen("{}", &i.to_string(), 1),
                    img.data_type.as_str(),
                );
            }
        }

        tags.parse_ini(&self.meta_text, ":", keys::CUSTOM_PREFIX);
        for (i, img) in self.images.iter().enumerate() {
            tags.parse_ini(
                &img.meta_text,
                ":",
                &format!("{}image_{i}/", keys::CUSTOM_PREFIX),
            );
        }
        Ok(())
    }

    fn raw_endian(&self) -> Option<Endianness> {
        Some(self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (Vec<NanoscopeImage>, String) {
        parse_header(&mut LineReader::new(text.as_bytes())).unwrap()
    }

    #[test]
    fn test_validate_magic() {
        let f = NanoscopeFormat::new();
        assert_eq!(f.validate(b"\\*File list\r\n", ""), Some(0));
        assert_eq!(f.validate(b"\\*Force file list\r\n", ""), Some(0));
        assert_eq!(f.validate(b"\\*File lis", ""), None);
        assert_eq!(f.validate(b"\\*Other list\r\n", ""), None);
    }

    #[test]
    fn test_parse_sections() {
        let (images, global) = parse(
            "\\*File list\r\n\\Version: 0x04220200\r\n\\Date: 06:32:07 PM Thu Dec 09 2004\r\n\
             \\*Ciao image list\r\n\\Data offset: 8192\r\n\\Samps/line: 4\r\n\
             \\Number of lines: 2\r\n\\Scan size: 353.5 200 nm\r\n\
             \\@2:Image Data: S [Height] \"Height\"\r\n\\*Scanner list\r\n\\Scan rate: 1.5\r\n\
             \\*File list end\r\n\\Ignored: 1\r\n",
        );
        assert_eq!(images.len(), 1);
        let img = &images[0];
        assert_eq!((img.width, img.height, img.data_offset), (4, 2, 8192));
        approx::assert_relative_eq!(img.scan_x, 0.3535);
        approx::assert_relative_eq!(img.scan_y, 0.2);
        assert_eq!(img.data_type, "Height");
        assert_eq!(img.section, "Ciao image list");
        assert!(img.meta_text.contains("[Scanner list]\nScan rate: 1.5\n"));
        assert!(!img.meta_text.contains("Data offset"));

        assert!(global.starts_with("[File list]\nVersion: 0x04220200\n"));
        assert!(!global.contains("Ignored"));
    }

    #[test]
    fn test_scan_size_microns_untouched() {
        let (images, _) = parse("\\*Ciao image list\n\\Scan size: 15 15 ~m\n");
        assert_eq!(images[0].scan_x, 15.0);
    }

    #[test]
    fn test_header_date() {
        assert_eq!(
            header_date_time("Version: 1\nDate: 06:32:07 PM Thu Dec 09 2004\n").as_deref(),
            Some("2004-12-09 18:32:07")
        );
        assert_eq!(header_date_time("Date: garbage"), None);
    }
}
