//! NRRD (Nearly Raw Raster Data) reader and writer.
//!
//! Only the attached-header, raw-encoding subset is handled:
//!
//! ```text
//! NRRD0004
//! # comment
//! dimension: 3
//! sizes: 3 640 480
//! type: uint16
//! endian: little
//! encoding: raw
//!
//! <binary samples>
//! ```
//!
//! The first axis holds the interleaved samples of a pixel when `kinds:`
//! says so, or, without `kinds:`, when it has at most 4 entries in a 3+
//! dimensional volume. Axes beyond x and y become pages, the first of them
//! counted as z.
//!
//! The writer buffers every page and emits header and data on
//! [`FormatSession::finish`], when the final page count is known.

use crate::error::{IoError, IoResult};
use crate::handle::OpenOptions;
use crate::plugin::{
    FormatConstraints, FormatHeader, FormatItem, FormatPlugin, FormatSession, PageContext,
};
use crate::stream::{IoMode, Stream};
use crate::swap::{Endianness, swap_array};
use crate::tags::{TagStore, keys};
use crate::text::{LineReader, split_key_value};
use bim_core::layout::{interleave_bytes, planarize_bytes};
use bim_core::{ImageBitmap, ImageInfo, PixelType, ResolutionUnit};
use std::io::{Seek, SeekFrom, Write};

/// Common prefix of every NRRD magic (`NRRD0001` .. `NRRD0005`).
pub const NRRD_MAGIC: &[u8] = b"NRRD000";
/// Bytes requested for detection.
pub const NRRD_MAGIC_SIZE: usize = 20;
/// Magic line emitted by the writer.
pub const NRRD_WRITE_MAGIC: &str = "NRRD0004";

/// Largest first axis still read as samples of one pixel.
const MAX_INTERLEAVED_SAMPLES: u64 = 4;

/// Writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NrrdWriterOptions {
    /// Byte order of the written samples.
    pub byte_order: Endianness,
}

const NRRD_ITEMS: &[FormatItem] = &[FormatItem {
    short_name: "NRRD",
    long_name: "Nearly Raw Raster Data",
    extensions: &["nrrd"],
    can_read: true,
    can_write: true,
    can_read_meta: true,
    can_write_meta: false,
    can_write_multipage: true,
    constraints: FormatConstraints {
        min_depth: 8,
        max_depth: 64,
        lut_unsupported: true,
        ..FormatConstraints::NONE
    },
}];

const NRRD_HEADER: FormatHeader = FormatHeader {
    name: "NRRD",
    version: "1.0.0",
    description: "Teem NRRD raw volumes",
    magic_size: NRRD_MAGIC_SIZE,
    formats: NRRD_ITEMS,
};

/// NRRD plugin.
#[derive(Debug, Clone, Default)]
pub struct NrrdFormat {
    writer: NrrdWriterOptions,
}

impl NrrdFormat {
    /// Plugin writing in host byte order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin with explicit writer options.
    pub fn with_writer_options(writer: NrrdWriterOptions) -> Self {
        Self { writer }
    }

    /// Write order: option string `endian`, then the handle's hint, then
    /// the plugin default.
    fn write_order(&self, options: &OpenOptions) -> Endianness {
        options
            .option("endian")
            .and_then(Endianness::from_name)
            .or(options.byte_order_hint)
            .unwrap_or(self.writer.byte_order)
    }
}

impl FormatPlugin for NrrdFormat {
    fn header(&self) -> &FormatHeader {
        &NRRD_HEADER
    }

    fn validate(&self, magic: &[u8], _file_name: &str) -> Option<usize> {
        magic.starts_with(NRRD_MAGIC).then_some(0)
    }

    fn open(
        &self,
        stream: &mut Stream,
        _sub_format: usize,
        mode: IoMode,
        options: &OpenOptions,
    ) -> IoResult<Box<dyn FormatSession>> {
        match mode {
            IoMode::Read => Ok(Box::new(NrrdReadSession::open(stream)?)),
            IoMode::Write => Ok(Box::new(NrrdWriteSession::new(self.write_order(options)))),
        }
    }
}

/// Sample type of the `type:` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrrdType {
    /// 8-bit unsigned.
    U8,
    /// 8-bit signed.
    I8,
    /// 16-bit unsigned.
    U16,
    /// 16-bit signed.
    I16,
    /// 32-bit unsigned.
    U32,
    /// 32-bit signed.
    I32,
    /// 64-bit unsigned.
    U64,
    /// 64-bit signed.
    I64,
    /// IEEE single.
    F32,
    /// IEEE double.
    F64,
}

impl NrrdType {
    /// Parses a type name, including the C-style aliases NRRD accepts.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Some(match name.as_str() {
            "uint8" | "uint8_t" | "uchar" | "unsigned char" => Self::U8,
            "int8" | "int8_t" | "signed char" => Self::I8,
            "uint16" | "uint16_t" | "ushort" | "unsigned short" | "unsigned short int" => Self::U16,
            "int16" | "int16_t" | "short" | "short int" | "signed short" | "signed short int" => {
                Self::I16
            }
            "uint32" | "uint32_t" | "uint" | "unsigned int" => Self::U32,
            "int32" | "int32_t" | "int" | "signed int" => Self::I32,
            "uint64" | "uint64_t" | "ulonglong" | "unsigned long long"
            | "unsigned long long int" => Self::U64,
            "int64" | "int64_t" | "longlong" | "long long" | "long long int"
            | "signed long long" | "signed long long int" => Self::I64,
            "float" => Self::F32,
            "double" => Self::F64,
            _ => return None,
        })
    }

    /// Type matching a sample descriptor.
    pub fn from_info(depth: u32, pixel_type: PixelType) -> Option<Self> {
        Some(match (pixel_type, depth) {
            (PixelType::Unsigned, 8) => Self::U8,
            (PixelType::Signed, 8) => Self::I8,
            (PixelType::Unsigned, 16) => Self::U16,
            (PixelType::Signed, 16) => Self::I16,
            (PixelType::Unsigned, 32) => Self::U32,
            (PixelType::Signed, 32) => Self::I32,
            (PixelType::Unsigned, 64) => Self::U64,
            (PixelType::Signed, 64) => Self::I64,
            (PixelType::Float, 32) => Self::F32,
            (PixelType::Float, 64) => Self::F64,
            _ => return None,
        })
    }

    /// Name written to the header.
    pub fn name(&self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::U16 => "uint16",
            Self::I16 => "int16",
            Self::U32 => "uint32",
            Self::I32 => "int32",
            Self::U64 => "uint64",
            Self::I64 => "int64",
            Self::F32 => "float",
            Self::F64 => "double",
        }
    }

    /// Bits per sample.
    pub fn depth(&self) -> u32 {
        match self {
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 | Self::F32 => 32,
            Self::U64 | Self::I64 | Self::F64 => 64,
        }
    }

    /// Interpretation of the samples.
    pub fn pixel_type(&self) -> PixelType {
        match self {
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => PixelType::Unsigned,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => PixelType::Signed,
            Self::F32 | Self::F64 => PixelType::Float,
        }
    }

    /// Bytes per sample.
    #[inline]
    pub fn size(&self) -> usize {
        self.depth() as usize / 8
    }
}

/// Parsed attached header.
#[derive(Debug, Clone, PartialEq)]
pub struct NrrdHeader {
    /// Number of axes.
    pub dimension: usize,
    /// Extent of every axis.
    pub sizes: Vec<u64>,
    /// Sample type.
    pub kind: NrrdType,
    /// Byte order of the samples.
    pub endian: Endianness,
    /// Per-axis sample spacing; NaN for non-spatial axes.
    pub spacings: Vec<f64>,
    /// Units of the spatial axes.
    pub space_units: Vec<String>,
    /// Per-axis kind (`domain`, `space`, `RGB-color`, ...).
    pub kinds: Vec<String>,
    /// Free-text description.
    pub content: Option<String>,
    /// Fields and key/value pairs not interpreted here.
    pub custom: Vec<(String, String)>,
    /// Start of the sample data.
    pub data_offset: u64,
}

impl NrrdHeader {
    /// Reads the header from the start of `stream`.
    pub fn read(stream: &mut Stream) -> IoResult<Self> {
        stream.seek(SeekFrom::Start(0))?;
        let mut reader = LineReader::new(&mut *stream);

        let magic = reader
            .next_line()?
            .ok_or_else(|| IoError::header("empty NRRD file"))?;
        if !magic.as_bytes().starts_with(NRRD_MAGIC) {
            return Err(IoError::header(format!("bad NRRD magic line {magic:?}")));
        }

        let mut dimension = None;
        let mut sizes = Vec::new();
        let mut kind = None;
        let mut endian = Endianness::Little;
        let mut spacings = Vec::new();
        let mut space_units = Vec::new();
        let mut kinds = Vec::new();
        let mut content = None;
        let mut custom = Vec::new();
        let mut terminated = false;

        while let Some(line) = reader.next_line()? {
            if line.trim().is_empty() {
                terminated = true;
                break;
            }
            if line.starts_with('#') {
                continue;
            }
            // key:=value pairs carry free-form user data
            if let Some((k, v)) = split_key_value(&line, ":=") {
                custom.push((k.to_string(), v.to_string()));
                continue;
            }
            let Some((key, value)) = split_key_value(&line, ":") else {
                tracing::warn!(line = %line, "skipping malformed NRRD header line");
                continue;
            };
            match key.to_ascii_lowercase().as_str() {
                "dimension" => {
                    dimension = Some(value.parse::<usize>().map_err(|_| {
                        IoError::header(format!("bad NRRD dimension {value:?}"))
                    })?)
                }
                "sizes" => {
                    sizes = value
                        .split_whitespace()
                        .map(str::parse::<u64>)
                        .collect::<Result<_, _>>()
                        .map_err(|_| IoError::header(format!("bad NRRD sizes {value:?}")))?
                }
                "type" => {
                    kind = Some(NrrdType::from_name(value).ok_or_else(|| {
                        IoError::header(format!("unsupported NRRD type {value:?}"))
                    })?)
                }
                "endian" => {
                    endian = Endianness::from_name(value).ok_or_else(|| {
                        IoError::header(format!("bad NRRD endian {value:?}"))
                    })?
                }
                "encoding" => {
                    if !value.eq_ignore_ascii_case("raw") {
                        return Err(IoError::header(format!(
                            "unsupported NRRD encoding {value:?}"
                        )));
                    }
                }
                "spacings" => {
                    spacings = value
                        .split_whitespace()
                        .map(|s| s.parse::<f64>().unwrap_or(f64::NAN))
                        .collect()
                }
                "space units" | "units" => space_units = quoted_list(value),
                "kinds" => kinds = value.split_whitespace().map(str::to_string).collect(),
                "content" => content = Some(value.to_string()),
                _ => custom.push((key.to_string(), value.to_string())),
            }
        }
        if !terminated {
            return Err(IoError::header("NRRD header has no terminating blank line"));
        }

        let kind = kind.ok_or_else(|| IoError::header("NRRD header lacks a type"))?;
        let dimension = dimension.unwrap_or(sizes.len());
        if dimension < 2 || sizes.len() != dimension {
            return Err(IoError::header(format!(
                "NRRD dimension {dimension} does not match {} sizes",
                sizes.len()
            )));
        }
        if sizes.contains(&0) {
            return Err(IoError::header("NRRD axis of size 0"));
        }

        let header = Self {
            dimension,
            sizes,
            kind,
            endian,
            spacings,
            space_units,
            kinds,
            content,
            custom,
            data_offset: reader.consumed(),
        };
        // every per-page and per-axis product below is bounded by this one
        header.data_size()?;
        if header.is_interleaved() && u32::try_from(header.sizes[0]).is_err() {
            return Err(IoError::header(format!(
                "NRRD sample axis of {} is too large",
                header.sizes[0]
            )));
        }
        Ok(header)
    }

    /// Bytes of the whole data block.
    pub fn data_size(&self) -> IoResult<u64> {
        self.sizes
            .iter()
            .try_fold(self.kind.size() as u64, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| IoError::header("NRRD sizes overflow"))
    }

    /// Returns `true` when the first axis holds interleaved samples.
    pub fn is_interleaved(&self) -> bool {
        if self.dimension < 3 {
            return false;
        }
        match self.kinds.first() {
            Some(kind) => !is_domain_kind(kind),
            None => self.sizes[0] <= MAX_INTERLEAVED_SAMPLES,
        }
    }

    /// Index of the x axis.
    fn x_axis(&self) -> usize {
        usize::from(self.is_interleaved())
    }

    /// Axes past x and y.
    fn page_axes(&self) -> &[u64] {
        &self.sizes[self.x_axis() + 2..]
    }

    /// Geometry and resolution shared by every page.
    pub fn image_info(&self) -> ImageInfo {
        let x = self.x_axis();
        let samples = if self.is_interleaved() {
            u32::try_from(self.sizes[0]).unwrap_or(u32::MAX)
        } else {
            1
        };
        let mut info = ImageInfo::new(
            self.sizes[x],
            self.sizes[x + 1],
            samples,
            self.kind.depth(),
            self.kind.pixel_type(),
        );

        let extra = self.page_axes();
        info.number_pages = saturating_product(extra);
        info.number_z = extra.first().copied().unwrap_or(1);
        info.number_t = saturating_product(extra.get(1..).unwrap_or(&[]));

        let unit = self
            .space_units
            .iter()
            .find_map(|u| ResolutionUnit::from_symbol(u));
        let sx = self.spacings.get(x).copied().filter(|v| v.is_finite());
        let sy = self.spacings.get(x + 1).copied().filter(|v| v.is_finite());
        if let (Some(sx), Some(sy)) = (sx, sy) {
            info.x_res = sx;
            info.y_res = sy;
            info.res_units = unit.unwrap_or(ResolutionUnit::Microns);
        }
        info
    }

    /// Bytes of one page.
    pub fn page_size(&self) -> u64 {
        let x = self.x_axis();
        saturating_product(&self.sizes[..x + 2]).saturating_mul(self.kind.size() as u64)
    }
}

/// Product of `sizes`, pinned at `u64::MAX`. Headers from [`NrrdHeader::read`]
/// never reach the cap.
fn saturating_product(sizes: &[u64]) -> u64 {
    sizes.iter().fold(1u64, |acc, &n| acc.saturating_mul(n))
}

fn is_domain_kind(kind: &str) -> bool {
    matches!(
        kind.to_ascii_lowercase().as_str(),
        "domain" | "space" | "time" | "???" | "none"
    )
}

/// Splits `"a" "b c" d` into its items.
fn quoted_list(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = value.trim();
    while !rest.is_empty() {
        if let Some(body) = rest.strip_prefix('"') {
            let end = body.find('"').unwrap_or(body.len());
            out.push(body[..end].to_string());
            rest = body.get(end + 1..).unwrap_or("").trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            out.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }
    out
}

/// Open NRRD file.
#[derive(Debug)]
pub struct NrrdReadSession {
    header: NrrdHeader,
    info: ImageInfo,
}

impl NrrdReadSession {
    fn open(stream: &mut Stream) -> IoResult<Self> {
        let header = NrrdHeader::read(stream)?;
        let info = header.image_info();
        stream.ensure_range(header.data_offset, header.data_size()?)?;
        tracing::debug!(
            sizes = ?header.sizes,
            kind = header.kind.name(),
            offset = header.data_offset,
            "parsed NRRD header"
        );
        Ok(Self { header, info })
    }

    /// Parsed header.
    pub fn header(&self) -> &NrrdHeader {
        &self.header
    }
}

impl FormatSession for NrrdReadSession {
    fn num_pages(&self) -> u64 {
        self.info.number_pages
    }

    fn image_info(&self, _page: u64) -> IoResult<ImageInfo> {
        Ok(self.info.clone())
    }

    fn read_page(
        &mut self,
        stream: &mut Stream,
        page: u64,
        bitmap: &mut ImageBitmap,
        ctx: &PageContext<'_>,
    ) -> IoResult<()> {
        let info = &self.info;
        bitmap.ensure(info, &ctx.limits())?;

        let page_size = self.header.page_size();
        let mut raw = stream.read_vec_at(self.header.data_offset + page * page_size, page_size)?;
        let elem = self.header.kind.size();
        if elem > 1 && self.header.endian.needs_swap(Endianness::native()) {
            swap_array(&mut raw, elem);
        }

        if info.samples == 1 {
            bitmap.plane_mut(0)?.copy_from_slice(&raw);
            ctx.report(1, 1);
            return Ok(());
        }
        let (w, h) = (info.width as usize, info.height as usize);
        let samples = info.samples;
        for s in 0..samples {
            ctx.check_abort("NRRD read")?;
            planarize_bytes(
                &raw,
                elem,
                w,
                h,
                samples as usize,
                s as usize,
                0,
                bitmap.plane_mut(s)?,
            )?;
            ctx.report(u64::from(s) + 1, u64::from(samples));
        }
        Ok(())
    }

    fn append_metadata(&mut self, _stream: &mut Stream, tags: &mut TagStore) -> IoResult<()> {
        if let Some(content) = &self.header.content {
            tags.set(keys::IMAGE_NAME_TEMPLATE.replacen("{}", "0", 1), content.as_str());
        }
        for (k, v) in &self.header.custom {
            tags.set(format!("{}{k}", keys::CUSTOM_PREFIX), v.as_str());
        }
        Ok(())
    }

    fn raw_endian(&self) -> Option<Endianness> {
        Some(self.header.endian)
    }
}

/// Buffering writer.
#[derive(Debug)]
pub struct NrrdWriteSession {
    order: Endianness,
    info: Option<ImageInfo>,
    kind: Option<NrrdType>,
    data: Vec<u8>,
    pages: u64,
}

impl NrrdWriteSession {
    fn new(order: Endianness) -> Self {
        Self {
            order,
            info: None,
            kind: None,
            data: Vec::new(),
            pages: 0,
        }
    }

    fn header_text(&self, info: &ImageInfo, kind: NrrdType) -> String {
        let mut axes = Vec::with_capacity(4);
        let mut kinds = Vec::with_capacity(4);
        if info.samples > 1 {
            axes.push(u64::from(info.samples));
            kinds.push(match info.samples {
                3 => "RGB-color",
                4 => "RGBA-color",
                _ => "vector",
            });
        }
        axes.extend([info.width, info.height]);
        kinds.extend(["space", "space"]);
        if self.pages > 1 {
            axes.push(self.pages);
            kinds.push("domain");
        }

        let join = |v: Vec<String>| v.join(" ");
        let mut text = format!(
            "{NRRD_WRITE_MAGIC}\n\
             dimension: {}\n\
             sizes: {}\n\
             type: {}\n\
             endian: {}\n\
             encoding: raw\n\
             kinds: {}\n",
            axes.len(),
            join(axes.iter().map(u64::to_string).collect()),
            kind.name(),
            self.order.name(),
            kinds.join(" "),
        );

        if let Some(scale) = info.res_units.to_microns() {
            if info.x_res > 0.0 && info.y_res > 0.0 {
                let mut res = [info.x_res * scale, info.y_res * scale].into_iter();
                let spacings = kinds
                    .iter()
                    .map(|&k| match k {
                        "space" => res.next().map_or_else(|| "nan".to_string(), |v| v.to_string()),
                        _ => "nan".to_string(),
                    })
                    .collect();
                text.push_str(&format!("spacings: {}\n", join(spacings)));
                text.push_str("space units: \"um\" \"um\"\n");
            }
        }
        text.push('\n');
        text
    }
}

impl FormatSession for NrrdWriteSession {
    fn num_pages(&self) -> u64 {
        self.pages
    }

    fn image_info(&self, _page: u64) -> IoResult<ImageInfo> {
        let mut info = self
            .info
            .clone()
            .ok_or_else(|| IoError::unsupported("no page written yet"))?;
        info.number_pages = self.pages;
        Ok(info)
    }

    fn write_page(
        &mut self,
        _stream: &mut Stream,
        _page: u64,
        bitmap: &ImageBitmap,
        ctx: &PageContext<'_>,
    ) -> IoResult<()> {
        let info = bitmap.info();
        let kind = NrrdType::from_info(info.depth, info.pixel_type).ok_or_else(|| {
            IoError::unsupported(format!(
                "NRRD cannot store {}-bit {} samples",
                info.depth,
                info.pixel_type.name()
            ))
        })?;
        if let Some(first) = &self.info {
            if !first.same_geometry(info) || first.pixel_type != info.pixel_type {
                return Err(IoError::unsupported(
                    "NRRD pages must share geometry and sample type",
                ));
            }
        } else {
            self.info = Some(info.clone());
            self.kind = Some(kind);
        }

        let elem = kind.size();
        let (w, h) = (info.width as usize, info.height as usize);
        let samples = info.samples as usize;
        let mut page = vec![0u8; w * h * samples * elem];
        if samples == 1 {
            page.copy_from_slice(bitmap.plane(0)?);
        } else {
            for s in 0..samples {
                ctx.check_abort("NRRD write")?;
                interleave_bytes(bitmap.plane(s as u32)?, elem, w, h, samples, s, 0, &mut page)?;
            }
        }
        if elem > 1 && self.order.needs_swap(Endianness::native()) {
            swap_array(&mut page, elem);
        }

        self.data
            .try_reserve(page.len())
            .map_err(|e| bim_core::Error::allocation_failed(page.len() as u64, e.to_string()))?;
        self.data.extend_from_slice(&page);
        self.pages += 1;
        Ok(())
    }

    fn raw_endian(&self) -> Option<Endianness> {
        Some(self.order)
    }

    fn finish(&mut self, stream: &mut Stream) -> IoResult<()> {
        let (Some(info), Some(kind)) = (&self.info, self.kind) else {
            return Err(IoError::unsupported("NRRD file closed without pages"));
        };
        let header = self.header_text(info, kind);
        stream.seek(SeekFrom::Start(0))?;
        stream.write_all(header.as_bytes())?;
        stream.write_all(&self.data)?;
        tracing::debug!(pages = self.pages, bytes = self.data.len(), "wrote NRRD");
        self.data = Vec::new();
        self.info = None;
        Ok(())
    }
}
