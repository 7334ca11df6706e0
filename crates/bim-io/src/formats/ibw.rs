//! Igor Binary Wave v5 reader.
//!
//! An IBW file is a 64-byte `BinHeader5`, a 320-byte `WaveHeader5`, the
//! wave data, an optional formula and a free-text note:
//!
//! ```text
//! 0      BinHeader5   version (5) selects the byte order
//! 64     WaveHeader5  npnts, type, nDim[4], sfA[4], units, ...
//! 384    data         npnts elements of `type`
//! ...    formula      formulaSize bytes
//! ...    note         noteSize bytes, CR line breaks
//! ```
//!
//! Pages are `nDim[0] x nDim[1]` planes stacked along `nDim[2]`. Every
//! element type is rescaled to 8-bit unsigned per page using the page's
//! minimum and maximum, so pages of the same wave are not comparable in
//! absolute terms.

use crate::date::{ClockTime, format_date_time, month_from_name};
use crate::error::{IoError, IoResult};
use crate::handle::OpenOptions;
use crate::header::{FieldKind, FieldSpec, Record, RecordLayout, detect_endianness};
use crate::plugin::{
    FormatConstraints, FormatHeader, FormatItem, FormatPlugin, FormatSession, PageContext,
};
use crate::stream::{IoMode, Stream};
use crate::swap::{Endianness, swap_array};
use crate::tags::{TagStore, keys};
use bim_core::{ImageBitmap, ImageInfo, PixelType, ResolutionUnit};
use byteorder::{ByteOrder, NativeEndian};
use std::io::{Seek, SeekFrom};

/// Bytes inspected by [`IbwFormat::validate`].
pub const IBW_MAGIC_SIZE: usize = 12;
/// Version field of a little-endian v5 file.
pub const IBW_MAGIC_LE: [u8; 2] = [0x05, 0x00];
/// Version field of a big-endian v5 file.
pub const IBW_MAGIC_BE: [u8; 2] = [0x00, 0x05];

/// `BinHeader5`.
pub static BIN_HEADER5: RecordLayout = RecordLayout::new(
    "BinHeader5",
    &[
        FieldSpec::scalar("version", FieldKind::I16),
        FieldSpec::scalar("checksum", FieldKind::I16),
        FieldSpec::scalar("wfmSize", FieldKind::I32),
        FieldSpec::scalar("formulaSize", FieldKind::I32),
        FieldSpec::scalar("noteSize", FieldKind::I32),
        FieldSpec::scalar("dataEUnitsSize", FieldKind::I32),
        FieldSpec::array("dimEUnitsSize", FieldKind::I32, 4),
        FieldSpec::array("dimLabelsSize", FieldKind::I32, 4),
        FieldSpec::scalar("sIndicesSize", FieldKind::I32),
        FieldSpec::scalar("optionsSize1", FieldKind::I32),
        FieldSpec::scalar("optionsSize2", FieldKind::I32),
    ],
);

/// `WaveHeader5`, without the trailing inline data field.
pub static WAVE_HEADER5: RecordLayout = RecordLayout::new(
    "WaveHeader5",
    &[
        FieldSpec::scalar("next", FieldKind::U32),
        FieldSpec::scalar("creationDate", FieldKind::U32),
        FieldSpec::scalar("modDate", FieldKind::U32),
        FieldSpec::scalar("npnts", FieldKind::I32),
        FieldSpec::scalar("type", FieldKind::I16),
        FieldSpec::scalar("dLock", FieldKind::I16),
        FieldSpec::bytes("whpad1", 6),
        FieldSpec::scalar("whVersion", FieldKind::I16),
        FieldSpec::bytes("bname", 32),
        FieldSpec::scalar("whpad2", FieldKind::I32),
        FieldSpec::scalar("dFolder", FieldKind::U32),
        FieldSpec::array("nDim", FieldKind::I32, 4),
        FieldSpec::array("sfA", FieldKind::F64, 4),
        FieldSpec::array("sfB", FieldKind::F64, 4),
        FieldSpec::bytes("dataUnits", 4),
        FieldSpec::bytes("dimUnits", 16),
        FieldSpec::scalar("fsValid", FieldKind::I16),
        FieldSpec::scalar("whpad3", FieldKind::I16),
        FieldSpec::scalar("topFullScale", FieldKind::F64),
        FieldSpec::scalar("botFullScale", FieldKind::F64),
        FieldSpec::scalar("dataEUnits", FieldKind::U32),
        FieldSpec::array("dimEUnits", FieldKind::U32, 4),
        FieldSpec::array("dimLabels", FieldKind::U32, 4),
        FieldSpec::scalar("waveNoteH", FieldKind::U32),
        FieldSpec::array("whUnused", FieldKind::I32, 16),
        FieldSpec::scalar("aModified", FieldKind::I16),
        FieldSpec::scalar("wModified", FieldKind::I16),
        FieldSpec::scalar("swModified", FieldKind::I16),
        FieldSpec::scalar("useBits", FieldKind::U8),
        FieldSpec::scalar("kindBits", FieldKind::U8),
        FieldSpec::scalar("formula", FieldKind::U32),
        FieldSpec::scalar("depID", FieldKind::I32),
        FieldSpec::scalar("whpad4", FieldKind::I16),
        FieldSpec::scalar("srcFldr", FieldKind::I16),
        FieldSpec::scalar("fileName", FieldKind::U32),
        FieldSpec::scalar("sIndices", FieldKind::U32),
    ],
);

/// Offset of the first data element, right after both headers.
pub const IBW_DATA_OFFSET: u64 = 384;

/// Wave type codes.
pub mod wave_type {
    /// Complex flag; alone it denotes a pair of `f32`.
    pub const CMPLX: i16 = 0x01;
    /// 32-bit float.
    pub const FP32: i16 = 0x02;
    /// 64-bit float.
    pub const FP64: i16 = 0x04;
    /// 8-bit integer.
    pub const I8: i16 = 0x08;
    /// 16-bit integer.
    pub const I16: i16 = 0x10;
    /// 32-bit integer.
    pub const I32: i16 = 0x20;
    /// Unsigned flag for the integer types.
    pub const UNSIGNED: i16 = 0x40;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    F32,
    F64,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
}

impl Scalar {
    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 => 8,
        }
    }

    fn read<B: ByteOrder>(self, b: &[u8]) -> f64 {
        match self {
            Self::F32 => B::read_f32(b) as f64,
            Self::F64 => B::read_f64(b),
            Self::I8 => b[0] as i8 as f64,
            Self::U8 => b[0] as f64,
            Self::I16 => B::read_i16(b) as f64,
            Self::U16 => B::read_u16(b) as f64,
            Self::I32 => B::read_i32(b) as f64,
            Self::U32 => B::read_u32(b) as f64,
        }
    }
}

/// Decoded wave element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ElementType {
    scalar: Scalar,
    complex: bool,
}

impl ElementType {
    /// Unknown codes read as single unsigned bytes.
    fn from_code(code: i16) -> Self {
        let complex = code & wave_type::CMPLX != 0;
        let unsigned = code & wave_type::UNSIGNED != 0;
        let scalar = match code & !(wave_type::CMPLX | wave_type::UNSIGNED) {
            wave_type::FP32 => Scalar::F32,
            wave_type::FP64 => Scalar::F64,
            wave_type::I8 if unsigned => Scalar::U8,
            wave_type::I8 => Scalar::I8,
            wave_type::I16 if unsigned => Scalar::U16,
            wave_type::I16 => Scalar::I16,
            wave_type::I32 if unsigned => Scalar::U32,
            wave_type::I32 => Scalar::I32,
            0 if complex => Scalar::F32,
            _ => Scalar::U8,
        };
        Self { scalar, complex }
    }

    /// Bytes per element; a complex element holds real and imaginary parts.
    fn size(self) -> usize {
        self.scalar.size() * if self.complex { 2 } else { 1 }
    }
}

const IBW_ITEMS: &[FormatItem] = &[FormatItem {
    short_name: "IBW",
    long_name: "Igor Binary Wave v5",
    extensions: &["ibw"],
    can_read: true,
    can_write: false,
    can_read_meta: true,
    can_write_meta: false,
    can_write_multipage: false,
    constraints: FormatConstraints::NONE,
}];

const IBW_HEADER: FormatHeader = FormatHeader {
    name: "IBW",
    version: "1.0.0",
    description: "Igor Binary Wave v5",
    magic_size: IBW_MAGIC_SIZE,
    formats: IBW_ITEMS,
};

/// Igor Binary Wave plugin.
#[derive(Debug, Clone)]
pub struct IbwFormat {
    header: FormatHeader,
    host: Endianness,
}

impl Default for IbwFormat {
    fn default() -> Self {
        Self::new()
    }
}

impl IbwFormat {
    /// Plugin decoding for the running machine.
    pub fn new() -> Self {
        Self::with_host(Endianness::native())
    }

    /// Plugin decoding headers as if running on a `host` machine.
    pub fn with_host(host: Endianness) -> Self {
        Self {
            header: IBW_HEADER,
            host,
        }
    }
}

impl FormatPlugin for IbwFormat {
    fn header(&self) -> &FormatHeader {
        &self.header
    }

    fn validate(&self, magic: &[u8], _file_name: &str) -> Option<usize> {
        if magic.len() < IBW_MAGIC_SIZE {
            return None;
        }
        (magic.starts_with(&IBW_MAGIC_LE) || magic.starts_with(&IBW_MAGIC_BE)).then_some(0)
    }

    fn open(
        &self,
        stream: &mut Stream,
        _sub_format: usize,
        mode: IoMode,
        _options: &OpenOptions,
    ) -> IoResult<Box<dyn FormatSession>> {
        if mode != IoMode::Read {
            return Err(IoError::unsupported("IBW is read-only"));
        }
        Ok(Box::new(IbwSession::open(stream, self.host)?))
    }
}

/// Parsed wave.
#[derive(Debug)]
pub struct IbwSession {
    bin: Record,
    wave: Record,
    order: Endianness,
    element: ElementType,
    info: ImageInfo,
    note: String,
}

impl IbwSession {
    fn open(stream: &mut Stream, host: Endianness) -> IoResult<Self> {
        let magic = stream.peek(IBW_MAGIC_LE.len())?;
        let order = detect_endianness(&magic, &IBW_MAGIC_BE, &IBW_MAGIC_LE)?;

        stream.seek(SeekFrom::Start(0))?;
        let bin = Record::decode_with_host(&BIN_HEADER5, stream, order, host)?;
        let wave = Record::decode_with_host(&WAVE_HEADER5, stream, order, host)?;

        let element = ElementType::from_code(wave.i16("type")?);
        let dims: Vec<i32> = wave.get_array("nDim")?;
        if dims[0] <= 0 {
            return Err(IoError::header(format!("invalid wave width {}", dims[0])));
        }
        if dims[1] < 0 || dims[2] < 0 {
            return Err(IoError::header(format!(
                "invalid wave dimensions {dims:?}"
            )));
        }
        let width = dims[0] as u64;
        let height = (dims[1] as u64).max(1);
        let pages = (dims[2] as u64).max(1);

        let npnts = wave.i32("npnts")?;
        if npnts < 0 {
            return Err(IoError::header(format!("negative point count {npnts}")));
        }
        let elem = element.size() as u64;
        let data_size = (npnts as u64) * elem;
        let pages_size = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(pages))
            .and_then(|v| v.checked_mul(elem))
            .ok_or_else(|| IoError::header("wave size overflows"))?;
        stream.ensure_range(IBW_DATA_OFFSET, data_size.max(pages_size))?;

        let formula_offset = IBW_DATA_OFFSET + data_size;
        let notes_offset = formula_offset + bin.i32("formulaSize")?.max(0) as u64;
        let note_size = bin.i32("noteSize")?.max(0) as u64;
        let note = match stream.read_vec_at(notes_offset, note_size) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).replace('\r', "\n"),
            Err(e) => {
                tracing::warn!(error = %e, "IBW note block unreadable");
                String::new()
            }
        };

        let mut info = ImageInfo::new(width, height, 1, 8, PixelType::Unsigned);
        info.number_pages = pages;
        let sf_a: Vec<f64> = wave.get_array("sfA")?;
        if let Some(unit) = dim_unit(&wave)? {
            info.res_units = unit;
            info.x_res = sf_a[0];
            info.y_res = sf_a[1];
        }

        tracing::debug!(
            width,
            height,
            pages,
            ?order,
            swapped = bin.is_swapped(),
            "parsed IBW header"
        );
        Ok(Self {
            bin,
            wave,
            order,
            element,
            info,
            note,
        })
    }

    /// Binary header record.
    pub fn bin_header(&self) -> &Record {
        &self.bin
    }

    /// Wave header record.
    pub fn wave_header(&self) -> &Record {
        &self.wave
    }

    /// Note text with line breaks normalized to LF.
    pub fn note(&self) -> &str {
        &self.note
    }

    /// One value per element; complex elements yield their real part.
    /// `raw` is brought to host order in place first.
    fn decode_values(&self, raw: &mut [u8]) -> Vec<f64> {
        let scalar = self.element.scalar;
        if self.order.needs_swap(Endianness::native()) {
            swap_array(raw, scalar.size());
        }
        raw.chunks_exact(self.element.size())
            .map(|c| scalar.read::<NativeEndian>(c))
            .collect()
    }
}

/// Physical unit of the x axis, if it names one.
fn dim_unit(wave: &Record) -> IoResult<Option<ResolutionUnit>> {
    let units = wave.bytes("dimUnits")?;
    let x = &units[..4];
    let end = x.iter().position(|&b| b == 0).unwrap_or(x.len());
    Ok(std::str::from_utf8(&x[..end])
        .ok()
        .and_then(ResolutionUnit::from_symbol))
}

/// Rescales values to `0..=255` using their own range.
fn normalize_to_u8(values: &[f64], out: &mut [u8]) {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mut range = (max - min) / 256.0;
    if !range.is_finite() || range == 0.0 {
        range = 256.0;
    }
    for (o, &v) in out.iter_mut().zip(values) {
        let scaled = ((v - min) / range) as i64;
        *o = scaled.clamp(0, 255) as u8;
    }
}

impl FormatSession for IbwSession {
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
        let page = page.min(self.info.number_pages - 1);
        bitmap.ensure(&self.info, &ctx.limits())?;

        let points = self.info.width * self.info.height;
        let page_bytes = points * self.element.size() as u64;
        let mut raw = stream.read_vec_at(IBW_DATA_OFFSET + page * page_bytes, page_bytes)?;
        ctx.check_abort("IBW read")?;

        let values = self.decode_values(&mut raw);
        normalize_to_u8(&values, bitmap.plane_mut(0)?);
        ctx.report(self.info.height, self.info.height);
        Ok(())
    }

    fn append_metadata(&mut self, _stream: &mut Stream, tags: &mut TagStore) -> IoResult<()> {
        if let Some(date_time) = note_date_time(&self.note) {
            tags.append_tag(keys::DATE_TIME, date_time);
        }
        tags.parse_ini(&self.note, ":", keys::CUSTOM_PREFIX);
        Ok(())
    }

    fn raw_endian(&self) -> Option<Endianness> {
        Some(self.order)
    }
}

fn note_value<'a>(note: &'a str, key: &str) -> Option<&'a str> {
    note.lines()
        .find_map(|l| l.find(key).map(|i| l[i + key.len()..].trim()))
}

/// `Date: Tue, Sep 20, 2005` and `Time: 10:58:49 AM` note lines.
fn note_date_time(note: &str) -> Option<String> {
    let date = note_value(note, "Date: ")?;
    let parts: Vec<&str> = date
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    let month = month_from_name(parts.get(1)?)?;
    let day: u32 = parts.get(2)?.parse().ok()?;
    let year: i32 = parts.get(3)?.parse().ok()?;

    let time = note_value(note, "Time: ")
        .and_then(|t| {
            let mut it = t.split_whitespace();
            ClockTime::parse(it.next()?, it.next())
        })
        .unwrap_or_default();
    Some(format_date_time(year, month, day, time))
}
