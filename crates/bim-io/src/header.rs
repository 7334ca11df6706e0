//! Fixed-layout binary header decoding.
//!
//! A binary format declares its header as a [`RecordLayout`]: an ordered
//! list of typed fields, some repeated as fixed-size arrays. [`Record`]
//! reads exactly `layout.size()` bytes and exposes each field through a
//! typed accessor that applies a byte swap if and only if the file
//! endianness differs from the host endianness. Formats never reinterpret
//! byte buffers as structs and never hand-roll swaps.
//!
//! # Example
//!
//! ```rust
//! use bim_io::header::{FieldKind, FieldSpec, Record, RecordLayout};
//! use bim_io::Endianness;
//!
//! static LAYOUT: RecordLayout = RecordLayout::new("demo", &[
//!     FieldSpec::scalar("version", FieldKind::I16),
//!     FieldSpec::array("dims", FieldKind::I32, 2),
//! ]);
//!
//! let bytes = [5u8, 0, 4, 0, 0, 0, 3, 0, 0, 0];
//! let rec = Record::from_bytes(&LAYOUT, &bytes, Endianness::Little)?;
//! assert_eq!(rec.i16("version")?, 5);
//! assert_eq!(rec.i32_at("dims", 1)?, 3);
//! # Ok::<(), bim_io::IoError>(())
//! ```

use crate::error::{IoError, IoResult};
use crate::swap::{swap_f32, swap_f64, swap16, swap32, Endianness};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::Read;

/// Element type of a header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed byte.
    I8,
    /// Unsigned byte.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Opaque bytes (names, padding); never swapped.
    Bytes,
}

impl FieldKind {
    /// Size of one element in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Bytes => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// One named field: `count` consecutive elements of `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name used by accessors.
    pub name: &'static str,
    /// Element type.
    pub kind: FieldKind,
    /// Number of elements (1 for scalars, byte length for `Bytes`).
    pub count: usize,
}

impl FieldSpec {
    /// A single element.
    pub const fn scalar(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            count: 1,
        }
    }

    /// A fixed-size array.
    pub const fn array(name: &'static str, kind: FieldKind, count: usize) -> Self {
        Self { name, kind, count }
    }

    /// A run of opaque bytes.
    pub const fn bytes(name: &'static str, len: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Bytes,
            count: len,
        }
    }

    /// Size of the whole field in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.kind.size() * self.count
    }
}

/// Ordered field list describing a packed record.
#[derive(Debug)]
pub struct RecordLayout {
    name: &'static str,
    fields: &'static [FieldSpec],
}

impl RecordLayout {
    /// Declares a layout.
    pub const fn new(name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self { name, fields }
    }

    /// Layout name, for error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    /// Total packed size in bytes.
    pub const fn size(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].size();
            i += 1;
        }
        total
    }

    /// Byte offset and descriptor of field `name`.
    pub fn locate(&self, name: &str) -> Option<(usize, &'static FieldSpec)> {
        let mut offset = 0;
        for f in self.fields {
            if f.name == name {
                return Some((offset, f));
            }
            offset += f.size();
        }
        None
    }
}

/// A header field type readable through [`Record`].
pub trait Scalar: Copy {
    /// Field kind this type decodes.
    const KIND: FieldKind;

    /// Interprets `bytes` (exactly `KIND.size()` long) in `order`.
    fn read_in(bytes: &[u8], order: Endianness) -> Self;

    /// Reverses the byte order of the value.
    fn swapped(self) -> Self;
}

macro_rules! impl_scalar {
    ($ty:ty, $kind:ident, $read:ident, $swap:expr) => {
        impl Scalar for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            #[inline]
            fn read_in(bytes: &[u8], order: Endianness) -> Self {
                match order {
                    Endianness::Little => LittleEndian::$read(bytes),
                    Endianness::Big => BigEndian::$read(bytes),
                }
            }

            #[inline]
            fn swapped(self) -> Self {
                $swap(self)
            }
        }
    };
}

impl_scalar!(i16, I16, read_i16, |v: i16| swap16(v as u16) as i16);
impl_scalar!(u16, U16, read_u16, swap16);
impl_scalar!(i32, I32, read_i32, |v: i32| swap32(v as u32) as i32);
impl_scalar!(u32, U32, read_u32, swap32);
impl_scalar!(f32, F32, read_f32, swap_f32);
impl_scalar!(f64, F64, read_f64, swap_f64);

impl Scalar for u8 {
    const KIND: FieldKind = FieldKind::U8;

    #[inline]
    fn read_in(bytes: &[u8], _order: Endianness) -> Self {
        bytes[0]
    }

    #[inline]
    fn swapped(self) -> Self {
        self
    }
}

impl Scalar for i8 {
    const KIND: FieldKind = FieldKind::I8;

    #[inline]
    fn read_in(bytes: &[u8], _order: Endianness) -> Self {
        bytes[0] as i8
    }

    #[inline]
    fn swapped(self) -> Self {
        self
    }
}

/// Compares a magic field against its big- and little-endian variants.
///
/// Returns [`IoError::UnrecognizedHeader`] if neither matches.
pub fn detect_endianness(bytes: &[u8], big: &[u8], little: &[u8]) -> IoResult<Endianness> {
    if bytes.starts_with(big) {
        Ok(Endianness::Big)
    } else if bytes.starts_with(little) {
        Ok(Endianness::Little)
    } else {
        Err(IoError::header(format!(
            "magic {:02X?} matches neither byte order",
            &bytes[..bytes.len().min(big.len().max(little.len()))]
        )))
    }
}

/// A decoded record: raw bytes plus the swap decision.
#[derive(Debug, Clone)]
pub struct Record {
    layout: &'static RecordLayout,
    bytes: Vec<u8>,
    host: Endianness,
    swap: bool,
}

impl Record {
    /// Reads exactly `layout.size()` bytes from `reader`.
    pub fn decode<R: Read>(
        layout: &'static RecordLayout,
        reader: &mut R,
        file_order: Endianness,
    ) -> IoResult<Self> {
        Self::decode_with_host(layout, reader, file_order, Endianness::native())
    }

    /// Like [`Record::decode`], with the host byte order given explicitly.
    ///
    /// Accessors read fields in `host` order and swap them when
    /// `file_order != host`, so the result is independent of the machine.
    pub fn decode_with_host<R: Read>(
        layout: &'static RecordLayout,
        reader: &mut R,
        file_order: Endianness,
        host: Endianness,
    ) -> IoResult<Self> {
        let mut bytes = vec![0u8; layout.size()];
        reader.read_exact(&mut bytes).map_err(|e| {
            IoError::header(format!(
                "truncated {} ({} bytes): {e}",
                layout.name(),
                layout.size()
            ))
        })?;
        Ok(Self {
            layout,
            bytes,
            host,
            swap: file_order.needs_swap(host),
        })
    }

    /// Decodes from an in-memory slice, which must hold at least
    /// `layout.size()` bytes.
    pub fn from_bytes(
        layout: &'static RecordLayout,
        bytes: &[u8],
        file_order: Endianness,
    ) -> IoResult<Self> {
        let mut slice = bytes;
        Self::decode(layout, &mut slice, file_order)
    }

    /// Layout this record was decoded with.
    pub fn layout(&self) -> &'static RecordLayout {
        self.layout
    }

    /// Returns `true` if accessors swap multi-byte fields.
    pub fn is_swapped(&self) -> bool {
        self.swap
    }

    /// Raw record bytes, in file order.
    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    /// Element `index` of field `name`.
    pub fn get<T: Scalar>(&self, name: &str, index: usize) -> IoResult<T> {
        let (offset, spec) = self.field(name)?;
        if spec.kind != T::KIND {
            return Err(IoError::header(format!(
                "{}.{name} is {:?}, read as {:?}",
                self.layout.name(),
                spec.kind,
                T::KIND
            )));
        }
        if index >= spec.count {
            return Err(IoError::header(format!(
                "{}.{name}[{index}] out of range (len {})",
                self.layout.name(),
                spec.count
            )));
        }
        let size = spec.kind.size();
        let start = offset + index * size;
        let value = T::read_in(&self.bytes[start..start + size], self.host);
        Ok(if self.swap { value.swapped() } else { value })
    }

    /// All elements of array field `name`.
    pub fn get_array<T: Scalar>(&self, name: &str) -> IoResult<Vec<T>> {
        let (_, spec) = self.field(name)?;
        (0..spec.count).map(|i| self.get(name, i)).collect()
    }

    /// Raw bytes of field `name` (any kind), unswapped.
    pub fn bytes(&self, name: &str) -> IoResult<&[u8]> {
        let (offset, spec) = self.field(name)?;
        Ok(&self.bytes[offset..offset + spec.size()])
    }

    /// A `Bytes` field read as a NUL-terminated string.
    pub fn c_string(&self, name: &str) -> IoResult<String> {
        let raw = self.bytes(name)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Scalar `i16` field.
    pub fn i16(&self, name: &str) -> IoResult<i16> {
        self.get(name, 0)
    }

    /// Scalar `u16` field.
    pub fn u16(&self, name: &str) -> IoResult<u16> {
        self.get(name, 0)
    }

    /// Scalar `i32` field.
    pub fn i32(&self, name: &str) -> IoResult<i32> {
        self.get(name, 0)
    }

    /// Scalar `u32` field.
    pub fn u32(&self, name: &str) -> IoResult<u32> {
        self.get(name, 0)
    }

    /// Scalar `f32` field.
    pub fn f32(&self, name: &str) -> IoResult<f32> {
        self.get(name, 0)
    }

    /// Scalar `f64` field.
    pub fn f64(&self, name: &str) -> IoResult<f64> {
        self.get(name, 0)
    }

    /// Element of an `i32` array field.
    pub fn i32_at(&self, name: &str, index: usize) -> IoResult<i32> {
        self.get(name, index)
    }

    /// Element of an `f64` array field.
    pub fn f64_at(&self, name: &str, index: usize) -> IoResult<f64> {
        self.get(name, index)
    }

    fn field(&self, name: &str) -> IoResult<(usize, &'static FieldSpec)> {
        self.layout
            .locate(name)
            .ok_or_else(|| IoError::header(format!("{} has no field `{name}`", self.layout.name())))
    }
}
