//! Image geometry and sample type descriptor.
//!
//! [`ImageInfo`] is the value type every format plugin fills on open and the
//! caller inspects before reading pages. It says nothing about how the
//! pixels are stored on disk; it describes the canonical planar buffer a
//! page decodes into.
//!
//! # Types
//!
//! - [`PixelType`] - unsigned / signed / float sample interpretation
//! - [`ImageMode`] - interpretive hint (grayscale, RGB, CMYK, ...)
//! - [`ResolutionUnit`] - physical unit of `x_res` / `y_res`
//! - [`Lut`] - palette of up to 256 RGBA entries
//!
//! # Example
//!
//! ```rust
//! use bim_core::{ImageInfo, PixelType};
//!
//! let info = ImageInfo::new(640, 480, 3, 16, PixelType::Unsigned);
//! assert!(info.validate().is_ok());
//! assert_eq!(info.line_size_in_bytes(), Some(1280));
//! ```

use crate::error::{Error, Result};

/// Bit depths a canonical plane can carry.
pub const SUPPORTED_DEPTHS: [u32; 7] = [1, 2, 4, 8, 16, 32, 64];

/// Maximum number of palette entries.
pub const MAX_LUT_ENTRIES: usize = 256;

/// Returns `ceil(width * depth / 8)`, or `None` on overflow.
///
/// # Example
///
/// ```rust
/// use bim_core::line_size_in_bytes;
///
/// assert_eq!(line_size_in_bytes(7, 1), Some(1));
/// assert_eq!(line_size_in_bytes(9, 1), Some(2));
/// assert_eq!(line_size_in_bytes(3, 16), Some(6));
/// ```
#[inline]
pub fn line_size_in_bytes(width: u64, depth: u32) -> Option<u64> {
    let bits = width.checked_mul(depth as u64)?;
    Some(bits.div_ceil(8))
}

/// How the bits of one sample are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelType {
    /// Not yet known (default-constructed descriptor).
    #[default]
    Undefined,
    /// Unsigned integer.
    Unsigned,
    /// Two's complement signed integer.
    Signed,
    /// IEEE 754 float (32 or 64 bit).
    Float,
}

impl PixelType {
    /// Human readable name, as written into the `image_pixel_format` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Unsigned => "unsigned integer",
            Self::Signed => "signed integer",
            Self::Float => "floating point",
        }
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Interpretive hint for the samples of an image.
///
/// Independent of the sample count: a 3-sample image may be RGB, YUV, LAB
/// or simply three unrelated channels ([`ImageMode::Multi`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageMode {
    /// 1-bit black and white.
    Bitmap,
    /// Single intensity channel.
    #[default]
    Grayscale,
    /// Palette indices, see [`Lut`].
    Indexed,
    /// Red, green, blue.
    Rgb,
    /// Blue, green, red.
    Bgr,
    /// Hue, saturation, lightness.
    Hsl,
    /// Hue, saturation, value.
    Hsv,
    /// Red, green, blue, alpha.
    Rgba,
    /// Alpha, blue, green, red.
    Abgr,
    /// Cyan, magenta, yellow, black.
    Cmyk,
    /// Luma plus two chroma channels.
    Yuv,
    /// CIE XYZ.
    Xyz,
    /// CIE L*a*b*.
    Lab,
    /// Arbitrary channels with no color meaning.
    Multi,
}

impl ImageMode {
    /// Lowercase name, as written into the `image_mode` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bitmap => "monochrome",
            Self::Grayscale => "grayscale",
            Self::Indexed => "indexed",
            Self::Rgb => "rgb",
            Self::Bgr => "bgr",
            Self::Hsl => "hsl",
            Self::Hsv => "hsv",
            Self::Rgba => "rgba",
            Self::Abgr => "abgr",
            Self::Cmyk => "cmyk",
            Self::Yuv => "yuv",
            Self::Xyz => "xyz",
            Self::Lab => "lab",
            Self::Multi => "multichannel",
        }
    }
}

impl std::fmt::Display for ImageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical unit of [`ImageInfo::x_res`] and [`ImageInfo::y_res`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolutionUnit {
    /// No physical size known.
    #[default]
    None,
    /// Meters.
    Meters,
    /// Inches.
    Inches,
    /// Centimeters.
    Centimeters,
    /// Millimeters.
    Millimeters,
    /// Micrometers.
    Microns,
    /// Nanometers.
    Nanometers,
}

impl ResolutionUnit {
    /// Factor converting a value in this unit to micrometers.
    ///
    /// Returns `None` for [`ResolutionUnit::None`].
    pub fn to_microns(&self) -> Option<f64> {
        match self {
            Self::None => None,
            Self::Meters => Some(1.0e6),
            Self::Inches => Some(25_400.0),
            Self::Centimeters => Some(1.0e4),
            Self::Millimeters => Some(1.0e3),
            Self::Microns => Some(1.0),
            Self::Nanometers => Some(1.0e-3),
        }
    }

    /// Short unit symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Meters => "m",
            Self::Inches => "in",
            Self::Centimeters => "cm",
            Self::Millimeters => "mm",
            Self::Microns => "um",
            Self::Nanometers => "nm",
        }
    }

    /// Parses a unit symbol as written in text headers ("um", "µm", "nm", ...).
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "m" | "meter" | "meters" => Some(Self::Meters),
            "in" | "inch" | "inches" => Some(Self::Inches),
            "cm" => Some(Self::Centimeters),
            "mm" => Some(Self::Millimeters),
            "um" | "µm" | "micron" | "microns" | "~m" => Some(Self::Microns),
            "nm" => Some(Self::Nanometers),
            _ => None,
        }
    }
}

/// Palette of up to [`MAX_LUT_ENTRIES`] RGBA entries.
///
/// An empty palette (`count() == 0`) means the image is not paletted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lut {
    entries: Vec<[u8; 4]>,
}

impl Lut {
    /// Creates an empty palette.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a palette from entries, truncated to [`MAX_LUT_ENTRIES`].
    pub fn from_entries(mut entries: Vec<[u8; 4]>) -> Self {
        entries.truncate(MAX_LUT_ENTRIES);
        Self { entries }
    }

    /// Full 256-entry gray ramp.
    pub fn gray_ramp() -> Self {
        Self {
            entries: (0..=255u8).map(|v| [v, v, v, 255]).collect(),
        }
    }

    /// Number of valid entries.
    #[inline]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are present.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Palette entries.
    #[inline]
    pub fn entries(&self) -> &[[u8; 4]] {
        &self.entries
    }
}

/// Geometry and type descriptor for one image or page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    /// Width in pixels.
    pub width: u64,
    /// Height in pixels.
    pub height: u64,
    /// Samples (channels) per pixel.
    pub samples: u32,
    /// Bits per sample.
    pub depth: u32,
    /// Sample interpretation.
    pub pixel_type: PixelType,
    /// Interpretive hint.
    pub image_mode: ImageMode,
    /// Number of addressable pages.
    pub number_pages: u64,
    /// Number of z slices.
    pub number_z: u64,
    /// Number of time points.
    pub number_t: u64,
    /// Unit of `x_res` / `y_res`.
    pub res_units: ResolutionUnit,
    /// Physical pixel width.
    pub x_res: f64,
    /// Physical pixel height.
    pub y_res: f64,
    /// Palette; empty unless the image is indexed.
    pub lut: Lut,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            samples: 1,
            depth: 8,
            pixel_type: PixelType::Unsigned,
            image_mode: ImageMode::Grayscale,
            number_pages: 1,
            number_z: 1,
            number_t: 1,
            res_units: ResolutionUnit::None,
            x_res: 0.0,
            y_res: 0.0,
            lut: Lut::new(),
        }
    }
}

impl ImageInfo {
    /// Creates a single-page descriptor.
    ///
    /// The image mode is derived from the sample count: 1 is grayscale,
    /// 3 is RGB, 4 is RGBA, anything else is multichannel.
    pub fn new(width: u64, height: u64, samples: u32, depth: u32, pixel_type: PixelType) -> Self {
        let image_mode = match samples {
            1 => ImageMode::Grayscale,
            3 => ImageMode::Rgb,
            4 => ImageMode::Rgba,
            _ => ImageMode::Multi,
        };
        Self {
            width,
            height,
            samples,
            depth,
            pixel_type,
            image_mode,
            ..Self::default()
        }
    }

    /// Checks the descriptor invariants.
    ///
    /// - `depth` is one of [`SUPPORTED_DEPTHS`]
    /// - `samples >= 1`
    /// - a non-empty palette requires `samples == 1` and `depth <= 8`
    /// - a float pixel type requires a depth of 32 or 64
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_DEPTHS.contains(&self.depth) {
            return Err(Error::InvalidDepth { depth: self.depth });
        }
        if self.samples == 0 {
            return Err(Error::InvalidSamples {
                samples: self.samples,
            });
        }
        if !self.lut.is_empty() && (self.samples != 1 || self.depth > 8) {
            return Err(Error::InvalidLut {
                reason: format!(
                    "palette needs 1 sample of at most 8 bits, image has {} x {} bits",
                    self.samples, self.depth
                ),
            });
        }
        if self.pixel_type == PixelType::Float && self.depth != 32 && self.depth != 64 {
            return Err(Error::InvalidDepth { depth: self.depth });
        }
        Ok(())
    }

    /// Checks the invariants plus non-zero extents, as required of an
    /// opened image.
    pub fn validate_opened(&self) -> Result<()> {
        self.validate()?;
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_dimensions(
                self.width,
                self.height,
                "opened image must have non-zero extents",
            ));
        }
        Ok(())
    }

    /// Bytes in one row of one plane, `ceil(width * depth / 8)`.
    #[inline]
    pub fn line_size_in_bytes(&self) -> Option<u64> {
        line_size_in_bytes(self.width, self.depth)
    }

    /// Bytes in one plane.
    #[inline]
    pub fn plane_size_in_bytes(&self) -> Option<u64> {
        self.line_size_in_bytes()?.checked_mul(self.height)
    }

    /// Bytes across all planes.
    #[inline]
    pub fn image_size_in_bytes(&self) -> Option<u64> {
        self.plane_size_in_bytes()?.checked_mul(self.samples as u64)
    }

    /// Returns `true` when two descriptors need the same buffer shape.
    #[inline]
    pub fn same_geometry(&self, other: &ImageInfo) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.samples == other.samples
            && self.depth == other.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_size_rounds_up() {
        assert_eq!(line_size_in_bytes(0, 8), Some(0));
        assert_eq!(line_size_in_bytes(1, 1), Some(1));
        assert_eq!(line_size_in_bytes(8, 1), Some(1));
        assert_eq!(line_size_in_bytes(5, 2), Some(2));
        assert_eq!(line_size_in_bytes(3, 4), Some(2));
        assert_eq!(line_size_in_bytes(10, 64), Some(80));
        assert_eq!(line_size_in_bytes(u64::MAX, 64), None);
    }

    #[test]
    fn test_new_derives_mode() {
        assert_eq!(ImageInfo::new(1, 1, 1, 8, PixelType::Unsigned).image_mode, ImageMode::Grayscale);
        assert_eq!(ImageInfo::new(1, 1, 3, 8, PixelType::Unsigned).image_mode, ImageMode::Rgb);
        assert_eq!(ImageInfo::new(1, 1, 4, 8, PixelType::Unsigned).image_mode, ImageMode::Rgba);
        assert_eq!(ImageInfo::new(1, 1, 5, 8, PixelType::Unsigned).image_mode, ImageMode::Multi);
    }

    #[test]
    fn test_validate_depth_and_samples() {
        let mut info = ImageInfo::new(4, 4, 1, 12, PixelType::Unsigned);
        assert!(matches!(info.validate(), Err(Error::InvalidDepth { depth: 12 })));

        info.depth = 16;
        info.samples = 0;
        assert!(matches!(info.validate(), Err(Error::InvalidSamples { .. })));
    }

    #[test]
    fn test_validate_lut() {
        let mut info = ImageInfo::new(4, 4, 1, 8, PixelType::Unsigned);
        info.lut = Lut::gray_ramp();
        assert!(info.validate().is_ok());

        info.depth = 16;
        assert!(matches!(info.validate(), Err(Error::InvalidLut { .. })));

        info.depth = 8;
        info.samples = 3;
        assert!(matches!(info.validate(), Err(Error::InvalidLut { .. })));
    }

    #[test]
    fn test_validate_float_depth() {
        let info = ImageInfo::new(4, 4, 1, 16, PixelType::Float);
        assert!(info.validate().is_err());
        let info = ImageInfo::new(4, 4, 1, 32, PixelType::Float);
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_validate_opened_rejects_empty() {
        let info = ImageInfo::new(0, 4, 1, 8, PixelType::Unsigned);
        assert!(info.validate().is_ok());
        assert!(info.validate_opened().is_err());
    }

    #[test]
    fn test_resolution_unit() {
        assert_eq!(ResolutionUnit::from_symbol("nm"), Some(ResolutionUnit::Nanometers));
        assert_eq!(ResolutionUnit::from_symbol("\"um\""), Some(ResolutionUnit::Microns));
        assert_eq!(ResolutionUnit::Millimeters.to_microns(), Some(1000.0));
        assert_eq!(ResolutionUnit::None.to_microns(), None);
    }

    #[test]
    fn test_lut_truncates() {
        let lut = Lut::from_entries(vec![[0, 0, 0, 0]; 300]);
        assert_eq!(lut.count(), MAX_LUT_ENTRIES);
        assert_eq!(Lut::gray_ramp().entries()[17], [17, 17, 17, 255]);
    }
}
