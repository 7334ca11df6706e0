//! Owned planar pixel storage.
//!
//! An [`ImageBitmap`] holds one zero-initialized buffer per sample, each
//! `line_size_in_bytes * height` bytes. Format plugins fill the planes
//! during a page read; the caller owns the bitmap and keeps it across pages.
//!
//! # Allocation
//!
//! Every allocation is checked for arithmetic overflow and against an
//! [`AllocLimits`] budget before memory is requested, and the request itself
//! goes through `try_reserve_exact`, so an oversized geometry from a corrupt
//! header surfaces as [`Error::AllocationFailed`] instead of aborting.
//!
//! # Example
//!
//! ```rust
//! use bim_core::{AllocLimits, ImageBitmap, ImageInfo, PixelType};
//!
//! let info = ImageInfo::new(5, 2, 3, 16, PixelType::Unsigned);
//! let mut bmp = ImageBitmap::allocate(&info, &AllocLimits::default())?;
//! assert_eq!(bmp.line_size_in_bytes(), 10);
//! bmp.scan_line_mut(2, 1)?[0] = 0xFF;
//! assert_eq!(bmp.plane(2)?[10], 0xFF);
//! # Ok::<(), bim_core::Error>(())
//! ```

use crate::error::{Error, Result};
use crate::info::ImageInfo;

/// Default allocation budget: 4 GiB across all planes.
pub const DEFAULT_MAX_ALLOC_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Upper bound applied to every bitmap allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocLimits {
    /// Maximum total bytes across all planes.
    pub max_bytes: u64,
}

impl Default for AllocLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_ALLOC_BYTES,
        }
    }
}

impl AllocLimits {
    /// Budget of `max_bytes` bytes.
    #[inline]
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// No budget beyond address-space limits.
    #[inline]
    pub fn unlimited() -> Self {
        Self { max_bytes: u64::MAX }
    }
}

/// Planar pixel buffers bound to one [`ImageInfo`].
#[derive(Debug, Clone, Default)]
pub struct ImageBitmap {
    info: ImageInfo,
    line_size: usize,
    planes: Vec<Vec<u8>>,
}

impl ImageBitmap {
    /// Allocates zero-filled planes for `info`.
    pub fn allocate(info: &ImageInfo, limits: &AllocLimits) -> Result<Self> {
        let mut bmp = Self::default();
        bmp.reallocate(info, limits)?;
        Ok(bmp)
    }

    /// Releases the current planes and allocates fresh ones for `info`.
    ///
    /// The previous buffers are dropped before the new request, so the peak
    /// footprint never holds both geometries. On failure the bitmap is left
    /// empty.
    pub fn reallocate(&mut self, info: &ImageInfo, limits: &AllocLimits) -> Result<()> {
        self.planes = Vec::new();
        self.line_size = 0;
        self.info = ImageInfo::default();

        info.validate()?;
        let (line_size, plane_size) = plane_geometry(info, limits)?;

        let mut planes = Vec::new();
        planes
            .try_reserve_exact(info.samples as usize)
            .map_err(|e| Error::allocation_failed(info.samples as u64, e.to_string()))?;
        for _ in 0..info.samples {
            let mut plane = Vec::new();
            plane
                .try_reserve_exact(plane_size)
                .map_err(|e| Error::allocation_failed(plane_size as u64, e.to_string()))?;
            plane.resize(plane_size, 0);
            planes.push(plane);
        }

        self.info = info.clone();
        self.line_size = line_size;
        self.planes = planes;
        Ok(())
    }

    /// Makes the bitmap match `info`, reallocating only if the geometry
    /// (width, height, samples, depth) changed.
    ///
    /// Returns `true` when a reallocation happened. Descriptive fields
    /// (mode, resolution, palette) are always refreshed.
    pub fn ensure(&mut self, info: &ImageInfo, limits: &AllocLimits) -> Result<bool> {
        if !self.planes.is_empty() && self.info.same_geometry(info) {
            self.info = info.clone();
            return Ok(false);
        }
        self.reallocate(info, limits)?;
        Ok(true)
    }

    /// Descriptor the planes were allocated for.
    #[inline]
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Returns `true` if no planes are allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Number of planes.
    #[inline]
    pub fn samples(&self) -> u32 {
        self.planes.len() as u32
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u64 {
        self.info.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u64 {
        self.info.height
    }

    /// Bytes per row of one plane.
    #[inline]
    pub fn line_size_in_bytes(&self) -> usize {
        self.line_size
    }

    /// Whole plane `sample`.
    pub fn plane(&self, sample: u32) -> Result<&[u8]> {
        self.planes
            .get(sample as usize)
            .map(Vec::as_slice)
            .ok_or_else(|| self.out_of_bounds(sample, 0))
    }

    /// Whole plane `sample`, mutable.
    pub fn plane_mut(&mut self, sample: u32) -> Result<&mut [u8]> {
        let err = self.out_of_bounds(sample, 0);
        self.planes
            .get_mut(sample as usize)
            .map(Vec::as_mut_slice)
            .ok_or(err)
    }

    /// Byte offset of row `y` inside any plane.
    #[inline]
    pub fn scan_line_offset(&self, y: u64) -> usize {
        y as usize * self.line_size
    }

    /// Row `y` of plane `sample`, exactly `line_size_in_bytes` long.
    pub fn scan_line(&self, sample: u32, y: u64) -> Result<&[u8]> {
        if y >= self.info.height {
            return Err(self.out_of_bounds(sample, y));
        }
        let start = self.scan_line_offset(y);
        let line = self.line_size;
        Ok(&self.plane(sample)?[start..start + line])
    }

    /// Row `y` of plane `sample`, mutable.
    pub fn scan_line_mut(&mut self, sample: u32, y: u64) -> Result<&mut [u8]> {
        if y >= self.info.height {
            return Err(self.out_of_bounds(sample, y));
        }
        let start = self.scan_line_offset(y);
        let line = self.line_size;
        Ok(&mut self.plane_mut(sample)?[start..start + line])
    }

    /// Swaps rows `a` and `b` of plane `sample`.
    pub fn swap_lines(&mut self, sample: u32, a: u64, b: u64) -> Result<()> {
        let height = self.info.height;
        if a >= height || b >= height {
            return Err(self.out_of_bounds(sample, a.max(b)));
        }
        if a == b {
            return Ok(());
        }
        let line = self.line_size;
        let (lo, hi) = (a.min(b) as usize * line, a.max(b) as usize * line);
        let plane = self.plane_mut(sample)?;
        let (head, tail) = plane.split_at_mut(hi);
        head[lo..lo + line].swap_with_slice(&mut tail[..line]);
        Ok(())
    }

    fn out_of_bounds(&self, sample: u32, row: u64) -> Error {
        Error::OutOfBounds {
            sample,
            row,
            samples: self.planes.len() as u32,
            height: self.info.height,
        }
    }
}

/// Computes `(line_size, plane_size)` for `info`, enforcing `limits`.
fn plane_geometry(info: &ImageInfo, limits: &AllocLimits) -> Result<(usize, usize)> {
    let overflow = || {
        Error::allocation_failed(
            u64::MAX,
            format!(
                "{}x{}x{} at {} bits overflows",
                info.width, info.height, info.samples, info.depth
            ),
        )
    };

    let line = info.line_size_in_bytes().ok_or_else(overflow)?;
    let plane = info.plane_size_in_bytes().ok_or_else(overflow)?;
    let total = info.image_size_in_bytes().ok_or_else(overflow)?;

    if total > limits.max_bytes {
        return Err(Error::allocation_failed(
            total,
            format!("exceeds configured maximum of {} bytes", limits.max_bytes),
        ));
    }

    let line = usize::try_from(line).map_err(|_| overflow())?;
    let plane = usize::try_from(plane).map_err(|_| overflow())?;
    Ok((line, plane))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::PixelType;

    #[test]
    fn test_allocate_zero_filled() {
        let info = ImageInfo::new(3, 2, 2, 8, PixelType::Unsigned);
        let bmp = ImageBitmap::allocate(&info, &AllocLimits::default()).unwrap();
        assert_eq!(bmp.samples(), 2);
        assert_eq!(bmp.line_size_in_bytes(), 3);
        assert_eq!(bmp.plane(0).unwrap(), &[0u8; 6]);
        assert_eq!(bmp.plane(1).unwrap().len(), 6);
    }

    #[test]
    fn test_limit_refused() {
        let info = ImageInfo::new(1024, 1024, 1, 8, PixelType::Unsigned);
        let err = ImageBitmap::allocate(&info, &AllocLimits::new(1000)).unwrap_err();
        assert!(err.is_allocation_error());
    }

    #[test]
    fn test_overflow_refused() {
        let info = ImageInfo::new(u64::MAX, u64::MAX, 1, 64, PixelType::Unsigned);
        let err = ImageBitmap::allocate(&info, &AllocLimits::unlimited()).unwrap_err();
        assert!(err.is_allocation_error());
    }

    #[test]
    fn test_invalid_info_refused() {
        let info = ImageInfo::new(4, 4, 1, 3, PixelType::Unsigned);
        assert!(matches!(
            ImageBitmap::allocate(&info, &AllocLimits::default()),
            Err(Error::InvalidDepth { depth: 3 })
        ));
    }

    #[test]
    fn test_ensure_reuses_same_geometry() {
        let limits = AllocLimits::default();
        let info = ImageInfo::new(4, 4, 1, 16, PixelType::Unsigned);
        let mut bmp = ImageBitmap::default();
        assert!(bmp.ensure(&info, &limits).unwrap());
        bmp.plane_mut(0).unwrap()[0] = 7;

        assert!(!bmp.ensure(&info, &limits).unwrap());
        assert_eq!(bmp.plane(0).unwrap()[0], 7);

        let bigger = ImageInfo::new(8, 4, 1, 16, PixelType::Unsigned);
        assert!(bmp.ensure(&bigger, &limits).unwrap());
        assert_eq!(bmp.plane(0).unwrap().len(), 64);
        assert_eq!(bmp.plane(0).unwrap()[0], 0);
    }

    #[test]
    fn test_failed_reallocate_leaves_empty() {
        let info = ImageInfo::new(4, 4, 1, 8, PixelType::Unsigned);
        let mut bmp = ImageBitmap::allocate(&info, &AllocLimits::default()).unwrap();
        let huge = ImageInfo::new(1 << 20, 1 << 20, 1, 8, PixelType::Unsigned);
        assert!(bmp.reallocate(&huge, &AllocLimits::new(1 << 20)).is_err());
        assert!(bmp.is_empty());
    }

    #[test]
    fn test_scan_line_bounds() {
        let info = ImageInfo::new(9, 3, 1, 1, PixelType::Unsigned);
        let mut bmp = ImageBitmap::allocate(&info, &AllocLimits::default()).unwrap();
        assert_eq!(bmp.scan_line(0, 2).unwrap().len(), 2);
        assert!(bmp.scan_line(0, 3).is_err());
        assert!(bmp.scan_line(1, 0).is_err());
        assert!(bmp.scan_line_mut(0, 3).is_err());
    }

    #[test]
    fn test_swap_lines() {
        let info = ImageInfo::new(2, 3, 1, 8, PixelType::Unsigned);
        let mut bmp = ImageBitmap::allocate(&info, &AllocLimits::default()).unwrap();
        bmp.plane_mut(0).unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        bmp.swap_lines(0, 2, 0).unwrap();
        assert_eq!(bmp.plane(0).unwrap(), &[5, 6, 3, 4, 1, 2]);
        assert!(bmp.swap_lines(0, 0, 3).is_err());
    }
}
