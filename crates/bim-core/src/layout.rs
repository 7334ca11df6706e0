//! Planar / interleaved sample layout conversion.
//!
//! Formats that store pixels interleaved (`RGBRGB...`) are split into the
//! canonical one-plane-per-sample layout with [`planarize`]; writers that need
//! interleaved output use [`interleave`]. Both move data only, never
//! altering precision, and process rows in parallel with Rayon: every output
//! row depends on a fixed, read-only input region, so rows need no
//! synchronization.
//!
//! The `_bytes` variants do the same with a runtime element width, for
//! callers holding raw `u8` planes (e.g. an [`ImageBitmap`](crate::ImageBitmap)).
//!
//! # Example
//!
//! ```rust
//! use bim_core::layout::{interleave, planarize};
//!
//! let rgb = [1u16, 2, 3, 4, 5, 6];
//! let mut green = [0u16; 2];
//! planarize(&rgb, 2, 1, 3, 1, 0, &mut green)?;
//! assert_eq!(green, [2, 5]);
//!
//! let mut out = [0u16; 6];
//! interleave(&green, 2, 1, 3, 1, 0, &mut out)?;
//! assert_eq!(out, [0, 2, 0, 0, 5, 0]);
//! # Ok::<(), bim_core::Error>(())
//! ```

use crate::error::{Error, Result};
use rayon::prelude::*;

/// Copies sample `sample_index` of an interleaved buffer into `plane`.
///
/// Element `interleaved[row * stride + col * samples + sample_index]` goes to
/// `plane[row * width + col]`. A `stride` of 0 means `samples * width`.
/// `width == 0` or `height == 0` is a no-op.
pub fn planarize<T: Copy + Send + Sync>(
    interleaved: &[T],
    width: usize,
    height: usize,
    samples: usize,
    sample_index: usize,
    stride: usize,
    plane: &mut [T],
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    let geo = Geometry::new(width, height, samples, sample_index, stride)?;
    geo.check(interleaved.len(), plane.len())?;

    plane[..geo.plane_len]
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, dst)| {
            let src = &interleaved[row * geo.stride..];
            for (col, out) in dst.iter_mut().enumerate() {
                *out = src[col * samples + sample_index];
            }
        });
    Ok(())
}

/// Writes `plane` into every `samples`-th element of `interleaved`,
/// starting at `sample_index`. Inverse of [`planarize`].
///
/// Elements belonging to other samples are left untouched.
pub fn interleave<T: Copy + Send + Sync>(
    plane: &[T],
    width: usize,
    height: usize,
    samples: usize,
    sample_index: usize,
    stride: usize,
    interleaved: &mut [T],
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    let geo = Geometry::new(width, height, samples, sample_index, stride)?;
    geo.check(interleaved.len(), plane.len())?;

    interleaved
        .par_chunks_mut(geo.stride)
        .take(height)
        .enumerate()
        .for_each(|(row, dst)| {
            let src = &plane[row * width..(row + 1) * width];
            for (col, &value) in src.iter().enumerate() {
                dst[col * samples + sample_index] = value;
            }
        });
    Ok(())
}

/// [`planarize`] over raw bytes with an element width of `elem_size` bytes.
///
/// `width`, `stride` and the buffer lengths are in elements / bytes as for
/// the typed version multiplied by `elem_size`.
pub fn planarize_bytes(
    interleaved: &[u8],
    elem_size: usize,
    width: usize,
    height: usize,
    samples: usize,
    sample_index: usize,
    stride: usize,
    plane: &mut [u8],
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    check_elem_size(elem_size)?;
    let geo = Geometry::new(width, height, samples, sample_index, stride)?;
    geo.check(interleaved.len() / elem_size, plane.len() / elem_size)?;

    let row_bytes = width * elem_size;
    plane[..geo.plane_len * elem_size]
        .par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(row, dst)| {
            let src = &interleaved[row * geo.stride * elem_size..];
            for (col, out) in dst.chunks_exact_mut(elem_size).enumerate() {
                let at = (col * samples + sample_index) * elem_size;
                out.copy_from_slice(&src[at..at + elem_size]);
            }
        });
    Ok(())
}

/// [`interleave`] over raw bytes with an element width of `elem_size` bytes.
pub fn interleave_bytes(
    plane: &[u8],
    elem_size: usize,
    width: usize,
    height: usize,
    samples: usize,
    sample_index: usize,
    stride: usize,
    interleaved: &mut [u8],
) -> Result<()> {
    if width == 0 || height == 0 {
        return Ok(());
    }
    check_elem_size(elem_size)?;
    let geo = Geometry::new(width, height, samples, sample_index, stride)?;
    geo.check(interleaved.len() / elem_size, plane.len() / elem_size)?;

    let row_bytes = width * elem_size;
    interleaved
        .par_chunks_mut(geo.stride * elem_size)
        .take(height)
        .enumerate()
        .for_each(|(row, dst)| {
            let src = &plane[row * row_bytes..(row + 1) * row_bytes];
            for (col, value) in src.chunks_exact(elem_size).enumerate() {
                let at = (col * samples + sample_index) * elem_size;
                dst[at..at + elem_size].copy_from_slice(value);
            }
        });
    Ok(())
}

fn check_elem_size(elem_size: usize) -> Result<()> {
    if elem_size == 0 {
        return Err(Error::buffer_too_small("element", 1, 0));
    }
    Ok(())
}

/// Validated geometry shared by both directions.
struct Geometry {
    stride: usize,
    plane_len: usize,
    interleaved_len: usize,
}

impl Geometry {
    fn new(
        width: usize,
        height: usize,
        samples: usize,
        sample_index: usize,
        stride: usize,
    ) -> Result<Self> {
        if samples == 0 {
            return Err(Error::InvalidSamples { samples: 0 });
        }
        if sample_index >= samples {
            return Err(Error::OutOfBounds {
                sample: sample_index as u32,
                row: 0,
                samples: samples as u32,
                height: height as u64,
            });
        }
        let overflow = || {
            Error::invalid_dimensions(width as u64, height as u64, "layout size overflows")
        };
        let row_len = width.checked_mul(samples).ok_or_else(overflow)?;
        let stride = if stride == 0 { row_len } else { stride };
        if stride < row_len {
            return Err(Error::buffer_too_small("stride", row_len, stride));
        }
        let plane_len = width.checked_mul(height).ok_or_else(overflow)?;
        let interleaved_len = (height - 1)
            .checked_mul(stride)
            .and_then(|v| v.checked_add(row_len))
            .ok_or_else(overflow)?;
        Ok(Self {
            stride,
            plane_len,
            interleaved_len,
        })
    }

    fn check(&self, interleaved: usize, plane: usize) -> Result<()> {
        if interleaved < self.interleaved_len {
            return Err(Error::buffer_too_small(
                "interleaved",
                self.interleaved_len,
                interleaved,
            ));
        }
        if plane < self.plane_len {
            return Err(Error::buffer_too_small("plane", self.plane_len, plane));
        }
        Ok(())
    }
}
