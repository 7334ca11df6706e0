//! Byte order and byte-swap primitives.
//!
//! Every binary format funnels its endianness handling through this module:
//! header fields via [`crate::header::Record`], bulk sample buffers via the
//! `swap_array*` functions after a raw read.

/// Byte order (endianness).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first (network byte order).
    Big,
}

impl Endianness {
    /// Byte order of the machine running this code.
    #[inline]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    /// Returns `true` when data in `self` order must be swapped to be read
    /// on a `host` machine.
    #[inline]
    pub fn needs_swap(self, host: Endianness) -> bool {
        self != host
    }

    /// Lowercase name as used in text headers ("little" / "big").
    pub fn name(&self) -> &'static str {
        match self {
            Self::Little => "little",
            Self::Big => "big",
        }
    }

    /// Parses "little" / "big" (case-insensitive).
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" => Some(Self::Little),
            "big" => Some(Self::Big),
            _ => None,
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::native()
    }
}

/// Reverses the byte order of a 16-bit value.
#[inline]
pub const fn swap16(v: u16) -> u16 {
    v.swap_bytes()
}

/// Reverses the byte order of a 32-bit value.
#[inline]
pub const fn swap32(v: u32) -> u32 {
    v.swap_bytes()
}

/// Reverses the byte order of a 64-bit value.
#[inline]
pub const fn swap64(v: u64) -> u64 {
    v.swap_bytes()
}

/// Reverses the byte order of an `f32` bit pattern.
#[inline]
pub fn swap_f32(v: f32) -> f32 {
    f32::from_bits(swap32(v.to_bits()))
}

/// Reverses the byte order of an `f64` bit pattern.
#[inline]
pub fn swap_f64(v: f64) -> f64 {
    f64::from_bits(swap64(v.to_bits()))
}

/// Swaps every 2-byte element of `buf` in place. A trailing odd byte is left
/// as is.
pub fn swap_array16(buf: &mut [u8]) {
    for c in buf.chunks_exact_mut(2) {
        c.swap(0, 1);
    }
}

/// Swaps every 4-byte element of `buf` in place.
pub fn swap_array32(buf: &mut [u8]) {
    for c in buf.chunks_exact_mut(4) {
        c.reverse();
    }
}

/// Swaps every 8-byte element of `buf` in place.
pub fn swap_array64(buf: &mut [u8]) {
    for c in buf.chunks_exact_mut(8) {
        c.reverse();
    }
}

/// Swaps every `elem_size`-byte element of `buf` in place.
///
/// Sizes other than 2, 4 and 8 are a no-op.
pub fn swap_array(buf: &mut [u8], elem_size: usize) {
    match elem_size {
        2 => swap_array16(buf),
        4 => swap_array32(buf),
        8 => swap_array64(buf),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_scalars() {
        assert_eq!(swap16(0x1234), 0x3412);
        assert_eq!(swap32(0x1122_3344), 0x4433_2211);
        assert_eq!(swap64(0x0102_0304_0506_0708), 0x0807_0605_0403_0201);
        assert_eq!(swap_f32(swap_f32(1.5)), 1.5);
        assert_eq!(swap_f64(swap_f64(-2.25)), -2.25);
    }

    #[test]
    fn test_swap_arrays() {
        let mut b = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        swap_array16(&mut b);
        assert_eq!(b, [2, 1, 4, 3, 6, 5, 8, 7, 9]);

        let mut b = [1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_array32(&mut b);
        assert_eq!(b, [4, 3, 2, 1, 8, 7, 6, 5]);

        let mut b = [1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_array(&mut b, 8);
        assert_eq!(b, [8, 7, 6, 5, 4, 3, 2, 1]);

        swap_array(&mut b, 1);
        assert_eq!(b, [8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_swap_array_matches_byteorder() {
        let v: u32 = 0xDEAD_BEEF;
        let mut b = v.to_le_bytes();
        swap_array32(&mut b);
        assert_eq!(b, v.to_be_bytes());
    }

    #[test]
    fn test_endianness() {
        assert!(Endianness::Little.needs_swap(Endianness::Big));
        assert!(!Endianness::Big.needs_swap(Endianness::Big));
        assert_eq!(Endianness::from_name("BIG"), Some(Endianness::Big));
        assert_eq!(Endianness::from_name("middle"), None);
        assert_eq!(Endianness::default(), Endianness::native());
    }
}
