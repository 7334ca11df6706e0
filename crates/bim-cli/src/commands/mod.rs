//! CLI command implementations

pub mod convert;
pub mod formats;
pub mod info;

use anyhow::{Context, Result};
use bim_io::{Endianness, FormatHandle, OpenOptions};
use std::path::Path;

/// Open image for reading
pub fn open_image(path: &Path, options: &OpenOptions) -> Result<FormatHandle> {
    FormatHandle::open_path(path, options.clone())
        .with_context(|| format!("Failed to open: {}", path.display()))
}

/// Parse a byte order argument
pub fn parse_endian(s: &str) -> Result<Endianness> {
    Endianness::from_name(s).with_context(|| format!("Unknown byte order '{s}' (use little or big)"))
}

/// Applies an optional `--endian` style argument as the byte order hint.
pub fn with_endian(options: &OpenOptions, endian: Option<&str>) -> Result<OpenOptions> {
    let options = options.clone();
    Ok(match endian {
        Some(e) => options.with_byte_order(parse_endian(e)?),
        None => options,
    })
}

/// Format file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endian() {
        assert_eq!(parse_endian("BIG").unwrap(), Endianness::Big);
        assert!(parse_endian("middle").is_err());
        let o = with_endian(&OpenOptions::new(), Some("little")).unwrap();
        assert_eq!(o.byte_order_hint, Some(Endianness::Little));
        assert_eq!(with_endian(&o, None).unwrap().byte_order_hint, Some(Endianness::Little));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
