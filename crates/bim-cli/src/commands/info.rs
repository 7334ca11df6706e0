//! Image info command.
//!
//! Prints geometry, sample type and resolution of one page, plus the
//! metadata tags with `--all`.

use crate::InfoArgs;
use anyhow::{Context, Result};
use bim_core::{ImageBitmap, ImageInfo, ResolutionUnit};
use bim_io::{FormatHandle, OpenOptions};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Runs the info command.
pub fn run(args: InfoArgs, options: &OpenOptions, verbose: bool) -> Result<()> {
    let options = super::with_endian(options, args.endian.as_deref())?;
    for path in &args.input {
        let file_size = fs::metadata(path)
            .with_context(|| format!("Failed to stat: {}", path.display()))?
            .len();
        let mut image = super::open_image(path, &options)?;
        let pages = image.num_pages()?;
        let page = args.page.min(pages.saturating_sub(1));
        let info = image.image_info(page)?;

        print_text(path, &image, &info, page, file_size, verbose)?;
        if args.all {
            print_tags(&mut image, page)?;
        }
        if args.input.len() > 1 {
            println!();
        }
    }
    Ok(())
}

fn print_text(
    path: &Path,
    image: &FormatHandle,
    info: &ImageInfo,
    page: u64,
    file_size: u64,
    verbose: bool,
) -> Result<()> {
    let format = image.format()?;
    println!("{}", path.display());
    println!("  Format:     {} ({})", format.short_name, format.long_name);
    println!("  Resolution: {}x{}", info.width, info.height);
    println!(
        "  Pages:      {} (z {}, t {})",
        info.number_pages, info.number_z, info.number_t
    );
    if page > 0 {
        println!("  Page:       {page}");
    }
    println!("  Channels:   {}", info.samples);
    println!("  Depth:      {} bit {}", info.depth, info.pixel_type.name());
    println!("  Mode:       {}", info.image_mode.name());
    if info.res_units != ResolutionUnit::None {
        println!(
            "  Pixel size: {} x {} {}",
            info.x_res,
            info.y_res,
            info.res_units.symbol()
        );
    }
    println!("  File size:  {}", super::format_size(file_size));
    if verbose {
        if let Some(size) = info.image_size_in_bytes() {
            println!("  Decoded:    {}", super::format_size(size));
        }
    }
    Ok(())
}

/// Tags are collected for the current page, so a page other than the first
/// is decoded before asking.
fn print_tags(image: &mut FormatHandle, page: u64) -> Result<()> {
    if page > 0 {
        let mut bitmap = ImageBitmap::default();
        image
            .read_page(page, &mut bitmap)
            .with_context(|| format!("Failed to read page {page}"))?;
    }
    let tags = match image.metadata() {
        Ok(tags) => tags,
        Err(e) if e.is_unsupported() => {
            debug!(error = %e, "no metadata");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to read metadata"),
    };
    println!("  Metadata:");
    for (key, value) in &tags {
        println!("    {key} = {value}");
    }
    Ok(())
}
