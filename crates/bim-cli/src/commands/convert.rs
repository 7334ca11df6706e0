//! Format conversion command.
//!
//! Copies every page (or the one selected with `--page`) into a new file of
//! the output format, NRRD unless told otherwise.

use crate::ConvertArgs;
use anyhow::{Context, Result, bail};
use bim_core::ImageBitmap;
use bim_io::{FormatHandle, OpenOptions};
use tracing::{debug, info};

/// Runs the convert command.
pub fn run(args: ConvertArgs, options: &OpenOptions, verbose: bool) -> Result<()> {
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        format = %args.format,
        "Converting image"
    );

    let in_options = super::with_endian(options, args.input_endian.as_deref())?;
    let mut input = super::open_image(&args.input, &in_options)?;
    let pages = input.num_pages()?;
    let range = match args.page {
        Some(p) if p >= pages => bail!("Page {p} out of range ({pages} pages)"),
        Some(p) => p..p + 1,
        None => 0..pages,
    };

    let out_options =
        super::with_endian(options, args.endian.as_deref())?.with_format(args.format.as_str());
    let mut output = FormatHandle::create(&args.output, out_options)
        .with_context(|| format!("Failed to create: {}", args.output.display()))?;

    let mut page = ImageBitmap::default();
    let mut written = 0u64;
    for p in range {
        input
            .read_page(p, &mut page)
            .with_context(|| format!("Failed to read page {p}"))?;
        output
            .write_page(&page)
            .with_context(|| format!("Failed to write page {p}"))?;
        debug!(page = p, width = page.width(), height = page.height(), "page converted");
        written += 1;
    }
    output
        .close()
        .with_context(|| format!("Failed to finish: {}", args.output.display()))?;

    if verbose {
        println!(
            "{} -> {} ({} page{})",
            args.input.display(),
            args.output.display(),
            written,
            if written == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bim_core::{AllocLimits, ImageInfo, PixelType};

    fn write_source(path: &std::path::Path, pages: u8) {
        let info = ImageInfo::new(3, 2, 1, 8, PixelType::Unsigned);
        let mut out = FormatHandle::create(path, OpenOptions::default()).unwrap();
        for p in 0..pages {
            let mut page = ImageBitmap::allocate(&info, &AllocLimits::default()).unwrap();
            page.plane_mut(0).unwrap().fill(p + 1);
            out.write_page(&page).unwrap();
        }
        out.close().unwrap();
    }

    fn args(input: &std::path::Path, output: &std::path::Path, page: Option<u64>) -> ConvertArgs {
        ConvertArgs {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            page,
            format: "NRRD".to_string(),
            endian: Some("big".to_string()),
            input_endian: None,
        }
    }

    #[test]
    fn test_convert_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("stack.nrrd");
        let dst = dir.path().join("page.out");
        write_source(&src, 3);

        run(args(&src, &dst, Some(2)), &OpenOptions::default(), false).unwrap();

        let mut back = FormatHandle::open_path(&dst, OpenOptions::default()).unwrap();
        assert_eq!(back.num_pages().unwrap(), 1);
        let mut page = ImageBitmap::default();
        back.read_page(0, &mut page).unwrap();
        assert!(page.plane(0).unwrap().iter().all(|&v| v == 3));
    }

    #[test]
    fn test_convert_all_pages() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("stack.nrrd");
        let dst = dir.path().join("copy.nrrd");
        write_source(&src, 2);

        run(args(&src, &dst, None), &OpenOptions::default(), false).unwrap();
        let back = FormatHandle::open_path(&dst, OpenOptions::default()).unwrap();
        assert_eq!(back.num_pages().unwrap(), 2);
    }

    #[test]
    fn test_page_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("one.nrrd");
        write_source(&src, 1);
        let err = run(args(&src, &dir.path().join("x.nrrd"), Some(4)), &OpenOptions::default(), false)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
