//! Registered format listing.

use crate::FormatsArgs;
use anyhow::Result;
use bim_io::{FormatItem, FormatRegistry};

fn flag(on: bool, c: char) -> char {
    if on { c } else { '-' }
}

/// `RWMP` capability string: read, write, metadata, multipage.
fn capabilities(item: &FormatItem) -> String {
    [
        flag(item.can_read, 'R'),
        flag(item.can_write, 'W'),
        flag(item.can_read_meta, 'M'),
        flag(item.can_write_multipage, 'P'),
    ]
    .iter()
    .collect()
}

/// Runs the formats command.
pub fn run(args: FormatsArgs, verbose: bool) -> Result<()> {
    let registry = FormatRegistry::global();
    println!("{:<12} {:<5} {:<16} DESCRIPTION", "FORMAT", "CAPS", "EXTENSIONS");
    for (header, item) in registry.formats() {
        if args.writable && !item.can_write {
            continue;
        }
        println!(
            "{:<12} {:<5} {:<16} {}",
            item.short_name,
            capabilities(item),
            item.extensions.join(","),
            item.long_name
        );
        if verbose {
            println!(
                "{:<12} plugin {} {} ({}), {} magic bytes",
                "", header.name, header.version, header.description, header.magic_size
            );
        }
    }
    Ok(())
}
