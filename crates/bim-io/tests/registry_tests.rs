//! Format detection and lookup through the built-in registry.

use bim_io::formats::ibw::IbwFormat;
use bim_io::{FormatHandle, FormatRegistry, IoError, OpenOptions};

fn padded(prefix: &[u8], len: usize) -> Vec<u8> {
    let mut v = prefix.to_vec();
    v.resize(len.max(prefix.len()), b' ');
    v
}

#[test]
fn builtin_formats_in_registration_order() {
    let registry = FormatRegistry::global();
    assert_eq!(registry.format_names(), vec!["IBW", "NANOSCOPE", "NRRD"]);
    assert_eq!(registry.max_magic_size(), 20);
}

#[test]
fn detects_each_magic() {
    let registry = FormatRegistry::with_builtin();
    let cases: [(&[u8], &str); 5] = [
        (&[0x05, 0x00], "IBW"),
        (&[0x00, 0x05], "IBW"),
        (b"\\*File list\r\n", "NANOSCOPE"),
        (b"\\*Force file list\r\n", "NANOSCOPE"),
        (b"NRRD0004\n", "NRRD"),
    ];
    for (magic, name) in cases {
        let found = registry.detect(&padded(magic, 20), "").unwrap();
        assert_eq!(found.item().short_name, name, "{magic:?}");
    }
}

#[test]
fn short_or_unknown_magic_is_a_mismatch() {
    let registry = FormatRegistry::with_builtin();
    assert!(matches!(
        registry.detect(b"NRRD0004\n", "tiny.nrrd"),
        Err(IoError::FormatMismatch(name)) if name == "tiny.nrrd"
    ));
    assert!(matches!(
        registry.detect(&[0xFF; 32], ""),
        Err(IoError::FormatMismatch(_))
    ));
}

#[test]
fn lookup_by_extension_and_name() {
    let registry = FormatRegistry::global();
    assert!(registry.supports_extension("NAN"));
    assert!(registry.supports_extension("ibw"));
    assert!(!registry.supports_extension("tif"));

    let nrrd = registry.find_by_extension("nrrd").unwrap();
    assert!(nrrd.item().can_write);
    assert!(nrrd.item().can_write_multipage);
    assert_eq!(nrrd.plugin().header().name, "NRRD");

    let nan = registry.find_by_name("nanoscope").unwrap();
    assert_eq!(nan.item().constraints.max_depth, 16);
    assert!(!nan.item().can_write);
}

#[test]
fn capabilities_listing() {
    let registry = FormatRegistry::global();
    let writable: Vec<&str> = registry
        .formats()
        .filter(|(_, item)| item.can_write)
        .map(|(_, item)| item.short_name)
        .collect();
    assert_eq!(writable, vec!["NRRD"]);
    assert!(registry.formats().all(|(_, item)| item.can_read_meta));
}

#[test]
fn registration_closes_after_first_detection() {
    let mut registry = FormatRegistry::new();
    registry.register(IbwFormat::new()).unwrap();
    assert!(!registry.is_sealed());
    let _ = registry.detect(b"garbage garbage", "");
    assert!(registry.is_sealed());
    let err = registry.register(IbwFormat::new()).unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(registry.len(), 1);
}

#[test]
fn unknown_bytes_fail_to_open() {
    let err = FormatHandle::open_bytes(b"plain text, nothing else".to_vec(), OpenOptions::default())
        .unwrap_err();
    assert!(matches!(err, IoError::OpenFailed { .. }));
    assert!(matches!(err.root(), IoError::FormatMismatch(_)));
}
