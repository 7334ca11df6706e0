//! Handle lifecycle: capability checks, metadata precedence, reopen.

use bim_core::{AllocLimits, ImageBitmap, ImageInfo, PixelType};
use bim_io::tags::keys;
use bim_io::{
    FormatConstraints, FormatHandle, FormatHeader, FormatItem, FormatPlugin, FormatRegistry,
    FormatSession, IoError, IoMode, IoResult, MetadataSource, OpenOptions, PageContext, Stream,
    TagStore,
};
use std::io::Write;
use std::sync::Arc;

const SINK_ITEMS: &[FormatItem] = &[FormatItem {
    short_name: "SINK",
    long_name: "Single page sink",
    extensions: &["sink"],
    can_read: false,
    can_write: true,
    can_read_meta: false,
    can_write_meta: false,
    can_write_multipage: false,
    constraints: FormatConstraints {
        max_width: 16,
        max_samples: 1,
        ..FormatConstraints::NONE
    },
}];

const SINK_HEADER: FormatHeader = FormatHeader {
    name: "sink",
    version: "0.1.0",
    description: "test sink",
    magic_size: 4,
    formats: SINK_ITEMS,
};

struct SinkFormat;

impl FormatPlugin for SinkFormat {
    fn header(&self) -> &FormatHeader {
        &SINK_HEADER
    }

    fn validate(&self, magic: &[u8], _: &str) -> Option<usize> {
        magic.starts_with(b"SNK!").then_some(0)
    }

    fn open(
        &self,
        _: &mut Stream,
        _: usize,
        _: IoMode,
        _: &OpenOptions,
    ) -> IoResult<Box<dyn FormatSession>> {
        Ok(Box::new(SinkSession { pages: 0 }))
    }
}

struct SinkSession {
    pages: u64,
}

impl FormatSession for SinkSession {
    fn num_pages(&self) -> u64 {
        self.pages
    }

    fn image_info(&self, _: u64) -> IoResult<ImageInfo> {
        Err(IoError::unsupported("sink has no pages to describe"))
    }

    fn write_page(
        &mut self,
        stream: &mut Stream,
        _: u64,
        bitmap: &ImageBitmap,
        _: &PageContext<'_>,
    ) -> IoResult<()> {
        stream.write_all(b"SNK!")?;
        stream.write_all(bitmap.plane(0)?)?;
        self.pages += 1;
        Ok(())
    }
}

fn sink_registry() -> FormatRegistry {
    let mut registry = FormatRegistry::new();
    registry.register(SinkFormat).unwrap();
    registry
}

fn gray(width: u64) -> ImageBitmap {
    let info = ImageInfo::new(width, 1, 1, 8, PixelType::Unsigned);
    ImageBitmap::allocate(&info, &AllocLimits::default()).unwrap()
}

fn nrrd_bytes() -> Vec<u8> {
    let mut out = FormatHandle::create_memory("NRRD", OpenOptions::default()).unwrap();
    out.write_page(&gray(4)).unwrap();
    out.finish_into_bytes().unwrap()
}

#[test]
fn single_page_format_refuses_second_page() {
    let registry = sink_registry();
    let mut h = FormatHandle::new(OpenOptions::new().with_format("sink"));
    h.open_stream(&registry, Stream::memory_writer(), IoMode::Write)
        .unwrap();

    h.write_page(&gray(8)).unwrap();
    assert!(h.write_page(&gray(8)).unwrap_err().is_unsupported());

    let bytes = h.finish_into_bytes().unwrap();
    assert_eq!(&bytes[..4], b"SNK!");
    assert_eq!(bytes.len(), 12);
}

#[test]
fn constraints_are_checked_before_dispatch() {
    let registry = sink_registry();
    let mut h = FormatHandle::new(OpenOptions::new().with_format("SINK"));
    h.open_stream(&registry, Stream::memory_writer(), IoMode::Write)
        .unwrap();

    assert!(h.write_page(&gray(32)).unwrap_err().is_unsupported());
    let rgb = ImageInfo::new(4, 1, 3, 8, PixelType::Unsigned);
    let rgb = ImageBitmap::allocate(&rgb, &AllocLimits::default()).unwrap();
    assert!(h.write_page(&rgb).unwrap_err().is_unsupported());
    assert_eq!(h.num_pages().unwrap(), 0);
    assert!(h.metadata().unwrap_err().is_unsupported());
}

#[test]
fn unreadable_format_fails_to_open() {
    let registry = sink_registry();
    let mut h = FormatHandle::new(OpenOptions::default());
    let err = h
        .open_stream(&registry, Stream::from_bytes(b"SNK!data".to_vec()), IoMode::Read)
        .unwrap_err();
    assert!(matches!(err, IoError::OpenFailed { ref format, .. } if format == "SINK"));
    assert!(err.root().is_unsupported());
    assert!(!h.is_open());
}

#[test]
fn mode_mismatch_is_unsupported() {
    let mut reader = FormatHandle::open_bytes(nrrd_bytes(), OpenOptions::default()).unwrap();
    assert!(reader.write_page(&gray(4)).unwrap_err().is_unsupported());

    let mut writer = FormatHandle::create_memory("NRRD", OpenOptions::default()).unwrap();
    let mut page = ImageBitmap::default();
    assert!(writer.read_page(0, &mut page).unwrap_err().is_unsupported());
    writer.write_page(&gray(4)).unwrap();
}

struct ExifLike;

impl MetadataSource for ExifLike {
    fn name(&self) -> &str {
        "exif-like"
    }

    fn extract(&self, _: &mut Stream, tags: &mut TagStore) -> IoResult<()> {
        tags.set(keys::FORMAT, "EXIF");
        tags.set("exif/Make", "Acme");
        Ok(())
    }
}

struct Broken;

impl MetadataSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn extract(&self, _: &mut Stream, tags: &mut TagStore) -> IoResult<()> {
        tags.set("broken/partial", true);
        Err(IoError::header("corrupt block"))
    }
}

#[test]
fn native_tags_win_over_sources() {
    let mut h = FormatHandle::open_bytes(nrrd_bytes(), OpenOptions::default()).unwrap();
    h.add_metadata_source(Arc::new(Broken));
    h.add_metadata_source(Arc::new(ExifLike));

    let tags = h.metadata().unwrap();
    assert_eq!(tags.get_str(keys::FORMAT), Some("NRRD"));
    assert_eq!(tags.get_str("exif/Make"), Some("Acme"));
    assert!(tags.as_bool("broken/partial", false));
    assert_eq!(tags.as_u64(keys::IMAGE_NUM_X, 0), 4);
}

#[test]
fn reopen_replaces_the_image() {
    let mut h = FormatHandle::open_bytes(nrrd_bytes(), OpenOptions::default()).unwrap();
    assert_eq!(h.format().unwrap().short_name, "NRRD");

    let registry = sink_registry();
    h.open_stream(&registry, Stream::memory_writer(), IoMode::Write)
        .unwrap_err();
    assert!(!h.is_open());

    h.open_stream(
        FormatRegistry::global(),
        Stream::from_bytes(nrrd_bytes()),
        IoMode::Read,
    )
    .unwrap();
    assert_eq!(h.image_info(3).unwrap().width, 4);
    h.close().unwrap();
    assert!(h.num_pages().unwrap_err().is_unsupported());
}

#[test]
fn allocation_limit_applies_to_reads() {
    let options = OpenOptions::new().with_limits(AllocLimits::new(2));
    let mut h = FormatHandle::open_bytes(nrrd_bytes(), options).unwrap();
    let mut page = ImageBitmap::default();
    let err = h.read_page(0, &mut page).unwrap_err();
    assert!(err.is_allocation_error());
}

#[test]
fn unknown_extension_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.unknownext");
    let err = FormatHandle::create(&path, OpenOptions::default()).unwrap_err();
    assert!(matches!(err.root(), IoError::FormatMismatch(_)));
    assert!(!path.exists());

    let ibw = dir.path().join("out.ibw");
    let err = FormatHandle::create(&ibw, OpenOptions::default()).unwrap_err();
    assert!(err.root().is_unsupported());
    assert!(!ibw.exists());
}
