//! IBW reader against waves synthesized in memory.

use bim_core::{ImageBitmap, PixelType, ResolutionUnit};
use bim_io::formats::ibw::{IBW_DATA_OFFSET, IbwFormat, wave_type};
use bim_io::tags::keys;
use bim_io::{Endianness, FormatHandle, FormatRegistry, IoMode, OpenOptions, Stream};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

const WAVE: usize = 64;

struct Wave<'a> {
    dims: [i32; 3],
    kind: i16,
    data: Vec<u8>,
    note: &'a str,
    dim_units: &'a str,
    sf_a: [f64; 2],
}

impl Default for Wave<'_> {
    fn default() -> Self {
        Self {
            dims: [2, 2, 0],
            kind: wave_type::FP32,
            data: Vec::new(),
            note: "",
            dim_units: "",
            sf_a: [1.0, 1.0],
        }
    }
}

fn build<B: ByteOrder>(w: &Wave<'_>, npnts: i32) -> Vec<u8> {
    let mut buf = vec![0u8; IBW_DATA_OFFSET as usize];
    B::write_i16(&mut buf[0..], 5);
    B::write_i32(&mut buf[12..], w.note.len() as i32);

    B::write_i32(&mut buf[WAVE + 12..], npnts);
    B::write_i16(&mut buf[WAVE + 16..], w.kind);
    for (i, d) in w.dims.iter().enumerate() {
        B::write_i32(&mut buf[WAVE + 68 + i * 4..], *d);
    }
    B::write_f64(&mut buf[WAVE + 84..], w.sf_a[0]);
    B::write_f64(&mut buf[WAVE + 92..], w.sf_a[1]);
    let units = w.dim_units.as_bytes();
    buf[WAVE + 152..WAVE + 152 + units.len()].copy_from_slice(units);

    buf.extend_from_slice(&w.data);
    buf.extend_from_slice(w.note.as_bytes());
    buf
}

fn f32_data<B: ByteOrder>(values: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * 4];
    B::write_f32_into(values, &mut out);
    out
}

fn read_first_page(bytes: Vec<u8>) -> (FormatHandle, ImageBitmap) {
    let mut handle = FormatHandle::open_bytes(bytes, OpenOptions::default()).expect("open ibw");
    let mut page = ImageBitmap::default();
    handle.read_page(0, &mut page).expect("read page");
    (handle, page)
}

#[test]
fn little_endian_float_wave_is_normalized() {
    let wave = Wave {
        data: f32_data::<LittleEndian>(&[-1.0, 0.0, 1.0, 3.0]),
        ..Wave::default()
    };
    let (handle, page) = read_first_page(build::<LittleEndian>(&wave, 4));

    let info = handle.image_info(0).unwrap();
    assert_eq!((info.width, info.height, info.samples, info.depth), (2, 2, 1, 8));
    assert_eq!(info.pixel_type, PixelType::Unsigned);
    assert_eq!(handle.format().unwrap().short_name, "IBW");
    assert_eq!(page.plane(0).unwrap(), &[0, 64, 128, 255]);
}

#[test]
fn big_endian_int16_wave() {
    let mut data = vec![0u8; 8];
    BigEndian::write_i16_into(&[10, 20, 30, 40], &mut data);
    let wave = Wave {
        kind: wave_type::I16,
        data,
        ..Wave::default()
    };
    let (mut handle, page) = read_first_page(build::<BigEndian>(&wave, 4));

    assert_eq!(page.plane(0).unwrap(), &[0, 85, 170, 255]);
    let tags = handle.metadata().unwrap();
    assert_eq!(tags.get_str(keys::RAW_ENDIAN), Some("big"));
}

#[test]
fn decoding_does_not_depend_on_host_order() {
    let wave = Wave {
        dims: [4, 1, 0],
        data: f32_data::<LittleEndian>(&[0.0, 1.0, 2.0, 3.0]),
        ..Wave::default()
    };
    let bytes = build::<LittleEndian>(&wave, 4);

    let mut registry = FormatRegistry::new();
    registry
        .register(IbwFormat::with_host(Endianness::Big))
        .unwrap();
    let mut handle = FormatHandle::new(OpenOptions::default());
    handle
        .open_stream(&registry, Stream::from_bytes(bytes), IoMode::Read)
        .unwrap();

    let info = handle.image_info(0).unwrap();
    assert_eq!((info.width, info.height), (4, 1));
    let mut page = ImageBitmap::default();
    handle.read_page(0, &mut page).unwrap();
    assert_eq!(page.plane(0).unwrap(), &[0, 85, 170, 255]);
}

#[test]
fn note_becomes_date_and_custom_tags() {
    let note = "Date: Tue, Sep 20, 2005\rTime: 10:58:49 AM\rScanRate: 1.00\rOperator: \"jd\"\r";
    let wave = Wave {
        data: f32_data::<LittleEndian>(&[0.0; 4]),
        note,
        ..Wave::default()
    };
    let (mut handle, page) = read_first_page(build::<LittleEndian>(&wave, 4));

    // constant data maps to zero
    assert_eq!(page.plane(0).unwrap(), &[0, 0, 0, 0]);

    let tags = handle.metadata().unwrap();
    assert_eq!(tags.get_str(keys::DATE_TIME), Some("2005-09-20 10:58:49"));
    assert_eq!(tags.get_str("custom/ScanRate"), Some("1.00"));
    assert_eq!(tags.get_str("custom/Operator"), Some("jd"));
    assert_eq!(tags.as_u64(keys::IMAGE_NUM_X, 0), 2);
    assert_eq!(tags.get_str(keys::FORMAT), Some("IBW"));
}

#[test]
fn resolution_from_scaling_and_units() {
    let wave = Wave {
        data: f32_data::<LittleEndian>(&[0.0, 1.0, 2.0, 3.0]),
        dim_units: "nm",
        sf_a: [20.0, 40.0],
        ..Wave::default()
    };
    let (mut handle, _) = read_first_page(build::<LittleEndian>(&wave, 4));

    let info = handle.image_info(0).unwrap();
    assert_eq!(info.res_units, ResolutionUnit::Nanometers);
    let tags = handle.metadata().unwrap();
    approx::assert_relative_eq!(tags.as_f64(keys::PIXEL_RESOLUTION_X, 0.0), 0.02);
    approx::assert_relative_eq!(tags.as_f64(keys::PIXEL_RESOLUTION_Y, 0.0), 0.04);
}

#[test]
fn truncated_data_fails_to_open() {
    let wave = Wave {
        dims: [64, 64, 0],
        data: f32_data::<LittleEndian>(&[0.0; 16]),
        ..Wave::default()
    };
    let err = FormatHandle::open_bytes(build::<LittleEndian>(&wave, 64 * 64), OpenOptions::default())
        .unwrap_err();
    assert!(matches!(
        err.root(),
        bim_io::IoError::UnrecognizedHeader(_)
    ));
}

#[test]
fn ibw_cannot_be_written() {
    let registry = FormatRegistry::global();
    let ibw = registry.find_by_name("IBW").unwrap();
    assert!(!ibw.item().can_write);

    let err = FormatHandle::create_memory("IBW", OpenOptions::default()).unwrap_err();
    assert!(err.root().is_unsupported());
}
