//! NanoScope reader against headers synthesized in memory.

use bim_core::ImageBitmap;
use bim_io::tags::keys;
use bim_io::{Endianness, FormatHandle, IoError, OpenOptions};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

struct Section {
    offset: Option<u64>,
    width: u64,
    height: u64,
    scan: &'static str,
    name: &'static str,
}

impl Section {
    fn new(offset: u64, width: u64, height: u64) -> Self {
        Self {
            offset: Some(offset),
            width,
            height,
            scan: "15 15 ~m",
            name: "Height",
        }
    }
}

fn header(first_line: &str, sections: &[Section]) -> String {
    let mut h = format!(
        "{first_line}\r\n\\Version: 0x04220200\r\n\\Date: 06:32:07 PM Thu Dec 09 2004\r\n\
         \\*Equipment list\r\n\\Description: D3100\r\n"
    );
    for s in sections {
        h.push_str("\\*Ciao image list\r\n");
        if let Some(offset) = s.offset {
            h.push_str(&format!("\\Data offset: {offset}\r\n"));
        }
        h.push_str(&format!(
            "\\Samps/line: {}\r\n\\Number of lines: {}\r\n\\Scan size: {}\r\n\
             \\Line direction: Retrace\r\n\\@2:Image Data: S [{n}] \"{n}\"\r\n",
            s.width,
            s.height,
            s.scan,
            n = s.name
        ));
    }
    h.push_str("\\*File list end\r\n");
    h
}

fn assemble(header: &str, blobs: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut buf = header.as_bytes().to_vec();
    for (offset, data) in blobs {
        let offset = *offset as usize;
        assert!(buf.len() <= offset, "fixture header overlaps data");
        buf.resize(offset, 0);
        buf.extend_from_slice(data);
    }
    buf
}

fn encode<B: ByteOrder>(values: &[i16]) -> Vec<u8> {
    let mut out = vec![0u8; values.len() * 2];
    B::write_i16_into(values, &mut out);
    out
}

fn ramp(width: usize, height: usize) -> Vec<i16> {
    (0..width * height).map(|i| i as i16 * 1000 - 8000).collect()
}

fn plane_u16(page: &ImageBitmap) -> Vec<u16> {
    page.plane(0)
        .unwrap()
        .chunks_exact(2)
        .map(|c| u16::from_ne_bytes([c[0], c[1]]))
        .collect()
}

/// Rows flipped and shifted into the unsigned range.
fn expected(disk: &[i16], width: usize, height: usize) -> Vec<u16> {
    (0..height)
        .flat_map(|y| {
            let row = &disk[(height - 1 - y) * width..(height - y) * width];
            row.iter().map(|&v| (v as u16).wrapping_add(32767))
        })
        .collect()
}

fn single_image() -> (Vec<u8>, Vec<i16>) {
    let disk = ramp(4, 4);
    let bytes = assemble(
        &header("\\*File list", &[Section::new(1024, 4, 4)]),
        &[(1024, encode::<BigEndian>(&disk))],
    );
    (bytes, disk)
}

#[test]
fn rows_are_flipped_and_biased() {
    let (bytes, disk) = single_image();
    let mut handle = FormatHandle::open_bytes(bytes, OpenOptions::default()).unwrap();

    let info = handle.image_info(0).unwrap();
    assert_eq!((info.width, info.height, info.depth, info.samples), (4, 4, 16, 1));
    approx::assert_relative_eq!(info.x_res, 3.75);

    let mut page = ImageBitmap::default();
    handle.read_page(0, &mut page).unwrap();
    let values = plane_u16(&page);
    assert_eq!(values, expected(&disk, 4, 4));
    // top row is the last row on disk
    assert_eq!(values[0], (disk[12] as u16).wrapping_add(32767));
}

#[test]
fn header_metadata() {
    let (bytes, _) = single_image();
    let mut handle = FormatHandle::open_bytes(bytes, OpenOptions::default()).unwrap();
    let tags = handle.metadata().unwrap();

    assert_eq!(tags.get_str(keys::DATE_TIME), Some("2004-12-09 18:32:07"));
    assert_eq!(tags.get_str("image_0_name"), Some("Height"));
    assert_eq!(tags.get_str("custom/File list/Version"), Some("0x04220200"));
    assert_eq!(tags.get_str("custom/Equipment list/Description"), Some("D3100"));
    assert_eq!(
        tags.get_str("custom/image_0/Line direction"),
        Some("Retrace")
    );
    assert_eq!(tags.get_str(keys::RAW_ENDIAN), Some("big"));
    assert_eq!(tags.get_str(keys::FORMAT), Some("NANOSCOPE"));
    approx::assert_relative_eq!(tags.as_f64(keys::PIXEL_RESOLUTION_Y, 0.0), 3.75);
}

#[test]
fn force_file_list_is_recognized() {
    let disk = ramp(2, 2);
    let bytes = assemble(
        &header("\\*Force file list", &[Section::new(1024, 2, 2)]),
        &[(1024, encode::<BigEndian>(&disk))],
    );
    let handle = FormatHandle::open_bytes(bytes, OpenOptions::default()).unwrap();
    assert_eq!(handle.num_pages().unwrap(), 1);
}

#[test]
fn every_image_section_is_a_page() {
    let small = ramp(2, 2);
    let wide = ramp(3, 2);
    let mut second = Section::new(2048, 3, 2);
    second.name = "Phase";
    second.scan = "600 300 nm";
    let bytes = assemble(
        &header("\\*File list", &[Section::new(1024, 2, 2), second]),
        &[
            (1024, encode::<BigEndian>(&small)),
            (2048, encode::<BigEndian>(&wide)),
        ],
    );
    let mut handle = FormatHandle::open_bytes(bytes, OpenOptions::default()).unwrap();
    assert_eq!(handle.num_pages().unwrap(), 2);

    let info = handle.image_info(1).unwrap();
    assert_eq!((info.width, info.height, info.number_pages), (3, 2, 2));
    approx::assert_relative_eq!(info.x_res, 0.2);
    approx::assert_relative_eq!(info.y_res, 0.15);

    // past the end clamps to the last page
    let mut page = ImageBitmap::default();
    handle.read_page(7, &mut page).unwrap();
    assert_eq!(plane_u16(&page), expected(&wide, 3, 2));

    let tags = handle.metadata().unwrap();
    assert_eq!(tags.get_str("image_1_name"), Some("Phase"));
    assert_eq!(tags.as_u64(keys::IMAGE_NUM_X, 0), 3);
}

#[test]
fn incomplete_sections_are_dropped() {
    let disk = ramp(2, 2);
    let mut broken = Section::new(0, 2, 2);
    broken.offset = None;
    let bytes = assemble(
        &header("\\*File list", &[broken, Section::new(1024, 2, 2)]),
        &[(1024, encode::<BigEndian>(&disk))],
    );
    let mut handle = FormatHandle::open_bytes(bytes, OpenOptions::default()).unwrap();
    assert_eq!(handle.num_pages().unwrap(), 1);

    let mut page = ImageBitmap::default();
    handle.read_page(0, &mut page).unwrap();
    assert_eq!(plane_u16(&page), expected(&disk, 2, 2));
}

#[test]
fn no_usable_section_fails() {
    let mut broken = Section::new(0, 4, 4);
    broken.offset = None;
    let bytes = header("\\*File list", &[broken]).into_bytes();
    let err = FormatHandle::open_bytes(bytes, OpenOptions::default()).unwrap_err();
    assert!(matches!(err.root(), IoError::UnrecognizedHeader(_)));
}

#[test]
fn byte_order_hint_selects_sample_order() {
    let disk = ramp(2, 2);
    let bytes = assemble(
        &header("\\*File list", &[Section::new(1024, 2, 2)]),
        &[(1024, encode::<LittleEndian>(&disk))],
    );
    let options = OpenOptions::new().with_byte_order(Endianness::Little);
    let mut handle = FormatHandle::open_bytes(bytes, options).unwrap();

    let mut page = ImageBitmap::default();
    handle.read_page(0, &mut page).unwrap();
    assert_eq!(plane_u16(&page), expected(&disk, 2, 2));
    assert_eq!(
        handle.metadata().unwrap().get_str(keys::RAW_ENDIAN),
        Some("little")
    );
}

#[test]
fn progress_and_abort() {
    let (bytes, _) = single_image();
    let mut handle = FormatHandle::open_bytes(bytes, OpenOptions::default()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    handle.set_progress(move |done, total| sink.lock().unwrap().push((done, total)));

    let mut page = ImageBitmap::default();
    handle.read_page(0, &mut page).unwrap();
    assert_eq!(seen.lock().unwrap().last(), Some(&(2, 2)));

    handle.abort_flag().store(true, Ordering::Relaxed);
    let err = handle.read_page(0, &mut page).unwrap_err();
    assert!(matches!(err, IoError::Aborted(_)));

    handle.reset_abort();
    assert!(handle.read_page(0, &mut page).is_ok());
}

#[test]
fn nanoscope_is_read_only() {
    let err = FormatHandle::create_memory("NANOSCOPE", OpenOptions::default()).unwrap_err();
    assert!(err.root().is_unsupported());
}
