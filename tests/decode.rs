//! End-to-end tests exercising the public `decode` API against hand-built
//! JBIG2 segment streams.

use jbig2_decode::{Error, Limits, Options, decode};

const FILE_HEADER_ID: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

/// Build a sequential-organization file header with a known page count.
fn file_header(num_pages: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&FILE_HEADER_ID);
    out.push(0x01); // sequential, known page count, no extensions
    out.extend_from_slice(&num_pages.to_be_bytes());
    out
}

/// Build a segment (header + data) with no referred-to segments and a
/// one-byte page association.
fn segment(segment_number: u32, segment_type: u8, page_association: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&segment_number.to_be_bytes());
    out.push(segment_type & 0x3F);
    out.push(0x00); // 0 referred-to segments, no retention flags
    out.push(page_association);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

/// Build a segment header only, with an explicit (possibly unknown) data length
/// and no data bytes following.
fn segment_header_only(segment_number: u32, segment_type: u8, data_length: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&segment_number.to_be_bytes());
    out.push(segment_type & 0x3F);
    out.push(0x00);
    out.push(1);
    out.extend_from_slice(&data_length.to_be_bytes());
    out
}

/// Build a page information segment's data (7.4.8).
fn page_info_data(width: u32, height: u32, default_pixel: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // x resolution unknown
    out.extend_from_slice(&0u32.to_be_bytes()); // y resolution unknown
    out.push(if default_pixel { 0x04 } else { 0x00 });
    out.extend_from_slice(&0u16.to_be_bytes()); // not striped
    out
}

const PAGE_INFORMATION: u8 = 48;
const END_OF_FILE: u8 = 51;
const IMMEDIATE_GENERIC_REGION: u8 = 38;
const TABLES: u8 = 53;

#[test]
fn page_with_no_regions_decodes_to_default_pixel_white() {
    let mut data = file_header(1);
    data.extend(segment(0, PAGE_INFORMATION, 1, &page_info_data(4, 3, false)));
    data.extend(segment(1, END_OF_FILE, 0, &[]));

    let bitmap = decode(&data, &Options::default()).unwrap();

    assert_eq!(bitmap.width(), 4);
    assert_eq!(bitmap.height(), 3);
    for y in 0..3 {
        for x in 0..4 {
            assert!(!bitmap.get_pixel(x, y), "pixel ({x},{y}) should be white");
        }
    }
}

#[test]
fn page_with_no_regions_decodes_to_default_pixel_black() {
    let mut data = file_header(1);
    data.extend(segment(0, PAGE_INFORMATION, 1, &page_info_data(4, 3, true)));
    data.extend(segment(1, END_OF_FILE, 0, &[]));

    let bitmap = decode(&data, &Options::default()).unwrap();

    for y in 0..3 {
        for x in 0..4 {
            assert!(bitmap.get_pixel(x, y), "pixel ({x},{y}) should be black");
        }
    }
}

/// "bitmap.get(x, y) = 0 when x < 0 ∨ x ≥ width ∨ y < 0 ∨ y ≥ height"
#[test]
fn out_of_range_pixels_read_as_false() {
    let mut data = file_header(1);
    data.extend(segment(0, PAGE_INFORMATION, 1, &page_info_data(4, 3, true)));
    data.extend(segment(1, END_OF_FILE, 0, &[]));

    let bitmap = decode(&data, &Options::default()).unwrap();

    assert!(!bitmap.get_pixel(4, 0));
    assert!(!bitmap.get_pixel(0, 3));
    assert!(!bitmap.get_pixel(100, 100));
}

#[test]
fn invalid_file_header_is_data_error() {
    let mut data = file_header(1);
    data[0] = 0x00; // corrupt the magic signature

    let result = decode(&data, &Options::default());
    assert!(matches!(result, Err(Error::DataError(_))));
}

/// "A segment header claiming dataLength > remaining must raise DataError."
#[test]
fn declared_data_length_past_end_of_stream_is_data_error() {
    let mut data = file_header(1);
    // Claim 1000 bytes of page information data but supply none.
    data.extend(segment_header_only(0, PAGE_INFORMATION, 1000));

    let result = decode(&data, &Options::default());
    assert!(matches!(result, Err(Error::DataError(_))));
}

/// Unknown-length segments (7.2.7) are rejected as unsupported rather than
/// resolved by scanning forward for an end-of-data marker.
#[test]
fn unknown_length_segment_is_unsupported() {
    let mut data = file_header(1);
    data.extend(segment_header_only(0, IMMEDIATE_GENERIC_REGION, 0xFFFF_FFFF));

    let result = decode(&data, &Options::default());
    assert!(matches!(result, Err(Error::UnsupportedError(_))));
}

/// "A page-information segment declaring width = 100000, height = 100000 with
/// MaxPixels = 1_000_000 must raise ResourceExceeded and produce no bitmap."
#[test]
fn oversized_page_dimensions_raise_resource_exceeded() {
    let mut data = file_header(1);
    data.extend(segment(
        0,
        PAGE_INFORMATION,
        1,
        &page_info_data(100_000, 100_000, false),
    ));
    data.extend(segment(1, END_OF_FILE, 0, &[]));

    let limits = Limits {
        max_width: 200_000,
        max_height: 200_000,
        max_pixels: 1_000_000,
        ..Limits::default()
    };
    let options = Options { limits };

    let result = decode(&data, &options);
    assert!(matches!(result, Err(Error::ResourceExceeded(_))));
}

/// "A custom-Huffman-table segment with lines whose code lengths overflow the
/// 16-bit table size must raise DataError."
#[test]
fn malformed_custom_huffman_table_is_data_error() {
    let mut data = file_header(1);
    data.extend(segment(0, PAGE_INFORMATION, 1, &page_info_data(4, 3, false)));

    // Tables segment (7.4.13, B.2): HTOOB=0, HTPS=1, HTRS=8, HTLOW=0, HTHIGH=1,
    // followed by a single table line whose RANGELEN is 255 (8 one-bits),
    // which overflows when used as a shift amount for the range size.
    let mut table_data = Vec::new();
    table_data.push(0x70); // HTRS bits = 7 (-> 8), HTPS bits = 0 (-> 1), HTOOB = 0
    table_data.extend_from_slice(&0i32.to_be_bytes()); // HTLOW = 0
    table_data.extend_from_slice(&1i32.to_be_bytes()); // HTHIGH = 1
    table_data.push(0xFF); // PREFLEN bit (1) + first 7 bits of RANGELEN (all 1)
    table_data.push(0x80); // last bit of RANGELEN (1) + padding

    data.extend(segment(1, TABLES, 1, &table_data));

    let result = decode(&data, &Options::default());
    assert!(matches!(result, Err(Error::DataError(_))));
}
