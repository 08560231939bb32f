use criterion::{Criterion, criterion_group, criterion_main};
use jbig2_decode::{Options, decode};

const FILE_HEADER_ID: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

fn file_header(num_pages: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&FILE_HEADER_ID);
    out.push(0x01);
    out.extend_from_slice(&num_pages.to_be_bytes());
    out
}

fn segment(segment_number: u32, segment_type: u8, page_association: u8, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&segment_number.to_be_bytes());
    out.push(segment_type & 0x3F);
    out.push(0x00);
    out.push(page_association);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
    out
}

fn page_info_data(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.push(0x00);
    out.extend_from_slice(&0u16.to_be_bytes());
    out
}

const PAGE_INFORMATION: u8 = 48;
const END_OF_FILE: u8 = 51;

/// A page with declared dimensions but no region content, which exercises
/// file/segment framing and resource-limit bookkeeping without requiring an
/// arithmetic-coded fixture.
fn empty_page_stream(width: u32, height: u32) -> Vec<u8> {
    let mut data = file_header(1);
    data.extend(segment(0, PAGE_INFORMATION, 1, &page_info_data(width, height)));
    data.extend(segment(1, END_OF_FILE, 0, &[]));
    data
}

fn criterion_benchmark(c: &mut Criterion) {
    let small = empty_page_stream(64, 64);
    c.bench_function("decode empty 64x64 page", |b| {
        b.iter(|| decode(&small, &Options::default()).unwrap())
    });

    let large = empty_page_stream(4096, 4096);
    c.bench_function("decode empty 4096x4096 page", |b| {
        b.iter(|| decode(&large, &Options::default()).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
