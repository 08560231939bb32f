/*!
A memory-safe, pure-Rust JBIG2 decoder.

`jbig2-decode` decodes JBIG2 images as specified in ITU-T T.88 (also known
as ISO/IEC 14492). JBIG2 is a bi-level image compression standard commonly
used in PDF documents for compressing scanned text documents.

# Example
```rust,no_run
use jbig2_decode::{Options, decode};

let data = std::fs::read("image.jb2").unwrap();
let bitmap = decode(&data, &Options::default()).unwrap();

println!("{}x{} image", bitmap.width(), bitmap.height());
```

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

mod arithmetic_decoder;
mod bitmap;
mod decode;
mod error;
mod file;
mod gray_scale;
mod huffman_table;
mod integer_decoder;
mod lazy;
mod options;
mod page_info;
mod reader;
mod segment;
mod symbol_id_decoder;

use alloc::vec::Vec;

use crate::decode::{generic, generic_refinement, halftone, pattern, symbol, text};
use crate::file::{parse_file, parse_segments_sequential};
use crate::huffman_table::{HuffmanTable, StandardHuffmanTables};
use crate::page_info::parse_page_information;
use crate::reader::Reader;
use crate::segment::{Segment, SegmentType};

pub use crate::error::{Error, PublicResult};
pub use crate::options::{Limits, Options};

/// A decoded JBIG2 bitmap, returned by the crate's top-level decode functions.
///
/// Pixel data is stored one bit per pixel, MSB-first within each byte, with
/// each row padded to a byte boundary (row stride is `ceil(width / 8)`
/// bytes). `true` means black, `false` means white.
#[derive(Debug, Clone)]
pub struct Bitmap {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl Bitmap {
    /// Width of the bitmap in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the bitmap in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The pixel value at `(x, y)`. Returns `false` for out-of-range
    /// coordinates rather than panicking.
    pub fn get_pixel(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }

        let byte_idx = y as usize * self.stride + (x / 8) as usize;
        let bit = 7 - (x % 8);
        (self.data[byte_idx] >> bit) & 1 != 0
    }

    /// The packed row-major pixel data (MSB-first, byte-aligned rows).
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn from_internal(bitmap: &bitmap::Bitmap) -> Self {
        let stride = (bitmap.width as usize).div_ceil(8);
        let mut data = alloc::vec![0_u8; stride * bitmap.height as usize];

        for y in 0..bitmap.height {
            for x in 0..bitmap.width {
                if bitmap.get_pixel(x, y) {
                    let byte_idx = y as usize * stride + (x / 8) as usize;
                    let bit = 7 - (x % 8);
                    data[byte_idx] |= 1 << bit;
                }
            }
        }

        Self {
            width: bitmap.width,
            height: bitmap.height,
            stride,
            data,
        }
    }
}

/// Decode a standalone JBIG2 file.
///
/// The file is expected to use the sequential (Annex D.1) or random-access
/// (Annex D.2) organization, as identified by the file header.
pub fn decode(data: &[u8], options: &Options) -> PublicResult<Bitmap> {
    Ok(decode_inner(data, options)?)
}

/// Decode an embedded JBIG2 image, as embedded in a PDF content stream
/// (Annex D.3), with the given global segments.
pub fn decode_embedded(
    data: &[u8],
    globals: Option<&[u8]>,
    options: &Options,
) -> PublicResult<Bitmap> {
    Ok(decode_embedded_inner(data, globals, options)?)
}

/// Decode page `page` (1-indexed) of a JBIG2 stream with the given global
/// segments.
///
/// For single-page streams (the common PDF image case) `page` should be 1.
pub fn decode_page(
    page: u32,
    data: &[u8],
    globals: Option<&[u8]>,
    options: &Options,
) -> PublicResult<Bitmap> {
    Ok(decode_page_inner(page, data, globals, options)?)
}

fn decode_inner(data: &[u8], options: &Options) -> error::Result<Bitmap> {
    let limits = &options.limits;
    let file = parse_file(data, limits)?;
    decode_with_segments(&file.segments, 1, limits)
}

fn decode_embedded_inner(
    data: &[u8],
    globals: Option<&[u8]>,
    options: &Options,
) -> error::Result<Bitmap> {
    let limits = &options.limits;
    let segments = collect_embedded_segments(data, globals, limits)?;
    decode_with_segments(&segments, 1, limits)
}

fn decode_page_inner(
    page: u32,
    data: &[u8],
    globals: Option<&[u8]>,
    options: &Options,
) -> error::Result<Bitmap> {
    let limits = &options.limits;
    let segments = collect_embedded_segments(data, globals, limits)?;
    decode_with_segments(&segments, page, limits)
}

fn collect_embedded_segments<'a>(
    data: &'a [u8],
    globals: Option<&'a [u8]>,
    limits: &options::Limits,
) -> error::Result<Vec<Segment<'a>>> {
    let mut segments = Vec::new();

    if let Some(globals_data) = globals {
        let mut reader = Reader::new(globals_data);
        parse_segments_sequential(&mut reader, &mut segments, limits)?;
    }

    let mut reader = Reader::new(data);
    parse_segments_sequential(&mut reader, &mut segments, limits)?;

    segments.sort_by_key(|seg| seg.header.segment_number);

    Ok(segments)
}

fn decode_with_segments(
    segments: &[Segment<'_>],
    page: u32,
    limits: &options::Limits,
) -> error::Result<Bitmap> {
    use crate::error::{FormatError, LimitError, SegmentError, bail};

    let mut pages_seen: u32 = 0;
    let mut decode_operations: u32 = 0;
    let mut total_symbols: u32 = 0;
    let standard_tables = StandardHuffmanTables::new();

    let height_from_stripes = segments
        .iter()
        .filter(|seg| {
            seg.header.segment_type == SegmentType::EndOfStripe
                && seg.header._page_association == page
        })
        .filter_map(|seg| u32::from_be_bytes(seg.data.try_into().ok()?).checked_add(1))
        .max();

    let mut ctx: Option<DecodeContext> = None;

    for seg in segments {
        if seg.header._page_association != 0 && seg.header._page_association != page {
            // Belongs to a different page than the one requested; skip, but
            // keep parsing so that later EndOfFile handling still works.
            if seg.header.segment_type == SegmentType::PageInformation {
                pages_seen += 1;
                if pages_seen > limits.max_pages {
                    bail!(LimitError::MaxPagesExceeded);
                }
            }
            continue;
        }

        let mut reader = Reader::new(seg.data);

        match seg.header.segment_type {
            SegmentType::PageInformation => {
                pages_seen += 1;
                if pages_seen > limits.max_pages {
                    bail!(LimitError::MaxPagesExceeded);
                }

                if ctx.is_none() {
                    ctx = Some(new_decode_context(&mut reader, height_from_stripes, limits)?);
                }
            }
            SegmentType::ImmediateGenericRegion | SegmentType::ImmediateLosslessGenericRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;
                let header = generic::parse(&mut reader)?;
                let region = generic::decode(&header)?;
                region
                    .bitmap
                    .compose_onto(&mut c.page_bitmap, region.combination_operator);
            }
            SegmentType::IntermediateGenericRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;
                let header = generic::parse(&mut reader)?;
                let region = generic::decode(&header)?;
                c.store_region(seg.header.segment_number, region.bitmap);
            }
            SegmentType::PatternDictionary => {
                if ctx.is_none() {
                    bail!(FormatError::MissingPageInfo);
                }
                decode_operations = check_decode_budget(decode_operations, limits)?;
                let dictionary = pattern::decode(&mut reader)?;
                ctx.as_mut()
                    .unwrap()
                    .store_pattern_dictionary(seg.header.segment_number, dictionary);
            }
            SegmentType::SymbolDictionary => {
                let c = ctx.as_ref().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;

                // "1) Concatenate all the input symbol dictionaries to form
                // SDINSYMS." (6.5.5, step 1)
                let input_symbols: Vec<&bitmap::Bitmap> = seg
                    .header
                    .referred_to_segments
                    .iter()
                    .filter_map(|&num| c.get_symbol_dictionary(num))
                    .flat_map(|dict| dict.exported_symbols.iter())
                    .collect();

                let referred_tables: Vec<HuffmanTable> = seg
                    .header
                    .referred_to_segments
                    .iter()
                    .filter_map(|&num| c.get_huffman_table(num))
                    .cloned()
                    .collect();

                let dictionary = symbol::decode(
                    &mut reader,
                    &input_symbols,
                    &referred_tables,
                    &standard_tables,
                )?;

                total_symbols = total_symbols
                    .checked_add(dictionary.exported_symbols.len() as u32)
                    .ok_or(LimitError::MaxSymbolsExceeded)?;
                if total_symbols > limits.max_symbols {
                    bail!(LimitError::MaxSymbolsExceeded);
                }

                ctx.as_mut()
                    .unwrap()
                    .store_symbol_dictionary(seg.header.segment_number, dictionary);
            }
            SegmentType::ImmediateTextRegion | SegmentType::ImmediateLosslessTextRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;

                let symbols: Vec<&bitmap::Bitmap> = seg
                    .header
                    .referred_to_segments
                    .iter()
                    .filter_map(|&num| c.get_symbol_dictionary(num))
                    .flat_map(|dict| dict.exported_symbols.iter())
                    .collect();

                let referred_tables: Vec<HuffmanTable> = seg
                    .header
                    .referred_to_segments
                    .iter()
                    .filter_map(|&num| c.get_huffman_table(num))
                    .cloned()
                    .collect();

                let region =
                    text::decode(&mut reader, &symbols, &referred_tables, &standard_tables)?;
                region
                    .bitmap
                    .compose_onto(&mut c.page_bitmap, region.combination_operator);
            }
            SegmentType::IntermediateTextRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;

                let symbols: Vec<&bitmap::Bitmap> = seg
                    .header
                    .referred_to_segments
                    .iter()
                    .filter_map(|&num| c.get_symbol_dictionary(num))
                    .flat_map(|dict| dict.exported_symbols.iter())
                    .collect();

                let referred_tables: Vec<HuffmanTable> = seg
                    .header
                    .referred_to_segments
                    .iter()
                    .filter_map(|&num| c.get_huffman_table(num))
                    .cloned()
                    .collect();

                let region =
                    text::decode(&mut reader, &symbols, &referred_tables, &standard_tables)?;
                c.store_region(seg.header.segment_number, region.bitmap);
            }
            SegmentType::ImmediateHalftoneRegion | SegmentType::ImmediateLosslessHalftoneRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;

                let pattern_dict = seg
                    .header
                    .referred_to_segments
                    .first()
                    .and_then(|&num| c.get_pattern_dictionary(num))
                    .ok_or(SegmentError::MissingPatternDictionary)?;

                let header = halftone::parse(&mut reader)?;
                let region = halftone::decode(&header, pattern_dict)?;
                region
                    .bitmap
                    .compose_onto(&mut c.page_bitmap, region.combination_operator);
            }
            SegmentType::IntermediateHalftoneRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;

                let pattern_dict = seg
                    .header
                    .referred_to_segments
                    .first()
                    .and_then(|&num| c.get_pattern_dictionary(num))
                    .ok_or(SegmentError::MissingPatternDictionary)?;

                let header = halftone::parse(&mut reader)?;
                let region = halftone::decode(&header, pattern_dict)?;
                c.store_region(seg.header.segment_number, region.bitmap);
            }
            SegmentType::IntermediateGenericRefinementRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;

                let reference = seg
                    .header
                    .referred_to_segments
                    .first()
                    .and_then(|&num| c.get_referred_segment(num))
                    .unwrap_or(&c.page_bitmap);

                let region = generic_refinement::decode(&mut reader, reference)?;
                c.store_region(seg.header.segment_number, region.bitmap);
            }
            SegmentType::ImmediateGenericRefinementRegion
            | SegmentType::ImmediateLosslessGenericRefinementRegion => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                decode_operations =
                    check_decode_budget(decode_operations, limits)?;

                // "2) If there are no referred-to segments, then use the page
                // bitmap as the reference buffer." (7.4.7.5)
                let reference = seg
                    .header
                    .referred_to_segments
                    .first()
                    .and_then(|&num| c.get_referred_segment(num))
                    .unwrap_or(&c.page_bitmap);

                let region = generic_refinement::decode(&mut reader, reference)?;
                region
                    .bitmap
                    .compose_onto(&mut c.page_bitmap, region.combination_operator);
            }
            SegmentType::Tables => {
                let c = ctx.as_mut().ok_or(FormatError::MissingPageInfo)?;
                let table = HuffmanTable::read_custom(&mut reader, limits.max_huffman_table_lines)?;
                c.store_huffman_table(seg.header.segment_number, table);
            }
            SegmentType::Extension => {
                log::debug!(
                    "skipping extension segment {}",
                    seg.header.segment_number
                );
            }
            SegmentType::EndOfPage => {
                if seg.header._page_association == page {
                    break;
                }
            }
            SegmentType::EndOfFile => {
                break;
            }
            SegmentType::EndOfStripe | SegmentType::Profiles | SegmentType::ColourPalette => {
                log::debug!(
                    "skipping segment {} of type {:?}",
                    seg.header.segment_number,
                    seg.header.segment_type
                );
            }
        }
    }

    let ctx = ctx.ok_or(FormatError::MissingPageInfo)?;

    Ok(Bitmap::from_internal(&ctx.page_bitmap))
}

fn check_decode_budget(count: u32, limits: &options::Limits) -> error::Result<u32> {
    use crate::error::{LimitError, bail};

    let next = count.checked_add(1).ok_or(LimitError::MaxDecodeOperationsExceeded)?;
    if next > limits.max_decode_operations {
        bail!(LimitError::MaxDecodeOperationsExceeded);
    }
    Ok(next)
}

fn check_bitmap_dimensions(width: u32, height: u32, limits: &options::Limits) -> error::Result<()> {
    use crate::error::{LimitError, bail};

    if width > limits.max_width {
        bail!(LimitError::MaxWidthExceeded);
    }
    if height > limits.max_height {
        bail!(LimitError::MaxHeightExceeded);
    }
    if (width as u64) * (height as u64) > limits.max_pixels {
        bail!(LimitError::MaxPixelsExceeded);
    }
    Ok(())
}

/// Per-page decoding context: the page bitmap plus the intermediate
/// segment results (regions, dictionaries, tables) available for later
/// referred-to lookup.
struct DecodeContext {
    page_bitmap: bitmap::Bitmap,
    referred_segments: Vec<(u32, bitmap::Bitmap)>,
    pattern_dictionaries: Vec<(u32, pattern::PatternDictionary)>,
    symbol_dictionaries: Vec<(u32, symbol::SymbolDictionary)>,
    huffman_tables: Vec<(u32, HuffmanTable)>,
}

impl DecodeContext {
    fn store_region(&mut self, segment_number: u32, region: bitmap::Bitmap) {
        self.referred_segments.push((segment_number, region));
    }

    fn get_referred_segment(&self, segment_number: u32) -> Option<&bitmap::Bitmap> {
        self.referred_segments
            .binary_search_by_key(&segment_number, |(num, _)| *num)
            .ok()
            .map(|idx| &self.referred_segments[idx].1)
    }

    fn store_pattern_dictionary(
        &mut self,
        segment_number: u32,
        dictionary: pattern::PatternDictionary,
    ) {
        self.pattern_dictionaries.push((segment_number, dictionary));
    }

    fn get_pattern_dictionary(&self, segment_number: u32) -> Option<&pattern::PatternDictionary> {
        self.pattern_dictionaries
            .binary_search_by_key(&segment_number, |(num, _)| *num)
            .ok()
            .map(|idx| &self.pattern_dictionaries[idx].1)
    }

    fn store_symbol_dictionary(
        &mut self,
        segment_number: u32,
        dictionary: symbol::SymbolDictionary,
    ) {
        self.symbol_dictionaries.push((segment_number, dictionary));
    }

    fn get_symbol_dictionary(&self, segment_number: u32) -> Option<&symbol::SymbolDictionary> {
        self.symbol_dictionaries
            .binary_search_by_key(&segment_number, |(num, _)| *num)
            .ok()
            .map(|idx| &self.symbol_dictionaries[idx].1)
    }

    fn store_huffman_table(&mut self, segment_number: u32, table: HuffmanTable) {
        self.huffman_tables.push((segment_number, table));
    }

    fn get_huffman_table(&self, segment_number: u32) -> Option<&HuffmanTable> {
        self.huffman_tables
            .binary_search_by_key(&segment_number, |(num, _)| *num)
            .ok()
            .map(|idx| &self.huffman_tables[idx].1)
    }
}

fn new_decode_context(
    reader: &mut Reader<'_>,
    height_from_stripes: Option<u32>,
    limits: &options::Limits,
) -> error::Result<DecodeContext> {
    use crate::error::{DecodeError, FormatError, bail};

    let page_info = parse_page_information(reader)?;

    // Coloured pages and pages requiring auxiliary buffers are real T.88
    // features (7.4.8.5 bits 5 and 7) this decoder doesn't implement.
    if page_info.flags.might_contain_coloured || page_info.flags.requires_auxiliary_buffers {
        bail!(DecodeError::Unsupported);
    }

    // "A page's bitmap height may be declared in its page information
    // segment to be unknown (by specifying a height of 0xFFFFFFFF). In
    // this case, the page must be striped." (7.4.8.2)
    let height = if page_info.height == 0xFFFF_FFFF {
        height_from_stripes.ok_or(FormatError::UnknownPageHeight)?
    } else {
        page_info.height
    };

    check_bitmap_dimensions(page_info.width, height, limits)?;

    log::debug!(
        "page information: {}x{}, default pixel {}",
        page_info.width,
        height,
        page_info.flags.default_pixel
    );

    let page_bitmap = bitmap::Bitmap::new_with(
        page_info.width,
        height,
        0,
        0,
        page_info.flags.default_pixel != 0,
    );

    Ok(DecodeContext {
        page_bitmap,
        referred_segments: Vec::new(),
        pattern_dictionaries: Vec::new(),
        symbol_dictionaries: Vec::new(),
        huffman_tables: Vec::new(),
    })
}
