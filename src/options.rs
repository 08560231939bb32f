//! Decoder configuration and resource limits.

/// Configuration accepted by the crate's top-level `decode` functions.
///
/// `Options::default()` is a safe choice for untrusted input: it enables
/// all conservative `Limits` and is the configuration callers should reach
/// for unless they have a specific reason not to.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Resource limits enforced while parsing and decoding.
    pub limits: Limits,
}

/// Resource limits enforced while decoding a JBIG2 stream.
///
/// Every field bounds a quantity that an adversarial or corrupted input
/// could otherwise inflate to exhaust memory or CPU time well beyond the
/// size of the compressed input. Defaults are chosen generously enough for
/// legitimate scanned-document pages while still bounding worst-case
/// amplification; callers decoding from a trusted source (e.g. their own
/// encoder) can raise individual fields to `u32::MAX` to disable a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum page or region bitmap width, in pixels.
    pub max_width: u32,
    /// Maximum page or region bitmap height, in pixels.
    pub max_height: u32,
    /// Maximum page bitmap area, in pixels (`width * height`).
    pub max_pixels: u64,
    /// Maximum number of segments in a single decode.
    pub max_segments: u32,
    /// Maximum number of pages processed (page information segments seen).
    pub max_pages: u32,
    /// Maximum declared length of a single segment's data part, in bytes.
    pub max_segment_data_length: u32,
    /// Maximum number of segments a single segment may refer to.
    pub max_referred_segments: u32,
    /// Maximum total number of symbol/region decode invocations.
    pub max_decode_operations: u32,
    /// Maximum number of lines in a custom Huffman table (7.4.13, B.2).
    pub max_huffman_table_lines: u32,
    /// Maximum total number of symbols across all symbol dictionaries.
    pub max_symbols: u32,
    /// Maximum iteration count for internally bounded loops (e.g. height
    /// classes, strips, halftone grid cells) that are otherwise bounded
    /// only by attacker-controlled counts read from the stream.
    pub max_loop_iterations: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_width: 1 << 16,
            max_height: 1 << 16,
            max_pixels: 1 << 28,
            max_segments: 1 << 16,
            max_pages: 1 << 10,
            max_segment_data_length: 1 << 28,
            max_referred_segments: 256,
            max_decode_operations: 1 << 20,
            max_huffman_table_lines: 1 << 12,
            max_symbols: 1 << 20,
            max_loop_iterations: 1 << 24,
        }
    }
}
