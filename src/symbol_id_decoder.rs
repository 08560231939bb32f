//! Symbol ID (IAID) decoder (A.3).
//!
//! Used by symbol dictionary refinement/aggregate coding and by text region
//! decoding to pick which symbol a given instance refers to; both callers
//! immediately need the result as an index into a symbol bitmap slice, so
//! this also offers a bounds-checked variant of `decode`.

use alloc::vec;
use alloc::vec::Vec;

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::error::{Result, SymbolError};

pub(crate) struct SymbolIdDecoder {
    contexts: Vec<Context>,
    code_len: u32,
}

impl SymbolIdDecoder {
    pub(crate) fn new(code_len: u32) -> Self {
        // A.3: "The number of contexts required is 2^SBSYMCODELEN, which is less
        // than twice the maximum symbol ID."
        let num_contexts = 1_usize << code_len;

        Self {
            contexts: vec![Context::default(); num_contexts],
            code_len,
        }
    }

    #[inline(always)]
    pub(crate) fn decode(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> u32 {
        let mut prev = 1_u32;

        for _ in 0..self.code_len {
            let ctx_mask = (1_u32 << (self.code_len + 1)) - 1;
            let ctx_idx = (prev & ctx_mask) as usize;
            let d = decoder.decode(&mut self.contexts[ctx_idx]);

            prev = (prev << 1) | d;
        }

        prev -= 1 << self.code_len;
        prev
    }

    /// Decode a symbol ID and check it against the number of symbols actually
    /// available, since `SBSYMCODELEN` only bounds the ID by the next power
    /// of two and a malformed stream can still point past the end of `SBSYMS`.
    #[inline]
    pub(crate) fn decode_checked(
        &mut self,
        decoder: &mut ArithmeticDecoder<'_>,
        num_symbols: usize,
    ) -> Result<usize> {
        let id = self.decode(decoder) as usize;
        if id >= num_symbols {
            return Err(SymbolError::OutOfRange.into());
        }
        Ok(id)
    }
}
