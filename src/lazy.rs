//! Deferred construction for the 15 standard Huffman tables of Annex B.
//!
//! `StandardTables` holds one of these per table (B.1-B.15). Building all 15
//! up front would waste work for streams that only touch SDHUFF=0 paths or a
//! handful of Huffman-coded fields, so each table is built from its `TableLine`
//! definition the first time a decoder actually asks for it.

/// With `std`, defer construction until first use and cache it.
#[cfg(feature = "std")]
#[derive(Debug)]
pub(crate) struct Lazy<T>(std::cell::OnceCell<T>);

#[cfg(feature = "std")]
impl<T> Lazy<T> {
    pub(crate) fn new(_builder: impl FnOnce() -> T) -> Self {
        Self(std::cell::OnceCell::new())
    }

    pub(crate) fn get(&self, builder: impl FnOnce() -> T) -> &T {
        self.0.get_or_init(builder)
    }
}

/// Without `std` there's no `OnceCell`, so just build eagerly; `no_std` targets
/// for this crate are typically embedded decoders that build one
/// `StandardTables` and keep it for the process lifetime anyway.
#[cfg(not(feature = "std"))]
#[derive(Debug)]
pub(crate) struct Lazy<T>(T);

#[cfg(not(feature = "std"))]
impl<T> Lazy<T> {
    pub(crate) fn new(builder: impl FnOnce() -> T) -> Self {
        Self(builder())
    }

    pub(crate) fn get(&self, _builder: impl FnOnce() -> T) -> &T {
        &self.0
    }
}
