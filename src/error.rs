//! Error kinds at the crate's external boundary.
//!
//! Grounded in the dependency tables of the wider example pack
//! (`freddiehaddad-oxidized`, `rerun-io-rerun` both derive their error
//! enums with `thiserror`); the teacher itself is zero-dependency and
//! has no error type of its own to port. The variant set is spec.md
//! §7's five kinds verbatim, plus an internal-only
//! `CellPoolExhausted` used by the rasterizer's band-retry loop
//! (never surfaced past `rasterize`, per spec.md §7's propagation
//! policy: two consecutive overflows "abort the shape with an empty
//! RLE", not an `Err` the caller sees).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unsupported: {0}")]
    NonSupport(String),

    #[error("operation requires a precondition that wasn't met: {0}")]
    InsufficientCondition(String),

    #[error("internal invariant violated: {0}")]
    MemoryCorruption(String),

    #[error("back-end specific failure: {0}")]
    Unknown(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Internal-only signal that a band's cell pool ran out of room.
/// Callers of the public rasterizer API never see this: the band loop
/// in `rle` catches it, halves the band, and retries (spec.md §4.5,
/// §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CellPoolExhausted;
