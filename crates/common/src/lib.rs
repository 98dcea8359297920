//! # common - shared store-file primitives
//!
//! Building blocks used by every store codec in this workspace:
//!
//! - [`crc`] — reflected CRC-32 (IEEE polynomial) with seed chaining, the
//!   checksum every store stamps on metadata pages, slab labels and records
//! - [`framing`] — fixed-width framing helpers: null-padded strings,
//!   exact reads that tolerate EOF, zero-fill, alignment math
//! - [`slab`] — the 128-byte `AMPSSLAB` container label shared by all
//!   slab-allocated store versions
//! - [`gz`] — plain vs. gzip input selection and whole-file
//!   compress/decompress used by the upgrade drivers
//! - [`time`] — store timestamps (microseconds since 1601-01-01 UTC) to
//!   ISO-8601 text
//! - [`summary`] — per-file and per-slab counters reported by the dump
//!   surfaces
//! - [`error`] — the codec-level error type
//!
//! Every store file starts with a metadata page of [`PAGE_SIZE`] bytes whose
//! leading magic string selects the on-disk version.

pub mod crc;
pub mod error;
pub mod framing;
pub mod gz;
pub mod options;
pub mod slab;
pub mod summary;
pub mod time;

pub use error::{Result, StoreError};
pub use options::DumpOptions;

/// Size of the metadata page at the head of every store file.
pub const PAGE_SIZE: u64 = 4096;

/// Record and slab-label alignment. `allocated` is always a multiple of this.
pub const ALIGN_SIZE: u64 = 128;

/// Smallest slab a writer will emit; shorter slabs are zero-padded up to it.
pub const MIN_SLAB_SIZE: u64 = 144 * 1024;

/// Slack the writers leave after the last variable-width field of a record.
pub const DEFAULT_PADDING: u64 = 16;

#[cfg(test)]
mod tests;
