//! Reflected CRC-32 (IEEE polynomial, `0xEDB88320`) over byte ranges.
//!
//! The store formats use two seed conventions: metadata pages and slab
//! labels are checksummed from seed `0`, while records (and the journal
//! header pages) chain from [`RECORD_SEED`]. Passing a previous result as
//! the seed continues the computation, so large regions can be checksummed
//! incrementally.

use crc32fast::Hasher;

/// Seed used for record-scope checksums.
pub const RECORD_SEED: u32 = 0xFFFF_FFFF;

/// CRC-32 of `bytes`, continuing from `seed` (`0` starts a fresh checksum).
pub fn crc32(bytes: &[u8], seed: u32) -> u32 {
    let mut hasher = Hasher::new_with_initial(seed);
    hasher.update(bytes);
    hasher.finalize()
}

/// CRC-32 of `bytes[offset..end]`, continuing from `seed`.
///
/// `end` is clamped to the buffer length so a record whose declared data
/// size reaches past a truncated read still produces a deterministic (and
/// mismatching) checksum instead of panicking.
pub fn crc32_range(bytes: &[u8], seed: u32, offset: usize, end: usize) -> u32 {
    let end = end.min(bytes.len());
    let offset = offset.min(end);
    crc32(&bytes[offset..end], seed)
}
