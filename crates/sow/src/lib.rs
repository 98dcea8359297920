//! # sow - state-of-the-world store codec
//!
//! A SOW file holds the latest value per keyed topic. Six on-disk versions
//! exist; this crate decodes all of them and writes the latest.
//!
//! ## Version history
//!
//! | Version | Header magic            | Layout                                  |
//! |---------|-------------------------|-----------------------------------------|
//! | 1.0     | `amps::amps_pstore/1.0` | flat record array, 56-byte prefixes     |
//! | 2.0     | `persist::gpstore/1.0`  | flat array, validity stamp per record   |
//! | 2.1     | `persist::gpstore/1.1`  | flat array                              |
//! | 3.0     | `persist::gpstore/3.0`  | flat array, adds expiration             |
//! | 4.0     | `amps-sow-v1.0`         | slab-allocated, per-record CRC          |
//! | 5.0     | `amps-sow-v2.0`         | slabs, adds string key / correlation id |
//! | 6.0     | `amps-sow-v3.0`         | slabs, adds compression metadata        |
//!
//! Flat versions pack fixed-size cells immediately after the 4096-byte
//! metadata page; a record may span several cells. Slab versions group
//! 128-byte-aligned records inside `AMPSSLAB`-labelled containers.
//!
//! Readers normalize every version into [`SowRecord`]; the writer only
//! emits version 6.0, so upgrading any file is "stream records from a
//! reader into a writer".

mod reader;
mod record;
mod writer;

#[cfg(test)]
mod tests;

pub use reader::{Records, SowReader};
pub use record::SowRecord;
pub use writer::SowWriter;

use anyhow::Context;
use common::{gz, DumpOptions, Result, StoreError};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Version string stamped by [`SowWriter`].
pub const LATEST_VERSION_STRING: &str = "amps-sow-v3.0";

/// Default record size used by `upgrade` when the caller has no opinion.
pub const DEFAULT_RECORD_SIZE: u64 = 512;

/// Default increment (records per slab) used by `upgrade`.
pub const DEFAULT_INCREMENT_SIZE: u64 = 10_000;

/// On-disk SOW format versions, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SowVersion {
    V1,
    V2,
    V21,
    V3,
    V4,
    V5,
    V6,
}

impl SowVersion {
    /// Selects the version from the magic string at the head of the
    /// metadata page.
    pub fn from_header(header: &[u8]) -> Option<SowVersion> {
        let m = |magic: &[u8]| header.starts_with(magic);
        if m(b"amps::amps_pstore/1.0") {
            Some(SowVersion::V1)
        } else if m(b"persist::gpstore/1.0") {
            Some(SowVersion::V2)
        } else if m(b"persist::gpstore/1.1") {
            Some(SowVersion::V21)
        } else if m(b"persist::gpstore/3.0") {
            Some(SowVersion::V3)
        } else if m(b"amps-sow-v1.0") {
            Some(SowVersion::V4)
        } else if m(b"amps-sow-v2.0") {
            Some(SowVersion::V5)
        } else if m(b"amps-sow-v3.0") {
            Some(SowVersion::V6)
        } else {
            None
        }
    }

    /// Returns `true` for slab-allocated versions.
    pub fn is_slab(&self) -> bool {
        matches!(self, SowVersion::V4 | SowVersion::V5 | SowVersion::V6)
    }

    /// Largest valid record flags value for this version; anything above
    /// marks a malformed cell.
    pub fn max_record_flags(&self) -> u32 {
        match self {
            SowVersion::V4 => 15,
            SowVersion::V5 => 7,
            SowVersion::V6 => 31,
            _ => 0,
        }
    }
}

impl fmt::Display for SowVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SowVersion::V1 => "1.0",
            SowVersion::V2 => "2.0",
            SowVersion::V21 => "2.1",
            SowVersion::V3 => "3.0",
            SowVersion::V4 => "4.0",
            SowVersion::V5 => "5.0",
            SowVersion::V6 => "6.0",
        };
        f.write_str(s)
    }
}

/// Returns the on-disk version of the SOW file at `path`.
pub fn version(path: &Path) -> Result<SowVersion> {
    let mut input = gz::open_input(path)?;
    let mut header = vec![0u8; common::PAGE_SIZE as usize];
    let n = common::framing::read_exact_or_eof(&mut *input, &mut header)?;
    SowVersion::from_header(&header[..n]).ok_or_else(|| StoreError::unrecognized(&header[..n]))
}

/// Returns `true` when the file is already at the latest version.
pub fn is_up_to_date(path: &Path) -> Result<bool> {
    Ok(version(path)? == SowVersion::V6)
}

/// Upgrades the SOW file at `old` into a latest-version file at `new`.
///
/// A file already at the latest version is copied byte for byte. Otherwise
/// every record of the source is streamed into a [`SowWriter`], and the
/// last-sync transaction id is carried forward (the source's persisted
/// marker when it has one, else the highest transaction id written).
/// A `.gz` destination is produced by compressing the finished plain file.
pub fn upgrade(old: &Path, new: &Path, record_size: u64, increment_size: u64) -> anyhow::Result<()> {
    if is_up_to_date(old).with_context(|| format!("failed to open {}", old.display()))? {
        fs::copy(old, new)?;
        return Ok(());
    }

    let mut reader = SowReader::open(old)?;
    let last_sync = reader.last_sync_tx_id()?;

    let plain_new = if gz::is_gzip_path(new) {
        new.with_extension("")
    } else {
        new.to_path_buf()
    };

    let mut writer = SowWriter::create(&plain_new, record_size, increment_size)?;
    let mut last_tx_id = 0u64;
    for rec in reader.records() {
        writer.write(&rec)?;
        last_tx_id = last_tx_id.max(rec.seq);
    }
    if last_sync != 0 {
        writer.write_last_sync_tx_id(last_sync)?;
    } else {
        writer.write_last_sync_tx_id(last_tx_id)?;
    }
    writer.close()?;

    if gz::is_gzip_path(new) {
        gz::compress_file(&plain_new, new)
            .with_context(|| format!("failed to compress {}", new.display()))?;
        fs::remove_file(&plain_new)?;
    }
    Ok(())
}

/// Dumps the records of a SOW file followed by the file summary.
pub fn dump<W: io::Write>(path: &Path, opts: &DumpOptions, out: &mut W) -> anyhow::Result<()> {
    let mut reader = SowReader::open(path)?;
    let mut printed = 0u64;
    for rec in reader.records() {
        if opts.limit.is_some_and(|limit| printed >= limit) {
            continue; // keep consuming so the summary counters are complete
        }
        if let Some(text) = rec.render(opts) {
            writeln!(out, "{}", text)?;
            printed += 1;
        }
    }
    write!(out, "{}", reader.summary().render())?;
    Ok(())
}
