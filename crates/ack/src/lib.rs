//! # ack - client-acknowledgment store codec
//!
//! The ack store persists one delivery cursor per client: the client name
//! hash, the highest acknowledged client sequence number and the local
//! transaction id it maps to. Recovery replays the journal from these
//! cursors.
//!
//! Two dialects exist on disk:
//!
//! - **legacy, store version 2.1** (`persist::gpstore/1.1` or
//!   `persist::gpstore/3.0` magic): fixed-size records packed in a flat
//!   array after the metadata page
//! - **latest, store version 4.0** (`amps-store-v1.0` magic):
//!   slab-allocated records with per-record CRCs and an opaque payload
//!
//! Readers normalize both into [`AckRecord`]; the writer emits 4.0 only.

mod reader;
mod record;
mod writer;

pub use reader::{AckReader, Records};
pub use record::AckRecord;
pub use writer::AckWriter;

use anyhow::Context;
use common::{gz, DumpOptions, Result, StoreError};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Version string stamped by [`AckWriter`].
pub const LATEST_VERSION_STRING: &str = "amps-store-v1.0";

/// On-disk ack store versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckVersion {
    V21,
    V40,
}

impl AckVersion {
    pub fn from_header(header: &[u8]) -> Option<AckVersion> {
        if header.starts_with(b"persist::gpstore/1.1") || header.starts_with(b"persist::gpstore/3.0")
        {
            Some(AckVersion::V21)
        } else if header.starts_with(b"amps-store-v1.0") {
            Some(AckVersion::V40)
        } else {
            None
        }
    }
}

impl fmt::Display for AckVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AckVersion::V21 => "2.1",
            AckVersion::V40 => "4.0",
        })
    }
}

/// Returns the store version of the ack file at `path`.
pub fn version(path: &Path) -> Result<AckVersion> {
    let mut input = gz::open_input(path)?;
    let mut header = vec![0u8; common::PAGE_SIZE as usize];
    let n = common::framing::read_exact_or_eof(&mut *input, &mut header)?;
    AckVersion::from_header(&header[..n]).ok_or_else(|| StoreError::unrecognized(&header[..n]))
}

/// Returns `true` when the file is already at the latest version.
pub fn is_up_to_date(path: &Path) -> Result<bool> {
    Ok(version(path)? == AckVersion::V40)
}

/// Upgrades the ack file at `old` into a latest-version file at `new`.
///
/// Bookkeeping-only cursors (`client_seq == 0`) are no longer needed and
/// are dropped. A file already at the latest version is copied byte for
/// byte.
pub fn upgrade(old: &Path, new: &Path) -> anyhow::Result<()> {
    if is_up_to_date(old).with_context(|| format!("failed to open {}", old.display()))? {
        fs::copy(old, new)?;
        return Ok(());
    }

    let mut reader = AckReader::open(old)?;
    let plain_new = if gz::is_gzip_path(new) {
        new.with_extension("")
    } else {
        new.to_path_buf()
    };
    let mut writer = AckWriter::create(&plain_new, reader.record_size())?;
    for rec in reader.records() {
        if rec.client_seq == 0 {
            continue;
        }
        writer.write(&rec)?;
    }
    writer.close()?;

    if gz::is_gzip_path(new) {
        gz::compress_file(&plain_new, new)?;
        fs::remove_file(&plain_new)?;
    }
    Ok(())
}

/// Dumps the records of an ack file followed by the file summary.
pub fn dump<W: io::Write>(path: &Path, opts: &DumpOptions, out: &mut W) -> anyhow::Result<()> {
    let mut reader = AckReader::open(path)?;
    let legacy = reader.version() == AckVersion::V21;
    let mut printed = 0u64;
    for rec in reader.records() {
        if opts.limit.is_some_and(|limit| printed >= limit) {
            continue;
        }
        writeln!(out, "{}", rec.render(legacy))?;
        printed += 1;
    }
    write!(out, "{}", reader.summary().render())?;
    Ok(())
}
