//! # journal - transaction-log file codec
//!
//! The journal is the server's append-only transaction log. Eight on-disk
//! versions exist (`amps::txlog/v1` through `amps::txlog/v8`); this crate
//! reads all of them and writes the latest.
//!
//! A journal file is laid out as two 512-byte metadata pages (header and
//! extents) followed by records in 256-byte transaction units. Version 4
//! moved the first record to offset 4096 and introduced `noop` padding
//! records so a file always ends on a 4096-byte transaction boundary.
//! Version 5 replaced the per-record SOW key with an expiration and added
//! reverse-traversal sizes; version 7 widened the extents page with
//! timestamps and moved record flags into the fixed header.
//!
//! Journal files are frequently archived gzip-compressed; `upgrade`
//! transparently unwraps a `.gz` source and rewraps a `.gz` destination.

mod reader;
mod record;
mod writer;

pub use reader::{Extents, JournalReader, Records, SourceExtents};
pub use record::{flags_str, message_type_name, JournalRecord, RecordType};
pub use writer::JournalWriter;

use anyhow::Context;
use common::{gz, DumpOptions, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Version string stamped by [`JournalWriter`].
pub const LATEST_VERSION: &str = "amps::txlog/v8";

/// Numeric version stamped by [`JournalWriter`].
pub const WRITER_VERSION: u32 = 8;

/// Size of each of the two leading metadata pages.
pub const METADATA_SIZE: u64 = 512;

/// Fixed record-header size of the latest version.
pub const TX_HEADER_SIZE: usize = 120;

/// Journal records are sized in units of this many bytes.
pub const MIN_TX_SIZE: usize = 256;

/// Offset of the first record; files are padded to multiples of this.
pub const TX_OFFSET: u64 = 4096;

pub(crate) const COMPRESSION_TYPE: &str = "gz";
pub(crate) const COMPRESSION_OPTIONS: u64 = 9;

/// Returns the version string of the journal file at `path`.
pub fn version(path: &Path) -> Result<String> {
    Ok(JournalReader::open(path)?.version_string().to_string())
}

/// Returns `true` when the file is already at the latest version.
pub fn is_up_to_date(path: &Path) -> Result<bool> {
    Ok(version(path)? == LATEST_VERSION)
}

fn strip_gz(path: &Path) -> PathBuf {
    path.with_extension("")
}

fn upgrade_uncompressed(old: &Path, new: &Path) -> anyhow::Result<()> {
    let mut reader = JournalReader::open(old)
        .with_context(|| format!("failed to open journal {}", old.display()))?;
    let mut writer = JournalWriter::create(new, reader.instance_id(), reader.extents())?;
    for rec in reader.records() {
        // alignment noops carry no data; the writer re-pads on close
        if rec.rtype == RecordType::Noop {
            continue;
        }
        writer.write(&rec)?;
    }
    writer.close()?;
    Ok(())
}

/// Upgrades the journal file at `old` into a latest-version file at `new`.
///
/// A file already at the latest version is copied byte for byte. `.gz`
/// sources are decompressed next to the input first and `.gz` destinations
/// recompressed after the plain upgrade, matching how journal archives are
/// stored.
pub fn upgrade(old: &Path, new: &Path) -> anyhow::Result<()> {
    if is_up_to_date(old).with_context(|| format!("failed to open {}", old.display()))? {
        fs::copy(old, new)?;
        return Ok(());
    }
    match (gz::is_gzip_path(old), gz::is_gzip_path(new)) {
        (false, false) => upgrade_uncompressed(old, new),
        (false, true) => {
            let plain_new = strip_gz(new);
            upgrade_uncompressed(old, &plain_new)?;
            gz::compress_file(&plain_new, new)?;
            fs::remove_file(&plain_new)?;
            Ok(())
        }
        (true, to_gz) => {
            let plain_old = strip_gz(old);
            gz::decompress_file(old, &plain_old)?;
            let result = if to_gz {
                let plain_new = strip_gz(new);
                upgrade_uncompressed(&plain_old, &plain_new)
                    .and_then(|_| {
                        gz::compress_file(&plain_new, new)?;
                        fs::remove_file(&plain_new)?;
                        Ok(())
                    })
            } else {
                upgrade_uncompressed(&plain_old, new)
            };
            fs::remove_file(&plain_old)?;
            result
        }
    }
}

/// Dumps the records of a journal file, then entry and byte totals.
///
/// Noop padding records are never shown. `opts.start`/`opts.stop` bound
/// the printed entry indexes; `opts.extents` appends the replication
/// source extents observed in the file.
pub fn dump<W: io::Write>(path: &Path, opts: &DumpOptions, out: &mut W) -> anyhow::Result<()> {
    let mut reader = JournalReader::open(path)
        .with_context(|| format!("failed to open journal {}", path.display()))?;
    writeln!(out, "{}", reader.format_extents(opts.localtime))?;

    let file_size = reader.file_size();
    let header_extents = reader.extents();
    let mut entries = 0u64;
    let mut byte_count = 0u64;
    let mut unknown_commands = 0u64;
    let mut unknown_message_types = 0u64;
    let mut last_tx_id = 0u64;

    for rec in reader.records() {
        if rec.rtype == RecordType::Noop {
            continue;
        }
        if matches!(rec.rtype, RecordType::Unknown(_)) {
            unknown_commands += 1;
        }
        if message_type_name(rec.message_type_hash).ends_with("(unknown)") {
            unknown_message_types += 1;
        }
        if entries >= opts.start && opts.stop.map_or(true, |stop| entries <= stop) {
            writeln!(out, "{}", rec.render(entries, opts))?;
        }
        byte_count = rec.offset + rec.size as u64;
        last_tx_id = rec.local_tx_id;
        entries += 1;
    }

    if opts.extents && !reader.source_extents().is_empty() {
        writeln!(out, "Replication Source Info:")?;
        for (hash, ext) in reader.source_extents() {
            writeln!(
                out,
                "Replication Source {}: {}",
                String::from_utf8_lossy(&ext.path),
                hash
            )?;
        }
        writeln!(out, "\nReplication Extents Info:")?;
        writeln!(
            out,
            "Local Extents: [{}:{}]",
            header_extents.first, header_extents.last
        )?;
        for ext in reader.source_extents().values() {
            writeln!(
                out,
                "Source {} Extents: [{}:{}]",
                String::from_utf8_lossy(&ext.path),
                ext.first,
                ext.last
            )?;
        }
        writeln!(out, "_____________________________________________________")?;
    }

    if entries > 0 && last_tx_id > header_extents.last {
        writeln!(out, "\n*****************************************************")?;
        writeln!(
            out,
            "NOTE: This is the active journal, and may change during\n\
             the dump process. Extents may not be fully written, and\n\
             reported counts and actual counts may differ."
        )?;
        writeln!(out, "*****************************************************\n")?;
    }

    writeln!(out, "Total Entries    : {}", entries)?;
    writeln!(out, "Total Bytes      : {}", byte_count)?;
    writeln!(out, "Remaining Bytes  : {}", file_size.saturating_sub(byte_count))?;
    if unknown_commands > 0 {
        writeln!(
            out,
            "WARNING: {} messages with unknown command type.",
            unknown_commands
        )?;
    }
    if unknown_message_types > 0 {
        writeln!(
            out,
            "WARNING: {} messages with unknown message type.",
            unknown_message_types
        )?;
    }
    Ok(())
}
