//! # queue - queue-acknowledgment store codec
//!
//! The queue store persists one recovery point per (client, queue topic):
//! alongside the client cursor fields of the ack store it records the
//! queue topic hash, the creation transaction and its timestamp, plus an
//! opaque recovery-point payload.
//!
//! Only one on-disk version has ever shipped (`amps-store-v1.0`,
//! slab-allocated, 80-byte record headers), so there is no upgrade path;
//! the crate offers reading, writing and the dump/version surfaces.
//!
//! ## Record layout
//!
//! ```text
//! crc: u32 | flags: u32 | data_len: u32 | allocated: u32 |
//! slab_offset: u64 | generation_count: u64 | client_name_hash: u64 |
//! client_seq: u64 | local_tx_id: u64 | topic_hash: u64 |
//! creation_tx_id: u64 | creation_timestamp: u64 | data[data_len]
//! ```
//!
//! The CRC covers everything after itself up to the end of the payload,
//! seed `0xFFFF_FFFF`.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use common::crc::{crc32, crc32_range, RECORD_SEED};
use common::framing::{align_up, fill_zeros, padded_str, put_padded, read_exact_or_eof};
use common::gz::{self, ReadSeek};
use common::slab::{read_label, SlabLabel, SLAB_LABEL_SIZE};
use common::summary::{FileSummary, SlabDetail};
use common::time;
use common::{
    DumpOptions, Result, StoreError, DEFAULT_PADDING, MIN_SLAB_SIZE, PAGE_SIZE,
};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// Version string stamped by [`QueueWriter`].
pub const LATEST_VERSION_STRING: &str = "amps-store-v1.0";

const RECORD_HEADER_SIZE: usize = 80;
const MAX_RECORD_FLAGS: u32 = 1;
const INCREMENT_SIZE: u64 = 512;

/// Queue slabs grow larger than ack slabs before closing.
const SLAB_MAX_SIZE: u64 = 1_282_048;

/// One queue recovery point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueRecord {
    pub crc: u32,
    pub flags: u32,
    pub data_len: u32,
    pub allocated: u64,
    pub slab_offset: u64,
    pub generation_count: u64,
    pub client_name_hash: u64,
    pub client_seq: u64,
    pub local_tx_id: u64,
    pub topic_hash: u64,
    pub creation_tx_id: u64,
    pub creation_timestamp: u64,
    pub total_offset: u64,
    pub data: Vec<u8>,
}

impl QueueRecord {
    /// Renders the record for a dump.
    pub fn render(&self, opts: &DumpOptions) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "topic hash         = {}", self.topic_hash);
        let _ = writeln!(s, "crc                = {}", self.crc);
        let _ = writeln!(s, "flags              = {}", self.flags);
        let _ = writeln!(s, "file offset        = {}", self.total_offset);
        let _ = writeln!(s, "slab offset        = {}", self.slab_offset);
        let _ = writeln!(s, "allocated          = {}", self.allocated);
        let _ = writeln!(s, "data length        = {}", self.data_len);
        let _ = writeln!(s, "generation         = {}", self.generation_count);
        let _ = writeln!(s, "client             = {}", self.client_name_hash);
        let _ = writeln!(s, "client seq         = {}", self.client_seq);
        let _ = writeln!(s, "local txid         = {}", self.local_tx_id);
        let _ = writeln!(s, "creation txid      = {}", self.creation_tx_id);
        let _ = writeln!(
            s,
            "creation_timestamp = {}",
            time::iso_timestamp(self.creation_timestamp, opts.localtime)
        );
        let _ = write!(
            s,
            "recovery point     = {}",
            String::from_utf8_lossy(&self.data)
        );
        s
    }
}

/// A readable queue store file.
pub struct QueueReader {
    input: Box<dyn ReadSeek>,
    record_size: u64,
    increment_size: u64,
    size: u64,
    meta_generation: u64,
    summary: FileSummary,
    validate: bool,
}

impl QueueReader {
    /// Opens `path` (plain or `.gz`) with record CRC validation enabled.
    pub fn open(path: &Path) -> Result<QueueReader> {
        QueueReader::open_with(path, true)
    }

    /// Opens `path`, optionally skipping record CRC validation.
    pub fn open_with(path: &Path, validate: bool) -> Result<QueueReader> {
        let mut input = gz::open_input(path)?;
        let mut header = vec![0u8; PAGE_SIZE as usize];
        let n = read_exact_or_eof(&mut *input, &mut header)?;
        if n < header.len() || !header.starts_with(LATEST_VERSION_STRING.as_bytes()) {
            return Err(StoreError::unrecognized(&header[..n]));
        }
        let raw_version = padded_str(&header[..16]);
        let size = LittleEndian::read_u64(&header[16..24]);
        let record_size = LittleEndian::read_u64(&header[24..32]);
        let increment_size = LittleEndian::read_u64(&header[32..40]);
        let meta_generation = LittleEndian::read_u64(&header[40..48]);
        let crc = LittleEndian::read_u32(&header[48..52]);
        let computed = crc32(&header[..48], 0);
        if computed != crc {
            return Err(StoreError::HeaderCrc {
                found: crc,
                computed,
            });
        }

        let summary = FileSummary::new(&path.display().to_string(), &raw_version, record_size);
        Ok(QueueReader {
            input,
            record_size,
            increment_size,
            size,
            meta_generation,
            summary,
            validate,
        })
    }

    pub fn record_size(&self) -> u64 {
        self.record_size
    }

    pub fn increment_size(&self) -> u64 {
        self.increment_size
    }

    pub fn declared_size(&self) -> u64 {
        self.size
    }

    pub fn meta_generation(&self) -> u64 {
        self.meta_generation
    }

    /// Counters accumulated by the most recent records pass.
    pub fn summary(&self) -> &FileSummary {
        &self.summary
    }

    /// A lazy, single-pass stream of the file's records.
    pub fn records(&mut self) -> Records<'_> {
        self.summary = FileSummary::new(
            &self.summary.file_name,
            &self.summary.version,
            self.record_size,
        );
        Records {
            rd: self,
            next_label: PAGE_SIZE,
            slab: None,
            done: false,
        }
    }
}

/// Iterator over queue records. Finite and single-pass; malformed cells
/// are skipped, truncation ends the stream.
pub struct Records<'a> {
    rd: &'a mut QueueReader,
    next_label: u64,
    slab: Option<CurrentSlab>,
    done: bool,
}

struct CurrentSlab {
    base: u64,
    size: u64,
    consumed: u64,
    detail: SlabDetail,
}

impl Records<'_> {
    fn finish_slab(&mut self) {
        if let Some(cur) = self.slab.take() {
            if cur.size > 0 {
                self.rd.summary.slabs.push(cur.detail);
            }
        }
    }

    fn advance(&mut self) -> Option<QueueRecord> {
        loop {
            if self.slab.is_none() {
                let label = match read_label(&mut *self.rd.input, self.next_label) {
                    Ok(Some(label)) => label,
                    Ok(None) => return None,
                    Err(e) => {
                        log::warn!("read failed at slab label: {}", e);
                        return None;
                    }
                };
                self.next_label = label.offset + label.size;
                self.slab = Some(CurrentSlab {
                    base: label.offset,
                    size: label.size,
                    consumed: SLAB_LABEL_SIZE,
                    detail: SlabDetail::new(label.size, label.offset),
                });
            }

            let cur = self.slab.as_mut().expect("slab set above");
            if cur.consumed >= cur.size {
                self.finish_slab();
                continue;
            }

            if self
                .rd
                .input
                .seek(SeekFrom::Start(cur.base + cur.consumed))
                .is_err()
            {
                self.finish_slab();
                return None;
            }
            let mut head = [0u8; SLAB_LABEL_SIZE as usize];
            let n = read_exact_or_eof(&mut *self.rd.input, &mut head).unwrap_or(0);
            if n < head.len() {
                self.finish_slab();
                return None;
            }

            let crc = LittleEndian::read_u32(&head[0..4]);
            let flags = LittleEndian::read_u32(&head[4..8]);
            let data_len = LittleEndian::read_u32(&head[8..12]);
            let allocated = LittleEndian::read_u32(&head[12..16]) as u64;
            let slab_offset = LittleEndian::read_u64(&head[16..24]);
            let generation_count = LittleEndian::read_u64(&head[24..32]);
            let client_name_hash = LittleEndian::read_u64(&head[32..40]);
            let client_seq = LittleEndian::read_u64(&head[40..48]);
            let local_tx_id = LittleEndian::read_u64(&head[48..56]);
            let topic_hash = LittleEndian::read_u64(&head[56..64]);
            let creation_tx_id = LittleEndian::read_u64(&head[64..72]);
            let creation_timestamp = LittleEndian::read_u64(&head[72..80]);

            if crc == 0
                || flags > MAX_RECORD_FLAGS
                || data_len as u64 > allocated
                || allocated < SLAB_LABEL_SIZE
            {
                cur.consumed += SLAB_LABEL_SIZE;
                continue;
            }
            if data_len == 0 && flags == 1 {
                cur.consumed += allocated;
                self.rd.summary.invalid_records += 1;
                cur.detail.invalid_count += 1;
                cur.detail.deleted_bytes += allocated;
                continue;
            }

            let total_offset = cur.base + cur.consumed;
            let slab_remaining = cur.size - cur.consumed;
            let readable = slab_remaining.min(allocated - SLAB_LABEL_SIZE) as usize;
            let mut buf = Vec::with_capacity(head.len() + readable);
            buf.extend_from_slice(&head);
            buf.resize(head.len() + readable, 0);
            let n = read_exact_or_eof(&mut *self.rd.input, &mut buf[head.len()..]).unwrap_or(0);
            if n < readable {
                self.finish_slab();
                return None;
            }

            if self.rd.validate {
                let crc_len = RECORD_HEADER_SIZE + data_len as usize;
                let computed = crc32_range(&buf, RECORD_SEED, 4, crc_len);
                if computed != crc {
                    self.rd.summary.invalid_records += 1;
                    cur.detail.invalid_count += 1;
                    cur.detail.deleted_bytes += allocated;
                    cur.consumed += allocated;
                    continue;
                }
            }

            self.rd.summary.note_record(allocated);
            if client_name_hash != 0 {
                self.rd.summary.valid_keys += 1;
                cur.detail.valid_count += 1;
                cur.detail.stored_bytes += allocated;
                cur.detail.data_bytes += data_len as u64;
                self.rd.summary.note_data_size(data_len as u64);
            }
            cur.consumed += allocated;

            let data_end = (RECORD_HEADER_SIZE + data_len as usize).min(buf.len());
            return Some(QueueRecord {
                crc,
                flags,
                data_len,
                allocated,
                slab_offset,
                generation_count,
                client_name_hash,
                client_seq,
                local_tx_id,
                topic_hash,
                creation_tx_id,
                creation_timestamp,
                total_offset,
                data: buf[RECORD_HEADER_SIZE.min(data_end)..data_end].to_vec(),
            });
        }
    }
}

impl Iterator for Records<'_> {
    type Item = QueueRecord;

    fn next(&mut self) -> Option<QueueRecord> {
        if self.done {
            return None;
        }
        let rec = self.advance();
        if rec.is_none() {
            self.finish_slab();
            self.done = true;
        }
        rec
    }
}

/// Writes a queue store file.
pub struct QueueWriter {
    file: BufWriter<std::fs::File>,
    record_size: u64,
    file_size: u64,
    slab_written: u64,
    label_offset: u64,
    meta_generation: u64,
}

impl QueueWriter {
    /// Creates `path`; `record_size` is recorded in the metadata page.
    pub fn create(path: &Path, record_size: u64) -> Result<QueueWriter> {
        if record_size == 0 {
            return Err(StoreError::InvalidArgument(
                "record_size is required to write a queue file".to_string(),
            ));
        }
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = QueueWriter {
            file: BufWriter::new(raw),
            record_size,
            file_size: 0,
            slab_written: 0,
            label_offset: PAGE_SIZE,
            meta_generation: 0,
        };
        fill_zeros(&mut writer.file, PAGE_SIZE)?;
        writer.start_slab()?;
        Ok(writer)
    }

    fn start_slab(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.label_offset))?;
        fill_zeros(&mut self.file, SLAB_LABEL_SIZE)?;
        self.slab_written = SLAB_LABEL_SIZE;
        self.file_size += SLAB_LABEL_SIZE;
        Ok(())
    }

    /// Appends one recovery point.
    pub fn write(&mut self, rec: &QueueRecord) -> Result<()> {
        let allocated = align_up(
            RECORD_HEADER_SIZE as u64 + rec.data.len() as u64 + DEFAULT_PADDING,
            128,
        );
        if self.slab_written + allocated > SLAB_MAX_SIZE && self.slab_written > SLAB_LABEL_SIZE {
            self.close_slab()?;
            self.start_slab()?;
        }

        self.file
            .seek(SeekFrom::Start(self.label_offset + self.slab_written))?;
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + rec.data.len());
        buf.write_u32::<LittleEndian>(0)?; // crc, patched below
        buf.write_u32::<LittleEndian>(rec.flags)?;
        buf.write_u32::<LittleEndian>(rec.data.len() as u32)?;
        buf.write_u32::<LittleEndian>(allocated as u32)?;
        buf.write_u64::<LittleEndian>(self.label_offset)?;
        buf.write_u64::<LittleEndian>(rec.generation_count)?;
        buf.write_u64::<LittleEndian>(rec.client_name_hash)?;
        buf.write_u64::<LittleEndian>(rec.client_seq)?;
        buf.write_u64::<LittleEndian>(rec.local_tx_id)?;
        buf.write_u64::<LittleEndian>(rec.topic_hash)?;
        buf.write_u64::<LittleEndian>(rec.creation_tx_id)?;
        buf.write_u64::<LittleEndian>(rec.creation_timestamp)?;
        buf.extend_from_slice(&rec.data);
        let crc = crc32(&buf[4..], RECORD_SEED);
        LittleEndian::write_u32(&mut buf[..4], crc);

        self.file.write_all(&buf)?;
        fill_zeros(&mut self.file, allocated - buf.len() as u64)?;
        self.slab_written += allocated;
        self.file_size += allocated;
        Ok(())
    }

    fn close_slab(&mut self) -> Result<()> {
        if self.slab_written < MIN_SLAB_SIZE {
            let pad = MIN_SLAB_SIZE - self.slab_written;
            self.file
                .seek(SeekFrom::Start(self.label_offset + self.slab_written))?;
            fill_zeros(&mut self.file, pad)?;
            self.slab_written += pad;
            self.file_size += pad;
        } else if self.slab_written % PAGE_SIZE != 0 {
            let pad = PAGE_SIZE - (self.slab_written % PAGE_SIZE);
            self.file
                .seek(SeekFrom::Start(self.label_offset + self.slab_written))?;
            fill_zeros(&mut self.file, pad)?;
            self.slab_written += pad;
            self.file_size += pad;
        }
        self.file.seek(SeekFrom::Start(self.label_offset))?;
        self.file
            .write_all(&SlabLabel::encode(self.slab_written, self.label_offset))?;
        self.label_offset = self.file_size + PAGE_SIZE;
        self.slab_written = 0;
        Ok(())
    }

    fn write_metadata(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(52);
        put_padded(&mut buf, LATEST_VERSION_STRING.as_bytes(), 16);
        buf.write_u64::<LittleEndian>(self.file_size)?;
        buf.write_u64::<LittleEndian>(self.record_size)?;
        buf.write_u64::<LittleEndian>(INCREMENT_SIZE)?;
        buf.write_u64::<LittleEndian>(self.meta_generation)?;
        let crc = crc32(&buf, 0);
        buf.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Closes the open slab, stamps the metadata page and syncs.
    pub fn close(mut self) -> Result<()> {
        self.close_slab()?;
        self.write_metadata()?;
        self.file.flush()?;
        self.file
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?
            .sync_all()?;
        Ok(())
    }
}

/// Returns the store version of the queue file at `path` (always 4.0 for
/// a recognized file).
pub fn version(path: &Path) -> Result<String> {
    QueueReader::open_with(path, false)?;
    Ok("4.0".to_string())
}

/// Dumps the records of a queue file followed by the file summary.
pub fn dump<W: io::Write>(path: &Path, opts: &DumpOptions, out: &mut W) -> anyhow::Result<()> {
    let mut reader = QueueReader::open(path)?;
    let mut printed = 0u64;
    for rec in reader.records() {
        if opts.limit.is_some_and(|limit| printed >= limit) {
            continue;
        }
        writeln!(out, "{}", rec.render(opts))?;
        printed += 1;
    }
    write!(out, "{}", reader.summary().render())?;
    Ok(())
}

#[cfg(test)]
mod tests;
