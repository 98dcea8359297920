//! Version-dispatched SOW file reading.
//!
//! [`SowReader::open`] reads the 4096-byte metadata page, selects the
//! version from its magic string, and (for versions that stamp one)
//! verifies the header CRC. [`SowReader::records`] then yields every
//! decodable record as a normalized [`SowRecord`], in file order:
//! flat-array cells for versions 1-3, slab walking for versions 4-6.
//!
//! Iteration never fails: a record that flunks its CRC or carries
//! out-of-range header fields is skipped and counted, a slab label that
//! flunks its CRC ends the walk with a diagnostic, and a short read
//! anywhere is the end of the stream.

use byteorder::{ByteOrder, LittleEndian};
use common::crc::{crc32, crc32_range, RECORD_SEED};
use common::framing::{padded_str, read_exact_or_eof};
use common::gz::{self, ReadSeek};
use common::slab::{read_label, SLAB_LABEL_SIZE};
use common::summary::{FileSummary, SlabDetail};
use common::{Result, StoreError, PAGE_SIZE};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::record::{SowRecord, INVALID_FLAG};
use crate::SowVersion;

/// Stamp every version-2.0 record carries in place of flags.
const V2_VALID_STAMP: u32 = 0xA5A5_A5A5;

/// Fixed record-header size of the slab versions.
const SLAB_RECORD_HEADER: usize = 64;

/// A readable SOW file of any supported version.
pub struct SowReader {
    input: Box<dyn ReadSeek>,
    version: SowVersion,
    record_size: u64,
    increment_size: u64,
    size: u64,
    meta_generation: u64,
    compression_type: String,
    compression_options: u64,
    summary: FileSummary,
    validate: bool,
}

impl SowReader {
    /// Opens `path` (plain or `.gz`) with record CRC validation enabled.
    pub fn open(path: &Path) -> Result<SowReader> {
        SowReader::open_with(path, true)
    }

    /// Opens `path`, optionally skipping CRC validation of records.
    /// The metadata-page CRC is always checked where the format stamps one.
    pub fn open_with(path: &Path, validate: bool) -> Result<SowReader> {
        let mut input = gz::open_input(path)?;
        let mut header = vec![0u8; PAGE_SIZE as usize];
        let n = read_exact_or_eof(&mut *input, &mut header)?;
        if n < header.len() {
            return Err(StoreError::unrecognized(&header[..n]));
        }
        let version =
            SowVersion::from_header(&header).ok_or_else(|| StoreError::unrecognized(&header))?;

        let mut record_size = 0u64;
        let mut increment_size = 0u64;
        let mut size = 0u64;
        let mut meta_generation = 0u64;
        let mut compression_type = String::new();
        let mut compression_options = 0u64;
        let raw_version;

        match version {
            SowVersion::V1 => {
                // 21-byte magic, a one-byte tag, then padding to the first
                // 8-byte boundary before the counters
                raw_version = padded_str(&header[..21]);
                record_size = LittleEndian::read_u64(&header[24..32]);
            }
            SowVersion::V2 | SowVersion::V21 => {
                raw_version = padded_str(&header[..32]);
                record_size = LittleEndian::read_u64(&header[32..40]);
            }
            SowVersion::V3 => {
                raw_version = padded_str(&header[..32]);
                record_size = LittleEndian::read_u64(&header[32..40]);
                increment_size = LittleEndian::read_u64(&header[48..56]);
            }
            SowVersion::V4 | SowVersion::V5 => {
                raw_version = padded_str(&header[..16]);
                size = LittleEndian::read_u64(&header[16..24]);
                record_size = LittleEndian::read_u64(&header[24..32]);
                increment_size = LittleEndian::read_u64(&header[32..40]);
                meta_generation = LittleEndian::read_u64(&header[40..48]);
                let crc = LittleEndian::read_u32(&header[48..52]);
                let computed = crc32(&header[..48], 0);
                if computed != crc {
                    return Err(StoreError::HeaderCrc {
                        found: crc,
                        computed,
                    });
                }
            }
            SowVersion::V6 => {
                raw_version = padded_str(&header[..16]);
                compression_type = padded_str(&header[16..24]);
                compression_options = LittleEndian::read_u64(&header[24..32]);
                size = LittleEndian::read_u64(&header[32..40]);
                record_size = LittleEndian::read_u64(&header[40..48]);
                increment_size = LittleEndian::read_u64(&header[48..56]);
                meta_generation = LittleEndian::read_u64(&header[56..64]);
                let crc = LittleEndian::read_u32(&header[64..68]);
                let computed = crc32(&header[..64], 0);
                if computed != crc {
                    return Err(StoreError::HeaderCrc {
                        found: crc,
                        computed,
                    });
                }
            }
        }

        let summary = FileSummary::new(&path.display().to_string(), &raw_version, record_size);

        Ok(SowReader {
            input,
            version,
            record_size,
            increment_size,
            size,
            meta_generation,
            compression_type,
            compression_options,
            summary,
            validate,
        })
    }

    pub fn version(&self) -> SowVersion {
        self.version
    }

    pub fn record_size(&self) -> u64 {
        self.record_size
    }

    pub fn increment_size(&self) -> u64 {
        self.increment_size
    }

    /// Total store bytes as declared by the metadata page (slab versions).
    pub fn declared_size(&self) -> u64 {
        self.size
    }

    pub fn meta_generation(&self) -> u64 {
        self.meta_generation
    }

    pub fn compression_type(&self) -> &str {
        &self.compression_type
    }

    pub fn compression_options(&self) -> u64 {
        self.compression_options
    }

    /// Counters accumulated by the most recent [`records`](Self::records)
    /// pass.
    pub fn summary(&self) -> &FileSummary {
        &self.summary
    }

    /// The raw first 4096 bytes of the file.
    pub fn metadata(&mut self) -> Result<Vec<u8>> {
        self.input.seek(SeekFrom::Start(0))?;
        let mut page = vec![0u8; PAGE_SIZE as usize];
        read_exact_or_eof(&mut *self.input, &mut page)?;
        Ok(page)
    }

    /// The persisted last-sync transaction id. It lives inside the
    /// metadata page, at offset 64 for versions up to 4.0 and offset 128
    /// afterwards, as the third field of a `(crc, sow_key, tx_id)` triple.
    pub fn last_sync_tx_id(&mut self) -> Result<u64> {
        let base = if self.version >= SowVersion::V5 { 128 } else { 64 };
        self.input.seek(SeekFrom::Start(0))?;
        let mut page = vec![0u8; base + 24];
        let n = read_exact_or_eof(&mut *self.input, &mut page)?;
        if n < page.len() {
            return Ok(0);
        }
        Ok(LittleEndian::read_u64(&page[base + 16..base + 24]))
    }

    /// A lazy, single-pass stream of the file's records.
    pub fn records(&mut self) -> Records<'_> {
        self.summary = FileSummary::new(
            &self.summary.file_name,
            &self.summary.version,
            self.record_size,
        );
        let state = if self.version.is_slab() {
            State::Slab {
                next_label: PAGE_SIZE,
                slab: None,
            }
        } else {
            let _ = self.input.seek(SeekFrom::Start(PAGE_SIZE));
            State::Flat
        };
        Records {
            rd: self,
            state,
            done: false,
        }
    }
}

enum State {
    Flat,
    Slab {
        next_label: u64,
        slab: Option<CurrentSlab>,
    },
}

struct CurrentSlab {
    base: u64,
    size: u64,
    consumed: u64,
    detail: SlabDetail,
}

/// Iterator over the records of one [`SowReader`]. Finite, single-pass,
/// and infallible: anything unreadable is skipped or ends the stream.
pub struct Records<'a> {
    rd: &'a mut SowReader,
    state: State,
    done: bool,
}

impl Records<'_> {
    fn next_flat(&mut self) -> Option<SowRecord> {
        let cell = self.rd.record_size as usize;
        let min_prefix = match self.rd.version {
            SowVersion::V1 => 56,
            _ => 40,
        };
        if cell < min_prefix {
            return None;
        }
        loop {
            let mut head = vec![0u8; cell];
            let n = match read_exact_or_eof(&mut *self.rd.input, &mut head) {
                Ok(n) => n,
                Err(e) => {
                    log::warn!("read failed during flat iteration: {}", e);
                    return None;
                }
            };
            if n < cell {
                return None;
            }
            match self.rd.version {
                SowVersion::V1 => {
                    let crc = LittleEndian::read_u64(&head[0..8]);
                    let flags = LittleEndian::read_u64(&head[8..16]);
                    let node_size = LittleEndian::read_u64(&head[16..24]);
                    let header_size = LittleEndian::read_u64(&head[24..32]);
                    let data_size = LittleEndian::read_u64(&head[32..40]);
                    let key = LittleEndian::read_u64(&head[40..48]);
                    let seq = LittleEndian::read_u64(&head[48..56]);
                    if crc == 0 && node_size == 0 {
                        return None;
                    }
                    let cells = (node_size / self.rd.record_size).max(1);
                    if cells > 1 {
                        self.rd.summary.multi_records += 1;
                        if !self.read_more(&mut head, (cells - 1) as usize * cell) {
                            return None;
                        }
                    }
                    let allocated = (node_size / self.rd.record_size + 1) * self.rd.record_size;
                    if key != 0 {
                        self.rd.summary.valid_keys += 1;
                        self.rd.summary.note_data_size(data_size);
                    }
                    self.rd.summary.number_of_records += 1;
                    let data_off = 56 + header_size as usize;
                    return Some(SowRecord {
                        crc: crc as u32,
                        flags: flags as u32,
                        data_size: data_size as u32,
                        allocated,
                        key,
                        seq,
                        data: slice_at(&head, data_off, data_size as usize),
                        ..SowRecord::default()
                    });
                }
                SowVersion::V2 | SowVersion::V21 => {
                    // five u32 fields, 4 bytes of padding, then two u64s
                    let crc = LittleEndian::read_u32(&head[0..4]);
                    let valid = LittleEndian::read_u32(&head[4..8]);
                    let num_records = LittleEndian::read_u32(&head[8..12]);
                    let data_size = LittleEndian::read_u32(&head[12..16]);
                    let header_size = LittleEndian::read_u32(&head[16..20]);
                    let key = LittleEndian::read_u64(&head[24..32]);
                    let seq = LittleEndian::read_u64(&head[32..40]);
                    if crc == 0 && num_records == 0 {
                        return None;
                    }
                    if self.rd.version == SowVersion::V2 && valid != V2_VALID_STAMP {
                        self.rd.summary.invalid_records += 1;
                        continue;
                    }
                    if num_records > 1 {
                        self.rd.summary.multi_records += 1;
                        if !self.read_more(&mut head, (num_records - 1) as usize * cell) {
                            return None;
                        }
                    }
                    if key != 0 {
                        self.rd.summary.valid_keys += 1;
                        self.rd.summary.note_data_size(data_size as u64);
                    }
                    self.rd.summary.number_of_records += 1;
                    let data_off = 40 + header_size as usize;
                    return Some(SowRecord {
                        crc,
                        data_size,
                        allocated: num_records as u64 * self.rd.record_size,
                        key,
                        seq,
                        data: slice_at(&head, data_off, data_size as usize),
                        ..SowRecord::default()
                    });
                }
                SowVersion::V3 => {
                    let crc = LittleEndian::read_u32(&head[0..4]);
                    let num_records = LittleEndian::read_u32(&head[8..12]);
                    let data_size = LittleEndian::read_u32(&head[12..16]);
                    let expiration = LittleEndian::read_u64(&head[16..24]);
                    let key = LittleEndian::read_u64(&head[24..32]);
                    let seq = LittleEndian::read_u64(&head[32..40]);
                    if crc == 0 && num_records == 0 {
                        return None;
                    }
                    if num_records > 1 {
                        self.rd.summary.multi_records += 1;
                        if !self.read_more(&mut head, (num_records - 1) as usize * cell) {
                            return None;
                        }
                    }
                    if key != 0 {
                        self.rd.summary.valid_keys += 1;
                        self.rd.summary.note_data_size(data_size as u64);
                    }
                    self.rd.summary.number_of_records += 1;
                    return Some(SowRecord {
                        crc,
                        data_size,
                        allocated: num_records as u64 * self.rd.record_size,
                        expiration_time: expiration,
                        key,
                        seq,
                        data: slice_at(&head, 40, data_size as usize),
                        ..SowRecord::default()
                    });
                }
                _ => unreachable!("flat iteration on a slab version"),
            }
        }
    }

    fn next_slab(&mut self) -> Option<SowRecord> {
        loop {
            let (next_label, slab) = match &mut self.state {
                State::Slab { next_label, slab } => (next_label, slab),
                State::Flat => unreachable!("slab iteration on a flat version"),
            };

            if slab.is_none() {
                let label = match read_label(&mut *self.rd.input, *next_label) {
                    Ok(Some(label)) => label,
                    Ok(None) => return None,
                    Err(e) => {
                        log::warn!("read failed at slab label: {}", e);
                        return None;
                    }
                };
                *next_label = label.offset + label.size;
                *slab = Some(CurrentSlab {
                    base: label.offset,
                    size: label.size,
                    consumed: SLAB_LABEL_SIZE,
                    detail: SlabDetail::new(label.size, label.offset),
                });
            }

            let cur = slab.as_mut().expect("slab set above");
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
                self.done = true;
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
            let data_size = LittleEndian::read_u32(&head[8..12]);
            let allocated = LittleEndian::read_u32(&head[12..16]) as u64;
            let slab_offset = LittleEndian::read_u64(&head[16..24]);
            let expiration_time = LittleEndian::read_u64(&head[24..32]);
            let update_time = LittleEndian::read_u64(&head[32..40]);
            let (generation_count, corr_len, sk_len) = if self.rd.version == SowVersion::V4 {
                (LittleEndian::read_u64(&head[40..48]), 0u32, 0u32)
            } else {
                (
                    0u64,
                    LittleEndian::read_u32(&head[40..44]),
                    LittleEndian::read_u32(&head[44..48]),
                )
            };
            let key = LittleEndian::read_u64(&head[48..56]);
            let seq = LittleEndian::read_u64(&head[56..64]);

            if crc == 0
                || flags > self.rd.version.max_record_flags()
                || data_size as u64 > allocated
                || allocated < SLAB_LABEL_SIZE
            {
                cur.consumed += SLAB_LABEL_SIZE;
                continue;
            }

            if data_size == 0 && flags & INVALID_FLAG != 0 {
                cur.consumed += allocated;
                self.rd.summary.invalid_records += 1;
                cur.detail.invalid_count += 1;
                cur.detail.deleted_bytes += allocated;
                continue;
            }

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
                let crc_len = SLAB_RECORD_HEADER + sk_len as usize + corr_len as usize
                    + data_size as usize;
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
            if key != 0 {
                self.rd.summary.valid_keys += 1;
                cur.detail.valid_count += 1;
                cur.detail.stored_bytes += allocated;
                cur.detail.data_bytes += data_size as u64;
                self.rd.summary.note_data_size(data_size as u64);
            }
            cur.consumed += allocated;

            let sk_off = SLAB_RECORD_HEADER;
            let corr_off = sk_off + sk_len as usize;
            let data_off = corr_off + corr_len as usize;
            return Some(SowRecord {
                crc,
                flags,
                data_size,
                allocated,
                slab_offset,
                expiration_time,
                update_time,
                generation_count,
                key,
                seq,
                string_key: slice_at(&buf, sk_off, sk_len as usize),
                correlation_id: slice_at(&buf, corr_off, corr_len as usize),
                data: slice_at(&buf, data_off, data_size as usize),
            });
        }
    }

    fn finish_slab(&mut self) {
        if let State::Slab { slab, .. } = &mut self.state {
            if let Some(cur) = slab.take() {
                if cur.size > 0 {
                    self.rd.summary.slabs.push(cur.detail);
                }
            }
        }
    }

    fn read_more(&mut self, head: &mut Vec<u8>, extra: usize) -> bool {
        let old_len = head.len();
        head.resize(old_len + extra, 0);
        match read_exact_or_eof(&mut *self.rd.input, &mut head[old_len..]) {
            Ok(n) if n == extra => true,
            _ => false,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = SowRecord;

    fn next(&mut self) -> Option<SowRecord> {
        if self.done {
            return None;
        }
        let rec = match self.state {
            State::Flat => self.next_flat(),
            State::Slab { .. } => self.next_slab(),
        };
        if rec.is_none() {
            self.finish_slab();
            self.done = true;
        }
        rec
    }
}

fn slice_at(buf: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let start = offset.min(buf.len());
    let end = (offset + len).min(buf.len());
    buf[start..end].to_vec()
}
