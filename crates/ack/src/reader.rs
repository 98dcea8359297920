//! Ack store reading for both on-disk dialects.

use byteorder::{ByteOrder, LittleEndian};
use common::crc::{crc32, crc32_range, RECORD_SEED};
use common::framing::{padded_str, read_exact_or_eof};
use common::gz::{self, ReadSeek};
use common::slab::{read_label, SLAB_LABEL_SIZE};
use common::summary::{FileSummary, SlabDetail};
use common::{Result, StoreError, PAGE_SIZE};
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::record::AckRecord;
use crate::AckVersion;

/// Fixed record-header size of the slab dialect.
const SLAB_RECORD_HEADER: usize = 56;

/// Largest valid flags value; anything above marks a malformed cell.
const MAX_RECORD_FLAGS: u32 = 1;

/// A readable ack file of either dialect.
pub struct AckReader {
    input: Box<dyn ReadSeek>,
    version: AckVersion,
    record_size: u64,
    increment_size: u64,
    size: u64,
    meta_generation: u64,
    summary: FileSummary,
    validate: bool,
}

impl AckReader {
    /// Opens `path` (plain or `.gz`) with record CRC validation enabled.
    pub fn open(path: &Path) -> Result<AckReader> {
        AckReader::open_with(path, true)
    }

    /// Opens `path`, optionally skipping record CRC validation.
    pub fn open_with(path: &Path, validate: bool) -> Result<AckReader> {
        let mut input = gz::open_input(path)?;
        let mut header = vec![0u8; PAGE_SIZE as usize];
        let n = read_exact_or_eof(&mut *input, &mut header)?;
        if n < header.len() {
            return Err(StoreError::unrecognized(&header[..n]));
        }
        let version =
            AckVersion::from_header(&header).ok_or_else(|| StoreError::unrecognized(&header))?;

        let raw_version;
        let mut size = 0;
        let mut increment_size = 0;
        let mut meta_generation = 0;
        let record_size;
        match version {
            AckVersion::V21 => {
                raw_version = padded_str(&header[..32]);
                record_size = LittleEndian::read_u64(&header[32..40]);
            }
            AckVersion::V40 => {
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
        }

        let summary = FileSummary::new(&path.display().to_string(), &raw_version, record_size);
        Ok(AckReader {
            input,
            version,
            record_size,
            increment_size,
            size,
            meta_generation,
            summary,
            validate,
        })
    }

    pub fn version(&self) -> AckVersion {
        self.version
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

    /// The raw first 4096 bytes of the file.
    pub fn metadata(&mut self) -> Result<Vec<u8>> {
        self.input.seek(SeekFrom::Start(0))?;
        let mut page = vec![0u8; PAGE_SIZE as usize];
        read_exact_or_eof(&mut *self.input, &mut page)?;
        Ok(page)
    }

    /// A lazy, single-pass stream of the file's records.
    pub fn records(&mut self) -> Records<'_> {
        self.summary = FileSummary::new(
            &self.summary.file_name,
            &self.summary.version,
            self.record_size,
        );
        let state = match self.version {
            AckVersion::V21 => {
                let _ = self.input.seek(SeekFrom::Start(PAGE_SIZE));
                State::Flat
            }
            AckVersion::V40 => State::Slab {
                next_label: PAGE_SIZE,
                slab: None,
            },
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

/// Iterator over ack records. Finite and single-pass; malformed cells are
/// skipped, truncation ends the stream.
pub struct Records<'a> {
    rd: &'a mut AckReader,
    state: State,
    done: bool,
}

impl Records<'_> {
    fn next_flat(&mut self) -> Option<AckRecord> {
        let cell = self.rd.record_size as usize;
        if cell < 32 {
            return None;
        }
        let mut head = vec![0u8; cell];
        let n = read_exact_or_eof(&mut *self.rd.input, &mut head).unwrap_or(0);
        if n < cell {
            return None;
        }
        let crc = LittleEndian::read_u32(&head[0..4]);
        let num_records = LittleEndian::read_u32(&head[4..8]);
        let client_name_hash = LittleEndian::read_u64(&head[8..16]);
        let client_seq = LittleEndian::read_u64(&head[16..24]);
        let local_tx_id = LittleEndian::read_u64(&head[24..32]);
        if crc == 0 && num_records == 0 {
            return None;
        }
        if num_records > 1 {
            self.rd.summary.multi_records += 1;
            let extra = (num_records - 1) as usize * cell;
            let old_len = head.len();
            head.resize(old_len + extra, 0);
            let n = read_exact_or_eof(&mut *self.rd.input, &mut head[old_len..]).unwrap_or(0);
            if n < extra {
                return None;
            }
        }
        if client_name_hash != 0 {
            self.rd.summary.valid_keys += 1;
        }
        self.rd.summary.number_of_records += 1;
        Some(AckRecord {
            crc,
            num_records,
            client_name_hash,
            client_seq,
            local_tx_id,
            allocated: self.rd.record_size,
            ..AckRecord::default()
        })
    }

    fn next_slab(&mut self) -> Option<AckRecord> {
        loop {
            let (next_label, slab) = match &mut self.state {
                State::Slab { next_label, slab } => (next_label, slab),
                State::Flat => unreachable!("slab iteration on a flat dialect"),
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
            let generation_count = LittleEndian::read_u64(&head[24..32]);
            let client_name_hash = LittleEndian::read_u64(&head[32..40]);
            let client_seq = LittleEndian::read_u64(&head[40..48]);
            let local_tx_id = LittleEndian::read_u64(&head[48..56]);

            if crc == 0
                || flags > MAX_RECORD_FLAGS
                || data_size as u64 > allocated
                || allocated < SLAB_LABEL_SIZE
            {
                cur.consumed += SLAB_LABEL_SIZE;
                continue;
            }

            if data_size == 0 && flags == 1 {
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
                let crc_len = SLAB_RECORD_HEADER + data_size as usize;
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
                cur.detail.data_bytes += data_size as u64;
                self.rd.summary.note_data_size(data_size as u64);
            }
            cur.consumed += allocated;

            let data_end = (SLAB_RECORD_HEADER + data_size as usize).min(buf.len());
            return Some(AckRecord {
                crc,
                flags,
                num_records: 1,
                data_size,
                allocated,
                slab_offset,
                generation_count,
                client_name_hash,
                client_seq,
                local_tx_id,
                total_offset,
                data: buf[SLAB_RECORD_HEADER.min(data_end)..data_end].to_vec(),
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
}

impl Iterator for Records<'_> {
    type Item = AckRecord;

    fn next(&mut self) -> Option<AckRecord> {
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
