//! Journal file reading across format versions 1 through 8.
//!
//! A journal starts with two 512-byte metadata pages (file header and
//! extents), then transaction records in 256-byte units: from offset 4096
//! for version 4 and later, from offset 1024 before that. Each record's
//! fixed header grew over the versions (96 bytes in v1, 104 in v2-v4,
//! 112 in v5, 120 from v6 on); variable-width payloads follow in the
//! canonical order `topic, auth id, correlation id, replication path, key,
//! message data`.
//!
//! Iteration ends at an all-zero record header, at a short read, or when
//! the next record would run past the end of the file.

use byteorder::{ByteOrder, LittleEndian};
use common::framing::{padded_str, read_exact_or_eof};
use common::gz::{self, ReadSeek};
use common::time;
use common::{Result, StoreError};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use crate::record::{JournalRecord, RecordType};
use crate::{METADATA_SIZE, MIN_TX_SIZE, TX_OFFSET};

/// First/last transaction ids (and, from version 7, their timestamps)
/// declared by the journal's second metadata page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Extents {
    pub first: u64,
    pub first_timestamp: i64,
    pub last: u64,
    pub last_timestamp: i64,
}

/// Replication extents observed for one source instance while iterating.
#[derive(Debug, Clone, Default)]
pub struct SourceExtents {
    pub path: Vec<u8>,
    pub first: u64,
    pub last: u64,
}

/// A readable journal file of any supported version.
pub struct JournalReader {
    input: Box<dyn ReadSeek>,
    file_name: String,
    version: u32,
    instance_id: u32,
    version_string: String,
    compression_type: String,
    compression_options: u64,
    extents: Extents,
    file_size: u64,
    entry_count: u64,
    source_extents: BTreeMap<u64, SourceExtents>,
}

impl JournalReader {
    /// Opens `path` (plain or `.gz`) and decodes both metadata pages.
    pub fn open(path: &Path) -> Result<JournalReader> {
        let mut input = gz::open_input(path)?;
        let file_size = input.seek(SeekFrom::End(0))?;
        input.seek(SeekFrom::Start(0))?;

        let mut meta = [0u8; METADATA_SIZE as usize];
        let n = read_exact_or_eof(&mut *input, &mut meta)?;
        if n < meta.len() || &meta[..4] != b"AMPS" {
            return Err(StoreError::unrecognized(&meta[..n]));
        }
        let version = LittleEndian::read_u32(&meta[4..8]);
        if !(1..=8).contains(&version) {
            return Err(StoreError::unrecognized(&meta));
        }
        let instance_id = LittleEndian::read_u32(&meta[8..12]);
        let version_string = padded_str(&meta[12..44]);
        let (compression_type, compression_options) = if version >= 7 {
            // 8-byte compression tag, then padding to the next 8-byte
            // boundary before the options word
            (
                padded_str(&meta[44..52]),
                LittleEndian::read_u64(&meta[56..64]),
            )
        } else {
            (String::new(), 0)
        };

        let mut page = [0u8; METADATA_SIZE as usize];
        input.seek(SeekFrom::Start(METADATA_SIZE))?;
        read_exact_or_eof(&mut *input, &mut page)?;
        let extents = if version < 7 {
            Extents {
                first: LittleEndian::read_u64(&page[0..8]),
                last: LittleEndian::read_u64(&page[8..16]),
                ..Extents::default()
            }
        } else {
            Extents {
                first: LittleEndian::read_u64(&page[0..8]),
                first_timestamp: LittleEndian::read_i64(&page[8..16]),
                last: LittleEndian::read_u64(&page[16..24]),
                last_timestamp: LittleEndian::read_i64(&page[24..32]),
            }
        };

        Ok(JournalReader {
            input,
            file_name: path.display().to_string(),
            version,
            instance_id,
            version_string,
            compression_type,
            compression_options,
            extents,
            file_size,
            entry_count: 0,
            source_extents: BTreeMap::new(),
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn version_string(&self) -> &str {
        &self.version_string
    }

    pub fn instance_id(&self) -> u32 {
        self.instance_id
    }

    pub fn extents(&self) -> Extents {
        self.extents
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn compression_type(&self) -> &str {
        &self.compression_type
    }

    pub fn compression_options(&self) -> u64 {
        self.compression_options
    }

    /// Replication source extents seen by the most recent records pass.
    pub fn source_extents(&self) -> &BTreeMap<u64, SourceExtents> {
        &self.source_extents
    }

    /// Number of records yielded by the most recent records pass.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// The fixed record-header size of this file's version.
    pub fn header_size(&self) -> usize {
        match self.version {
            1 => 96,
            2..=4 => 104,
            5 => 112,
            _ => 120,
        }
    }

    /// Renders the per-file banner shown at the top of a dump.
    pub fn format_extents(&self, localtime: bool) -> String {
        let extents = if self.extents.first > 0 && self.extents.last == 0 {
            "unwritten".to_string()
        } else {
            format!("[{}:{}]", self.extents.first, self.extents.last)
        };
        let mut s = String::new();
        if self.version < 7 {
            let _ = writeln!(s, "File Name   : {}", self.file_name);
            let _ = writeln!(s, "File Size   : {}", self.file_size);
            let _ = writeln!(s, "Version     : {}", self.version_string);
            let _ = writeln!(s, "Extents     : {}", extents);
        } else {
            let _ = writeln!(s, "File Name       : {}", self.file_name);
            let _ = writeln!(s, "File Size       : {}", self.file_size);
            let _ = writeln!(s, "Version         : {}", self.version_string);
            let _ = writeln!(s, "Compression     : {}", self.compression_type);
            let _ = writeln!(s, "Extents         : {}", extents);
            let _ = writeln!(
                s,
                "First Timestamp : {}",
                time::iso_timestamp(self.extents.first_timestamp.max(0) as u64, localtime)
            );
            let _ = writeln!(
                s,
                "Last Timestamp  : {}",
                time::iso_timestamp(self.extents.last_timestamp.max(0) as u64, localtime)
            );
        }
        let _ = write!(s, "_____________________________________________________");
        s
    }

    /// A lazy, single-pass stream of the file's records (noops included;
    /// the dump and upgrade surfaces filter them).
    pub fn records(&mut self) -> Records<'_> {
        self.entry_count = 0;
        self.source_extents.clear();
        let offset = if self.version >= 4 { TX_OFFSET } else { 1024 };
        Records {
            rd: self,
            offset,
            done: false,
        }
    }
}

/// Iterator over journal records. Finite and single-pass; malformed or
/// truncated tails end the stream instead of failing.
pub struct Records<'a> {
    rd: &'a mut JournalReader,
    offset: u64,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = JournalRecord;

    fn next(&mut self) -> Option<JournalRecord> {
        if self.done {
            return None;
        }
        self.done = true; // cleared again on success

        if self.offset + MIN_TX_SIZE as u64 > self.rd.file_size {
            return None;
        }
        if self.rd.input.seek(SeekFrom::Start(self.offset)).is_err() {
            return None;
        }
        let mut buf = vec![0u8; MIN_TX_SIZE];
        let n = read_exact_or_eof(&mut *self.rd.input, &mut buf).unwrap_or(0);
        if n < buf.len() {
            return None;
        }

        let crc = LittleEndian::read_u32(&buf[0..4]);
        let size = LittleEndian::read_u32(&buf[4..8]);
        if crc == 0 && size == 0 {
            return None;
        }
        if size as usize % MIN_TX_SIZE != 0 || size == 0 {
            log::warn!(
                "malformed record size {} at offset {}; ending iteration",
                size,
                self.offset
            );
            return None;
        }
        let remaining_blocks = size as usize / MIN_TX_SIZE - 1;
        if remaining_blocks > 0 {
            let old_len = buf.len();
            buf.resize(old_len + remaining_blocks * MIN_TX_SIZE, 0);
            let n = read_exact_or_eof(&mut *self.rd.input, &mut buf[old_len..]).unwrap_or(0);
            if n < remaining_blocks * MIN_TX_SIZE {
                return None;
            }
        }

        let mut rec = parse_record(self.rd.version, &buf);
        rec.offset = self.offset;

        // replicated entries contribute to the per-source extents view
        if rec.source_name_hash != 0 {
            let entry = self
                .rd
                .source_extents
                .entry(rec.source_name_hash)
                .or_insert_with(|| SourceExtents {
                    path: rec.replication_path.clone(),
                    first: rec.source_tx_id,
                    last: rec.source_tx_id,
                });
            entry.last = rec.source_tx_id;
        }

        self.offset += rec.size as u64;
        self.rd.entry_count += 1;
        self.done = false;
        Some(rec)
    }
}

fn parse_record(version: u32, buf: &[u8]) -> JournalRecord {
    let mut rec = JournalRecord {
        version,
        crc: LittleEndian::read_u32(&buf[0..4]),
        size: LittleEndian::read_u32(&buf[4..8]),
        ..JournalRecord::default()
    };

    let (topic_len, auth_len, corr_len, repl_len, key_len, header_size);
    match version {
        1 => {
            rec.rtype = RecordType::from_raw(LittleEndian::read_u32(&buf[8..12]) as u16);
            rec.message_len = LittleEndian::read_u32(&buf[12..16]);
            rec.message_type_hash = LittleEndian::read_u64(&buf[16..24]);
            rec.local_tx_id = LittleEndian::read_u64(&buf[24..32]);
            rec.source_tx_id = LittleEndian::read_u64(&buf[32..40]);
            rec.source_name_hash = LittleEndian::read_u64(&buf[40..48]);
            rec.client_name_hash = LittleEndian::read_u64(&buf[48..56]);
            rec.client_seq = LittleEndian::read_u64(&buf[56..64]);
            rec.topic_hash = LittleEndian::read_u64(&buf[64..72]);
            rec.sow_key = LittleEndian::read_u64(&buf[72..80]);
            rec.timestamp = LittleEndian::read_u64(&buf[80..88]);
            rec.flags = LittleEndian::read_u32(&buf[88..92]) as u16;
            topic_len = LittleEndian::read_u32(&buf[92..96]) as usize;
            auth_len = 0;
            corr_len = 0;
            repl_len = 0;
            key_len = 0;
            header_size = 96;
        }
        2..=4 => {
            rec.rtype = RecordType::from_raw(LittleEndian::read_u32(&buf[8..12]) as u16);
            rec.message_len = LittleEndian::read_u32(&buf[12..16]);
            rec.message_type_hash = LittleEndian::read_u64(&buf[16..24]);
            rec.local_tx_id = LittleEndian::read_u64(&buf[24..32]);
            rec.source_tx_id = LittleEndian::read_u64(&buf[32..40]);
            rec.source_name_hash = LittleEndian::read_u64(&buf[40..48]);
            rec.client_name_hash = LittleEndian::read_u64(&buf[48..56]);
            rec.client_seq = LittleEndian::read_u64(&buf[56..64]);
            rec.topic_hash = LittleEndian::read_u64(&buf[64..72]);
            rec.sow_key = LittleEndian::read_u64(&buf[72..80]);
            rec.timestamp = LittleEndian::read_u64(&buf[80..88]);
            rec.flags = LittleEndian::read_u32(&buf[88..92]) as u16;
            topic_len = LittleEndian::read_u32(&buf[92..96]) as usize;
            auth_len = LittleEndian::read_u32(&buf[96..100]) as usize;
            corr_len = 0;
            repl_len = LittleEndian::read_u32(&buf[100..104]) as usize;
            key_len = 0;
            header_size = 104;
        }
        5 | 6 => {
            rec.rtype = RecordType::from_raw(LittleEndian::read_u32(&buf[8..12]) as u16);
            rec.message_len = LittleEndian::read_u32(&buf[12..16]);
            rec.message_type_hash = LittleEndian::read_u64(&buf[16..24]);
            rec.local_tx_id = LittleEndian::read_u64(&buf[24..32]);
            rec.previous_local_tx_id = LittleEndian::read_u64(&buf[32..40]);
            rec.source_tx_id = LittleEndian::read_u64(&buf[40..48]);
            rec.source_name_hash = LittleEndian::read_u64(&buf[48..56]);
            rec.client_name_hash = LittleEndian::read_u64(&buf[56..64]);
            rec.client_seq = LittleEndian::read_u64(&buf[64..72]);
            rec.topic_hash = LittleEndian::read_u64(&buf[72..80]);
            rec.sow_expiration = LittleEndian::read_u64(&buf[80..88]);
            rec.timestamp = LittleEndian::read_u64(&buf[88..96]);
            rec.previous_size = LittleEndian::read_u32(&buf[96..100]);
            topic_len = LittleEndian::read_u32(&buf[100..104]) as usize;
            auth_len = LittleEndian::read_u32(&buf[104..108]) as usize;
            if version == 6 {
                corr_len = LittleEndian::read_u32(&buf[108..112]) as usize;
                repl_len = LittleEndian::read_u32(&buf[112..116]) as usize;
                header_size = 120;
            } else {
                corr_len = 0;
                repl_len = LittleEndian::read_u32(&buf[108..112]) as usize;
                header_size = 112;
            }
            key_len = 0;
        }
        _ => {
            rec.rtype = RecordType::from_raw(LittleEndian::read_u16(&buf[8..10]));
            rec.flags = LittleEndian::read_u16(&buf[10..12]);
            rec.message_len = LittleEndian::read_u32(&buf[12..16]);
            rec.message_type_hash = LittleEndian::read_u64(&buf[16..24]);
            rec.local_tx_id = LittleEndian::read_u64(&buf[24..32]);
            rec.previous_local_tx_id = LittleEndian::read_u64(&buf[32..40]);
            rec.source_tx_id = LittleEndian::read_u64(&buf[40..48]);
            rec.source_name_hash = LittleEndian::read_u64(&buf[48..56]);
            rec.client_name_hash = LittleEndian::read_u64(&buf[56..64]);
            rec.client_seq = LittleEndian::read_u64(&buf[64..72]);
            rec.topic_hash = LittleEndian::read_u64(&buf[72..80]);
            rec.sow_expiration = LittleEndian::read_u64(&buf[80..88]);
            rec.timestamp = LittleEndian::read_u64(&buf[88..96]);
            rec.previous_size = LittleEndian::read_u32(&buf[96..100]);
            topic_len = LittleEndian::read_u32(&buf[100..104]) as usize;
            auth_len = LittleEndian::read_u32(&buf[104..108]) as usize;
            corr_len = LittleEndian::read_u32(&buf[108..112]) as usize;
            repl_len = LittleEndian::read_u32(&buf[112..116]) as usize;
            key_len = LittleEndian::read_u32(&buf[116..120]) as usize;
            header_size = 120;
        }
    }

    let mut off = header_size;
    let mut take = |len: usize| {
        let start = off.min(buf.len());
        let end = (off + len).min(buf.len());
        off += len;
        buf[start..end].to_vec()
    };
    rec.topic = take(topic_len);
    rec.auth_id = take(auth_len);
    rec.correlation_id = take(corr_len);
    rec.replication_path = take(repl_len);
    rec.key = take(key_len);
    rec.data = take(rec.message_len as usize);
    rec
}
