//! Latest-version (v8) journal writing.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use common::crc::{crc32, RECORD_SEED};
use common::framing::{align_up, fill_zeros, put_padded};
use common::Result;
use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::reader::Extents;
use crate::record::{JournalRecord, RecordType};
use crate::{
    COMPRESSION_OPTIONS, COMPRESSION_TYPE, LATEST_VERSION, METADATA_SIZE, MIN_TX_SIZE,
    TX_HEADER_SIZE, TX_OFFSET, WRITER_VERSION,
};

/// Writes a version-8 journal file.
///
/// Construction needs the instance id and the declared extents of the data
/// about to be written (both come from the source file during an upgrade).
/// Extents are tightened as records arrive and rewritten on
/// [`close`](JournalWriter::close), which also pads the file to the next
/// 4096-byte transaction boundary with a noop record. A writer dropped
/// without `close` leaves stale extents behind.
pub struct JournalWriter {
    file: BufWriter<std::fs::File>,
    instance_id: u32,
    extents: Extents,
    offset: u64,
    last_write_size: u32,
    last_tx_id: u64,
    last_timestamp: u64,
    write_count: u64,
}

impl JournalWriter {
    /// Creates `path`, stamping the metadata and extents pages.
    pub fn create(path: &Path, instance_id: u32, extents: Extents) -> Result<JournalWriter> {
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = JournalWriter {
            file: BufWriter::new(raw),
            instance_id,
            extents,
            offset: TX_OFFSET,
            last_write_size: 0,
            last_tx_id: 0,
            last_timestamp: 0,
            write_count: 0,
        };

        // first metadata page, zero-padded to the first record offset
        let mut buf = Vec::with_capacity(76);
        buf.extend_from_slice(b"AMPS");
        buf.write_u32::<LittleEndian>(WRITER_VERSION)?;
        buf.write_u32::<LittleEndian>(writer.instance_id)?;
        put_padded(&mut buf, LATEST_VERSION.as_bytes(), 32);
        put_padded(&mut buf, COMPRESSION_TYPE.as_bytes(), 8);
        buf.extend_from_slice(&[0u8; 4]); // alignment before the options word
        buf.write_u64::<LittleEndian>(COMPRESSION_OPTIONS)?;
        buf.write_u64::<LittleEndian>(0)?; // header flags
        let crc = crc32(&buf, RECORD_SEED);
        buf.write_u32::<LittleEndian>(crc)?;
        writer.file.write_all(&buf)?;
        fill_zeros(&mut writer.file, TX_OFFSET - buf.len() as u64)?;

        writer.write_extents()?;
        Ok(writer)
    }

    fn write_extents(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(METADATA_SIZE))?;
        let mut buf = Vec::with_capacity(36);
        buf.write_u64::<LittleEndian>(self.extents.first)?;
        buf.write_i64::<LittleEndian>(self.extents.first_timestamp)?;
        buf.write_u64::<LittleEndian>(self.extents.last)?;
        buf.write_i64::<LittleEndian>(self.extents.last_timestamp)?;
        let crc = crc32(&buf, RECORD_SEED);
        buf.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn serialize(&self, rec: &JournalRecord, size: u32) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(size as usize);
        buf.write_u32::<LittleEndian>(0)?; // crc, patched below
        buf.write_u32::<LittleEndian>(size)?;
        buf.write_u16::<LittleEndian>(rec.rtype.as_raw())?;
        buf.write_u16::<LittleEndian>(rec.flags)?;
        buf.write_u32::<LittleEndian>(rec.data.len() as u32)?;
        buf.write_u64::<LittleEndian>(rec.message_type_hash)?;
        buf.write_u64::<LittleEndian>(rec.local_tx_id)?;
        buf.write_u64::<LittleEndian>(rec.previous_local_tx_id)?;
        buf.write_u64::<LittleEndian>(rec.source_tx_id)?;
        buf.write_u64::<LittleEndian>(rec.source_name_hash)?;
        buf.write_u64::<LittleEndian>(rec.client_name_hash)?;
        buf.write_u64::<LittleEndian>(rec.client_seq)?;
        buf.write_u64::<LittleEndian>(rec.topic_hash)?;
        buf.write_u64::<LittleEndian>(rec.sow_expiration)?;
        buf.write_u64::<LittleEndian>(rec.timestamp)?;
        buf.write_u32::<LittleEndian>(self.last_write_size)?;
        buf.write_u32::<LittleEndian>(rec.topic.len() as u32)?;
        buf.write_u32::<LittleEndian>(rec.auth_id.len() as u32)?;
        buf.write_u32::<LittleEndian>(rec.correlation_id.len() as u32)?;
        buf.write_u32::<LittleEndian>(rec.replication_path.len() as u32)?;
        buf.write_u32::<LittleEndian>(rec.key.len() as u32)?;
        buf.extend_from_slice(&rec.topic);
        buf.extend_from_slice(&rec.auth_id);
        buf.extend_from_slice(&rec.correlation_id);
        buf.extend_from_slice(&rec.replication_path);
        buf.extend_from_slice(&rec.key);
        buf.extend_from_slice(&rec.data);

        let crc = crc32(&buf[4..], RECORD_SEED);
        LittleEndian::write_u32(&mut buf[..4], crc);
        Ok(buf)
    }

    /// Appends one record, re-sizing it to this version's alignment.
    ///
    /// The record's `size` is recomputed (upgraded entries can shrink or
    /// grow as header fields change across versions) and `previous_size`
    /// is replaced with the size of the record actually written before
    /// this one, preserving reverse traversal in the new file.
    pub fn write(&mut self, rec: &JournalRecord) -> Result<()> {
        let payload = TX_HEADER_SIZE
            + rec.topic.len()
            + rec.auth_id.len()
            + rec.correlation_id.len()
            + rec.replication_path.len()
            + rec.key.len()
            + rec.data.len();
        let size = align_up(payload as u64, MIN_TX_SIZE as u64) as u32;

        self.file.seek(SeekFrom::Start(self.offset))?;
        let buf = self.serialize(rec, size)?;
        self.file.write_all(&buf)?;
        fill_zeros(&mut self.file, size as u64 - buf.len() as u64)?;

        self.last_write_size = size;
        self.offset += size as u64;
        self.last_tx_id = rec.local_tx_id;
        self.last_timestamp = rec.timestamp;
        self.write_count += 1;

        if self.extents.first == 0 || self.extents.first > rec.local_tx_id {
            self.extents.first = rec.local_tx_id;
            self.extents.first_timestamp = rec.timestamp as i64;
        }
        if self.extents.last == 0 || self.extents.last < rec.local_tx_id {
            self.extents.last = rec.local_tx_id;
            self.extents.last_timestamp = rec.timestamp as i64;
        }
        Ok(())
    }

    /// Writes a noop record of exactly `byte_count` bytes to pad the file
    /// to a transaction-offset boundary.
    fn write_noop(&mut self, byte_count: u32) -> Result<()> {
        let rec = JournalRecord {
            rtype: RecordType::Noop,
            local_tx_id: self.last_tx_id,
            timestamp: self.last_timestamp,
            data: vec![0u8; byte_count as usize - TX_HEADER_SIZE],
            ..JournalRecord::default()
        };
        self.file.seek(SeekFrom::Start(self.offset))?;
        let buf = self.serialize(&rec, byte_count)?;
        self.file.write_all(&buf)?;
        self.last_write_size = byte_count;
        self.offset += byte_count as u64;
        Ok(())
    }

    /// Number of records written so far (noops excluded).
    pub fn write_count(&self) -> u64 {
        self.write_count
    }

    /// Pads to the next transaction boundary, rewrites the extents page
    /// and syncs the file.
    pub fn close(mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.offset))?;
        let pad = TX_OFFSET - (self.offset % TX_OFFSET);
        if pad != TX_OFFSET {
            self.write_noop(pad as u32)?;
        }
        self.write_extents()?;
        self.file.flush()?;
        self.file
            .into_inner()
            .map_err(|e| common::StoreError::Io(e.into_error()))?
            .sync_all()?;
        Ok(())
    }
}
