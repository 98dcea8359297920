//! Latest-version (6.0) SOW file writing.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use common::crc::{crc32, RECORD_SEED};
use common::framing::{align_up, fill_zeros, put_padded};
use common::slab::{SlabLabel, SLAB_LABEL_SIZE};
use common::{Result, StoreError, DEFAULT_PADDING, MIN_SLAB_SIZE, PAGE_SIZE};
use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::record::SowRecord;
use crate::LATEST_VERSION_STRING;

const RECORD_HEADER_SIZE: u64 = 64;
const COMPRESSION_TYPE: &str = "gz";
const COMPRESSION_OPTIONS: u64 = 9;

/// Writes a version-6.0 SOW file.
///
/// The constructor stamps a CRC-correct metadata page and reserves the
/// first slab label position, so a crash mid-stream leaves a readable
/// (though truncated) file. Records are appended through
/// [`write`](SowWriter::write); [`close`](SowWriter::close) must be called
/// for the final metadata to land — a dropped writer leaves a file whose
/// metadata page does not describe its contents.
pub struct SowWriter {
    file: BufWriter<std::fs::File>,
    record_size: u64,
    increment_size: u64,
    slab_max_size: u64,
    /// Store bytes written past the metadata page, labels and padding
    /// included.
    file_size: u64,
    slab_written: u64,
    label_offset: u64,
    meta_generation: u64,
}

impl SowWriter {
    /// Creates `path` and writes the initial metadata page.
    ///
    /// `record_size` and `increment_size` (records per slab) size the slab
    /// allocation: both are clamped to sane ranges, the record size is
    /// aligned to 128 and the resulting slab capacity is page- and
    /// write-aligned with a one-megabyte floor.
    pub fn create(path: &Path, record_size: u64, increment_size: u64) -> Result<SowWriter> {
        if record_size == 0 || increment_size == 0 {
            return Err(StoreError::InvalidArgument(
                "record_size and increment_size are required to write a sow file".to_string(),
            ));
        }
        let record_size = align_up(record_size.clamp(128, 16_384), 128);
        let increment_size = increment_size.clamp(128, 1_000_000);

        let slab_bytes = record_size * increment_size + SLAB_LABEL_SIZE;
        let aligned = align_up(slab_bytes, PAGE_SIZE);
        let extended = align_up(align_up(aligned, 16 * 1024), PAGE_SIZE);
        let slab_max_size = extended.max(256 * PAGE_SIZE);

        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = SowWriter {
            file: BufWriter::new(raw),
            record_size,
            increment_size,
            slab_max_size,
            file_size: 0,
            slab_written: 0,
            label_offset: PAGE_SIZE,
            meta_generation: 0,
        };

        fill_zeros(&mut writer.file, PAGE_SIZE)?;
        writer.write_header()?;
        writer.start_slab()?;
        Ok(writer)
    }

    /// Zeroes the label position of a fresh slab.
    fn start_slab(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(self.label_offset))?;
        fill_zeros(&mut self.file, SLAB_LABEL_SIZE)?;
        self.slab_written = SLAB_LABEL_SIZE;
        self.file_size += SLAB_LABEL_SIZE;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::with_capacity(68);
        put_padded(&mut buf, LATEST_VERSION_STRING.as_bytes(), 16);
        put_padded(&mut buf, COMPRESSION_TYPE.as_bytes(), 8);
        buf.write_u64::<LittleEndian>(COMPRESSION_OPTIONS)?;
        buf.write_u64::<LittleEndian>(self.file_size)?;
        buf.write_u64::<LittleEndian>(self.record_size)?;
        buf.write_u64::<LittleEndian>(self.increment_size)?;
        buf.write_u64::<LittleEndian>(self.meta_generation)?;
        let crc = crc32(&buf, 0);
        buf.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Appends one record, opening a new slab first when this one would
    /// overflow.
    pub fn write(&mut self, rec: &SowRecord) -> Result<()> {
        let var_len =
            (rec.string_key.len() + rec.correlation_id.len() + rec.data.len()) as u64;
        let allocated = align_up(RECORD_HEADER_SIZE + var_len + DEFAULT_PADDING, 128);

        if self.slab_written + allocated > self.slab_max_size
            && self.slab_written > SLAB_LABEL_SIZE
        {
            self.close_slab()?;
            self.start_slab()?;
        }

        self.file
            .seek(SeekFrom::Start(self.label_offset + self.slab_written))?;

        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE as usize + var_len as usize);
        buf.write_u32::<LittleEndian>(0)?; // crc, patched below
        buf.write_u32::<LittleEndian>(rec.flags)?;
        buf.write_u32::<LittleEndian>(rec.data.len() as u32)?;
        buf.write_u32::<LittleEndian>(allocated as u32)?;
        buf.write_u64::<LittleEndian>(self.label_offset)?;
        buf.write_u64::<LittleEndian>(rec.expiration_time)?;
        buf.write_u64::<LittleEndian>(rec.update_time)?;
        buf.write_u32::<LittleEndian>(rec.correlation_id.len() as u32)?;
        buf.write_u32::<LittleEndian>(rec.string_key.len() as u32)?;
        buf.write_u64::<LittleEndian>(rec.key)?;
        buf.write_u64::<LittleEndian>(rec.seq)?;
        buf.extend_from_slice(&rec.string_key);
        buf.extend_from_slice(&rec.correlation_id);
        buf.extend_from_slice(&rec.data);

        let crc = crc32(&buf[4..], RECORD_SEED);
        LittleEndian::write_u32(&mut buf[..4], crc);

        self.file.write_all(&buf)?;
        fill_zeros(&mut self.file, allocated - buf.len() as u64)?;
        self.slab_written += allocated;
        self.file_size += allocated;
        Ok(())
    }

    /// Pads the open slab to its final size and stamps its label.
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

    /// Persists the last-sync transaction id inside the metadata page.
    pub fn write_last_sync_tx_id(&mut self, tx_id: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(128))?;
        let mut buf = Vec::with_capacity(24);
        buf.write_u64::<LittleEndian>(0)?;
        buf.write_u64::<LittleEndian>(0)?;
        buf.write_u64::<LittleEndian>(tx_id)?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Closes the last slab, finalizes the metadata page and syncs the
    /// file to disk.
    pub fn close(mut self) -> Result<()> {
        self.close_slab()?;
        self.write_header()?;
        self.file.flush()?;
        self.file
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?
            .sync_all()?;
        Ok(())
    }
}
