//! Latest-version (4.0) ack store writing.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use common::crc::{crc32, RECORD_SEED};
use common::framing::{align_up, fill_zeros, put_padded};
use common::slab::{SlabLabel, SLAB_LABEL_SIZE};
use common::{Result, StoreError, DEFAULT_PADDING, MIN_SLAB_SIZE, PAGE_SIZE};
use std::fs::OpenOptions;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::record::AckRecord;
use crate::LATEST_VERSION_STRING;

const RECORD_HEADER_SIZE: u64 = 56;
const INCREMENT_SIZE: u64 = 512;

/// Writes a version-4.0 ack store.
///
/// Ack slabs are small and fixed: every slab is padded to 144 KiB (or the
/// next page boundary beyond that). The metadata page is finalized by
/// [`close`](AckWriter::close); a writer dropped without closing leaves a
/// file whose metadata does not describe its contents.
pub struct AckWriter {
    file: BufWriter<std::fs::File>,
    record_size: u64,
    slab_max_size: u64,
    file_size: u64,
    slab_written: u64,
    label_offset: u64,
    meta_generation: u64,
}

impl AckWriter {
    /// Creates `path`; `record_size` is recorded in the metadata page
    /// (readers use it for multi-record accounting).
    pub fn create(path: &Path, record_size: u64) -> Result<AckWriter> {
        if record_size == 0 {
            return Err(StoreError::InvalidArgument(
                "record_size is required to write an ack file".to_string(),
            ));
        }
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut writer = AckWriter {
            file: BufWriter::new(raw),
            record_size,
            slab_max_size: MIN_SLAB_SIZE,
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

    /// Appends one cursor record.
    pub fn write(&mut self, rec: &AckRecord) -> Result<()> {
        let allocated = align_up(
            RECORD_HEADER_SIZE + rec.data.len() as u64 + DEFAULT_PADDING,
            128,
        );
        if self.slab_written + allocated > self.slab_max_size
            && self.slab_written > SLAB_LABEL_SIZE
        {
            self.close_slab()?;
            self.start_slab()?;
        }

        self.file
            .seek(SeekFrom::Start(self.label_offset + self.slab_written))?;
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE as usize + rec.data.len());
        buf.write_u32::<LittleEndian>(0)?; // crc, patched below
        buf.write_u32::<LittleEndian>(rec.flags)?;
        buf.write_u32::<LittleEndian>(rec.data.len() as u32)?;
        buf.write_u32::<LittleEndian>(allocated as u32)?;
        buf.write_u64::<LittleEndian>(self.label_offset)?;
        buf.write_u64::<LittleEndian>(rec.generation_count)?;
        buf.write_u64::<LittleEndian>(rec.client_name_hash)?;
        buf.write_u64::<LittleEndian>(rec.client_seq)?;
        buf.write_u64::<LittleEndian>(rec.local_tx_id)?;
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
