//! The 128-byte slab label.
//!
//! Slab-allocated store files carry their records inside variable-size
//! containers ("slabs"). Each slab begins with a label:
//!
//! ```text
//! magic "AMPSSLAB"[8] | size: u64 LE | offset: u64 LE | crc: u32 LE
//! ```
//!
//! zero-padded to 128 bytes. `offset` is the absolute file offset of the
//! slab itself and `size` is the full slab length including the label and
//! trailing padding, so `offset + size` is the next label position. The CRC
//! covers the first 24 label bytes, seed 0.

use byteorder::{ByteOrder, LittleEndian};
use std::io::{self, Read, Seek, SeekFrom};

use crate::crc::crc32;
use crate::framing::read_exact_or_eof;

/// Magic prefix of every slab label.
pub const SLAB_MAGIC: &[u8; 8] = b"AMPSSLAB";

/// On-disk size of a slab label (and of every record header cell).
pub const SLAB_LABEL_SIZE: u64 = 128;

/// A decoded slab label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabLabel {
    pub size: u64,
    pub offset: u64,
    pub crc: u32,
}

impl SlabLabel {
    /// Decodes a label from its 128 raw bytes. Returns `None` when the
    /// magic is absent (end of data, or an unwritten first slab).
    pub fn decode(bytes: &[u8]) -> Option<SlabLabel> {
        if bytes.len() < 28 || &bytes[..8] != SLAB_MAGIC {
            return None;
        }
        Some(SlabLabel {
            size: LittleEndian::read_u64(&bytes[8..16]),
            offset: LittleEndian::read_u64(&bytes[16..24]),
            crc: LittleEndian::read_u32(&bytes[24..28]),
        })
    }

    /// Encodes a full 128-byte label for a slab of `size` bytes based at
    /// file offset `offset`, with the CRC stamped.
    pub fn encode(size: u64, offset: u64) -> [u8; SLAB_LABEL_SIZE as usize] {
        let mut buf = [0u8; SLAB_LABEL_SIZE as usize];
        buf[..8].copy_from_slice(SLAB_MAGIC);
        LittleEndian::write_u64(&mut buf[8..16], size);
        LittleEndian::write_u64(&mut buf[16..24], offset);
        let crc = crc32(&buf[..24], 0);
        LittleEndian::write_u32(&mut buf[24..28], crc);
        buf
    }
}

/// Reads and verifies the slab label at `offset`.
///
/// `Ok(None)` ends slab iteration: a short read, a missing magic (the space
/// past the last slab, or a first slab that was reserved but never
/// written), or a label that fails its CRC (reported as a diagnostic; the
/// records before it are still good).
pub fn read_label<R: Read + Seek + ?Sized>(
    r: &mut R,
    offset: u64,
) -> io::Result<Option<SlabLabel>> {
    r.seek(SeekFrom::Start(offset))?;
    let mut buf = [0u8; SLAB_LABEL_SIZE as usize];
    let n = read_exact_or_eof(r, &mut buf)?;
    if n < buf.len() {
        return Ok(None);
    }
    let label = match SlabLabel::decode(&buf) {
        Some(label) => label,
        None => return Ok(None),
    };
    let computed = crc32(&buf[..24], 0);
    if computed != label.crc {
        log::error!(
            "bad slab header at offset {}: found crc {} but should be {}",
            offset,
            label.crc,
            computed
        );
        return Ok(None);
    }
    Ok(Some(label))
}
