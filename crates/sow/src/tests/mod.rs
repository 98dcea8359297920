mod upgrade_tests;
mod writer_tests;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::Write as _;
use std::path::Path;

use crate::SowRecord;

/// Builds a normalized record the way the upgrade path would see it.
pub(crate) fn make_record(key: u64, seq: u64, data: &[u8]) -> SowRecord {
    SowRecord {
        key,
        seq,
        data_size: data.len() as u32,
        data: data.to_vec(),
        ..SowRecord::default()
    }
}

/// Writes a version-1 flat-array SOW file (`amps::amps_pstore/1.0`):
/// 56-byte all-u64 record prefixes, terminated by an all-zero cell.
pub(crate) fn write_v1_file(path: &Path, records: &[(u64, u64, &[u8])]) {
    const RECORD_SIZE: usize = 512;
    let mut header = vec![0u8; 4096];
    header[..21].copy_from_slice(b"amps::amps_pstore/1.0");
    LittleEndian::write_u64(&mut header[24..32], RECORD_SIZE as u64);
    LittleEndian::write_u64(&mut header[32..40], records.len() as u64);

    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&header).unwrap();
    for &(key, seq, data) in records {
        let mut cell = vec![0u8; RECORD_SIZE];
        LittleEndian::write_u64(&mut cell[0..8], 0xBEEF); // crc, unchecked
        LittleEndian::write_u64(&mut cell[8..16], 0); // flags
        LittleEndian::write_u64(&mut cell[16..24], 100); // node size, one cell
        LittleEndian::write_u64(&mut cell[24..32], 0); // row header size
        LittleEndian::write_u64(&mut cell[32..40], data.len() as u64);
        LittleEndian::write_u64(&mut cell[40..48], key);
        LittleEndian::write_u64(&mut cell[48..56], seq);
        cell[56..56 + data.len()].copy_from_slice(data);
        file.write_all(&cell).unwrap();
    }
    file.write_all(&vec![0u8; RECORD_SIZE]).unwrap();
}

/// Writes a version-2.x flat-array SOW file; `magic` selects 2.0
/// (`persist::gpstore/1.0`) or 2.1 (`persist::gpstore/1.1`). Each record
/// carries its own validity stamp so tests can break it.
pub(crate) fn write_v2_file(path: &Path, magic: &[u8], records: &[(u64, u64, &[u8], u32)]) {
    const RECORD_SIZE: usize = 512;
    let mut header = vec![0u8; 4096];
    header[..magic.len()].copy_from_slice(magic);
    LittleEndian::write_u64(&mut header[32..40], RECORD_SIZE as u64);
    LittleEndian::write_u64(&mut header[40..48], records.len() as u64);

    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&header).unwrap();
    for &(key, seq, data, valid) in records {
        let mut cell = vec![0u8; RECORD_SIZE];
        LittleEndian::write_u32(&mut cell[0..4], 0xFEED); // crc, unchecked
        LittleEndian::write_u32(&mut cell[4..8], valid);
        LittleEndian::write_u32(&mut cell[8..12], 1); // num records
        LittleEndian::write_u32(&mut cell[12..16], data.len() as u32);
        LittleEndian::write_u32(&mut cell[16..20], 0); // row header size
        // 4 bytes of alignment padding precede the u64 fields
        LittleEndian::write_u64(&mut cell[24..32], key);
        LittleEndian::write_u64(&mut cell[32..40], seq);
        cell[40..40 + data.len()].copy_from_slice(data);
        file.write_all(&cell).unwrap();
    }
    file.write_all(&vec![0u8; RECORD_SIZE]).unwrap();
}

/// The validity stamp every live version-2.0 record carries.
pub(crate) const V2_STAMP: u32 = 0xA5A5_A5A5;

/// Writes a version-3.0 flat-array SOW file with the given records and a
/// last-sync marker, terminated by an all-zero cell.
pub(crate) fn write_v3_file(path: &Path, records: &[(u64, u64, &[u8])], sync_tx_id: u64) {
    const RECORD_SIZE: usize = 512;
    let mut header = vec![0u8; 4096];
    header[..20].copy_from_slice(b"persist::gpstore/3.0");
    LittleEndian::write_u64(&mut header[32..40], RECORD_SIZE as u64);
    LittleEndian::write_u64(&mut header[40..48], records.len() as u64);
    LittleEndian::write_u64(&mut header[48..56], RECORD_SIZE as u64);
    // last-sync triple (crc, sow key, tx id) lives at offset 64
    LittleEndian::write_u64(&mut header[80..88], sync_tx_id);

    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&header).unwrap();
    for &(key, seq, data) in records {
        let cells = (40 + data.len()).div_ceil(RECORD_SIZE);
        let mut cell = Vec::with_capacity(cells * RECORD_SIZE);
        cell.write_u32::<LittleEndian>(0xBEEF).unwrap(); // crc, unchecked in flat stores
        cell.write_u32::<LittleEndian>(0).unwrap(); // valid
        cell.write_u32::<LittleEndian>(cells as u32).unwrap();
        cell.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        cell.write_u64::<LittleEndian>(0).unwrap(); // expiration
        cell.write_u64::<LittleEndian>(key).unwrap();
        cell.write_u64::<LittleEndian>(seq).unwrap();
        cell.extend_from_slice(data);
        cell.resize(cells * RECORD_SIZE, 0);
        file.write_all(&cell).unwrap();
    }
    // an all-zero cell terminates flat-array iteration
    file.write_all(&vec![0u8; RECORD_SIZE]).unwrap();
}
