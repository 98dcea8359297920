//! The normalized ack record.

use std::fmt::Write as _;

/// One per-client delivery cursor, normalized across both store dialects.
/// Legacy files have no flags, payload or slab geometry; those fields are
/// zero / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckRecord {
    pub crc: u32,
    pub flags: u32,
    /// Cells occupied in a legacy flat array (1 for slab files).
    pub num_records: u32,
    pub data_size: u32,
    pub allocated: u64,
    pub slab_offset: u64,
    pub generation_count: u64,
    pub client_name_hash: u64,
    pub client_seq: u64,
    pub local_tx_id: u64,
    /// Absolute file offset of the record (slab files).
    pub total_offset: u64,
    pub data: Vec<u8>,
}

impl AckRecord {
    /// Renders the record for a dump; legacy records show their flat-array
    /// shape, slab records their geometry.
    pub fn render(&self, legacy: bool) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "client            = {}", self.client_name_hash);
        let _ = writeln!(s, "crc               = {}", self.crc);
        if legacy {
            let _ = writeln!(s, "number of records = {}", self.num_records);
            let _ = writeln!(s, "client_seq        = {}", self.client_seq);
            let _ = write!(s, "txid              = {}", self.local_tx_id);
        } else {
            let _ = writeln!(s, "flags             = {}", self.flags);
            let _ = writeln!(s, "file offset       = {}", self.total_offset);
            let _ = writeln!(s, "slab offset       = {}", self.slab_offset);
            let _ = writeln!(s, "allocated         = {}", self.allocated);
            let _ = writeln!(s, "data_size         = {}", self.data_size);
            let _ = writeln!(s, "generation        = {}", self.generation_count);
            let _ = writeln!(s, "client seq        = {}", self.client_seq);
            let _ = write!(s, "local txid        = {}", self.local_tx_id);
        }
        s
    }
}
