//! Per-file and per-slab counters maintained while records are iterated
//! and rendered at the end of a dump.

use std::fmt::Write as _;

/// Counters for one slab of a slab-allocated store file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlabDetail {
    pub size: u64,
    pub offset: u64,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub stored_bytes: u64,
    pub data_bytes: u64,
    pub deleted_bytes: u64,
}

impl SlabDetail {
    pub fn new(size: u64, offset: u64) -> SlabDetail {
        SlabDetail {
            size,
            offset,
            ..SlabDetail::default()
        }
    }
}

/// Whole-file counters reported after a dump.
#[derive(Debug, Clone, Default)]
pub struct FileSummary {
    pub file_name: String,
    pub version: String,
    pub record_size: u64,
    pub valid_keys: u64,
    pub number_of_records: u64,
    pub multi_records: u64,
    pub invalid_records: u64,
    pub max_data_size: u64,
    pub total_data_size: u64,
    pub slabs: Vec<SlabDetail>,
}

impl FileSummary {
    pub fn new(file_name: &str, version: &str, record_size: u64) -> FileSummary {
        FileSummary {
            file_name: file_name.to_string(),
            version: version.to_string(),
            record_size,
            ..FileSummary::default()
        }
    }

    /// Accounts one valid record's data size.
    pub fn note_data_size(&mut self, size: u64) {
        self.total_data_size += size;
        self.max_data_size = self.max_data_size.max(size);
    }

    /// Accounts one read record cell occupying `allocated` bytes.
    pub fn note_record(&mut self, allocated: u64) {
        if self.record_size > 0 && allocated > self.record_size {
            self.number_of_records += allocated / self.record_size;
            self.multi_records += 1;
        } else {
            self.number_of_records += 1;
        }
    }

    /// Renders the operator-facing summary block.
    pub fn render(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "File                : {:>20}", self.file_name);
        let _ = writeln!(s, "Version             : {:>20}", self.version);
        let _ = writeln!(s, "Valid Keys          : {:>20}", self.valid_keys);
        let _ = writeln!(s, "Record Size         : {:>20}", self.record_size);
        let _ = writeln!(s, "Maximum Records     : {:>20}", self.number_of_records);
        let _ = writeln!(s, "Multirecords        : {:>20}", self.multi_records);
        if self.valid_keys > 0 {
            let _ = writeln!(s, "Maximum record size : {:>20}", self.max_data_size);
            let _ = writeln!(
                s,
                "Average record size : {:>20.2}",
                self.total_data_size as f64 / self.valid_keys as f64
            );
        } else {
            let _ = writeln!(s, "Maximum record size : {:>20}", "(no data)");
            let _ = writeln!(s, "Average record size : {:>20}", "(no data)");
        }
        if !self.slabs.is_empty() {
            let _ = writeln!(s, "Slab Count          : {:>20}", self.slabs.len());
            for slab in &self.slabs {
                let _ = writeln!(s, "\nSlab Detail");
                let _ = writeln!(s, "  size          : {:>20}", slab.size);
                let _ = writeln!(s, "  file offset   : {:>20}", slab.offset);
                let _ = writeln!(s, "  valid count   : {:>20}", slab.valid_count);
                let _ = writeln!(s, "  invalid count : {:>20}", slab.invalid_count);
                let _ = writeln!(s, "  stored bytes  : {:>20}", slab.stored_bytes);
                let _ = writeln!(s, "  data bytes    : {:>20}", slab.data_bytes);
                let _ = writeln!(s, "  deleted bytes : {:>20}", slab.deleted_bytes);
            }
        }
        s
    }
}
