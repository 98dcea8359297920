//! The normalized SOW record and its operator-facing rendering.

use common::{time, DumpOptions};
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

/// Record flag bits. `INVALID` marks a reclaimed cell; the rest describe
/// live records.
pub const INVALID_FLAG: u32 = 1;
pub const HISTORICAL_FLAG: u32 = 2;
pub const HISTORICAL_DELETE_FLAG: u32 = 4;
pub const COMPRESSED_FLAG: u32 = 8;
pub const STRING_KEY_FLAG: u32 = 16;

/// A SOW record normalized across every on-disk version.
///
/// Fields a source version does not carry are defaulted: zero for counters
/// and times, empty bytes for the string key and correlation id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SowRecord {
    pub crc: u32,
    pub flags: u32,
    pub data_size: u32,
    pub allocated: u64,
    pub slab_offset: u64,
    pub expiration_time: u64,
    pub update_time: u64,
    pub generation_count: u64,
    pub key: u64,
    pub seq: u64,
    pub string_key: Vec<u8>,
    pub correlation_id: Vec<u8>,
    pub data: Vec<u8>,
}

impl SowRecord {
    /// Renders the flag bits the way operators read them.
    pub fn flags_str(&self) -> String {
        let mut parts = Vec::new();
        if self.flags & HISTORICAL_FLAG != 0 {
            parts.push("historical");
        }
        if self.flags & HISTORICAL_DELETE_FLAG != 0 {
            parts.push("historical_delete");
        }
        if self.flags & COMPRESSED_FLAG != 0 {
            parts.push("compressed");
        }
        if self.flags & STRING_KEY_FLAG != 0 {
            parts.push("string_key");
        }
        if parts.is_empty() {
            "0".to_string()
        } else {
            parts.join(",")
        }
    }

    /// Whether the record's expiration lies in the past. Expirations are
    /// POSIX seconds, except that historical files occasionally persist a
    /// 1601-epoch microsecond value instead; both are handled.
    pub fn is_expired(&self) -> bool {
        if self.expiration_time == 0 {
            return false;
        }
        let exp_secs = if self.expiration_time > 9_999_999_999_999_999 {
            (self.expiration_time / 1_000_000).saturating_sub(time::SECONDS_TO_UNIX_EPOCH as u64)
        } else {
            self.expiration_time
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        exp_secs < now
    }

    /// Renders the record for a dump. Returns `None` when the record is
    /// expired and the options exclude expired records.
    pub fn render(&self, opts: &DumpOptions) -> Option<String> {
        if self.is_expired() && !opts.include_expired {
            return None;
        }
        if !opts.verbose {
            return Some(String::from_utf8_lossy(&self.data).into_owned());
        }
        let exp_tag = if self.flags & HISTORICAL_DELETE_FLAG != 0 {
            "deleted"
        } else {
            "expiration"
        };
        let exp_val = if self.expiration_time == 0 {
            "0".to_string()
        } else {
            time::posix_to_iso8601(self.expiration_time, opts.localtime)
        };
        let update = if self.update_time == 0 {
            "0".to_string()
        } else {
            time::amps_to_iso8601(self.update_time, opts.localtime)
        };

        let mut s = String::new();
        let _ = writeln!(s, "key               = {}", self.key);
        let _ = writeln!(s, "crc               = {}", self.crc);
        let _ = writeln!(s, "flags             = {}", self.flags_str());
        let _ = writeln!(s, "slab offset       = {}", self.slab_offset);
        let _ = writeln!(s, "allocated         = {}", self.allocated);
        let _ = writeln!(s, "data size         = {}", self.data_size);
        let _ = writeln!(s, "{:<17} = {}", exp_tag, exp_val);
        let _ = writeln!(s, "iso8601 timestamp = {}", update);
        let _ = writeln!(s, "local txid        = {}", self.seq);
        let _ = writeln!(
            s,
            "string key        = [{}]",
            String::from_utf8_lossy(&self.string_key)
        );
        let _ = writeln!(
            s,
            "correlation id    = [{}]",
            String::from_utf8_lossy(&self.correlation_id)
        );
        let _ = write!(
            s,
            "data              = [{}]",
            String::from_utf8_lossy(&self.data)
        );
        Some(s)
    }
}
