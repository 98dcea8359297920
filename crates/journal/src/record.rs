//! The normalized journal record, its type/flag vocabulary and the
//! operator-facing rendering.

use byteorder::{ByteOrder, LittleEndian};
use common::{time, DumpOptions};
use std::fmt::Write as _;

/// Transaction-log entry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordType {
    #[default]
    Publish,
    DeltaPublish,
    SowDeleteByKey,
    SowDeleteByQuery,
    Duplicate,
    Ack,
    SowDeleteByData,
    SowDeleteByBookmark,
    Transfer,
    Noop,
    Unknown(u16),
}

impl RecordType {
    pub fn from_raw(raw: u16) -> RecordType {
        match raw {
            0 => RecordType::Publish,
            1 => RecordType::DeltaPublish,
            2 => RecordType::SowDeleteByKey,
            3 => RecordType::SowDeleteByQuery,
            4 => RecordType::Duplicate,
            5 => RecordType::Ack,
            6 => RecordType::SowDeleteByData,
            7 => RecordType::SowDeleteByBookmark,
            8 => RecordType::Transfer,
            9 => RecordType::Noop,
            other => RecordType::Unknown(other),
        }
    }

    pub fn as_raw(self) -> u16 {
        match self {
            RecordType::Publish => 0,
            RecordType::DeltaPublish => 1,
            RecordType::SowDeleteByKey => 2,
            RecordType::SowDeleteByQuery => 3,
            RecordType::Duplicate => 4,
            RecordType::Ack => 5,
            RecordType::SowDeleteByData => 6,
            RecordType::SowDeleteByBookmark => 7,
            RecordType::Transfer => 8,
            RecordType::Noop => 9,
            RecordType::Unknown(raw) => raw,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordType::Publish => "publish",
            RecordType::DeltaPublish => "delta-publish",
            RecordType::SowDeleteByKey => "sow_delete_by_key",
            RecordType::SowDeleteByQuery => "sow_delete_by_query",
            RecordType::Duplicate => "duplicate",
            RecordType::Ack => "ack",
            RecordType::SowDeleteByData => "sow_delete_by_data",
            RecordType::SowDeleteByBookmark => "sow_delete_by_bookmark",
            RecordType::Transfer => "transfer",
            RecordType::Noop => "noop",
            RecordType::Unknown(_) => "unknown",
        }
    }

    /// Types whose payload is bookkeeping, shown even under `--omit-data`.
    pub fn keeps_data_in_dumps(self) -> bool {
        matches!(
            self,
            RecordType::SowDeleteByBookmark | RecordType::Transfer
        )
    }
}

/// Record flag bits: 1 compressed, 2 string key, 4 cancel.
pub fn flags_str(flags: u16) -> &'static str {
    match flags {
        1 => "compressed",
        2 => "string key",
        3 => "compressed, string key",
        4 => "cancel",
        _ => "none",
    }
}

/// Message-type names are persisted as 64-bit hashes; this is the fixed
/// table of hashes the server has ever emitted.
pub fn message_type_name(hash: u64) -> String {
    match hash {
        11366176381677217403 => "fix".to_string(),
        2827704697691937455 => "nvfix".to_string(),
        10107872178429970057 => "xml".to_string(),
        9900685383425431138 => "json".to_string(),
        8442027542746405716 => "bson".to_string(),
        10020990295791775699 => "binary".to_string(),
        5817622476697324896 => "bflat".to_string(),
        698723037243269950 => "protobuf".to_string(),
        other => format!("{} (unknown)", other),
    }
}

/// A journal record normalized across every on-disk version. Fields a
/// source version does not carry are zero / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalRecord {
    pub crc: u32,
    pub size: u32,
    pub rtype: RecordType,
    pub flags: u16,
    pub message_len: u32,
    pub message_type_hash: u64,
    pub local_tx_id: u64,
    pub previous_local_tx_id: u64,
    pub source_tx_id: u64,
    pub source_name_hash: u64,
    pub client_name_hash: u64,
    pub client_seq: u64,
    pub topic_hash: u64,
    /// Only versions 1-4 persist a SOW key on journal entries.
    pub sow_key: u64,
    pub sow_expiration: u64,
    pub timestamp: u64,
    pub previous_size: u32,
    pub topic: Vec<u8>,
    pub auth_id: Vec<u8>,
    pub correlation_id: Vec<u8>,
    pub replication_path: Vec<u8>,
    pub key: Vec<u8>,
    pub data: Vec<u8>,
    /// File offset this record was read from.
    pub offset: u64,
    /// On-disk version of the source file, driving the rendering shape.
    pub version: u32,
}

impl JournalRecord {
    /// Transfer records embed the owning instance and request path in
    /// their payload.
    pub fn transfer_info(&self) -> Option<(u64, &[u8])> {
        if self.rtype != RecordType::Transfer || self.data.len() < 8 {
            return None;
        }
        Some((LittleEndian::read_u64(&self.data[..8]), &self.data[8..]))
    }

    fn data_for_dump(&self, opts: &DumpOptions) -> String {
        if self.flags == 1 || self.flags == 3 {
            return "compressed data".to_string();
        }
        if opts.omit_data && !self.rtype.keeps_data_in_dumps() {
            return "<removed from dump>".to_string();
        }
        String::from_utf8_lossy(&self.data).into_owned()
    }

    /// Renders one dump entry. The shape follows the source file version:
    /// newer versions carry more header fields.
    pub fn render(&self, entry: u64, opts: &DumpOptions) -> String {
        let iso = time::iso_timestamp(self.timestamp, opts.localtime);
        let expiration = if self.sow_expiration != 0 && opts.sow_expiration_iso {
            time::posix_to_iso8601(self.sow_expiration, opts.localtime)
        } else {
            self.sow_expiration.to_string()
        };

        let mut s = String::new();
        let _ = writeln!(s, "Entry               : {:>30}", entry);
        let _ = writeln!(s, "CRC                 : {:>30}", self.crc);
        let _ = writeln!(s, "type                : {:>30}", self.rtype.name());
        if self.version >= 7 {
            let _ = writeln!(s, "flags               : {:>30}", flags_str(self.flags));
            let _ = writeln!(s, "offset              : {:>30}", self.offset);
        }
        let _ = writeln!(s, "entry size          : {:>30}", self.size);
        let _ = writeln!(s, "msg len             : {:>30}", self.message_len);
        let _ = writeln!(
            s,
            "msg type            : {:>30}",
            message_type_name(self.message_type_hash)
        );
        let _ = writeln!(s, "localTxId           : {:>30}", self.local_tx_id);
        if self.version >= 5 {
            let _ = writeln!(
                s,
                "previousLocalTxId   : {:>30}",
                self.previous_local_tx_id
            );
        }
        let _ = writeln!(s, "sourceTxId          : {:>30}", self.source_tx_id);
        let _ = writeln!(s, "source              : {:>30}", self.source_name_hash);
        let _ = writeln!(s, "client              : {:>30}", self.client_name_hash);
        let _ = writeln!(s, "clientSeq           : {:>30}", self.client_seq);
        let _ = writeln!(s, "topicHash           : {:>30}", self.topic_hash);
        if self.version >= 5 {
            let _ = writeln!(s, "SOW expiration      : {:>30}", expiration);
        } else {
            let _ = writeln!(s, "SOW Key             : {:>30}", self.sow_key);
        }
        let _ = writeln!(s, "iso8601 timestamp   : {:>30}", iso);
        let _ = writeln!(s, "timestamp           : {:>30}", self.timestamp);
        if self.version >= 5 {
            let _ = writeln!(s, "previous size       : {:>30}", self.previous_size);
        } else {
            let _ = writeln!(s, "flags               : {:>30}", self.flags);
        }
        let _ = writeln!(s, "topic len           : {:>30}", self.topic.len());
        let _ = writeln!(s, "topic               : [{}]", String::from_utf8_lossy(&self.topic));
        let _ = writeln!(s, "data                : [{}]", self.data_for_dump(opts));
        if let Some((owner, request_path)) = self.transfer_info() {
            let _ = writeln!(s, "owner               : {:>30}", owner);
            let _ = writeln!(
                s,
                "requestPath         : [{}]",
                String::from_utf8_lossy(request_path)
            );
        }
        if !self.key.is_empty() {
            let _ = writeln!(s, "key len             : {:>30}", self.key.len());
            let _ = writeln!(s, "key                 : [{}]", String::from_utf8_lossy(&self.key));
        }
        if self.version >= 6 {
            let _ = writeln!(s, "correlation id len  : {:>30}", self.correlation_id.len());
            let _ = writeln!(
                s,
                "correlation id      : [{}]",
                String::from_utf8_lossy(&self.correlation_id)
            );
        }
        if self.version > 1 {
            let _ = writeln!(s, "auth ID len         : {:>30}", self.auth_id.len());
            let _ = writeln!(
                s,
                "auth ID             : [{}]",
                String::from_utf8_lossy(&self.auth_id)
            );
            let _ = writeln!(s, "rep path len        : {:>30}", self.replication_path.len());
            let _ = writeln!(
                s,
                "rep path            : [{}]",
                String::from_utf8_lossy(&self.replication_path)
            );
        }
        let _ = write!(s, "_____________________________________________________");
        s
    }
}
