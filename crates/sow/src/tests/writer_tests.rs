use tempfile::tempdir;

use super::{make_record, write_v3_file};
use crate::{SowReader, SowRecord, SowVersion, SowWriter};

#[test]
fn write_then_read_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");

    let records: Vec<SowRecord> = (1..=10u64)
        .map(|i| make_record(0x1000 + i, 100 + i, format!("payload-{}", i).as_bytes()))
        .collect();

    let mut w = SowWriter::create(&path, 512, 10_000).unwrap();
    for rec in &records {
        w.write(rec).unwrap();
    }
    w.close().unwrap();

    let mut r = SowReader::open(&path).unwrap();
    assert_eq!(r.version(), SowVersion::V6);
    let got: Vec<SowRecord> = r.records().collect();
    assert_eq!(got.len(), records.len());
    for (got, want) in got.iter().zip(&records) {
        assert_eq!(got.key, want.key);
        assert_eq!(got.seq, want.seq);
        assert_eq!(got.data, want.data);
        assert_eq!(got.data_size as usize, want.data.len());
        assert_ne!(got.crc, 0);
        assert_eq!(got.allocated % 128, 0);
        assert!(got.data_size as u64 <= got.allocated);
        assert_eq!(got.slab_offset, 4096);
    }
    assert_eq!(r.summary().valid_keys, 10);
    assert_eq!(r.summary().invalid_records, 0);
}

#[test]
fn string_key_and_correlation_id_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");

    let rec = SowRecord {
        key: 7,
        seq: 9,
        flags: crate::record::STRING_KEY_FLAG,
        string_key: b"order-42".to_vec(),
        correlation_id: b"corr-1".to_vec(),
        data: b"{\"qty\":3}".to_vec(),
        data_size: 9,
        ..SowRecord::default()
    };

    let mut w = SowWriter::create(&path, 512, 10_000).unwrap();
    w.write(&rec).unwrap();
    w.close().unwrap();

    let mut r = SowReader::open(&path).unwrap();
    let got: Vec<SowRecord> = r.records().collect();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].string_key, b"order-42");
    assert_eq!(got[0].correlation_id, b"corr-1");
    assert_eq!(got[0].data, b"{\"qty\":3}");
    assert_eq!(got[0].flags, crate::record::STRING_KEY_FLAG);
}

#[test]
fn records_spill_across_slabs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");

    // slab capacity bottoms out at 1 MiB; ~2.5 MiB of records forces
    // at least three slabs
    let data = vec![b'x'; 1024];
    let count = 2100u64;
    let mut w = SowWriter::create(&path, 512, 128).unwrap();
    for i in 0..count {
        w.write(&make_record(i + 1, i + 1, &data)).unwrap();
    }
    w.close().unwrap();

    let mut r = SowReader::open(&path).unwrap();
    let got = r.records().count();
    assert_eq!(got as u64, count);
    let summary = r.summary();
    assert!(summary.slabs.len() >= 3, "expected >= 3 slabs, got {}", summary.slabs.len());
    // slab offsets strictly increase and match their file positions
    let mut last_offset = 0;
    for slab in &summary.slabs {
        assert!(slab.offset > last_offset);
        last_offset = slab.offset;
    }
}

#[test]
fn record_exactly_filling_slab_stays_in_slab() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");

    // capacity after the label: 1 MiB - 128; a record allocated exactly
    // that many bytes must not open a second slab
    let slab_capacity: usize = 1024 * 1024 - 128;
    let data = vec![b'a'; slab_capacity - 64 - 16];

    let mut w = SowWriter::create(&path, 512, 128).unwrap();
    w.write(&make_record(1, 1, &data)).unwrap();
    w.close().unwrap();

    let mut r = SowReader::open(&path).unwrap();
    let got: Vec<crate::SowRecord> = r.records().collect();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].allocated as usize, slab_capacity);
    assert_eq!(r.summary().slabs.len(), 1);
}

#[test]
fn record_one_byte_over_opens_new_slab() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");

    let slab_capacity: usize = 1024 * 1024 - 128;
    let first = vec![b'a'; slab_capacity - 64 - 16];
    // one more data byte pushes allocation past the remaining space
    let second = vec![b'b'; 200];

    let mut w = SowWriter::create(&path, 512, 128).unwrap();
    w.write(&make_record(1, 1, &first)).unwrap();
    w.write(&make_record(2, 2, &second)).unwrap();
    w.close().unwrap();

    let mut r = SowReader::open(&path).unwrap();
    let got: Vec<crate::SowRecord> = r.records().collect();
    assert_eq!(got.len(), 2);
    assert_ne!(got[0].slab_offset, got[1].slab_offset);
    assert_eq!(r.summary().slabs.len(), 2);
}

#[test]
fn writer_requires_sizing_arguments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");
    assert!(SowWriter::create(&path, 0, 10_000).is_err());
    assert!(SowWriter::create(&path, 512, 0).is_err());
}

#[test]
fn empty_store_reads_back_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");
    let w = SowWriter::create(&path, 512, 10_000).unwrap();
    w.close().unwrap();

    let mut r = SowReader::open(&path).unwrap();
    assert_eq!(r.records().count(), 0);
}

#[test]
fn upgrade_carries_flat_records_into_slabs() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.sow");
    write_v3_file(&old, &[(0x1111, 42, b"hello")], 0);

    let new = dir.path().join("new.sow");
    crate::upgrade(&old, &new, 512, 10_000).unwrap();

    let mut r = SowReader::open(&new).unwrap();
    assert_eq!(r.version(), SowVersion::V6);
    let got: Vec<crate::SowRecord> = r.records().collect();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].key, 0x1111);
    assert_eq!(got[0].seq, 42);
    assert_eq!(got[0].data, b"hello");
    assert_eq!(got[0].slab_offset, 4096);
    assert_eq!(r.summary().invalid_records, 0);
}
