use super::*;
use tempfile::tempdir;

fn make_point(client: u64, topic: u64, seq: u64, data: &[u8]) -> QueueRecord {
    QueueRecord {
        client_name_hash: client,
        topic_hash: topic,
        client_seq: seq,
        local_tx_id: seq * 10,
        creation_tx_id: seq,
        creation_timestamp: (common::time::SECONDS_TO_UNIX_EPOCH as u64 + 1_700_000_000)
            * 1_000_000,
        data_len: data.len() as u32,
        data: data.to_vec(),
        ..QueueRecord::default()
    }
}

#[test]
fn write_then_read_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queues.ack");

    let mut w = QueueWriter::create(&path, 128).unwrap();
    for i in 1..=4u64 {
        w.write(&make_point(100 + i, 0xAAA, i, b"bookmark-state"))
            .unwrap();
    }
    w.close().unwrap();

    let mut r = QueueReader::open(&path).unwrap();
    assert_eq!(r.record_size(), 128);
    let got: Vec<QueueRecord> = r.records().collect();
    assert_eq!(got.len(), 4);
    for (i, rec) in got.iter().enumerate() {
        let i = i as u64 + 1;
        assert_eq!(rec.client_name_hash, 100 + i);
        assert_eq!(rec.topic_hash, 0xAAA);
        assert_eq!(rec.client_seq, i);
        assert_eq!(rec.local_tx_id, i * 10);
        assert_eq!(rec.creation_tx_id, i);
        assert_eq!(rec.data, b"bookmark-state");
        assert_ne!(rec.crc, 0);
        assert_eq!(rec.allocated % 128, 0);
    }
    assert_eq!(r.summary().valid_keys, 4);
    assert_eq!(r.summary().slabs.len(), 1);
}

#[test]
fn version_recognizes_store_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queues.ack");
    let w = QueueWriter::create(&path, 128).unwrap();
    w.close().unwrap();
    assert_eq!(version(&path).unwrap(), "4.0");

    let bogus = dir.path().join("bogus.ack");
    std::fs::write(&bogus, vec![7u8; 8192]).unwrap();
    assert!(version(&bogus).is_err());
}

#[test]
fn corrupt_record_is_skipped_and_counted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queues.ack");
    let mut w = QueueWriter::create(&path, 128).unwrap();
    for i in 1..=3u64 {
        w.write(&make_point(i, 1, i, b"0123456789")).unwrap();
    }
    w.close().unwrap();

    // flip one payload byte of the middle record (allocated 128 each)
    use std::io::{Seek, SeekFrom, Write};
    let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(4096 + 128 + 128 + 80 + 4)).unwrap();
    file.write_all(&[0xFF]).unwrap();
    drop(file);

    let mut r = QueueReader::open(&path).unwrap();
    let got: Vec<QueueRecord> = r.records().collect();
    assert_eq!(got.len(), 2);
    assert_eq!(r.summary().invalid_records, 1);
}

#[test]
fn dump_renders_recovery_points() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queues.ack");
    let mut w = QueueWriter::create(&path, 128).unwrap();
    w.write(&make_point(5, 0xBEE, 9, b"recovery")).unwrap();
    w.close().unwrap();

    let mut out = Vec::new();
    dump(&path, &common::DumpOptions::default(), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("client             = 5"));
    assert!(text.contains("client seq         = 9"));
    assert!(text.contains("recovery point     = recovery"));
    assert!(text.contains("Slab Count"));
}

#[test]
fn truncated_tail_terminates_gracefully() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queues.ack");
    let mut w = QueueWriter::create(&path, 128).unwrap();
    for i in 1..=3u64 {
        w.write(&make_point(i, 1, i, &vec![b'q'; 300])).unwrap();
    }
    w.close().unwrap();

    // chop into the last record's payload (allocated 512 each)
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(4096 + 128 + 512 + 512 + 200).unwrap();
    drop(file);

    let mut r = QueueReader::open(&path).unwrap();
    assert_eq!(r.records().count(), 2);
}
