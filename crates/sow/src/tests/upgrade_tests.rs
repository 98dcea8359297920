use tempfile::tempdir;

use super::{make_record, write_v1_file, write_v3_file};
use crate::{SowReader, SowRecord, SowVersion, SowWriter};

#[test]
fn upgrade_is_idempotent_on_latest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("topic.sow");
    let mut w = SowWriter::create(&path, 512, 10_000).unwrap();
    w.write(&make_record(1, 5, b"latest")).unwrap();
    w.close().unwrap();

    let out = dir.path().join("copy.sow");
    crate::upgrade(&path, &out, 512, 10_000).unwrap();
    assert_eq!(
        std::fs::read(&path).unwrap(),
        std::fs::read(&out).unwrap(),
        "latest-version upgrade must be a byte-for-byte copy"
    );
}

#[test]
fn upgraded_file_is_up_to_date() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.sow");
    write_v3_file(&old, &[(1, 1, b"a"), (2, 2, b"b")], 0);
    assert!(!crate::is_up_to_date(&old).unwrap());

    let new = dir.path().join("new.sow");
    crate::upgrade(&old, &new, 512, 10_000).unwrap();
    assert!(crate::is_up_to_date(&new).unwrap());
}

#[test]
fn oldest_version_upgrades_to_latest() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.sow");
    write_v1_file(&old, &[(0x11, 7, b"alpha"), (0x22, 8, b"beta")]);

    let new = dir.path().join("new.sow");
    crate::upgrade(&old, &new, 512, 10_000).unwrap();

    let mut r = SowReader::open(&new).unwrap();
    assert_eq!(r.version(), SowVersion::V6);
    let got: Vec<SowRecord> = r.records().collect();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].key, 0x11);
    assert_eq!(got[0].data, b"alpha");
    assert_eq!(got[1].seq, 8);
    assert_eq!(r.summary().invalid_records, 0);
}

#[test]
fn upgrade_propagates_persisted_sync_marker() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.sow");
    write_v3_file(&old, &[(1, 41, b"a"), (2, 99, b"b")], 77);

    let new = dir.path().join("new.sow");
    crate::upgrade(&old, &new, 512, 10_000).unwrap();

    let mut r = SowReader::open(&new).unwrap();
    assert_eq!(r.last_sync_tx_id().unwrap(), 77);
}

#[test]
fn upgrade_stamps_highest_tx_id_without_marker() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.sow");
    write_v3_file(&old, &[(1, 41, b"a"), (2, 99, b"b"), (3, 7, b"c")], 0);

    let new = dir.path().join("new.sow");
    crate::upgrade(&old, &new, 512, 10_000).unwrap();

    let mut r = SowReader::open(&new).unwrap();
    assert_eq!(r.last_sync_tx_id().unwrap(), 99);
}

#[test]
fn gzip_wrapped_upgrade_matches_plain_upgrade() {
    let dir = tempdir().unwrap();
    let plain_old = dir.path().join("store.sow");
    write_v3_file(&plain_old, &[(1, 1, b"alpha"), (2, 2, b"beta")], 0);

    let gz_old = dir.path().join("packed").join("store.sow.gz");
    std::fs::create_dir_all(gz_old.parent().unwrap()).unwrap();
    common::gz::compress_file(&plain_old, &gz_old).unwrap();

    let plain_new = dir.path().join("store-new.sow");
    crate::upgrade(&plain_old, &plain_new, 512, 10_000).unwrap();

    let gz_new = dir.path().join("packed").join("store-new.sow.gz");
    crate::upgrade(&gz_old, &gz_new, 512, 10_000).unwrap();

    let unpacked = dir.path().join("unpacked.sow");
    common::gz::decompress_file(&gz_new, &unpacked).unwrap();
    assert_eq!(
        std::fs::read(&unpacked).unwrap(),
        std::fs::read(&plain_new).unwrap()
    );
}

#[test]
fn upgraded_records_survive_a_second_upgrade() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.sow");
    let values: Vec<(u64, u64, &[u8])> =
        vec![(1, 1, b"one"), (2, 2, b"two"), (3, 3, b"three")];
    write_v3_file(&old, &values, 0);

    let mid = dir.path().join("mid.sow");
    crate::upgrade(&old, &mid, 512, 10_000).unwrap();
    let out = dir.path().join("out.sow");
    crate::upgrade(&mid, &out, 512, 10_000).unwrap();

    let mut r = SowReader::open(&out).unwrap();
    let got: Vec<SowRecord> = r.records().collect();
    assert_eq!(got.len(), 3);
    assert_eq!(got[2].data, b"three");
}
