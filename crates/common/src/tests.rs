use super::*;
use std::io::Cursor;
use tempfile::tempdir;

// -------------------- CRC --------------------

#[test]
fn crc32_check_value() {
    // Standard CRC-32/IEEE check value.
    assert_eq!(crc::crc32(b"123456789", 0), 0xCBF4_3926);
}

#[test]
fn crc32_seed_chaining_matches_single_pass() {
    let data = b"the quick brown fox jumps over the lazy dog";
    let whole = crc::crc32(data, 0);
    let first = crc::crc32(&data[..17], 0);
    let chained = crc::crc32(&data[17..], first);
    assert_eq!(whole, chained);
}

#[test]
fn crc32_record_seed_differs_from_zero_seed() {
    let data = b"payload";
    assert_ne!(crc::crc32(data, 0), crc::crc32(data, crc::RECORD_SEED));
}

#[test]
fn crc32_range_clamps_end() {
    let data = b"abcdef";
    assert_eq!(
        crc::crc32_range(data, 0, 2, 100),
        crc::crc32(&data[2..], 0)
    );
    // offset beyond end yields the empty-range checksum (the seed itself)
    assert_eq!(crc::crc32_range(data, 7, 10, 4), 7);
}

// -------------------- framing --------------------

#[test]
fn padded_str_stops_at_nul() {
    assert_eq!(framing::padded_str(b"amps-sow-v3.0\0\0\0"), "amps-sow-v3.0");
    assert_eq!(framing::padded_str(b"nonul"), "nonul");
}

#[test]
fn put_padded_pads_and_truncates() {
    let mut buf = Vec::new();
    framing::put_padded(&mut buf, b"gz", 8);
    assert_eq!(buf, b"gz\0\0\0\0\0\0");

    let mut buf = Vec::new();
    framing::put_padded(&mut buf, b"overlong", 4);
    assert_eq!(buf, b"over");
}

#[test]
fn align_up_rounds_to_power_of_two() {
    assert_eq!(framing::align_up(0, 128), 0);
    assert_eq!(framing::align_up(1, 128), 128);
    assert_eq!(framing::align_up(128, 128), 128);
    assert_eq!(framing::align_up(129, 256), 256);
}

#[test]
fn read_exact_or_eof_reports_short_reads() {
    let mut cur = Cursor::new(vec![1u8, 2, 3]);
    let mut buf = [0u8; 8];
    let n = framing::read_exact_or_eof(&mut cur, &mut buf).unwrap();
    assert_eq!(n, 3);
    assert_eq!(&buf[..3], &[1, 2, 3]);
}

#[test]
fn fill_zeros_writes_requested_count() {
    let mut out = Vec::new();
    framing::fill_zeros(&mut out, 10_000).unwrap();
    assert_eq!(out.len(), 10_000);
    assert!(out.iter().all(|&b| b == 0));
}

// -------------------- slab labels --------------------

#[test]
fn slab_label_roundtrip() {
    let bytes = slab::SlabLabel::encode(144 * 1024, 4096);
    let label = slab::SlabLabel::decode(&bytes).unwrap();
    assert_eq!(label.size, 144 * 1024);
    assert_eq!(label.offset, 4096);
    assert_eq!(label.crc, crc::crc32(&bytes[..24], 0));
}

#[test]
fn read_label_accepts_valid_label() {
    let mut file = vec![0u8; 4096];
    file.extend_from_slice(&slab::SlabLabel::encode(1024, 4096));
    let mut cur = Cursor::new(file);
    let label = slab::read_label(&mut cur, 4096).unwrap().unwrap();
    assert_eq!(label.offset, 4096);
    assert_eq!(label.size, 1024);
}

#[test]
fn read_label_rejects_bad_crc() {
    let mut bytes = slab::SlabLabel::encode(1024, 0).to_vec();
    bytes[10] ^= 0xFF;
    let mut cur = Cursor::new(bytes);
    assert!(slab::read_label(&mut cur, 0).unwrap().is_none());
}

#[test]
fn read_label_ends_on_missing_magic_and_short_read() {
    let mut cur = Cursor::new(vec![0u8; 128]);
    assert!(slab::read_label(&mut cur, 0).unwrap().is_none());

    let mut cur = Cursor::new(vec![0u8; 40]);
    assert!(slab::read_label(&mut cur, 0).unwrap().is_none());
}

// -------------------- gzip adapter --------------------

#[test]
fn gz_compress_then_open_input_roundtrip() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("store.dat");
    let packed = dir.path().join("store.dat.gz");

    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&plain, &payload).unwrap();
    gz::compress_file(&plain, &packed).unwrap();

    let mut input = gz::open_input(&packed).unwrap();
    let mut recovered = Vec::new();
    std::io::Read::read_to_end(&mut input, &mut recovered).unwrap();
    assert_eq!(recovered, payload);

    let unpacked = dir.path().join("store2.dat");
    gz::decompress_file(&packed, &unpacked).unwrap();
    assert_eq!(std::fs::read(&unpacked).unwrap(), payload);
}

#[test]
fn is_gzip_path_checks_extension() {
    use std::path::Path;
    assert!(gz::is_gzip_path(Path::new("a/b/store.journal.gz")));
    assert!(!gz::is_gzip_path(Path::new("a/b/store.journal")));
}

// -------------------- timestamps --------------------

#[test]
fn amps_epoch_converts_to_unix_epoch() {
    let micros = time::SECONDS_TO_UNIX_EPOCH as u64 * 1_000_000;
    assert_eq!(
        time::amps_to_iso8601(micros, false),
        "19700101T000000.000000Z"
    );
    assert_eq!(
        time::amps_to_iso8601(micros + 1_500_000, false),
        "19700101T000001.500000Z"
    );
}

#[test]
fn iso_timestamp_zero_is_unknown() {
    assert_eq!(time::iso_timestamp(0, false), "unknown");
}

#[test]
fn posix_large_values_fall_back_to_amps_epoch() {
    let micros = time::SECONDS_TO_UNIX_EPOCH as u64 * 1_000_000;
    assert_eq!(
        time::posix_to_iso8601(micros, false),
        "19700101T000000.000000Z"
    );
    assert_eq!(time::posix_to_iso8601(0, false), "19700101T000000Z");
}
