//! Fixed-width framing helpers shared by every codec.
//!
//! All store integers are little-endian and all fixed-width strings are
//! null-padded. Readers tolerate a short read anywhere past the metadata
//! page (it marks end-of-stream, not corruption), so the exact-read helper
//! here reports how many bytes it actually got instead of failing.

use std::io::{self, Read, Write};

/// Reads until `buf` is full or EOF, returning the number of bytes read.
///
/// A short count means the stream ended; callers treat anything less than
/// a full buffer as the end of iteration.
pub fn read_exact_or_eof<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Writes `count` zero bytes at the current position.
pub fn fill_zeros<W: Write + ?Sized>(w: &mut W, count: u64) -> io::Result<()> {
    const ZEROS: [u8; 4096] = [0u8; 4096];
    let mut remaining = count;
    while remaining > 0 {
        let n = remaining.min(ZEROS.len() as u64) as usize;
        w.write_all(&ZEROS[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}

/// Appends `value` to `buf`, null-padded (or truncated) to exactly `width`.
pub fn put_padded(buf: &mut Vec<u8>, value: &[u8], width: usize) {
    let n = value.len().min(width);
    buf.extend_from_slice(&value[..n]);
    buf.resize(buf.len() + (width - n), 0);
}

/// Decodes a null-padded fixed-width string, stopping at the first NUL.
pub fn padded_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
pub fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}
