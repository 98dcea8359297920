//! Plain vs. gzip stream selection.
//!
//! Store files may be wrapped in gzip (the `.gz` extension decides). The
//! readers need random access, so a gzipped input is inflated into memory
//! and served from a cursor; plain files are read in place. The upgrade
//! drivers use the whole-file helpers to stage a decompressed copy next to
//! the output and to recompress the finished file.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek};
use std::path::Path;

use crate::error::Result;

/// A readable, seekable byte stream.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Returns `true` when `path` names a gzip-wrapped file.
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("gz")
}

/// Opens `path` for reading, inflating `.gz` files into memory so the
/// caller can seek freely.
pub fn open_input(path: &Path) -> Result<Box<dyn ReadSeek>> {
    let file = File::open(path)?;
    if is_gzip_path(path) {
        let mut buf = Vec::new();
        GzDecoder::new(BufReader::new(file)).read_to_end(&mut buf)?;
        Ok(Box::new(Cursor::new(buf)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Inflates the gzip file at `src` into a plain file at `dst`.
pub fn decompress_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut reader = GzDecoder::new(BufReader::new(File::open(src)?));
    let mut writer = BufWriter::new(File::create(dst)?);
    io::copy(&mut reader, &mut writer)?;
    Ok(())
}

/// Compresses the plain file at `src` into a gzip file at `dst`.
pub fn compress_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut writer = GzEncoder::new(BufWriter::new(File::create(dst)?), Compression::new(9));
    io::copy(&mut reader, &mut writer)?;
    writer.finish()?;
    Ok(())
}
