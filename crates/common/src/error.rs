use std::io;
use thiserror::Error;

/// Errors surfaced by the store codecs.
///
/// Only conditions that abort an open or a write are errors. Recoverable
/// conditions met during record iteration (a record that fails its CRC, a
/// truncated tail, a foreign magic after the first slab) are handled inside
/// the readers: the record is skipped or iteration ends, and the event is
/// reflected in the file summary counters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The header magic matched no known on-disk version. Carries the start
    /// of the observed header for the operator.
    #[error("not a recognized store format (version string reported: {0:?})")]
    UnrecognizedFormat(String),

    /// The metadata page failed its checksum; the file is not trustworthy.
    #[error("bad file header: found crc {found:#010x} but should be {computed:#010x}")]
    HeaderCrc { found: u32, computed: u32 },

    /// A writer was constructed with missing or unusable parameters.
    #[error("invalid writer argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Builds an [`StoreError::UnrecognizedFormat`] from the first bytes of
    /// a header, reporting up to 20 bytes of the observed version string.
    pub fn unrecognized(header: &[u8]) -> StoreError {
        let end = header
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(header.len())
            .min(20);
        StoreError::UnrecognizedFormat(String::from_utf8_lossy(&header[..end]).into_owned())
    }
}
