//! Output controls for the dump surfaces.

/// Options accepted by every store `dump` function.
///
/// These replace what used to be process-wide toggles in earlier tooling;
/// every knob travels explicitly with the call.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// First entry index to print (entries before it are counted, not shown).
    pub start: u64,
    /// Last entry index to print, inclusive.
    pub stop: Option<u64>,
    /// Maximum number of records to print.
    pub limit: Option<u64>,
    /// Render timestamps in the local timezone instead of UTC.
    pub localtime: bool,
    /// Suppress message data in the output (delete-by-bookmark and transfer
    /// payloads are still shown since they carry bookkeeping, not messages).
    pub omit_data: bool,
    /// Per-field record rendering instead of data-only lines.
    pub verbose: bool,
    /// Journal only: print replication source extents after the records.
    pub extents: bool,
    /// SOW only: include records whose expiration is in the past.
    pub include_expired: bool,
    /// SOW only: render journal SOW-expiration values as ISO-8601.
    pub sow_expiration_iso: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            start: 0,
            stop: None,
            limit: None,
            localtime: false,
            omit_data: false,
            verbose: true,
            extents: false,
            include_expired: true,
            sow_expiration_iso: false,
        }
    }
}
