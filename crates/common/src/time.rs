//! Store timestamp conversion.
//!
//! Stores record time as microseconds since 1601-01-01 UTC. Rendering
//! subtracts [`SECONDS_TO_UNIX_EPOCH`] to reach the Unix epoch and formats
//! as compact ISO-8601 (`YYYYMMDDTHHMMSS.ffffff`). UTC output carries a `Z`
//! suffix unless the caller asked for local time; some legacy dump output
//! strips the `Z` for backward compatibility, which callers do themselves.

use chrono::{Local, LocalResult, TimeZone, Utc};

/// Seconds between 1601-01-01 and 1970-01-01, both UTC.
pub const SECONDS_TO_UNIX_EPOCH: i64 = 210_866_803_200;

const FMT: &str = "%Y%m%dT%H%M%S";

fn format_secs(unix_secs: i64, localtime: bool) -> Option<String> {
    if localtime {
        match Local.timestamp_opt(unix_secs, 0) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                Some(dt.format(FMT).to_string())
            }
            LocalResult::None => None,
        }
    } else {
        match Utc.timestamp_opt(unix_secs, 0) {
            LocalResult::Single(dt) => Some(dt.format(FMT).to_string()),
            _ => None,
        }
    }
}

/// Renders a store timestamp (µs since 1601) as ISO-8601.
pub fn amps_to_iso8601(amps_micros: u64, localtime: bool) -> String {
    let secs = (amps_micros / 1_000_000) as i64 - SECONDS_TO_UNIX_EPOCH;
    let frac = amps_micros % 1_000_000;
    match format_secs(secs, localtime) {
        Some(base) if localtime => format!("{}.{:06}", base, frac),
        Some(base) => format!("{}.{:06}Z", base, frac),
        None => "invalid".to_string(),
    }
}

/// Renders a POSIX-seconds value as ISO-8601.
///
/// Values too large to be POSIX seconds (more than 16 digits) are almost
/// certainly 1601-epoch microseconds and are rendered as such.
pub fn posix_to_iso8601(posix_secs: u64, localtime: bool) -> String {
    if posix_secs > 9_999_999_999_999_999 {
        return amps_to_iso8601(posix_secs, localtime);
    }
    match format_secs(posix_secs as i64, localtime) {
        Some(base) if localtime => base,
        Some(base) => format!("{}Z", base),
        None => "invalid".to_string(),
    }
}

/// Renders a store timestamp, mapping the zero value to `"unknown"`.
pub fn iso_timestamp(amps_micros: u64, localtime: bool) -> String {
    if amps_micros == 0 {
        return "unknown".to_string();
    }
    amps_to_iso8601(amps_micros, localtime)
}
