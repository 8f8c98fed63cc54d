//! File naming for captured frames and stack snapshots.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::frame::FrameMetadata;

/// Timestamp layout shared by frame names and snapshot names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Base name for a captured frame:
/// `capture[_<ts>]_<exp>s_g<gain>_o<offset>_r<readout>_b<bin>[_<count>]`.
///
/// Missing parameters are written as `none`; the count is zero-padded to four
/// digits.
pub fn capture_base_name(
    metadata: &FrameMetadata,
    timestamp: Option<&DateTime<Utc>>,
    capture_count: Option<u64>,
) -> String {
    let mut parts = vec!["capture".to_string()];
    if let Some(ts) = timestamp {
        parts.push(format_timestamp(ts));
    }
    parts.push(format!("{:.3}s", metadata.exposure_s.unwrap_or(0.0)));
    parts.push(format!("g{}", opt(metadata.gain.map(|g| g as i64))));
    parts.push(format!("o{}", opt(metadata.offset.map(i64::from))));
    parts.push(format!("r{}", opt(metadata.readout_mode.map(i64::from))));
    parts.push(format!("b{}", opt(metadata.binning.map(i64::from))));
    if let Some(count) = capture_count {
        parts.push(format!("{count:04}"));
    }
    parts.join("_")
}

fn opt(value: Option<i64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// `<dir>/<base>.<ext>`, extension lower-cased and without a leading dot.
pub fn with_extension(dir: &Path, base: &str, extension: &str) -> PathBuf {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    dir.join(format!("{base}.{ext}"))
}

/// Base tag for a rolled-over stack, carrying the latest solved centre when known.
pub fn stack_base_name(centre: Option<(f64, f64)>) -> String {
    match centre {
        Some((ra, dec)) => format!("stack_RA{ra:.4}_DEC{dec:.4}"),
        None => "stack".to_string(),
    }
}

/// `<base>_<YYYYmmdd_HHMMSS>`
pub fn snapshot_stem(base: &str, updated_at: &DateTime<Utc>) -> String {
    format!("{base}_{}", format_timestamp(updated_at))
}
