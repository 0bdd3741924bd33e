//! Volume/timestamp newtypes and canonical archive path construction.
//!
//! Shared by the tag model (UFID encoding), the importer (where to write a
//! file), and the catalog (how rows are keyed).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use thiserror::Error;

use crate::mpeg::Fingerprint;

/// Earliest timestamp the archive considers valid (2008-11-30T00:00:00Z).
pub const MIN_TIMESTAMP: u64 = 1_227_999_600;
/// Timestamps must be strictly before this (2038-01-19T00:00:00Z, the
/// classic 32-bit rollover boundary the original system guarded against).
pub const MAX_TIMESTAMP: u64 = 2_147_472_000;

/// Archive partition identifier. Production uses `1`; `0xff` is reserved
/// for the separate live-stream archiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume(pub u8);

impl Volume {
    /// Two lowercase hex digits, e.g. `01`.
    pub fn as_hex(&self) -> String {
        format!("{:02x}", self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 2 {
            return None;
        }
        u8::from_str_radix(s, 16).ok().map(Volume)
    }
}

/// Seconds since the Unix epoch at which a batch of files was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportTimestamp(pub u64);

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("timestamp {0} is outside the archive's accepted range")]
    OutOfRange(u64),
    #[error("malformed timestamp string {0:?}")]
    Malformed(String),
}

impl ImportTimestamp {
    pub fn new(seconds: u64) -> Result<Self, TimestampError> {
        if !(MIN_TIMESTAMP..MAX_TIMESTAMP).contains(&seconds) {
            return Err(TimestampError::OutOfRange(seconds));
        }
        Ok(ImportTimestamp(seconds))
    }

    /// Human form `%Y%m%d-%H%M%S` in local time, as used in archive paths.
    pub fn to_human(&self) -> String {
        let dt: DateTime<Local> = Local
            .timestamp_opt(self.0 as i64, 0)
            .single()
            .expect("validated timestamp range is representable");
        dt.format("%Y%m%d-%H%M%S").to_string()
    }

    pub fn from_human(s: &str) -> Result<Self, TimestampError> {
        let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y%m%d-%H%M%S")
            .map_err(|_| TimestampError::Malformed(s.to_string()))?;
        let dt = Local
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| TimestampError::Malformed(s.to_string()))?;
        ImportTimestamp::new(dt.timestamp() as u64)
    }

    pub fn to_millis(&self) -> u64 {
        self.0 * 1000
    }
}

/// `<prefix>/vol<VV>/<YYYYMMDD-HHMMSS>/<fingerprint>.mp3`
pub fn canonical_path(
    prefix: &Path,
    volume: Volume,
    ts: ImportTimestamp,
    fingerprint: &Fingerprint,
) -> PathBuf {
    prefix
        .join(format!("vol{}", volume.as_hex()))
        .join(ts.to_human())
        .join(format!("{}.mp3", fingerprint.as_str()))
}

/// `<prefix>/vol<VV>/<YYYYMMDD-HHMMSS>`, the directory a commit batch lives in.
pub fn batch_dir(prefix: &Path, volume: Volume, ts: ImportTimestamp) -> PathBuf {
    prefix
        .join(format!("vol{}", volume.as_hex()))
        .join(ts.to_human())
}
