//! The central `AudioFile` entity, shared by the album assembler, importer,
//! and catalog.

use std::path::PathBuf;

use crate::mpeg::{AudioStats, Fingerprint};
use crate::paths::{ImportTimestamp, Volume};
use crate::tags::TagSet;

/// A single archived (or in-flight) MP3, independent of where it currently
/// lives on disk.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub volume: Volume,
    pub import_timestamp: ImportTimestamp,
    pub fingerprint: Fingerprint,
    /// `None` until the album assembler has computed it.
    pub album_id: Option<u64>,
    pub stats: AudioStats,
    pub tags: TagSet,
    /// Where this file currently lives on disk: its dropbox source path
    /// before import, its staged/canonical path after. `None` once neither
    /// is relevant (e.g. a catalog row with no in-flight copy).
    pub path: Option<PathBuf>,
    /// The raw MPEG payload (frame bytes only, no ID3 container), present
    /// while the file is in flight and dropped once archived.
    pub payload: Option<Vec<u8>>,
}

impl AudioFile {
    /// Drop the in-memory payload to bound working-set size, keeping `path`
    /// so it can be re-read later.
    pub fn drop_payload(&mut self) {
        self.payload = None;
    }

    /// Re-read the payload (frame bytes only) from `path` if it isn't
    /// already loaded.
    pub fn ensure_payload(&mut self) -> Result<(), crate::mpeg::MpegError> {
        if self.payload.is_some() {
            return Ok(());
        }
        let path = self.path.clone().ok_or(crate::mpeg::MpegError::NoValidHeader)?;
        let result = crate::mpeg::analyzer::analyze_file(&path)?;
        self.payload = result.payload;
        Ok(())
    }

    pub fn track_number(&self) -> Option<u32> {
        let raw = self.tags.get_text("TRCK")?;
        let (n, _) = raw.split_once('/').unwrap_or((raw, raw));
        n.trim().parse().ok()
    }

    pub fn album_track_count(&self) -> Option<u32> {
        let raw = self.tags.get_text("TRCK")?;
        let (_, m) = raw.split_once('/')?;
        m.trim().parse().ok()
    }
}
