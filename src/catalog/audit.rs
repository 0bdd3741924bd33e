//! Read-only consistency sweep over every cataloged file (`do_catalog_check.py`
//! in the original system): confirms the on-disk file at its canonical path
//! still exists and its fingerprint still matches what the catalog records.
//! Touches neither the catalog nor the archive tree.

use std::path::Path;

use crate::mpeg::analyzer::analyze_file;
use crate::paths::canonical_path;

use super::{Catalog, CatalogError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// The canonical path for this fingerprint has no file on disk.
    Missing { fingerprint: String, path: String },
    /// The file on disk no longer fingerprints to the value the catalog has
    /// recorded (bit rot, a bad manual edit, a filesystem mixup).
    FingerprintMismatch {
        fingerprint: String,
        path: String,
        on_disk_fingerprint: String,
    },
}

/// Walk every row in `catalog` and verify it against the archive tree rooted
/// at `prefix`. Returns every [`Problem`] found; an empty vector means the
/// archive and catalog agree on every file.
pub fn check_catalog(catalog: &Catalog, prefix: &Path) -> Result<Vec<Problem>, CatalogError> {
    let mut problems = Vec::new();

    for file in catalog.get_all()? {
        let path = canonical_path(prefix, file.volume, file.import_timestamp, &file.fingerprint);
        if !path.exists() {
            problems.push(Problem::Missing {
                fingerprint: file.fingerprint.to_string(),
                path: path.display().to_string(),
            });
            continue;
        }

        match analyze_file(&path) {
            Ok(result) if result.fingerprint == file.fingerprint => {}
            Ok(result) => problems.push(Problem::FingerprintMismatch {
                fingerprint: file.fingerprint.to_string(),
                path: path.display().to_string(),
                on_disk_fingerprint: result.fingerprint.to_string(),
            }),
            Err(_) => problems.push(Problem::FingerprintMismatch {
                fingerprint: file.fingerprint.to_string(),
                path: path.display().to_string(),
                on_disk_fingerprint: "<unreadable>".to_string(),
            }),
        }
    }

    Ok(problems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AudioFile;
    use crate::mpeg::{AudioStats, ChannelMode, Fingerprint};
    use crate::paths::{ImportTimestamp, Volume};
    use crate::tags::TagSet;

    fn sample_file(fp_hex: &str, ts: u64) -> AudioFile {
        AudioFile {
            volume: Volume(1),
            import_timestamp: ImportTimestamp::new(ts).unwrap(),
            fingerprint: Fingerprint::from_hex(fp_hex).unwrap(),
            album_id: Some(1),
            stats: AudioStats {
                sampling_rate_hz: 44100,
                bit_rate_kbps: 128,
                channels: ChannelMode::Stereo,
                frame_count: 100,
                frame_size: 5000,
                duration_ms: 3000,
                is_vbr: false,
            },
            tags: TagSet::new(),
            path: None,
            payload: None,
        }
    }

    #[test]
    fn flags_a_file_missing_from_disk() {
        let mut cat = Catalog::open_in_memory().unwrap();
        let ts = crate::paths::MIN_TIMESTAMP + 500;
        let file = sample_file(&"a".repeat(40), ts);
        let mut txn = cat.begin_add(Volume(1), ImportTimestamp::new(ts).unwrap()).unwrap();
        txn.add(&file).unwrap();
        txn.commit().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let problems = check_catalog(&cat, dir.path()).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(matches!(problems[0], Problem::Missing { .. }));
    }
}
