//! Periodic import driver: a side-effect-free dry run, then (only once the
//! dry run reports zero errors) a real commit chunked to stay under a
//! configured byte budget (base spec §4.11).

use std::collections::HashSet;
use std::path::PathBuf;

use log::info;

use crate::artist::Whitelist;
use crate::catalog::Catalog;
use crate::dropbox::DropboxScanner;
use crate::mpeg::Fingerprint;
use crate::paths::{ImportTimestamp, Volume};

use super::transaction::ImportTransaction;
use super::ImportError;

/// 95% of 3 GiB, the production per-batch byte budget.
pub const DEFAULT_CHUNK_BYTES: u64 = 3 * 1024 * 1024 * 1024 / 100 * 95;

/// Everything a dry run found wrong with the current dropbox contents.
/// Empty means it's safe to run [`PeriodicImportDriver::real_import`].
#[derive(Debug, Default, Clone)]
pub struct DryRunReport {
    pub albums_seen: usize,
    pub tracks_seen: usize,
    pub errors: Vec<String>,
}

impl DryRunReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct PeriodicImportDriver<'w> {
    dropbox_root: PathBuf,
    tmp_prefix: PathBuf,
    archive_prefix: PathBuf,
    whitelist: &'w Whitelist,
    volume: Volume,
    chunk_bytes: u64,
}

impl<'w> PeriodicImportDriver<'w> {
    pub fn new(
        dropbox_root: PathBuf,
        tmp_prefix: PathBuf,
        archive_prefix: PathBuf,
        whitelist: &'w Whitelist,
        volume: Volume,
    ) -> Self {
        PeriodicImportDriver {
            dropbox_root,
            tmp_prefix,
            archive_prefix,
            whitelist,
            volume,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: u64) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    /// Scan the dropbox and check every track's fingerprint against
    /// `catalog` and against every other fingerprint seen in this same scan,
    /// without writing anything. A clean report is the precondition for
    /// [`real_import`](Self::real_import).
    pub fn dry_run(&self, catalog: &Catalog) -> Result<DryRunReport, ImportError> {
        let scanner = DropboxScanner::new(self.dropbox_root.clone(), self.whitelist);
        let albums = scanner.albums()?;

        let mut report = DryRunReport::default();
        let mut seen_in_scan: HashSet<Fingerprint> = HashSet::new();

        for album in &albums {
            report.albums_seen += 1;
            for track in &album.tracks {
                report.tracks_seen += 1;
                if catalog.get_by_fingerprint(&track.fingerprint)?.is_some() {
                    report.errors.push(format!(
                        "album {:?}: fingerprint {} is already catalogued",
                        album.title, track.fingerprint
                    ));
                }
                if !seen_in_scan.insert(track.fingerprint.clone()) {
                    report.errors.push(format!(
                        "album {:?}: fingerprint {} appears more than once in this dropbox scan",
                        album.title, track.fingerprint
                    ));
                }
            }
        }

        info!(
            "dry run: {} album(s), {} track(s), {} error(s)",
            report.albums_seen,
            report.tracks_seen,
            report.errors.len()
        );
        Ok(report)
    }

    /// Re-scan the dropbox and commit every album found, split into batches
    /// no larger than `chunk_bytes`. Each batch gets its own import
    /// timestamp, starting at `base_timestamp` and incrementing by one
    /// second per batch so concurrent batches never collide on the same
    /// archive directory. Refuses to run unless `dry_run` reported zero
    /// errors.
    pub fn real_import(
        &self,
        catalog: &mut Catalog,
        dry_run: &DryRunReport,
        base_timestamp: ImportTimestamp,
    ) -> Result<Vec<PathBuf>, ImportError> {
        if !dry_run.is_clean() {
            return Err(ImportError::CheckFailed(dry_run.errors.clone()));
        }

        let scanner = DropboxScanner::new(self.dropbox_root.clone(), self.whitelist);
        let albums = scanner.albums()?;

        let mut committed = Vec::new();
        let mut chunk_index: u64 = 0;
        let mut txn = ImportTransaction::new(
            self.tmp_prefix.clone(),
            self.volume,
            self.timestamp_for_chunk(base_timestamp, chunk_index)?,
            self.whitelist,
        );

        for album in albums {
            let album_bytes: u64 = album
                .tracks
                .iter()
                .filter_map(|t| t.payload.as_ref().map(|p| p.len() as u64))
                .sum();

            if txn.total_bytes() > 0 && txn.total_bytes() + album_bytes > self.chunk_bytes {
                info!(
                    "chunk boundary reached at {} byte(s) across {} album(s); committing",
                    txn.total_bytes(),
                    txn.album_count()
                );
                chunk_index += 1;
                let next_ts = self.timestamp_for_chunk(base_timestamp, chunk_index)?;
                let finished = std::mem::replace(
                    &mut txn,
                    ImportTransaction::new(self.tmp_prefix.clone(), self.volume, next_ts, self.whitelist),
                );
                committed.push(finished.commit(catalog, &self.archive_prefix)?);
            }

            txn.add_album(album)?;
        }

        if txn.album_count() > 0 {
            committed.push(txn.commit(catalog, &self.archive_prefix)?);
        }

        info!("real import: committed {} batch(es)", committed.len());
        Ok(committed)
    }

    fn timestamp_for_chunk(&self, base: ImportTimestamp, chunk_index: u64) -> Result<ImportTimestamp, ImportError> {
        ImportTimestamp::new(base.0 + chunk_index).map_err(ImportError::Timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::paths::MIN_TIMESTAMP;
    use crate::tags::TagSet;

    fn write_track(dir: &std::path::Path, name: &str, artist: &str, title: &str, album: &str, trck: &str) {
        std::fs::create_dir_all(dir).unwrap();
        let header = [0xFFu8, 0xFB, 0x90, 0x00];
        let decoded = crate::mpeg::header::MpegHeader::decode(&header).unwrap();
        let mut data = Vec::new();
        for _ in 0..150 {
            let mut frame = header.to_vec();
            frame.resize(decoded.frame_size(), 0xAB);
            data.extend(frame);
        }

        let mut tags = TagSet::new();
        tags.set_text("TPE1", artist);
        tags.set_text("TIT2", title);
        tags.set_text("TALB", album);
        tags.set_text("TRCK", trck);
        let mut out = tags.encode();
        out.extend(data);

        std::fs::write(dir.join(name), out).unwrap();
    }

    fn whitelist() -> Whitelist {
        Whitelist::from_names(["Some Artist".to_string()].into_iter())
    }

    #[test]
    fn dry_run_is_clean_for_a_fresh_album() {
        let dropbox = tempfile::tempdir().unwrap();
        write_track(
            &dropbox.path().join("album_one"),
            "one.mp3",
            "Some Artist",
            "A Song",
            "An Album",
            "1/1",
        );

        let wl = whitelist();
        let catalog = Catalog::open_in_memory().unwrap();
        let driver = PeriodicImportDriver::new(
            dropbox.path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            &wl,
            Volume(1),
        );

        let report = driver.dry_run(&catalog).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.albums_seen, 1);
    }

    #[test]
    fn dry_run_flags_a_fingerprint_already_in_the_catalog() {
        let dropbox = tempfile::tempdir().unwrap();
        write_track(
            &dropbox.path().join("album_one"),
            "one.mp3",
            "Some Artist",
            "A Song",
            "An Album",
            "1/1",
        );

        let wl = whitelist();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let archive_root = tempfile::tempdir().unwrap();
        let tmp_root = tempfile::tempdir().unwrap();
        let driver = PeriodicImportDriver::new(
            dropbox.path().to_path_buf(),
            tmp_root.path().to_path_buf(),
            archive_root.path().to_path_buf(),
            &wl,
            Volume(1),
        );

        let clean = driver.dry_run(&catalog).unwrap();
        let base_ts = ImportTimestamp::new(MIN_TIMESTAMP + 10).unwrap();
        driver.real_import(&mut catalog, &clean, base_ts).unwrap();

        // Re-drop the same track: now it's a duplicate by fingerprint.
        write_track(
            &dropbox.path().join("album_two"),
            "one.mp3",
            "Some Artist",
            "A Song",
            "An Album",
            "1/1",
        );
        let report = driver.dry_run(&catalog).unwrap();
        assert!(!report.is_clean());
        assert!(report.errors.iter().any(|e| e.contains("already catalogued")));
    }

    #[test]
    fn real_import_refuses_to_run_against_a_dirty_dry_run() {
        let dropbox = tempfile::tempdir().unwrap();
        let wl = whitelist();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let driver = PeriodicImportDriver::new(
            dropbox.path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            tempfile::tempdir().unwrap().path().to_path_buf(),
            &wl,
            Volume(1),
        );

        let dirty = DryRunReport {
            albums_seen: 1,
            tracks_seen: 1,
            errors: vec!["boom".to_string()],
        };
        let base_ts = ImportTimestamp::new(MIN_TIMESTAMP + 10).unwrap();
        let result = driver.real_import(&mut catalog, &dirty, base_ts);
        assert!(matches!(result, Err(ImportError::CheckFailed(_))));
    }

    #[test]
    fn real_import_splits_into_chunks_once_the_byte_budget_is_exceeded() {
        let dropbox = tempfile::tempdir().unwrap();
        write_track(
            &dropbox.path().join("album_one"),
            "one.mp3",
            "Some Artist",
            "Song One",
            "Album One",
            "1/1",
        );
        write_track(
            &dropbox.path().join("album_two"),
            "one.mp3",
            "Some Artist",
            "Song Two",
            "Album Two",
            "1/1",
        );

        let wl = whitelist();
        let mut catalog = Catalog::open_in_memory().unwrap();
        let archive_root = tempfile::tempdir().unwrap();
        let tmp_root = tempfile::tempdir().unwrap();
        let driver = PeriodicImportDriver::new(
            dropbox.path().to_path_buf(),
            tmp_root.path().to_path_buf(),
            archive_root.path().to_path_buf(),
            &wl,
            Volume(1),
        )
        .with_chunk_bytes(1024);

        let report = driver.dry_run(&catalog).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.albums_seen, 2);

        let base_ts = ImportTimestamp::new(MIN_TIMESTAMP + 10).unwrap();
        let batches = driver.real_import(&mut catalog, &report, base_ts).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(catalog.get_all().unwrap().len(), 2);
    }
}
