//! Staging, atomic batch rename, and catalog insert for one import batch
//! (base spec §4.8).
//!
//! Writes accumulate under a temp prefix; nothing touches the real archive
//! tree or the catalog until [`ImportTransaction::commit`], which performs
//! the DB insert, the single directory rename, the DB commit, and the
//! `_source_files` manifest, in that order, with the failure semantics the
//! base spec spells out for each boundary.

use std::path::{Path, PathBuf};

use log::error;

use crate::album::Album;
use crate::artist::Whitelist;
use crate::catalog::Catalog;
use crate::paths::{batch_dir, ImportTimestamp, Volume};

use super::{importer, ImportError};

/// An in-flight batch: files already written under a temp prefix, not yet
/// renamed into the archive or recorded in the catalog.
pub struct ImportTransaction<'w> {
    tmp_prefix: PathBuf,
    volume: Volume,
    import_timestamp: ImportTimestamp,
    whitelist: &'w Whitelist,
    albums: Vec<Album>,
    source_paths: Vec<PathBuf>,
    total_bytes: u64,
}

impl<'w> ImportTransaction<'w> {
    pub fn new(
        tmp_prefix: PathBuf,
        volume: Volume,
        import_timestamp: ImportTimestamp,
        whitelist: &'w Whitelist,
    ) -> Self {
        ImportTransaction {
            tmp_prefix,
            volume,
            import_timestamp,
            whitelist,
            albums: Vec::new(),
            source_paths: Vec::new(),
            total_bytes: 0,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn album_count(&self) -> usize {
        self.albums.len()
    }

    /// Stamp every track in `album` with this batch's volume/timestamp,
    /// re-read any dropped payload, standardize its tags, and write it into
    /// the temp tree. On error the album is not added and the caller (the
    /// driver) decides whether to abort the whole batch.
    pub fn add_album(&mut self, mut album: Album) -> Result<(), ImportError> {
        for track in &mut album.tracks {
            let source_path = track.path.clone();
            track.volume = self.volume;
            track.import_timestamp = self.import_timestamp;
            track.ensure_payload()?;

            importer::standardize(track, self.whitelist, &[])?;
            self.total_bytes += track.payload.as_ref().map(|p| p.len() as u64).unwrap_or(0);

            let target = importer::commit_to_disk(track, &self.tmp_prefix, self.whitelist)?;
            track.drop_payload();
            track.path = Some(target);

            if let Some(source_path) = source_path {
                self.source_paths.push(source_path);
            }
        }
        self.albums.push(album);
        Ok(())
    }

    /// Insert every staged file into `catalog`, rename the staged batch
    /// directory into `target_prefix`, commit the catalog transaction, and
    /// write the `_source_files` manifest.
    pub fn commit(self, catalog: &mut Catalog, target_prefix: &Path) -> Result<PathBuf, ImportError> {
        let mut db_txn = catalog.begin_add(self.volume, self.import_timestamp)?;
        for album in &self.albums {
            for track in &album.tracks {
                if let Err(e) = db_txn.add(track) {
                    db_txn.revert()?;
                    return Err(e.into());
                }
            }
        }

        let tmp_batch = batch_dir(&self.tmp_prefix, self.volume, self.import_timestamp);
        let target_batch = batch_dir(target_prefix, self.volume, self.import_timestamp);
        if let Some(parent) = target_batch.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if let Err(e) = std::fs::rename(&tmp_batch, &target_batch) {
            db_txn.revert()?;
            if e.raw_os_error() == Some(18) {
                // EXDEV: the staged tree and the archive root are not on the
                // same filesystem, so a directory rename can't be atomic.
                return Err(ImportError::CrossFilesystemRename {
                    from: tmp_batch,
                    to: target_batch,
                });
            }
            return Err(e.into());
        }

        if let Err(e) = db_txn.commit() {
            error!(
                "EMERGENCY: batch renamed into {} but the catalog commit failed: {e}; files are on disk but uncatalogued",
                target_batch.display()
            );
            return Err(e.into());
        }

        write_source_manifest(&target_batch, &self.source_paths)?;

        Ok(target_batch)
    }
}

fn write_source_manifest(batch_dir: &Path, source_paths: &[PathBuf]) -> std::io::Result<()> {
    let mut contents = String::new();
    for path in source_paths {
        contents.push_str(&path.display().to_string());
        contents.push('\n');
    }
    std::fs::write(batch_dir.join("_source_files"), contents)
}
