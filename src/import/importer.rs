//! Per-file tag standardization and on-disk commit (base spec §4.6).

use std::path::{Path, PathBuf};

use log::info;

use crate::artist::Whitelist;
use crate::checker;
use crate::model::AudioFile;
use crate::mpeg::analyzer::analyze_file;
use crate::paths::canonical_path;
use crate::tags::ufid::Ufid;
use crate::tags::{
    standardize, TagSet, FILE_TYPE, STATION_OWNER, TXXX_ALBUM_ID, TXXX_FRAME_COUNT, TXXX_FRAME_SIZE, UFID_OWNER,
};

use super::ImportError;

/// Strips/replaces the tag set on `file` to the archive's required form and
/// re-checks it, reverting `file.tags` to its pre-standardization state on
/// any failure so the caller can inspect or retry with the original tags
/// intact.
///
/// `blacklist` is the (usually empty) set of extra frame ids to strip,
/// beyond the whitelist filter and the always-rewritten required frames.
pub fn standardize(
    file: &mut AudioFile,
    whitelist: &Whitelist,
    blacklist: &[String],
) -> Result<(), ImportError> {
    let original = file.tags.clone();

    let mut stripped = standardize::strip_for_import(&file.tags, blacklist);
    standardize::coerce_bpm(&mut stripped);
    file.tags = stripped;

    rebuild_required_frames(file);

    let errors = checker::check(file, whitelist);
    if !errors.is_empty() {
        file.tags = original;
        return Err(ImportError::CheckFailed(errors));
    }

    Ok(())
}

fn rebuild_required_frames(file: &mut AudioFile) {
    file.tags.set_text("TLEN", file.stats.duration_ms.to_string());
    file.tags.set_txxx(TXXX_FRAME_COUNT, file.stats.frame_count.to_string());
    file.tags.set_txxx(TXXX_FRAME_SIZE, file.stats.frame_size.to_string());
    file.tags.set_text("TFLT", FILE_TYPE);
    file.tags.set_text("TOWN", STATION_OWNER);
    if let Some(album_id) = file.album_id {
        file.tags.set_txxx(TXXX_ALBUM_ID, album_id.to_string());
    }

    let ufid = Ufid {
        volume: file.volume,
        timestamp: file.import_timestamp,
        fingerprint: file.fingerprint.clone(),
    };
    file.tags.set_ufid(UFID_OWNER, ufid.to_bytes());
}

/// Write `file` to `prefix`'s canonical path, then re-scan the written file
/// and re-run the checker against the freshly-measured stats. On any
/// failure after the write, the partial file is deleted.
pub fn commit_to_disk(
    file: &AudioFile,
    prefix: &Path,
    whitelist: &Whitelist,
) -> Result<PathBuf, ImportError> {
    let payload = file
        .payload
        .as_ref()
        .expect("importer requires the payload to still be loaded");

    let target = canonical_path(prefix, file.volume, file.import_timestamp, &file.fingerprint);
    if target.exists() {
        return Err(ImportError::TargetExists(target));
    }
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let write_result = write_tagged_file(&target, file, payload);
    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&target);
        return Err(e.into());
    }

    if let Err(e) = reverify_written_file(&target, file, whitelist) {
        let _ = std::fs::remove_file(&target);
        return Err(e);
    }

    info!("committed {} to {}", file.fingerprint, target.display());
    Ok(target)
}

fn write_tagged_file(target: &Path, file: &AudioFile, payload: &[u8]) -> std::io::Result<()> {
    let mut out = file.tags.encode();
    out.extend_from_slice(payload);
    std::fs::write(target, out)
}

fn reverify_written_file(
    target: &Path,
    file: &AudioFile,
    whitelist: &Whitelist,
) -> Result<(), ImportError> {
    let result = analyze_file(target)?;
    let mut rescanned = file.clone();
    rescanned.fingerprint = result.fingerprint;
    rescanned.stats = result.stats;
    rescanned.tags = TagSet::read_from_path(target)?.unwrap_or_default();

    let errors = checker::check(&rescanned, whitelist);
    if !errors.is_empty() {
        return Err(ImportError::PostWriteCheckFailed(errors));
    }
    if rescanned.fingerprint != file.fingerprint {
        return Err(ImportError::PostWriteCheckFailed(vec![
            "re-scanned fingerprint does not match the staged fingerprint".to_string(),
        ]));
    }
    Ok(())
}
