//! The tag-level consistency checker run before and after a file is written
//! into the archive (base spec §7). Deliberately returns a flat list of
//! human-readable reason strings rather than a typed error enum — the base
//! spec itself calls these out as "strings, not types", and the set is
//! large, operator-facing, and keeps growing.

use crate::artist::Whitelist;
use crate::model::AudioFile;
use crate::tags::ufid::Ufid;
use crate::tags::{
    FILE_TYPE, REQUIRED_FRAMES, STATION_OWNER, TXXX_ALBUM_ID, TXXX_FRAME_COUNT, TXXX_FRAME_SIZE, UFID_OWNER,
};

/// Run every consistency rule against `file`, returning every violation
/// found (empty iff the file is archive-ready).
pub fn check(file: &AudioFile, whitelist: &Whitelist) -> Vec<String> {
    let mut errors = Vec::new();

    for frame in REQUIRED_FRAMES {
        if !file.tags.contains(frame) {
            errors.push(format!("missing required frame {frame}"));
        }
    }
    if file.tags.get_ufid(UFID_OWNER).is_none() {
        errors.push("missing required frame UFID".to_string());
    }
    for txxx in [TXXX_ALBUM_ID, TXXX_FRAME_COUNT, TXXX_FRAME_SIZE] {
        if file.tags.get_txxx(txxx).is_none() {
            errors.push(format!("missing required frame TXXX:{txxx}"));
        }
    }

    check_tlen(file, &mut errors);
    check_frame_count_and_size(file, &mut errors);
    check_tflt(file, &mut errors);
    check_town(file, &mut errors);
    check_ufid(file, &mut errors);
    check_order_frame(file, "TRCK", &mut errors);
    if file.tags.contains("TPOS") {
        check_order_frame(file, "TPOS", &mut errors);
    }
    check_artists_whitelisted(file, whitelist, &mut errors);

    errors
}

fn check_tlen(file: &AudioFile, errors: &mut Vec<String>) {
    match file.tags.get_text("TLEN") {
        None => {}
        Some(raw) => match raw.parse::<u64>() {
            Ok(v) if v == file.stats.duration_ms => {}
            Ok(v) => errors.push(format!(
                "TLEN {v} does not match measured duration {}",
                file.stats.duration_ms
            )),
            Err(_) => errors.push(format!("TLEN {raw:?} is not numeric")),
        },
    }
}

fn check_frame_count_and_size(file: &AudioFile, errors: &mut Vec<String>) {
    match file.tags.get_txxx(TXXX_FRAME_COUNT) {
        None => {}
        Some(raw) => match raw.parse::<u32>() {
            Ok(v) if v == file.stats.frame_count => {}
            Ok(v) => errors.push(format!(
                "TXXX:Frame Count {v} does not match measured count {}",
                file.stats.frame_count
            )),
            Err(_) => errors.push(format!("TXXX:Frame Count {raw:?} is not numeric")),
        },
    }

    match file.tags.get_txxx(TXXX_FRAME_SIZE) {
        None => {}
        Some(raw) => match raw.parse::<u64>() {
            Ok(v) if v == file.stats.frame_size => {}
            Ok(v) => errors.push(format!(
                "TXXX:Frame Size {v} does not match measured size {}",
                file.stats.frame_size
            )),
            Err(_) => errors.push(format!("TXXX:Frame Size {raw:?} is not numeric")),
        },
    }
}

fn check_tflt(file: &AudioFile, errors: &mut Vec<String>) {
    if let Some(raw) = file.tags.get_text("TFLT") {
        if raw != FILE_TYPE {
            errors.push(format!("TFLT {raw:?} is not {FILE_TYPE:?}"));
        }
    }
}

fn check_town(file: &AudioFile, errors: &mut Vec<String>) {
    if let Some(raw) = file.tags.get_text("TOWN") {
        if raw != STATION_OWNER {
            errors.push(format!("TOWN {raw:?} is not the station owner {STATION_OWNER:?}"));
        }
    }
}

fn check_ufid(file: &AudioFile, errors: &mut Vec<String>) {
    let Some(bytes) = file.tags.get_ufid(UFID_OWNER) else {
        return;
    };
    match Ufid::parse_bytes(bytes) {
        Err(e) => errors.push(format!("UFID is malformed: {e}")),
        Ok(ufid) => {
            if ufid.volume != file.volume {
                errors.push(format!(
                    "UFID volume {:?} does not match the file's volume {:?}",
                    ufid.volume, file.volume
                ));
            }
            if ufid.timestamp != file.import_timestamp {
                errors.push("UFID timestamp does not match the file's import timestamp".to_string());
            }
            if ufid.fingerprint != file.fingerprint {
                errors.push("UFID fingerprint does not match the file's measured fingerprint".to_string());
            }
        }
    }
}

fn check_order_frame(file: &AudioFile, frame_id: &str, errors: &mut Vec<String>) {
    let Some(raw) = file.tags.get_text(frame_id) else {
        return;
    };
    match crate::album::order::decode(raw) {
        Ok((n, m)) if n >= 1 && n <= m => {}
        _ => errors.push(format!("{frame_id} {raw:?} is not in archival n/m form with 1<=n<=m")),
    }
}

fn check_artists_whitelisted(file: &AudioFile, whitelist: &Whitelist, errors: &mut Vec<String>) {
    for frame_id in ["TPE1", "TPE2", "TPE3", "TPE4"] {
        if let Some(raw) = file.tags.get_text(frame_id) {
            if crate::artist::standardize(whitelist, raw).as_deref() != Some(raw)
                && !whitelist.contains_canonical(&crate::artist::canonicalize(raw))
            {
                errors.push(format!("{frame_id} {raw:?} is not a whitelisted artist"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpeg::{AudioStats, ChannelMode, Fingerprint};
    use crate::paths::{ImportTimestamp, Volume};
    use crate::tags::TagSet;

    fn base_file() -> AudioFile {
        let fp = Fingerprint::from_hex(&"a".repeat(40)).unwrap();
        let ts = ImportTimestamp::new(crate::paths::MIN_TIMESTAMP + 10).unwrap();
        let volume = Volume(1);

        let mut tags = TagSet::new();
        tags.set_text("TIT2", "A Song");
        tags.set_text("TPE1", "Some Artist");
        tags.set_text("TALB", "An Album");
        tags.set_text("TRCK", "1/1");
        tags.set_text("TLEN", "1000");
        tags.set_text("TOWN", STATION_OWNER);
        tags.set_text("TFLT", FILE_TYPE);
        tags.set_txxx(TXXX_ALBUM_ID, "42");
        tags.set_txxx(TXXX_FRAME_COUNT, "100");
        tags.set_txxx(TXXX_FRAME_SIZE, "5000");
        tags.set_ufid(
            UFID_OWNER,
            Ufid {
                volume,
                timestamp: ts,
                fingerprint: fp.clone(),
            }
            .to_bytes(),
        );

        AudioFile {
            volume,
            import_timestamp: ts,
            fingerprint: fp,
            album_id: Some(42),
            stats: AudioStats {
                sampling_rate_hz: 44100,
                bit_rate_kbps: 128,
                channels: ChannelMode::Stereo,
                frame_count: 100,
                frame_size: 5000,
                duration_ms: 1000,
                is_vbr: false,
            },
            tags,
            path: None,
            payload: None,
        }
    }

    #[test]
    fn a_fully_consistent_file_passes() {
        let file = base_file();
        let wl = Whitelist::from_names(["Some Artist".to_string()].into_iter());
        assert!(check(&file, &wl).is_empty());
    }

    #[test]
    fn catches_a_tlen_mismatch() {
        let mut file = base_file();
        file.tags.set_text("TLEN", "999");
        let wl = Whitelist::from_names(["Some Artist".to_string()].into_iter());
        let errors = check(&file, &wl);
        assert!(errors.iter().any(|e| e.contains("TLEN")));
    }

    #[test]
    fn catches_a_ufid_fingerprint_mismatch() {
        let mut file = base_file();
        let wrong_fp = Fingerprint::from_hex(&"b".repeat(40)).unwrap();
        file.tags.set_ufid(
            UFID_OWNER,
            Ufid {
                volume: file.volume,
                timestamp: file.import_timestamp,
                fingerprint: wrong_fp,
            }
            .to_bytes(),
        );
        let wl = Whitelist::from_names(["Some Artist".to_string()].into_iter());
        let errors = check(&file, &wl);
        assert!(errors.iter().any(|e| e.contains("fingerprint")));
    }

    #[test]
    fn catches_a_non_whitelisted_artist() {
        let file = base_file();
        let wl = Whitelist::default();
        let errors = check(&file, &wl);
        assert!(errors.iter().any(|e| e.contains("TPE1")));
    }
}
