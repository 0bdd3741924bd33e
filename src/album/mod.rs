//! Groups files sharing a directory and an album title into an `Album`,
//! validates track numbering, hoists guest-credited artists, and mints the
//! album id (base spec §4.5).

use std::collections::HashMap;

use md5::{Digest, Md5};
use thiserror::Error;

use crate::artist::{self, Whitelist};
use crate::model::AudioFile;
use crate::tags::TXXX_ALBUM_ID;

pub mod order;
use order::BadOrderError;

#[derive(Debug, Error)]
pub enum AlbumError {
    #[error("track {fingerprint} is missing required frame {frame}")]
    MissingFrame { fingerprint: String, frame: &'static str },
    #[error(transparent)]
    BadOrder(#[from] BadOrderError),
    #[error("artist {0:?} could not be hoisted: head is not a whitelisted artist")]
    UnresolvedArtist(String),
}

#[derive(Debug, Clone)]
pub struct Album {
    pub id: u64,
    pub title: String,
    pub tracks: Vec<AudioFile>,
    pub is_compilation: bool,
    /// The dominant `TPE1`, or `None` for a compilation.
    pub artist_name: Option<String>,
}

pub struct Assembler<'w> {
    whitelist: &'w Whitelist,
}

impl<'w> Assembler<'w> {
    pub fn new(whitelist: &'w Whitelist) -> Self {
        Assembler { whitelist }
    }

    /// Assemble one album from every file sharing a directory (the caller
    /// has already grouped by directory; this groups further by `TALB`
    /// majority and validates/normalizes the result).
    pub fn assemble(&self, mut tracks: Vec<AudioFile>) -> Result<Album, AlbumError> {
        let title = majority_album_title(&tracks);

        for track in &tracks {
            for frame in ["TPE1", "TIT2", "TALB", "TRCK"] {
                if !track.tags.contains(frame) {
                    return Err(AlbumError::MissingFrame {
                        fingerprint: track.fingerprint.to_string(),
                        frame,
                    });
                }
            }
        }

        validate_and_rewrite_track_numbers(&mut tracks)?;
        self.hoist_artists(&mut tracks)?;

        tracks.sort_by_key(|t| t.track_number().unwrap_or(0));

        let (artist_name, is_compilation) = classify_artist(&tracks);

        let id = album_id(&tracks);
        for track in &mut tracks {
            track.album_id = Some(id);
            track.tags.set_txxx(TXXX_ALBUM_ID, id.to_string());
        }

        Ok(Album {
            id,
            title,
            tracks,
            is_compilation,
            artist_name,
        })
    }

    fn hoist_artists(&self, tracks: &mut [AudioFile]) -> Result<(), AlbumError> {
        let uniform = tracks
            .windows(2)
            .all(|w| w[0].tags.get_text("TPE1") == w[1].tags.get_text("TPE1"));
        if uniform {
            return Ok(());
        }

        for track in tracks.iter_mut() {
            let raw = track.tags.get_text("TPE1").unwrap_or("").to_string();
            let (head, guest) = artist::split_and_standardize(self.whitelist, &raw)
                .map_err(|_| AlbumError::UnresolvedArtist(raw.clone()))?;

            track.tags.set_text("TPE1", head);
            if let Some(guest) = guest {
                let title = track.tags.get_text("TIT2").unwrap_or("").to_string();
                let with_credit = artist::title::append_guest_credit(&title, &guest);
                track.tags.set_text("TIT2", with_credit);
            }
        }
        Ok(())
    }
}

/// Picks the most frequent exact-case `TALB` value, ties broken
/// lexicographically. Covers the common case where every track agrees
/// exactly, and the case where they agree only up to casing (e.g. one
/// ripped track tagged `"live album"` against the rest tagged `"Live
/// Album"`) by letting the exact-string majority settle it either way.
fn majority_album_title(tracks: &[AudioFile]) -> String {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for track in tracks {
        if let Some(v) = track.tags.get_text("TALB") {
            *counts.entry(v).or_insert(0) += 1;
        }
    }
    let max = counts.values().copied().max().unwrap_or(0);
    let mut winners: Vec<&str> = counts.iter().filter(|(_, c)| **c == max).map(|(k, _)| *k).collect();
    winners.sort_unstable();
    winners.first().map(|s| s.to_string()).unwrap_or_default()
}

fn validate_and_rewrite_track_numbers(tracks: &mut [AudioFile]) -> Result<(), AlbumError> {
    let raw_values: Vec<String> = tracks
        .iter()
        .map(|t| t.tags.get_text("TRCK").unwrap_or("").to_string())
        .collect();
    let canonical = order::verify_and_standardize_str_list(&raw_values)?;

    for (track, trck) in tracks.iter_mut().zip(canonical) {
        track.tags.set_text("TRCK", trck);
    }

    Ok(())
}

fn classify_artist(tracks: &[AudioFile]) -> (Option<String>, bool) {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for track in tracks {
        if let Some(v) = track.tags.get_text("TPE1") {
            *counts.entry(v).or_insert(0) += 1;
        }
    }
    let total = tracks.len() as f64;
    let (mode, max_count) = counts
        .iter()
        .max_by_key(|(_, c)| **c)
        .map(|(k, c)| (*k, *c))
        .unwrap_or(("", 0));

    let is_compilation = (max_count as f64) < 0.66 * total;
    if is_compilation {
        (None, true)
    } else {
        (Some(mode.to_string()), false)
    }
}

/// MD5 of the sorted, concatenated fingerprint hex *strings* (not the
/// decoded bytes), first 60 bits of the digest read as a big-endian
/// unsigned integer.
fn album_id(tracks: &[AudioFile]) -> u64 {
    let mut fingerprints: Vec<&str> = tracks.iter().map(|t| t.fingerprint.as_str()).collect();
    fingerprints.sort_unstable();

    let mut hasher = Md5::new();
    for fp_hex in fingerprints {
        hasher.update(fp_hex.as_bytes());
    }
    let digest = hasher.finalize();

    // First 15 hex chars (60 bits) of the digest, as an unsigned integer.
    let mut value: u64 = 0;
    for byte in digest.iter().take(8) {
        value = (value << 8) | *byte as u64;
    }
    value >> 4 // drop the low nibble of the 8th byte to leave exactly 60 bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpeg::{AudioStats, Fingerprint};
    use crate::mpeg::ChannelMode;
    use crate::paths::{ImportTimestamp, Volume};
    use crate::tags::TagSet;

    fn stats() -> AudioStats {
        AudioStats {
            sampling_rate_hz: 44100,
            bit_rate_kbps: 128,
            channels: ChannelMode::Stereo,
            frame_count: 1000,
            frame_size: 1000,
            duration_ms: 30_000,
            is_vbr: false,
        }
    }

    fn track(fp_hex: &str, artist: &str, title: &str, album: &str, trck: &str) -> AudioFile {
        let mut tags = TagSet::new();
        tags.set_text("TPE1", artist);
        tags.set_text("TIT2", title);
        tags.set_text("TALB", album);
        tags.set_text("TRCK", trck);
        AudioFile {
            volume: Volume(1),
            import_timestamp: ImportTimestamp::new(crate::paths::MIN_TIMESTAMP + 10).unwrap(),
            fingerprint: Fingerprint::from_hex(fp_hex).unwrap(),
            album_id: None,
            stats: stats(),
            tags,
            path: None,
            payload: None,
        }
    }

    fn fp(n: u8) -> String {
        format!("{:02x}", n).repeat(20)
    }

    #[test]
    fn assembles_a_uniform_artist_album_and_stamps_album_id() {
        let wl = Whitelist::from_names(["Artist".to_string()].into_iter());
        let tracks = vec![
            track(&fp(1), "Artist", "Song One", "Album", "1/2"),
            track(&fp(2), "Artist", "Song Two", "Album", "2/2"),
        ];
        let album = Assembler::new(&wl).assemble(tracks).unwrap();
        assert_eq!(album.title, "Album");
        assert!(!album.is_compilation);
        assert_eq!(album.artist_name.as_deref(), Some("Artist"));
        assert!(album.tracks.iter().all(|t| t.album_id == Some(album.id)));
    }

    #[test]
    fn rejects_a_track_order_that_skips_a_number() {
        let wl = Whitelist::from_names(["Artist".to_string()].into_iter());
        let tracks = vec![
            track(&fp(1), "Artist", "Song One", "Album", "1/2"),
            track(&fp(2), "Artist", "Song Two", "Album", "1/2"),
        ];
        assert!(matches!(
            Assembler::new(&wl).assemble(tracks),
            Err(AlbumError::BadOrder(_))
        ));
    }

    #[test]
    fn hoists_a_guest_credit_into_the_title_and_head_artist_into_tpe1() {
        let wl = Whitelist::from_names(["Artist".to_string()].into_iter());
        let tracks = vec![
            track(&fp(1), "Artist", "Song One", "Album", "1/2"),
            track(&fp(2), "Artist feat. Guest Singer", "Song Two", "Album", "2/2"),
        ];
        let album = Assembler::new(&wl).assemble(tracks).unwrap();
        let hoisted = &album.tracks[1];
        assert_eq!(hoisted.tags.get_text("TPE1"), Some("Artist"));
        assert_eq!(hoisted.tags.get_text("TIT2"), Some("Song Two (w/ Guest Singer)"));
    }

    #[test]
    fn classifies_as_compilation_when_no_artist_dominates() {
        let wl = Whitelist::default();
        let tracks = vec![
            track(&fp(1), "A", "Song One", "Various", "1/3"),
            track(&fp(2), "B", "Song Two", "Various", "2/3"),
            track(&fp(3), "C", "Song Three", "Various", "3/3"),
        ];
        let album = Assembler::new(&wl).assemble(tracks).unwrap();
        assert!(album.is_compilation);
        assert_eq!(album.artist_name, None);
    }
}
