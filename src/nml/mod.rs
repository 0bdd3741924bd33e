//! Incremental Traktor NML (`.nml`) export (base spec §4.10).
//!
//! `quick-xml` builds each `<ENTRY>` and, for a from-scratch or full
//! rewrite, the whole document. The append-only fast path and the
//! `_CHIRP/UUID` bookkeeping work directly on the existing file's bytes via
//! the regex-located `ENTRIES="…"` slot and the `</COLLECTION>…<PLAYLISTS>`
//! seam the base spec describes, rather than re-parsing and re-serializing
//! a file that doesn't need it.

mod escape;

use std::collections::HashMap;
use std::path::Path;

use log::warn;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer as XmlWriter;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::model::AudioFile;

use escape::{escape_attr, escape_dir, simplify_unicode};

#[derive(Debug, Error)]
pub enum NmlError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error("NML file is malformed: {0}")]
    Malformed(&'static str),
}

const CHIRP_PLAYLIST_NAME: &str = "_CHIRP";

pub struct Writer<'c> {
    catalog: &'c Catalog,
}

impl<'c> Writer<'c> {
    pub fn new(catalog: &'c Catalog) -> Self {
        Writer { catalog }
    }

    /// Export to `path`: from-scratch if the file is absent or empty,
    /// incremental (with an append-only fast path) otherwise. A malformed
    /// or unreadable existing file falls back to a from-scratch rewrite,
    /// matching the base spec's "driver retries via the from-scratch
    /// writer" failure policy.
    pub fn export(&self, path: &Path, now: u64) -> Result<(), NmlError> {
        let existing = std::fs::read_to_string(path)
            .ok()
            .filter(|s| !s.trim().is_empty());

        let Some(doc) = existing else {
            return self.write_from_scratch(path, now);
        };

        match self.try_incremental(&doc, now) {
            Ok(patched) => {
                std::fs::write(path, patched)?;
                Ok(())
            }
            Err(e) => {
                warn!("incremental NML export failed ({e}); rebuilding from scratch");
                self.write_from_scratch(path, now)
            }
        }
    }

    fn write_from_scratch(&self, path: &Path, now: u64) -> Result<(), NmlError> {
        let files = self.catalog.get_all()?;
        let doc = self.build_document(&files, now)?;
        std::fs::write(path, doc)?;
        Ok(())
    }

    fn try_incremental(&self, doc: &str, now: u64) -> Result<String, NmlError> {
        let last_ts = extract_uuid(doc).ok_or(NmlError::Malformed("missing _CHIRP UUID"))?;
        let changed = self.catalog.get_since(last_ts)?;

        if changed.is_empty() {
            return patch_uuid(doc, now).ok_or(NmlError::Malformed("unrecognized _CHIRP layout"));
        }

        let mut by_fingerprint: HashMap<String, &AudioFile> =
            changed.iter().map(|f| (f.fingerprint.to_string(), f)).collect();

        let mut patched = doc.to_string();
        let mut modified_any = false;

        for fp in changed.iter().map(|f| f.fingerprint.to_string()).collect::<Vec<_>>() {
            let Some(file) = by_fingerprint.get(&fp).copied() else {
                continue;
            };
            let modified_ts = self.catalog.modified_timestamp(&file.fingerprint)?.unwrap_or(now);
            let entry = self.build_entry(file, modified_ts)?;
            match replace_entry_block(&patched, &fp, &entry) {
                Some(next) => {
                    patched = next;
                    modified_any = true;
                    by_fingerprint.remove(&fp);
                }
                None => {} // not present in the document yet; append below
            }
        }

        let mut to_append = Vec::new();
        for file in &changed {
            if by_fingerprint.contains_key(&file.fingerprint.to_string()) {
                let modified_ts = self.catalog.modified_timestamp(&file.fingerprint)?.unwrap_or(now);
                to_append.push(self.build_entry(file, modified_ts)?);
            }
        }

        if !modified_any {
            if let Some(spliced) = splice_append_only(&patched, &to_append, now) {
                return Ok(spliced);
            }
        }

        // Either an existing entry changed, or the append-only layout regex
        // didn't match: append what's left the same way and patch the
        // count/UUID by hand rather than a full document rebuild, since we
        // already have every piece we need.
        splice_append_only(&patched, &to_append, now)
            .or_else(|| patch_uuid(&patched, now))
            .ok_or(NmlError::Malformed("unrecognized document layout"))
    }

    fn build_document(&self, files: &[AudioFile], now: u64) -> Result<String, NmlError> {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(&mut buf);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut nml = BytesStart::new("NML");
        nml.push_attribute(("VERSION", "14"));
        w.write_event(Event::Start(nml))?;

        let mut collection = BytesStart::new("COLLECTION");
        let count = files.len().to_string();
        collection.push_attribute(("ENTRIES", count.as_str()));
        w.write_event(Event::Start(collection))?;

        for file in files {
            let modified_ts = self.catalog.modified_timestamp(&file.fingerprint)?.unwrap_or(file.import_timestamp.0);
            write_entry_events(&mut w, file, modified_ts)?;
        }
        w.write_event(Event::End(BytesEnd::new("COLLECTION")))?;

        write_playlists_events(&mut w, now)?;

        w.write_event(Event::End(BytesEnd::new("NML")))?;

        Ok(String::from_utf8(buf).expect("quick_xml only emits valid UTF-8"))
    }

    /// Build one standalone `<ENTRY>…</ENTRY>` string (used by the
    /// incremental path to splice/replace a single entry).
    fn build_entry(&self, file: &AudioFile, modified_ts: u64) -> Result<String, NmlError> {
        let mut buf = Vec::new();
        let mut w = XmlWriter::new(&mut buf);
        write_entry_events(&mut w, file, modified_ts)?;
        Ok(String::from_utf8(buf).expect("quick_xml only emits valid UTF-8"))
    }
}

fn write_entry_events<W: std::io::Write>(
    w: &mut XmlWriter<W>,
    file: &AudioFile,
    modified_ts: u64,
) -> Result<(), quick_xml::Error> {
    let artist = escape_attr(&simplify_unicode(file.tags.get_text("TPE1").unwrap_or("")));
    let title = escape_attr(&simplify_unicode(file.tags.get_text("TIT2").unwrap_or("")));
    let album_title = escape_attr(&simplify_unicode(file.tags.get_text("TALB").unwrap_or("")));
    let modified_date = modified_ts.to_string();

    let mut entry = BytesStart::new("ENTRY");
    entry.push_attribute(("ARTIST", artist.as_str()));
    entry.push_attribute(("TITLE", title.as_str()));
    entry.push_attribute(("MODIFIED_DATE", modified_date.as_str()));
    w.write_event(Event::Start(entry))?;

    let volume_dir = format!("vol{}", file.volume.as_hex());
    let ts_dir = file.import_timestamp.to_human();
    let dir = escape_dir(&[volume_dir.as_str(), ts_dir.as_str()]);
    let location_file = format!("{}.mp3", file.fingerprint.as_str());
    let mut location = BytesStart::new("LOCATION");
    location.push_attribute(("DIR", dir.as_str()));
    location.push_attribute(("FILE", location_file.as_str()));
    location.push_attribute(("VOLUME", volume_dir.as_str()));
    w.write_event(Event::Empty(location))?;

    let track = file.track_number().unwrap_or(0).to_string();
    let of_tracks = file.album_track_count().unwrap_or(0).to_string();
    let mut album = BytesStart::new("ALBUM");
    album.push_attribute(("TITLE", album_title.as_str()));
    album.push_attribute(("TRACK", track.as_str()));
    album.push_attribute(("OF_TRACKS", of_tracks.as_str()));
    w.write_event(Event::Empty(album))?;

    let bitrate = file.stats.bit_rate_kbps.to_string();
    let playtime = (file.stats.duration_ms / 1000).to_string();
    let filesize_kb = (file.stats.frame_size / 1024).max(1).to_string();
    let import_date = file.import_timestamp.0.to_string();
    let mut info = BytesStart::new("INFO");
    info.push_attribute(("BITRATE", bitrate.as_str()));
    info.push_attribute(("PLAYTIME", playtime.as_str()));
    info.push_attribute(("FILESIZE", filesize_kb.as_str()));
    info.push_attribute(("IMPORT_DATE", import_date.as_str()));
    w.write_event(Event::Empty(info))?;

    w.write_event(Event::End(BytesEnd::new("ENTRY")))?;
    Ok(())
}

fn write_playlists_events<W: std::io::Write>(w: &mut XmlWriter<W>, now: u64) -> Result<(), quick_xml::Error> {
    w.write_event(Event::Start(BytesStart::new("PLAYLISTS")))?;

    let mut node = BytesStart::new("NODE");
    node.push_attribute(("TYPE", "PLAYLIST"));
    node.push_attribute(("NAME", CHIRP_PLAYLIST_NAME));
    w.write_event(Event::Start(node))?;

    let uuid = now.to_string();
    let mut playlist = BytesStart::new("PLAYLIST");
    playlist.push_attribute(("UUID", uuid.as_str()));
    playlist.push_attribute(("ENTRIES", "0"));
    playlist.push_attribute(("TYPE", "LIST"));
    w.write_event(Event::Empty(playlist))?;

    w.write_event(Event::End(BytesEnd::new("NODE")))?;
    w.write_event(Event::End(BytesEnd::new("PLAYLISTS")))?;
    Ok(())
}

/// Locate the `_CHIRP` playlist's `UUID="…"` value.
fn extract_uuid(doc: &str) -> Option<u64> {
    let re = regex::Regex::new(r#"NAME="_CHIRP"[^>]*>\s*<PLAYLIST UUID="(\d+)""#).expect("regex must never fail");
    re.captures(doc)?.get(1)?.as_str().parse().ok()
}

/// Patch only the `_CHIRP` UUID in place, leaving the rest of the document
/// untouched (the no-changes-since-last-export case).
fn patch_uuid(doc: &str, now: u64) -> Option<String> {
    let re = regex::Regex::new(r#"(NAME="_CHIRP"[^>]*>\s*<PLAYLIST UUID=")\d+(")"#).expect("regex must never fail");
    if !re.is_match(doc) {
        return None;
    }
    Some(re.replace(doc, format!("${{1}}{now}$2")).into_owned())
}

/// Replace the `<ENTRY>…</ENTRY>` block whose `LOCATION` carries
/// `FILE="<fingerprint>.mp3"` with `replacement`. Returns `None` if no such
/// entry exists yet (it's a new file, to be appended instead).
fn replace_entry_block(doc: &str, fingerprint: &str, replacement: &str) -> Option<String> {
    let needle = format!(r#"FILE="{fingerprint}.mp3""#);
    let file_pos = doc.find(&needle)?;
    let entry_start = doc[..file_pos].rfind("<ENTRY")?;
    let after_file = file_pos + needle.len();
    let entry_end_rel = doc[after_file..].find("</ENTRY>")?;
    let entry_end = after_file + entry_end_rel + "</ENTRY>".len();

    let mut out = String::with_capacity(doc.len());
    out.push_str(&doc[..entry_start]);
    out.push_str(replacement);
    out.push_str(&doc[entry_end..]);
    Some(out)
}

/// The append-only fast path: bump `ENTRIES="…"`, splice new `<ENTRY>`
/// elements immediately before `</COLLECTION>`, and patch the `_CHIRP`
/// UUID, all without touching anything else in the document. Returns
/// `None` if the document's layout doesn't match the expected shape, in
/// which case the caller falls back to a full rewrite.
fn splice_append_only(doc: &str, new_entries: &[String], now: u64) -> Option<String> {
    let entries_re = regex::Regex::new(r#"<COLLECTION ENTRIES="(\d+)">"#).expect("regex must never fail");
    let caps = entries_re.captures(doc)?;
    let current_count: usize = caps.get(1)?.as_str().parse().ok()?;
    let entries_tag_start = caps.get(0)?.start();
    let entries_tag_end = caps.get(0)?.end();

    let collection_close = doc.find("</COLLECTION>")?;
    if doc[entries_tag_end..].find("<PLAYLISTS>").is_none() {
        return None;
    }

    let new_count = current_count + new_entries.len();
    let mut out = String::with_capacity(doc.len() + new_entries.iter().map(String::len).sum::<usize>());
    out.push_str(&doc[..entries_tag_start]);
    out.push_str(&format!(r#"<COLLECTION ENTRIES="{new_count}">"#));
    out.push_str(&doc[entries_tag_end..collection_close]);
    for entry in new_entries {
        out.push_str(entry);
    }
    out.push_str(&doc[collection_close..]);

    patch_uuid(&out, now).or(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AudioFile;
    use crate::mpeg::{AudioStats, ChannelMode, Fingerprint};
    use crate::paths::{ImportTimestamp, Volume};
    use crate::tags::TagSet;

    fn file(fp_hex: &str, ts: u64, title: &str) -> AudioFile {
        let mut tags = TagSet::new();
        tags.set_text("TPE1", "Motörhead");
        tags.set_text("TIT2", title);
        tags.set_text("TALB", "Overkill");
        tags.set_text("TRCK", "1/2");
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
                frame_size: 500_000,
                duration_ms: 180_000,
                is_vbr: false,
            },
            tags,
            path: None,
            payload: None,
        }
    }

    fn seed_catalog(fp_hex: &str, ts: u64, title: &str) -> Catalog {
        let mut cat = Catalog::open_in_memory().unwrap();
        let f = file(fp_hex, ts, title);
        let mut txn = cat.begin_add(Volume(1), ImportTimestamp::new(ts).unwrap()).unwrap();
        txn.add(&f).unwrap();
        txn.commit().unwrap();
        cat
    }

    #[test]
    fn from_scratch_export_contains_every_file_and_folds_diacritics() {
        let ts = crate::paths::MIN_TIMESTAMP + 10;
        let cat = seed_catalog(&"a".repeat(40), ts, "Overkill");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.nml");

        Writer::new(&cat).export(&path, 1_700_000_000).unwrap();
        let doc = std::fs::read_to_string(&path).unwrap();

        assert!(doc.contains(r#"ARTIST="Motorhead""#));
        assert!(doc.contains(&format!(r#"FILE="{}.mp3""#, "a".repeat(40))));
        assert!(doc.contains(r#"COLLECTION ENTRIES="1""#));
        assert!(doc.contains(r#"NAME="_CHIRP""#));
    }

    #[test]
    fn incremental_export_appends_new_files_via_the_fast_path() {
        let ts1 = crate::paths::MIN_TIMESTAMP + 10;
        let cat = seed_catalog(&"a".repeat(40), ts1, "Overkill");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.nml");
        Writer::new(&cat).export(&path, 1_700_000_000).unwrap();

        let ts2 = crate::paths::MIN_TIMESTAMP + 20;
        let mut cat2 = cat;
        let f2 = file(&"b".repeat(40), ts2, "Stone Dead Forever");
        let mut txn = cat2.begin_add(Volume(1), ImportTimestamp::new(ts2).unwrap()).unwrap();
        txn.add(&f2).unwrap();
        txn.commit().unwrap();

        Writer::new(&cat2).export(&path, 1_700_001_000).unwrap();
        let doc = std::fs::read_to_string(&path).unwrap();

        assert!(doc.contains(&format!(r#"FILE="{}.mp3""#, "a".repeat(40))));
        assert!(doc.contains(&format!(r#"FILE="{}.mp3""#, "b".repeat(40))));
        assert!(doc.contains(r#"COLLECTION ENTRIES="2""#));
        assert!(doc.contains(r#"UUID="1700001000""#));
    }

    #[test]
    fn incremental_export_rewrites_a_modified_entry_in_place() {
        let ts = crate::paths::MIN_TIMESTAMP + 10;
        let fp = "c".repeat(40);
        let mut cat = seed_catalog(&fp, ts, "Overkill");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.nml");
        Writer::new(&cat).export(&path, 1_700_000_000).unwrap();

        let fingerprint = Fingerprint::from_hex(&fp).unwrap();
        let mut tags = cat.get_by_fingerprint(&fingerprint).unwrap().unwrap().tags;
        tags.set_text("TIT2", "Overkill (Remastered)");
        cat.update(&fingerprint, 1_700_000_500, &tags).unwrap();

        Writer::new(&cat).export(&path, 1_700_002_000).unwrap();
        let doc = std::fs::read_to_string(&path).unwrap();

        assert!(doc.contains(r#"TITLE="Overkill (Remastered)""#));
        assert!(doc.contains(r#"COLLECTION ENTRIES="1""#));
    }
}
