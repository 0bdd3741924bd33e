//! The relational catalog: the persistent `audio_files` / `id3_tags` /
//! `last_modified` tables, schema migration, and the read/write API (base
//! spec §4.7).
//!
//! Built on `rusqlite`, the same crate family (`rusqlite`/`sqlx`) the wider
//! example pool reaches for (`kramerc-ongaku-server`, `caprica-chooui`) to
//! persist a scanned library. A `Catalog` wraps one `rusqlite::Connection`;
//! nothing here is `Sync` and nothing needs to be, per the base spec's
//! single-committer concurrency model (§5).

pub mod audit;
mod migrations;

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::model::AudioFile;
use crate::mpeg::{AudioStats, ChannelMode, Fingerprint};
use crate::paths::{ImportTimestamp, Volume};
use crate::tags::{Frame, FrameValue, TagSet};

/// Delimiter used by the group-concatenation fast read path; chosen to be
/// vanishingly unlikely to occur inside tag text.
const GROUP_CONCAT_DELIMITER: &str = "\u{1}\u{1e}\u{1}";

/// `application_id` pragma stamped on every catalog file this crate creates,
/// so a foreign SQLite file is never mistaken for a catalog.
const APPLICATION_ID: i32 = 0x43484952; // "CHIR"

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("fingerprint {0:?} is not 40 lowercase hex characters")]
    BadFingerprint(String),
    #[error("a tag value contains the group-concatenation delimiter; falling back to the per-file read path")]
    DelimiterCollision,
    #[error("transaction already finished (commit or revert was already called)")]
    TransactionFinished,
}

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (creating if absent) the catalog file at `path`, running any
    /// migrations the store is missing. Before running a migration, the
    /// existing file is copied to a `OLD_VERSION_<n>_<name>` sibling.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let existed = path.exists();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "application_id", APPLICATION_ID)?;

        let current_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let mut start_index = current_version as usize;

        if start_index == 0 && existed && migrations::has_legacy_tables(&conn)? {
            start_index = 1;
        }

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate().skip(start_index) {
            if existed {
                backup_before_migration(path, i, migration.name)?;
            }
            (migration.up)(&conn)?;
            conn.pragma_update(None, "user_version", (i + 1) as i64)?;
        }

        Ok(Catalog { conn })
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "application_id", APPLICATION_ID)?;
        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            (migration.up)(&conn)?;
            conn.pragma_update(None, "user_version", (i + 1) as i64)?;
        }
        Ok(Catalog { conn })
    }

    pub fn begin_add(
        &mut self,
        volume: Volume,
        import_timestamp: ImportTimestamp,
    ) -> Result<AddTransaction<'_>, CatalogError> {
        let tx = self.conn.transaction()?;
        Ok(AddTransaction {
            tx: Some(tx),
            volume,
            import_timestamp,
        })
    }

    pub fn get_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<AudioFile>, CatalogError> {
        let row = self
            .conn
            .query_row(
                "SELECT volume, import_timestamp, fingerprint, album_id, sampling_rate_hz,
                        bit_rate_kbps, channels, frame_count, frame_size, duration_ms
                 FROM audio_files WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                row_to_file_without_tags,
            )
            .optional()?;
        let Some(mut file) = row else { return Ok(None) };
        file.tags = self.current_tags(fingerprint.as_str(), u64::MAX)?;
        Ok(Some(file))
    }

    /// Every audio file, ordered `(import_timestamp DESC, album_id)`.
    pub fn get_all(&self) -> Result<Vec<AudioFile>, CatalogError> {
        self.query_files(
            "SELECT volume, import_timestamp, fingerprint, album_id, sampling_rate_hz,
                    bit_rate_kbps, channels, frame_count, frame_size, duration_ms
             FROM audio_files ORDER BY import_timestamp DESC, album_id",
            [],
        )
    }

    /// Files whose `last_modified.modified_timestamp` exceeds `cutoff`.
    pub fn get_since(&self, cutoff: u64) -> Result<Vec<AudioFile>, CatalogError> {
        self.query_files(
            "SELECT a.volume, a.import_timestamp, a.fingerprint, a.album_id, a.sampling_rate_hz,
                    a.bit_rate_kbps, a.channels, a.frame_count, a.frame_size, a.duration_ms
             FROM audio_files a
             JOIN last_modified m ON m.fingerprint = a.fingerprint
             WHERE m.modified_timestamp > ?1
             ORDER BY a.import_timestamp DESC, a.album_id",
            params![cutoff as i64],
        )
    }

    /// All files from one committed `(volume, timestamp)` batch, ordered by
    /// album id.
    pub fn get_by_import(
        &self,
        volume: Volume,
        ts: ImportTimestamp,
    ) -> Result<Vec<AudioFile>, CatalogError> {
        self.query_files(
            "SELECT volume, import_timestamp, fingerprint, album_id, sampling_rate_hz,
                    bit_rate_kbps, channels, frame_count, frame_size, duration_ms
             FROM audio_files WHERE volume = ?1 AND import_timestamp = ?2
             ORDER BY album_id",
            params![volume.0 as i64, ts.0 as i64],
        )
    }

    /// The `last_modified.modified_timestamp` for one fingerprint, if the
    /// file has ever had a tag snapshot recorded.
    pub fn modified_timestamp(&self, fingerprint: &Fingerprint) -> Result<Option<u64>, CatalogError> {
        let ts: Option<i64> = self
            .conn
            .query_row(
                "SELECT modified_timestamp FROM last_modified WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts.map(|t| t as u64))
    }

    /// Distinct `(volume, timestamp)` pairs, ascending by timestamp.
    pub fn get_all_imports(&self) -> Result<Vec<(Volume, ImportTimestamp)>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT volume, import_timestamp FROM audio_files ORDER BY import_timestamp ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let volume: i64 = row.get(0)?;
            let ts: i64 = row.get(1)?;
            Ok((Volume(volume as u8), ImportTimestamp(ts as u64)))
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn query_files(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AudioFile>, CatalogError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, row_to_file_without_tags)?;
        let mut files: Vec<AudioFile> = rows.collect::<Result<_, _>>()?;
        for file in &mut files {
            file.tags = self.current_tags(file.fingerprint.as_str(), u64::MAX)?;
        }
        Ok(files)
    }

    /// The most recent complete tag snapshot at or before `cutoff`
    /// (`u64::MAX` for "current").
    fn current_tags(&self, fingerprint: &str, cutoff: u64) -> Result<TagSet, CatalogError> {
        let latest_ts: Option<i64> = self
            .conn
            .query_row(
                "SELECT max(timestamp) FROM id3_tags WHERE fingerprint = ?1 AND timestamp <= ?2",
                params![fingerprint, cutoff as i64],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let Some(latest_ts) = latest_ts else {
            return Ok(TagSet::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT frame_id, value, serialized_repr FROM id3_tags WHERE fingerprint = ?1 AND timestamp = ?2",
        )?;
        let rows = stmt.query_map(params![fingerprint, latest_ts], |row| {
            let frame_id: String = row.get(0)?;
            let value: String = row.get(1)?;
            let serialized: String = row.get(2)?;
            Ok(decode_frame(&frame_id, &value, &serialized))
        })?;
        let frames: Vec<Frame> = rows.collect::<Result<_, _>>()?;
        Ok(TagSet::from_frames(frames))
    }

    /// Group-concatenation fast path for [`Self::get_all`]: one query joins
    /// tag rows per file with `GROUP_CONCAT`. Falls back to the one-query-
    /// per-file path (never errors) if any tag value contains the delimiter.
    pub fn get_all_fast(&self) -> Result<Vec<AudioFile>, CatalogError> {
        match self.try_get_all_fast() {
            Ok(files) => Ok(files),
            Err(CatalogError::DelimiterCollision) => self.get_all(),
            Err(e) => Err(e),
        }
    }

    fn try_get_all_fast(&self) -> Result<Vec<AudioFile>, CatalogError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.volume, a.import_timestamp, a.fingerprint, a.album_id, a.sampling_rate_hz,
                    a.bit_rate_kbps, a.channels, a.frame_count, a.frame_size, a.duration_ms,
                    (SELECT group_concat(frame_id || ?1 || value || ?1 || serialized_repr, ?2)
                     FROM id3_tags t
                     WHERE t.fingerprint = a.fingerprint
                       AND t.timestamp = (SELECT max(timestamp) FROM id3_tags WHERE fingerprint = a.fingerprint))
             FROM audio_files a ORDER BY a.import_timestamp DESC, a.album_id",
        )?;
        let field_sep = "\u{1}";
        let row_sep = GROUP_CONCAT_DELIMITER;
        let rows = stmt.query_map(params![field_sep, row_sep], |row| {
            let mut file = row_to_file_without_tags(row)?;
            let concat: Option<String> = row.get(10)?;
            file.tags = TagSet::new();
            if let Some(concat) = concat {
                for chunk in concat.split(row_sep) {
                    let mut parts = chunk.splitn(3, field_sep);
                    let (Some(id), Some(value), Some(repr)) =
                        (parts.next(), parts.next(), parts.next())
                    else {
                        continue;
                    };
                    if value.contains(row_sep) || value.contains(field_sep) {
                        return Err(rusqlite::Error::InvalidColumnType(
                            10,
                            "delimiter collision".into(),
                            rusqlite::types::Type::Text,
                        ));
                    }
                    file.tags.push(decode_frame(id, value, repr));
                }
            }
            Ok(file)
        })?;
        rows.collect::<Result<_, _>>().map_err(|e| match e {
            rusqlite::Error::InvalidColumnType(10, _, _) => CatalogError::DelimiterCollision,
            other => CatalogError::Sqlite(other),
        })
    }

    /// Always appends a new tag-history snapshot rather than mutating a
    /// column in place (base spec §9 resolves the `modify_tag` open question
    /// this way: the legacy single-frame update path is underspecified and
    /// unsafe to reproduce).
    pub fn apply_tag_edit(
        &mut self,
        fingerprint: &Fingerprint,
        timestamp: u64,
        mut tags: TagSet,
        frame_id: &str,
        new_value: &str,
    ) -> Result<(), CatalogError> {
        tags.set_text(frame_id, new_value);
        let tx = self.conn.transaction()?;
        insert_tag_snapshot(&tx, fingerprint.as_str(), timestamp, &tags)?;
        upsert_last_modified(&tx, fingerprint.as_str(), timestamp)?;
        tx.commit()?;
        Ok(())
    }

    /// Appends a full new tag snapshot for an already-archived file and
    /// bumps its `last_modified` row.
    pub fn update(
        &mut self,
        fingerprint: &Fingerprint,
        timestamp: u64,
        tags: &TagSet,
    ) -> Result<(), CatalogError> {
        let tx = self.conn.transaction()?;
        insert_tag_snapshot(&tx, fingerprint.as_str(), timestamp, tags)?;
        upsert_last_modified(&tx, fingerprint.as_str(), timestamp)?;
        tx.commit()?;
        Ok(())
    }
}

fn backup_before_migration(path: &Path, index: usize, name: &str) -> std::io::Result<()> {
    let backup = path.with_file_name(format!(
        "OLD_VERSION_{index}_{name}_{}",
        path.file_name().and_then(|f| f.to_str()).unwrap_or("catalog")
    ));
    std::fs::copy(path, backup)?;
    Ok(())
}

fn row_to_file_without_tags(row: &rusqlite::Row) -> rusqlite::Result<AudioFile> {
    let volume: i64 = row.get(0)?;
    let import_timestamp: i64 = row.get(1)?;
    let fingerprint: String = row.get(2)?;
    let album_id: i64 = row.get(3)?;
    let sampling_rate_hz: i64 = row.get(4)?;
    let bit_rate_kbps: i64 = row.get(5)?;
    let channels: String = row.get(6)?;
    let frame_count: i64 = row.get(7)?;
    let frame_size: i64 = row.get(8)?;
    let duration_ms: i64 = row.get(9)?;

    Ok(AudioFile {
        volume: Volume(volume as u8),
        import_timestamp: ImportTimestamp(import_timestamp as u64),
        fingerprint: Fingerprint::from_hex(&fingerprint).unwrap_or_else(|| {
            Fingerprint::from_hex(&"0".repeat(40)).expect("constant is valid hex")
        }),
        album_id: Some(album_id as u64),
        stats: AudioStats {
            sampling_rate_hz: sampling_rate_hz as u32,
            bit_rate_kbps: bit_rate_kbps as u16,
            channels: channel_mode_from_str(&channels),
            frame_count: frame_count as u32,
            frame_size: frame_size as u64,
            duration_ms: duration_ms as u64,
            is_vbr: false,
        },
        tags: TagSet::new(),
        path: None,
        payload: None,
    })
}

fn channel_mode_to_str(c: ChannelMode) -> &'static str {
    match c {
        ChannelMode::Stereo => "stereo",
        ChannelMode::JointStereo => "joint_stereo",
        ChannelMode::DualMono => "dual_mono",
        ChannelMode::Mono => "mono",
    }
}

fn channel_mode_from_str(s: &str) -> ChannelMode {
    match s {
        "joint_stereo" => ChannelMode::JointStereo,
        "dual_mono" => ChannelMode::DualMono,
        "mono" => ChannelMode::Mono,
        _ => ChannelMode::Stereo,
    }
}

/// Structured serialization of a frame for the `serialized_repr` column:
/// enough to reconstruct the exact [`Frame`] without depending on any
/// language-level object representation (base spec §9 design note).
fn encode_frame(frame: &Frame) -> (String, String, String) {
    match &frame.value {
        FrameValue::Text(s) => (frame.id.clone(), s.clone(), "TEXT".to_string()),
        FrameValue::ExtendedText { description, value } => (
            frame.key(),
            value.clone(),
            format!("TXXX\u{1}{description}\u{1}{value}"),
        ),
        FrameValue::Ufid { owner, identifier } => {
            let hex = hex_encode(identifier);
            (
                frame.id.clone(),
                hex.clone(),
                format!("UFID\u{1}{owner}\u{1}{hex}"),
            )
        }
        FrameValue::Unknown(bytes) => (frame.id.clone(), hex_encode(bytes), "UNKNOWN".to_string()),
    }
}

fn decode_frame(frame_id: &str, value: &str, serialized_repr: &str) -> Frame {
    if let Some(rest) = serialized_repr.strip_prefix("TXXX\u{1}") {
        if let Some((description, value)) = rest.split_once('\u{1}') {
            return Frame::txxx(description, value);
        }
    }
    if let Some(rest) = serialized_repr.strip_prefix("UFID\u{1}") {
        if let Some((owner, hex)) = rest.split_once('\u{1}') {
            return Frame::ufid(owner, hex_decode(hex));
        }
    }
    if serialized_repr == "UNKNOWN" {
        return Frame {
            id: frame_id.to_string(),
            value: FrameValue::Unknown(hex_decode(value)),
        };
    }
    Frame::text(frame_id, value)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn hex_decode(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .filter_map(|i| hex.get(i..i + 2).and_then(|s| u8::from_str_radix(s, 16).ok()))
        .collect()
}

fn insert_tag_snapshot(
    tx: &rusqlite::Transaction,
    fingerprint: &str,
    timestamp: u64,
    tags: &TagSet,
) -> rusqlite::Result<()> {
    for frame in tags.frames() {
        let (frame_id, value, serialized) = encode_frame(frame);
        tx.execute(
            "INSERT INTO id3_tags (fingerprint, timestamp, frame_id, value, serialized_repr)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![fingerprint, timestamp as i64, frame_id, value, serialized],
        )?;
    }
    Ok(())
}

fn upsert_last_modified(tx: &rusqlite::Transaction, fingerprint: &str, timestamp: u64) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO last_modified (fingerprint, modified_timestamp) VALUES (?1, ?2)
         ON CONFLICT(fingerprint) DO UPDATE SET modified_timestamp = excluded.modified_timestamp",
        params![fingerprint, timestamp as i64],
    )?;
    Ok(())
}

/// An in-flight batch insert. Exactly one of [`Self::commit`] /
/// [`Self::revert`] must be called; dropping without either leaves the
/// underlying `rusqlite` transaction to roll back on drop, matching the
/// base spec's "revert is safe any time before commit" rule.
pub struct AddTransaction<'c> {
    tx: Option<rusqlite::Transaction<'c>>,
    volume: Volume,
    import_timestamp: ImportTimestamp,
}

impl<'c> AddTransaction<'c> {
    pub fn add(&mut self, file: &AudioFile) -> Result<(), CatalogError> {
        let tx = self.tx.as_ref().ok_or(CatalogError::TransactionFinished)?;
        assert_eq!(file.volume, self.volume, "file volume must match the transaction's volume");
        assert_eq!(
            file.import_timestamp, self.import_timestamp,
            "file import_timestamp must match the transaction's timestamp"
        );
        let album_id = file.album_id.expect("albums are assigned an id before import");

        tx.execute(
            "INSERT INTO audio_files
                (volume, import_timestamp, fingerprint, album_id, sampling_rate_hz,
                 bit_rate_kbps, channels, frame_count, frame_size, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                file.volume.0 as i64,
                file.import_timestamp.0 as i64,
                file.fingerprint.as_str(),
                album_id as i64,
                file.stats.sampling_rate_hz as i64,
                file.stats.bit_rate_kbps as i64,
                channel_mode_to_str(file.stats.channels),
                file.stats.frame_count as i64,
                file.stats.frame_size as i64,
                file.stats.duration_ms as i64,
            ],
        )?;

        insert_tag_snapshot(tx, file.fingerprint.as_str(), file.import_timestamp.0, &file.tags)?;
        upsert_last_modified(tx, file.fingerprint.as_str(), file.import_timestamp.0)?;

        Ok(())
    }

    pub fn commit(mut self) -> Result<(), CatalogError> {
        let tx = self.tx.take().ok_or(CatalogError::TransactionFinished)?;
        tx.commit()?;
        Ok(())
    }

    pub fn revert(mut self) -> Result<(), CatalogError> {
        let tx = self.tx.take().ok_or(CatalogError::TransactionFinished)?;
        tx.rollback()?;
        Ok(())
    }
}
