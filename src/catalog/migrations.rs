//! Ordered schema migrations, applied by [`super::Catalog::open`].
//!
//! Migration 0 creates the two "legacy" tables (`audio_files`, `id3_tags`).
//! Migration 1 adds `last_modified`, backfilled from each file's own import
//! timestamp. A store with no tables at all starts at migration 0; a store
//! that already has the two legacy tables but no `user_version` is treated
//! as having completed migration 0 already (base spec §4.7).

use rusqlite::Connection;

pub struct Migration {
    pub name: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0_create_audio_files_and_id3_tags",
        up: migration_0,
    },
    Migration {
        name: "1_create_last_modified",
        up: migration_1,
    },
];

fn migration_0(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE audio_files (
            volume INTEGER NOT NULL,
            import_timestamp INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            album_id INTEGER NOT NULL,
            sampling_rate_hz INTEGER NOT NULL,
            bit_rate_kbps INTEGER NOT NULL,
            channels TEXT NOT NULL,
            frame_count INTEGER NOT NULL,
            frame_size INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX idx_audio_files_fingerprint ON audio_files (fingerprint);

        CREATE TABLE id3_tags (
            fingerprint TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            frame_id TEXT NOT NULL,
            value TEXT NOT NULL,
            serialized_repr TEXT NOT NULL
        );
        CREATE INDEX idx_id3_tags_fingerprint_timestamp ON id3_tags (fingerprint, timestamp DESC);
        ",
    )
}

fn migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE last_modified (
            fingerprint TEXT NOT NULL UNIQUE,
            modified_timestamp INTEGER NOT NULL
        );
        CREATE INDEX idx_last_modified_fingerprint ON last_modified (fingerprint);

        INSERT INTO last_modified (fingerprint, modified_timestamp)
        SELECT fingerprint, import_timestamp FROM audio_files;
        ",
    )
}

/// True iff the two legacy tables already exist (a pre-migration-0 store
/// that predates the `user_version` bookkeeping).
pub fn has_legacy_tables(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('audio_files', 'id3_tags')",
        [],
        |row| row.get(0),
    )?;
    Ok(count == 2)
}
