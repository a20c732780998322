//! Versioned schema migrations.
//!
//! The `migration` table is an append-only ledger; its highest
//! `schema_version` is the database's version. Databases created before the
//! ledger existed are recognised by the presence of the `song` table alone
//! (version 1). Each step runs in its own transaction together with its
//! ledger row, so a failed step leaves the ledger at the last complete
//! version.

use chrono::Utc;
use rusqlite::{Connection, Transaction};

use crate::error::{Error, Result};

/// Version a freshly initialised database is stamped with.
pub const SCHEMA_VERSION: u32 = 4;

/// A schema migration to `version` from `version - 1`.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// The `song` table as first released (version 1, no ledger).
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS song (
    id INTEGER PRIMARY KEY,
    row_number INTEGER NOT NULL,
    sid TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    name_pinyin TEXT NOT NULL DEFAULT '',
    sub_name TEXT NOT NULL DEFAULT '',
    album_id INTEGER NOT NULL DEFAULT 0,
    album_sid TEXT NOT NULL DEFAULT '',
    album_name TEXT NOT NULL DEFAULT '',
    album_sub_name TEXT NOT NULL DEFAULT '',
    album_lang TEXT NOT NULL DEFAULT '',
    album_song_count INTEGER NOT NULL DEFAULT 0,
    track INTEGER NOT NULL DEFAULT 0,
    artist_id INTEGER NOT NULL DEFAULT 0,
    artist_name TEXT NOT NULL DEFAULT '',
    artist_alias TEXT NOT NULL DEFAULT '',
    singers TEXT NOT NULL DEFAULT '',
    songwriters TEXT NOT NULL DEFAULT '',
    composer TEXT NOT NULL DEFAULT '',
    arrangement TEXT NOT NULL DEFAULT '',
    bak_song_id INTEGER NOT NULL DEFAULT 0,
    download_status INTEGER NOT NULL DEFAULT 0
);
"#;

/// Full schema at [`SCHEMA_VERSION`]. Column order matches what the
/// migration chain produces.
const INITIAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS song (
    id INTEGER PRIMARY KEY,
    row_number INTEGER NOT NULL,
    sid TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL DEFAULT '',
    name_pinyin TEXT NOT NULL DEFAULT '',
    sub_name TEXT NOT NULL DEFAULT '',
    album_id INTEGER NOT NULL DEFAULT 0,
    album_sid TEXT NOT NULL DEFAULT '',
    album_name TEXT NOT NULL DEFAULT '',
    album_sub_name TEXT NOT NULL DEFAULT '',
    album_lang TEXT NOT NULL DEFAULT '',
    album_song_count INTEGER NOT NULL DEFAULT 0,
    track INTEGER NOT NULL DEFAULT 0,
    artist_id INTEGER NOT NULL DEFAULT 0,
    artist_name TEXT NOT NULL DEFAULT '',
    artist_alias TEXT NOT NULL DEFAULT '',
    singers TEXT NOT NULL DEFAULT '',
    songwriters TEXT NOT NULL DEFAULT '',
    composer TEXT NOT NULL DEFAULT '',
    arrangement TEXT NOT NULL DEFAULT '',
    bak_song_id INTEGER NOT NULL DEFAULT 0,
    download_status INTEGER NOT NULL DEFAULT 0,
    in_songs INTEGER NOT NULL DEFAULT 1,
    in_albums INTEGER NOT NULL DEFAULT 0,
    in_playlists INTEGER NOT NULL DEFAULT 0,
    disc INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_song_download ON song(download_status, row_number);

CREATE TABLE IF NOT EXISTS migration (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS song_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    list_type TEXT NOT NULL,
    list_id INTEGER NOT NULL,
    song_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_song_list_list ON song_list(list_type, list_id);
"#;

const MIGRATION_002: &str = r#"
CREATE TABLE IF NOT EXISTS migration (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    schema_version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

-- Songs that predate the flags were all exported from the songs category
ALTER TABLE song ADD COLUMN in_songs INTEGER NOT NULL DEFAULT 1;
ALTER TABLE song ADD COLUMN in_albums INTEGER NOT NULL DEFAULT 0;
ALTER TABLE song ADD COLUMN in_playlists INTEGER NOT NULL DEFAULT 0;
"#;

const MIGRATION_003: &str = r#"
CREATE TABLE IF NOT EXISTS song_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    list_type TEXT NOT NULL,
    list_id INTEGER NOT NULL,
    song_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_song_list_list ON song_list(list_type, list_id);
"#;

const MIGRATION_004: &str = r#"
ALTER TABLE song ADD COLUMN disc INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_song_download ON song(download_status, row_number);
"#;

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 2,
        name: "membership_flags",
        sql: MIGRATION_002,
    },
    Migration {
        version: 3,
        name: "song_list",
        sql: MIGRATION_003,
    },
    Migration {
        version: 4,
        name: "song_disc",
        sql: MIGRATION_004,
    },
];

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Read the schema version: 0 when uninitialised, 1 for a ledger-less
/// `song` table, otherwise the ledger's maximum.
///
/// # Errors
/// Returns [`Error::BrokenLedger`] if the ledger table exists but is empty.
pub fn current_version(conn: &Connection) -> Result<u32> {
    if !table_exists(conn, "song")? {
        return Ok(0);
    }
    if !table_exists(conn, "migration")? {
        return Ok(1);
    }

    let max: Option<i64> =
        conn.query_row("SELECT MAX(schema_version) FROM migration", [], |row| {
            row.get(0)
        })?;
    let version = max.ok_or(Error::BrokenLedger)?;
    u32::try_from(version)
        .map_err(|_| Error::InvalidData(format!("invalid schema version {version} in ledger")))
}

fn stamp(tx: &Transaction<'_>, version: u32) -> Result<()> {
    tx.execute(
        "INSERT INTO migration (schema_version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Bring the database up to [`SCHEMA_VERSION`], returning the final version.
///
/// # Errors
/// Fails on a broken ledger, on a database newer than this build, or when a
/// migration step fails (that step is rolled back).
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    migrate_with(conn, MIGRATIONS, SCHEMA_VERSION)
}

fn migrate_with(conn: &mut Connection, migrations: &[Migration], target: u32) -> Result<u32> {
    let current = current_version(conn)?;

    if current == 0 {
        log::info!("Initialising database at schema version {}", target);
        let tx = conn.transaction()?;
        tx.execute_batch(INITIAL_SCHEMA)?;
        stamp(&tx, target)?;
        tx.commit()?;
        return Ok(target);
    }

    if current > target {
        return Err(Error::SchemaTooNew {
            found: current,
            supported: target,
        });
    }
    if current == target {
        log::debug!("No migrations to run: schema version {}", current);
        return Ok(current);
    }

    let mut version = current;
    for migration in migrations.iter().filter(|m| m.version > current && m.version <= target) {
        log::info!(
            "Applying migration {} ({})",
            migration.version,
            migration.name
        );
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        stamp(&tx, migration.version)?;
        tx.commit()?;
        version = migration.version;
    }

    Ok(version)
}
