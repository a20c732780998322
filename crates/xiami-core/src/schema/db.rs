use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::Result;
use crate::model::{DownloadStatus, ListType, Membership, Song};

use super::migrations;

/// Result of reconciling one remote record against the `song` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongUpsert {
    /// A new row was inserted.
    Created,
    /// The row already existed; only the membership flag was set.
    Flagged,
}

/// Counts from ingesting one album or playlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListIngest {
    pub created: usize,
    pub flagged: usize,
    /// Records without a usable song ID.
    pub skipped: usize,
}

const SONG_COLUMNS: &str = "id, row_number, sid, name, name_pinyin, sub_name,
    album_id, album_sid, album_name, album_sub_name, album_lang, album_song_count,
    track, disc, artist_id, artist_name, artist_alias,
    singers, songwriters, composer, arrangement, bak_song_id,
    download_status, in_songs, in_albums, in_playlists";

/// A database connection with the reconciliation and export queries.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migrations::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrations::migrate(&mut conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for advanced queries).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrations::current_version(&self.conn)
    }

    /// Delete every song and list membership.
    pub fn clear(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM song_list", [])?;
        tx.execute("DELETE FROM song", [])?;
        tx.commit()?;
        Ok(())
    }
}

// Song reconciliation
impl Database {
    /// The row number the next newly created song receives.
    pub fn next_row_number(&self) -> Result<i64> {
        next_row_number(&self.conn)
    }

    /// Create the song for `record` if its ID is new, otherwise set only the
    /// `membership` flag on the existing row.
    ///
    /// An existing row keeps its `row_number`, `download_status` and other
    /// flags, so repeated or reordered ingestion converges to the same state.
    pub fn create_song(
        &self,
        record: &Map<String, Value>,
        row_number: i64,
        membership: Membership,
    ) -> Result<SongUpsert> {
        let song = Song::from_remote(record, row_number, membership)?;
        upsert_song(&self.conn, &song, membership)
    }

    /// Reconcile every song of one album or playlist and record its
    /// membership rows, all in a single transaction.
    ///
    /// Membership rows are only added when the identical row is absent, so
    /// re-ingesting a list leaves the table unchanged.
    pub fn ingest_list(
        &mut self,
        list_type: ListType,
        list_id: i64,
        records: &[Map<String, Value>],
    ) -> Result<ListIngest> {
        let membership = match list_type {
            ListType::Album => Membership::Albums,
            ListType::Playlist => Membership::Playlists,
        };

        let tx = self.conn.transaction()?;
        let mut summary = ListIngest::default();

        for record in records {
            let song = match Song::from_remote(record, next_row_number(&tx)?, membership) {
                Ok(song) => song,
                Err(e) => {
                    log::warn!("Skipping record in {} {}: {}", list_type, list_id, e);
                    summary.skipped += 1;
                    continue;
                }
            };

            match upsert_song(&tx, &song, membership)? {
                SongUpsert::Created => summary.created += 1,
                SongUpsert::Flagged => summary.flagged += 1,
            }

            tx.execute(
                "INSERT INTO song_list (list_type, list_id, song_id)
                 SELECT ?1, ?2, ?3
                 WHERE NOT EXISTS (
                     SELECT 1 FROM song_list
                     WHERE list_type = ?1 AND list_id = ?2 AND song_id = ?3
                 )",
                rusqlite::params![list_type, list_id, song.id],
            )?;
        }

        tx.commit()?;
        Ok(summary)
    }

    /// Song IDs of a list in ingestion order.
    pub fn list_song_ids(&self, list_type: ListType, list_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT song_id FROM song_list
             WHERE list_type = ?1 AND list_id = ?2
             ORDER BY id",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![list_type, list_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

// Song queries
impl Database {
    pub fn get_song(&self, id: i64) -> Result<Option<Song>> {
        let song = self
            .conn
            .query_row(
                &format!("SELECT {SONG_COLUMNS} FROM song WHERE id = ?1"),
                [id],
                row_to_song,
            )
            .optional()?;
        Ok(song)
    }

    /// Songs with the given download status, in row-number order.
    pub fn songs_by_status(&self, status: DownloadStatus) -> Result<Vec<Song>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SONG_COLUMNS} FROM song
             WHERE download_status = ?1
             ORDER BY row_number"
        ))?;
        let songs = stmt
            .query_map([status], row_to_song)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    /// All songs in row-number order.
    pub fn list_songs(&self) -> Result<Vec<Song>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {SONG_COLUMNS} FROM song ORDER BY row_number"))?;
        let songs = stmt
            .query_map([], row_to_song)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(songs)
    }

    /// Record the outcome of a download attempt.
    pub fn set_download_status(&self, id: i64, status: DownloadStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE song SET download_status = ?2 WHERE id = ?1",
            rusqlite::params![id, status],
        )?;
        Ok(())
    }

    /// Number of songs per download status (statuses with no songs omitted).
    pub fn count_by_status(&self) -> Result<Vec<(DownloadStatus, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT download_status, COUNT(*) FROM song
             GROUP BY download_status
             ORDER BY download_status DESC",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Number of songs carrying the given membership flag.
    pub fn count_by_membership(&self, membership: Membership) -> Result<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM song WHERE {} = 1", membership.column()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn next_row_number(conn: &Connection) -> Result<i64> {
    let max: Option<i64> =
        conn.query_row("SELECT MAX(row_number) FROM song", [], |row| row.get(0))?;
    Ok(max.unwrap_or(0) + 1)
}

fn insert_song(conn: &Connection, song: &Song) -> Result<bool> {
    let inserted = conn.execute(
        &format!(
            "INSERT INTO song ({SONG_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)
             ON CONFLICT(id) DO NOTHING"
        ),
        rusqlite::params![
            song.id,
            song.row_number,
            song.sid,
            song.name,
            song.name_pinyin,
            song.sub_name,
            song.album_id,
            song.album_sid,
            song.album_name,
            song.album_sub_name,
            song.album_lang,
            song.album_song_count,
            song.track,
            song.disc,
            song.artist_id,
            song.artist_name,
            song.artist_alias,
            song.singers,
            song.songwriters,
            song.composer,
            song.arrangement,
            song.bak_song_id,
            song.download_status,
            song.in_songs,
            song.in_albums,
            song.in_playlists,
        ],
    )?;
    Ok(inserted > 0)
}

fn mark_song(conn: &Connection, id: i64, membership: Membership) -> Result<()> {
    conn.execute(
        &format!("UPDATE song SET {} = 1 WHERE id = ?1", membership.column()),
        [id],
    )?;
    Ok(())
}

fn upsert_song(conn: &Connection, song: &Song, membership: Membership) -> Result<SongUpsert> {
    if insert_song(conn, song)? {
        log::debug!("Created song {}", song);
        Ok(SongUpsert::Created)
    } else {
        mark_song(conn, song.id, membership)?;
        log::debug!("Song {} exists, set {}", song.id, membership.column());
        Ok(SongUpsert::Flagged)
    }
}

fn row_to_song(row: &rusqlite::Row) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        row_number: row.get(1)?,
        sid: row.get(2)?,
        name: row.get(3)?,
        name_pinyin: row.get(4)?,
        sub_name: row.get(5)?,
        album_id: row.get(6)?,
        album_sid: row.get(7)?,
        album_name: row.get(8)?,
        album_sub_name: row.get(9)?,
        album_lang: row.get(10)?,
        album_song_count: row.get(11)?,
        track: row.get(12)?,
        disc: row.get(13)?,
        artist_id: row.get(14)?,
        artist_name: row.get(15)?,
        artist_alias: row.get(16)?,
        singers: row.get(17)?,
        songwriters: row.get(18)?,
        composer: row.get(19)?,
        arrangement: row.get(20)?,
        bak_song_id: row.get(21)?,
        download_status: row.get(22)?,
        in_songs: row.get(23)?,
        in_albums: row.get(24)?,
        in_playlists: row.get(25)?,
    })
}
