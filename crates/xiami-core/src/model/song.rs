use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Local column name -> remote JSON key.
///
/// Consulted by [`Song::from_remote`]; `sub_name` is derived separately
/// from `subName` and `newSubName`.
pub const SONG_FIELD_MAP: &[(&str, &str)] = &[
    ("id", "songId"),
    ("sid", "songStringId"),
    ("name", "songName"),
    ("name_pinyin", "pinyin"),
    ("album_id", "albumId"),
    ("album_sid", "albumStringId"),
    ("album_name", "albumName"),
    ("album_sub_name", "albumSubName"),
    ("album_lang", "albumLanguage"),
    ("album_song_count", "albumSongCount"),
    ("track", "track"),
    ("disc", "cdSerial"),
    ("artist_id", "artistId"),
    ("artist_name", "artistName"),
    ("artist_alias", "artistAlias"),
    ("singers", "singers"),
    ("songwriters", "songwriters"),
    ("composer", "composer"),
    ("arrangement", "arrangement"),
    ("bak_song_id", "bakSongId"),
];

/// Outcome of the most recent download attempt for a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadStatus {
    NotSet,
    Success,
    /// No playable stream was offered, even after trying the backup ID.
    Unavailable,
    Failed,
}

impl DownloadStatus {
    pub const ALL: [Self; 4] = [Self::NotSet, Self::Success, Self::Unavailable, Self::Failed];

    /// Integer stored in the `download_status` column.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::NotSet => 0,
            Self::Success => 1,
            Self::Unavailable => -1,
            Self::Failed => -9,
        }
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NotSet),
            1 => Some(Self::Success),
            -1 => Some(Self::Unavailable),
            -9 => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotSet => "not-set",
            Self::Success => "success",
            Self::Unavailable => "unavailable",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = Error;

    /// Accepts either the name (`failed`) or the stored code (`-9`).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i64>() {
            return Self::from_code(code)
                .ok_or_else(|| Error::InvalidData(format!("unknown download status code {code}")));
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidData(format!("unknown download status '{s}'")))
    }
}

impl ToSql for DownloadStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for DownloadStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        Self::from_code(code).ok_or(FromSqlError::OutOfRange(code))
    }
}

/// The favorites category a song was discovered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Membership {
    Songs,
    Albums,
    Playlists,
}

impl Membership {
    /// The boolean column recording this membership.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Songs => "in_songs",
            Self::Albums => "in_albums",
            Self::Playlists => "in_playlists",
        }
    }
}

/// A favorited song as stored in the local database.
///
/// `id` is the remote song ID and never changes. `row_number` is the
/// first-seen ordinal assigned when the row is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: i64,
    pub row_number: i64,
    pub sid: String,
    pub name: String,
    pub name_pinyin: String,
    pub sub_name: String,

    pub album_id: i64,
    pub album_sid: String,
    pub album_name: String,
    pub album_sub_name: String,
    pub album_lang: String,
    pub album_song_count: i64,
    pub track: i64,
    pub disc: i64,

    pub artist_id: i64,
    pub artist_name: String,
    pub artist_alias: String,

    pub singers: String,
    pub songwriters: String,
    pub composer: String,
    pub arrangement: String,

    /// Alternate ID tried when `id` yields no playable stream; 0 when absent.
    pub bak_song_id: i64,

    // --- Export metadata ---
    pub download_status: DownloadStatus,
    pub in_songs: bool,
    pub in_albums: bool,
    pub in_playlists: bool,
}

impl Song {
    /// Build a song from a trimmed remote record.
    ///
    /// Only `songId` is required; every other mapped field defaults to an
    /// empty string or zero. The membership flag for `membership` is set and
    /// the other two are cleared.
    ///
    /// # Errors
    /// Returns [`Error::InvalidData`] if the record has no usable `songId`.
    pub fn from_remote(
        record: &Map<String, Value>,
        row_number: i64,
        membership: Membership,
    ) -> Result<Self> {
        let fields = RemoteFields(record);
        let id = fields.required_int("id")?;

        let sub_name = compose_sub_name(
            &text_value(record.get("subName")),
            &text_value(record.get("newSubName")),
        );

        let mut song = Self {
            id,
            row_number,
            sid: fields.text("sid"),
            name: fields.text("name"),
            name_pinyin: fields.text("name_pinyin"),
            sub_name,
            album_id: fields.int("album_id"),
            album_sid: fields.text("album_sid"),
            album_name: fields.text("album_name"),
            album_sub_name: fields.text("album_sub_name"),
            album_lang: fields.text("album_lang"),
            album_song_count: fields.int("album_song_count"),
            track: fields.int("track"),
            disc: fields.int("disc"),
            artist_id: fields.int("artist_id"),
            artist_name: fields.text("artist_name"),
            artist_alias: fields.text("artist_alias"),
            singers: fields.text("singers"),
            songwriters: fields.text("songwriters"),
            composer: fields.text("composer"),
            arrangement: fields.text("arrangement"),
            bak_song_id: fields.int("bak_song_id"),
            download_status: DownloadStatus::NotSet,
            in_songs: false,
            in_albums: false,
            in_playlists: false,
        };
        song.mark(membership);
        Ok(song)
    }

    /// Set the flag for `membership`, leaving the others untouched.
    pub fn mark(&mut self, membership: Membership) {
        match membership {
            Membership::Songs => self.in_songs = true,
            Membership::Albums => self.in_albums = true,
            Membership::Playlists => self.in_playlists = true,
        }
    }

    /// Singer names split on `/`, blanks dropped.
    #[must_use]
    pub fn singer_list(&self) -> Vec<String> {
        self.singers
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} - {} - {}",
            self.id, self.name, self.artist_name, self.album_name
        )
    }
}

/// Combine the two remote subtitle fields.
///
/// Both present and different: `"primary (secondary)"`. Both equal: just
/// one. Only one present: that one.
#[must_use]
pub fn compose_sub_name(primary: &str, secondary: &str) -> String {
    match (primary.is_empty(), secondary.is_empty()) {
        (false, false) if primary == secondary => primary.to_string(),
        (false, false) => format!("{primary} ({secondary})"),
        (false, true) => primary.to_string(),
        (true, false) => secondary.to_string(),
        (true, true) => String::new(),
    }
}

/// Field access through [`SONG_FIELD_MAP`].
struct RemoteFields<'a>(&'a Map<String, Value>);

impl RemoteFields<'_> {
    fn value(&self, local: &str) -> Option<&Value> {
        let key = SONG_FIELD_MAP
            .iter()
            .find(|(column, _)| *column == local)
            .map_or(local, |(_, remote)| *remote);
        self.0.get(key)
    }

    fn text(&self, local: &str) -> String {
        text_value(self.value(local))
    }

    fn int(&self, local: &str) -> i64 {
        self.value(local).and_then(int_value).unwrap_or(0)
    }

    fn required_int(&self, local: &str) -> Result<i64> {
        self.value(local).and_then(int_value).ok_or_else(|| {
            Error::InvalidData(format!("song record has no usable '{local}' field"))
        })
    }
}

fn text_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Remote IDs arrive as numbers, occasionally as numeric strings.
pub fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
