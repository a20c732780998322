//! Removal of high-churn and redundant fields from raw API records.
//!
//! Counters, favorite flags and permission blobs change on every fetch and
//! would make otherwise identical page files differ. Trimming is idempotent:
//! already-trimmed records pass through unchanged.

use serde_json::{Map, Value};

/// Keys dropped from song records.
pub const SONG_TRIM_KEYS: &[&str] = &[
    "favFlag",
    "thirdpartyUrl",
    "boughtCount",
    "gmtCreate",
    "playCount",
    "shareCount",
    "favCount",
    "offline",
    "offlineType",
    "downloadCount",
    "originOffline",
    "canReward",
    "isFavor",
    "purviewRoleVOs",
    "artistVOs", // duplicated by singerVOs
    "tags",
    "thirdSongs",
    "freeAudioInfo",
    "whaleSongVO",
    "listenFiles", // only present in playlist details
];

/// Keys dropped from album records.
pub const ALBUM_TRIM_KEYS: &[&str] = &[
    "favFlag",
    "isFavor",
    "playCount",
    "shareCount",
    "favCount",
    "commentCount",
    "collectCount",
    "gmtCreate",
    "gmtModify",
    "purviewRoleVOs",
    "tags",
    "canReward",
    "boughtCount",
];

fn remove_keys(record: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        record.shift_remove(*key);
    }
}

/// Trim a song record in place.
pub fn trim_song(record: &mut Map<String, Value>) {
    remove_keys(record, SONG_TRIM_KEYS);
}

/// Trim an album record in place, including every song in an embedded
/// `songs` array.
pub fn trim_album(record: &mut Map<String, Value>) {
    remove_keys(record, ALBUM_TRIM_KEYS);
    trim_embedded_songs(record);
}

/// Trim every object in the record's `songs` array, if it has one.
pub fn trim_embedded_songs(record: &mut Map<String, Value>) {
    if let Some(Value::Array(songs)) = record.get_mut("songs") {
        for song in songs.iter_mut().filter_map(Value::as_object_mut) {
            trim_song(song);
        }
    }
}

/// Apply `trim` to every object in a JSON array; non-objects are left alone.
pub fn trim_all(records: &mut [Value], trim: fn(&mut Map<String, Value>)) {
    for record in records.iter_mut().filter_map(Value::as_object_mut) {
        trim(record);
    }
}
