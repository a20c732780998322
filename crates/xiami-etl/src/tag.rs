//! Metadata and cover tagging of downloaded audio files.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::ItemKey;
use lofty::tag::{Accessor, Tag, TagType};
use xiami_core::model::{DownloadStatus, Song};
use xiami_core::schema::Database;

use crate::error::{EtlError, EtlResult};
use crate::store::{self, FileStore};

/// Tag values derived from a song row. Empty values are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFields {
    pub title: Option<String>,
    pub version: Option<String>,
    pub album: Option<String>,
    pub language: Option<String>,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    /// Written as both artist and album artist.
    pub artist: Option<String>,
    pub lyricist: Option<String>,
    pub composer: Option<String>,
    pub arranger: Option<String>,
    pub performers: Vec<String>,
    pub comment: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn positive(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}

impl TagFields {
    pub fn from_song(song: &Song) -> Self {
        let comment = [
            ("album_sub_name", &song.album_sub_name),
            ("artist_alias", &song.artist_alias),
        ]
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("; ");

        Self {
            title: non_empty(&song.name),
            version: non_empty(&song.sub_name),
            album: non_empty(&song.album_name),
            language: non_empty(&song.album_lang),
            track: positive(song.track),
            disc: positive(song.disc),
            artist: non_empty(&song.artist_name),
            lyricist: non_empty(&song.songwriters),
            composer: non_empty(&song.composer),
            arranger: non_empty(&song.arrangement),
            performers: song.singer_list(),
            comment: non_empty(&comment),
        }
    }

    fn apply(&self, tag: &mut Tag) {
        if let Some(title) = &self.title {
            tag.set_title(title.clone());
        }
        if let Some(album) = &self.album {
            tag.set_album(album.clone());
        }
        if let Some(artist) = &self.artist {
            tag.set_artist(artist.clone());
        }
        if let Some(track) = self.track {
            tag.set_track(track);
        }
        if let Some(disc) = self.disc {
            tag.set_disk(disc);
        }
        if let Some(comment) = &self.comment {
            tag.set_comment(comment.clone());
        }

        let performers = (!self.performers.is_empty()).then(|| self.performers.join("/"));
        let text_items = [
            (ItemKey::TrackSubtitle, &self.version),
            (ItemKey::Language, &self.language),
            (ItemKey::AlbumArtist, &self.artist),
            (ItemKey::Lyricist, &self.lyricist),
            (ItemKey::Composer, &self.composer),
            (ItemKey::Arranger, &self.arranger),
            (ItemKey::Performer, &performers),
        ];
        for (key, value) in text_items {
            let Some(value) = value else { continue };
            if !tag.insert_text(key.clone(), value.clone()) {
                log::debug!("{:?} tags cannot hold {key:?}", tag.tag_type());
            }
        }
    }
}

/// Tag format used for a file extension.
pub fn tag_type_for(path: &Path) -> EtlResult<TagType> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" => Ok(TagType::Id3v2),
        "m4a" | "mp4" => Ok(TagType::Mp4Ilst),
        _ => Err(EtlError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Write the song's metadata, and the cover if given, into `path`.
pub fn write_tags(path: &Path, song: &Song, cover: Option<&Path>) -> EtlResult<()> {
    let tag_type = tag_type_for(path)?;
    let mut tagged = lofty::read_from_path(path)?;

    if tagged.tag(tag_type).is_none() {
        tagged.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged
        .tag_mut(tag_type)
        .ok_or_else(|| EtlError::UnsupportedFormat(path.display().to_string()))?;

    TagFields::from_song(song).apply(tag);

    if let Some(cover) = cover {
        let mut picture = Picture::from_reader(&mut File::open(cover)?)?;
        picture.set_pic_type(PictureType::CoverFront);
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(picture);
    }

    tagged.save_to_path(path, WriteOptions::default())?;
    Ok(())
}

/// Counts from a tagging run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSummary {
    pub tagged: usize,
    pub with_cover: usize,
    /// Downloaded songs whose file was not found.
    pub missing: usize,
    pub failed: usize,
}

/// Index `music/` by file stem (`{row_number}-{id}`).
fn music_index(music_dir: &Path) -> HashMap<String, PathBuf> {
    store::dir_files(music_dir, |_| true)
        .into_iter()
        .filter_map(|path| Some((path.file_stem()?.to_str()?.to_string(), path)))
        .collect()
}

/// Tag every successfully downloaded song found in `music_dir`.
///
/// A file that cannot be tagged is logged and counted; the run continues.
pub fn tag_songs(db: &Database, store: &FileStore, music_dir: &Path) -> EtlResult<TagSummary> {
    let files = music_index(music_dir);
    let mut summary = TagSummary::default();

    for song in db.songs_by_status(DownloadStatus::Success)? {
        let stem = format!("{}-{}", song.row_number, song.id);
        let Some(path) = files.get(&stem) else {
            log::warn!("no audio file for song {} ({stem}.*)", song.id);
            summary.missing += 1;
            continue;
        };

        let cover = store.find_cover(song.album_id);
        match write_tags(path, &song, cover) {
            Ok(()) => {
                log::info!("tagged {}", path.display());
                summary.tagged += 1;
                if cover.is_some() {
                    summary.with_cover += 1;
                }
            }
            Err(e) => {
                log::error!("failed to tag {}: {e}", path.display());
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
