//! File-backed JSON store.
//!
//! Layout under `json/`:
//!
//! ```text
//! songs/songs-1.json            one file per page, a JSON array of records
//! albums/albums-1.json
//! album_details/{albumId}.json  one detail document per album
//! playlist_details/{listId}.json
//! ```
//!
//! Pages are read back in numeric page order and merged into an ordered map
//! keyed by remote ID: a later occurrence replaces the value but keeps the
//! position of the first.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use xiami_core::model::{int_value, ListType};

use crate::category::FavCategory;
use crate::config::Config;
use crate::error::EtlResult;

/// Records keyed by remote ID, in first-seen order.
pub type MergedRecords = IndexMap<i64, Map<String, Value>>;

#[allow(clippy::expect_used)]
static PAGE_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("page index pattern is valid"));

/// Page index embedded in a page file name (`songs-12.json` → 12).
pub fn page_index(file_name: &str) -> Option<u32> {
    PAGE_INDEX
        .find(file_name)
        .and_then(|m| m.as_str().parse().ok())
}

/// Reads and writes exported JSON documents.
#[derive(Debug)]
pub struct FileStore {
    json_dir: PathBuf,
    album_details_dir: PathBuf,
    playlist_details_dir: PathBuf,
    covers_dir: PathBuf,
    cover_index: OnceLock<HashMap<String, PathBuf>>,
}

impl FileStore {
    pub fn new(config: &Config) -> Self {
        Self {
            json_dir: config.json_dir(),
            album_details_dir: config.album_details_dir(),
            playlist_details_dir: config.playlist_details_dir(),
            covers_dir: config.covers_dir(),
            cover_index: OnceLock::new(),
        }
    }

    pub fn category_dir(&self, category: FavCategory) -> PathBuf {
        self.json_dir.join(category.dir_name())
    }

    pub fn page_path(&self, category: FavCategory, page: u32) -> PathBuf {
        self.category_dir(category)
            .join(format!("{}-{page}.json", category.file_stem()))
    }

    pub fn detail_dir(&self, list_type: ListType) -> PathBuf {
        match list_type {
            ListType::Album => self.album_details_dir.clone(),
            ListType::Playlist => self.playlist_details_dir.clone(),
        }
    }

    pub fn detail_path(&self, list_type: ListType, id: i64) -> PathBuf {
        self.detail_dir(list_type).join(format!("{id}.json"))
    }

    /// Write one page of records, replacing any previous copy atomically.
    pub fn write_page(
        &self,
        category: FavCategory,
        page: u32,
        records: &[Value],
    ) -> EtlResult<PathBuf> {
        let path = self.page_path(category, page);
        write_json_atomic(&path, records)?;
        Ok(path)
    }

    pub fn write_detail(&self, list_type: ListType, id: i64, detail: &Value) -> EtlResult<PathBuf> {
        let path = self.detail_path(list_type, id);
        write_json_atomic(&path, detail)?;
        Ok(path)
    }

    pub fn detail_exists(&self, list_type: ListType, id: i64) -> bool {
        self.detail_path(list_type, id).is_file()
    }

    pub fn load_detail(&self, list_type: ListType, id: i64) -> EtlResult<Option<Value>> {
        let path = self.detail_path(list_type, id);
        if !path.is_file() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Page files of a category sorted by page index (2 before 10).
    pub fn page_files(&self, category: FavCategory) -> Vec<(u32, PathBuf)> {
        let dir = self.category_dir(category);
        let mut pages: Vec<(u32, PathBuf)> = json_files(&dir)
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_string_lossy().into_owned();
                match page_index(&name) {
                    Some(index) => Some((index, path)),
                    None => {
                        log::warn!("Ignoring page file without a page number: {}", path.display());
                        None
                    }
                }
            })
            .collect();
        pages.sort_by_key(|(index, _)| *index);
        pages
    }

    /// Every record of a category, page by page.
    pub fn load_records(&self, category: FavCategory) -> EtlResult<Vec<Value>> {
        let mut records = Vec::new();
        for (_, path) in self.page_files(category) {
            match read_json(&path)? {
                Value::Array(items) => records.extend(items),
                Value::Null => {}
                _ => log::warn!("Page file is not a JSON array: {}", path.display()),
            }
        }
        Ok(records)
    }

    /// Records of a category keyed by ID. Last write wins on value, first
    /// write wins on order.
    pub fn merge_records(&self, category: FavCategory) -> EtlResult<MergedRecords> {
        let mut merged = MergedRecords::new();
        merge_into(&mut merged, self.load_records(category)?, category.id_key());
        Ok(merged)
    }

    /// IDs of the lists whose details were exported, in the order the lists
    /// appear in their favorites pages, followed by any others ascending.
    pub fn detail_ids(&self, list_type: ListType) -> EtlResult<Vec<i64>> {
        let on_disk: BTreeSet<i64> = json_files(&self.detail_dir(list_type))
            .iter()
            .filter_map(|path| path.file_stem()?.to_str()?.parse().ok())
            .collect();

        let categories: &[FavCategory] = match list_type {
            ListType::Album => &[FavCategory::Albums],
            ListType::Playlist => &[FavCategory::Playlists, FavCategory::MyPlaylists],
        };

        let mut ordered = Vec::with_capacity(on_disk.len());
        let mut seen = HashSet::new();
        for category in categories {
            for id in self.merge_records(*category)?.keys() {
                if on_disk.contains(id) && seen.insert(*id) {
                    ordered.push(*id);
                }
            }
        }
        ordered.extend(on_disk.into_iter().filter(|id| !seen.contains(id)));
        Ok(ordered)
    }

    /// Embedded song records of one detail document.
    pub fn detail_songs(&self, list_type: ListType, id: i64) -> EtlResult<Vec<Map<String, Value>>> {
        let songs = match self.load_detail(list_type, id)? {
            Some(Value::Object(mut detail)) => detail.remove("songs"),
            _ => None,
        };
        Ok(match songs {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Fold the songs of every detail document into `merged`, adding only
    /// IDs not already present. Existing entries keep position and value.
    pub fn fold_details(&self, merged: &mut MergedRecords, list_type: ListType) -> EtlResult<usize> {
        let mut added = 0;
        for id in self.detail_ids(list_type)? {
            for song in self.detail_songs(list_type, id)? {
                let Some(song_id) = song.get("songId").and_then(int_value) else {
                    continue;
                };
                if !merged.contains_key(&song_id) {
                    merged.insert(song_id, song);
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Every known song: favorites pages first, then songs only seen in
    /// album and playlist details.
    pub fn all_songs(&self) -> EtlResult<MergedRecords> {
        let mut merged = self.merge_records(FavCategory::Songs)?;
        self.fold_details(&mut merged, ListType::Album)?;
        self.fold_details(&mut merged, ListType::Playlist)?;
        Ok(merged)
    }

    /// Cover file for an album, matched by file stem. The covers directory
    /// is indexed on first use.
    pub fn find_cover(&self, album_id: i64) -> Option<&Path> {
        let index = self.cover_index.get_or_init(|| {
            dir_files(&self.covers_dir, |_| true)
                .into_iter()
                .filter_map(|path| Some((path.file_stem()?.to_str()?.to_string(), path)))
                .collect()
        });
        index.get(&album_id.to_string()).map(PathBuf::as_path)
    }
}

/// Insert records keyed by `id_key`. Records without a usable ID are
/// skipped with a warning.
pub fn merge_into(merged: &mut MergedRecords, records: Vec<Value>, id_key: &str) {
    for record in records {
        let Value::Object(map) = record else {
            log::warn!("Skipping non-object record");
            continue;
        };
        match map.get(id_key).and_then(int_value) {
            Some(id) => {
                merged.insert(id, map);
            }
            None => log::warn!("Skipping record without '{id_key}'"),
        }
    }
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    dir_files(dir, |path| {
        path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    })
}

pub(crate) fn dir_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && keep(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn read_json(path: &Path) -> EtlResult<Value> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Serialize to a temp file beside `path`, then rename over it.
fn write_json_atomic<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> EtlResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
