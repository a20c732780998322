//! Audio, cover and artist logo downloads.
//!
//! A song's `download_status` is written only after its attempt finished, so
//! it always records an outcome. Per-song failures are logged and recorded,
//! never propagated; API and database errors still abort the run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use url::Url;
use xiami_core::model::{int_value, DownloadStatus, ListType};
use xiami_core::schema::Database;

use crate::category::FavCategory;
use crate::client::{PlayInfo, SongPlayInfo, XiamiClient};
use crate::config::Config;
use crate::error::EtlResult;
use crate::resilience::retry_transient;
use crate::store::{self, FileStore};

/// The stream chosen for one song. `url` is `None` when nothing playable was
/// offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInfo {
    pub song_id: i64,
    pub url: Option<String>,
}

/// Outcome counts of a download run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub success: usize,
    pub unavailable: usize,
    pub failed: usize,
    /// Requested IDs with no song row.
    pub missing: usize,
}

impl DownloadSummary {
    fn record(&mut self, status: DownloadStatus) {
        match status {
            DownloadStatus::Success => self.success += 1,
            DownloadStatus::Unavailable => self.unavailable += 1,
            DownloadStatus::Failed => self.failed += 1,
            DownloadStatus::NotSet => {}
        }
    }

    fn merge(&mut self, other: Self) {
        self.success += other.success;
        self.unavailable += other.unavailable;
        self.failed += other.failed;
        self.missing += other.missing;
    }
}

/// Outcome counts of a cover or logo run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The largest offered encoding. Ties go to the earliest; a best size of
/// zero means nothing playable.
pub fn select_best_play_info(play_infos: &[PlayInfo]) -> Option<&PlayInfo> {
    let mut best: Option<&PlayInfo> = None;
    for info in play_infos {
        let size = info.file_size.unwrap_or(0);
        if best.map_or(true, |b| size > b.file_size.unwrap_or(0)) {
            best = Some(info);
        }
    }
    best.filter(|b| b.file_size.unwrap_or(0) > 0)
}

fn best_url(info: &SongPlayInfo) -> Option<String> {
    let Some(best) = select_best_play_info(&info.play_infos) else {
        log::debug!("no valid stream for song {}", info.song_id);
        return None;
    };
    best.listen_file.clone().filter(|url| !url.is_empty())
}

/// Extension of the last URL path segment, query ignored.
pub fn file_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    Path::new(segment)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
}

fn file_name(stem: &str, url: &Url) -> String {
    match file_extension(url) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Drives audio and artwork downloads for one run.
#[derive(Debug)]
pub struct Downloader<'a> {
    client: &'a XiamiClient,
    db: &'a Database,
    music_dir: PathBuf,
    covers_dir: PathBuf,
    artist_logos_dir: PathBuf,
    retries: usize,
}

impl<'a> Downloader<'a> {
    pub fn new(client: &'a XiamiClient, db: &'a Database, config: &Config) -> Self {
        Self {
            client,
            db,
            music_dir: config.music_dir(),
            covers_dir: config.covers_dir(),
            artist_logos_dir: config.artist_logos_dir(),
            retries: config.download_retries,
        }
    }

    /// Resolve one stream per requested song, in request order.
    ///
    /// With `try_backup`, a song without a playable stream is queried once
    /// more under its backup ID.
    pub async fn get_audioinfos(&self, song_ids: &[i64], try_backup: bool) -> EtlResult<Vec<AudioInfo>> {
        let urls: IndexMap<i64, Option<String>> = self
            .client
            .get_play_info(song_ids)
            .await?
            .iter()
            .map(|info| (info.song_id, best_url(info)))
            .collect();

        let mut infos = Vec::with_capacity(song_ids.len());
        for &song_id in song_ids {
            let mut url = urls.get(&song_id).cloned().flatten();

            if url.is_none() && try_backup {
                let bak_song_id = self
                    .db
                    .get_song(song_id)?
                    .map_or(0, |song| song.bak_song_id);
                if bak_song_id > 0 {
                    log::info!("trying backup id {bak_song_id} for song {song_id}");
                    url = self
                        .client
                        .get_play_info(&[bak_song_id])
                        .await?
                        .iter()
                        .find_map(best_url);
                }
            }

            infos.push(AudioInfo { song_id, url });
        }
        Ok(infos)
    }

    /// Download each stream to `music/{row_number}-{id}.{ext}` and record the
    /// outcome as the song's download status.
    pub async fn download_songs(&self, infos: &[AudioInfo]) -> EtlResult<DownloadSummary> {
        let mut summary = DownloadSummary::default();

        for info in infos {
            let Some(song) = self.db.get_song(info.song_id)? else {
                log::warn!("song {} is not in the database, skipping", info.song_id);
                summary.missing += 1;
                continue;
            };

            let status = match info.url.as_deref().filter(|u| !u.is_empty()) {
                None => DownloadStatus::Unavailable,
                Some(raw) => {
                    let stem = format!("{}-{}", song.row_number, song.id);
                    match self.fetch(raw, &self.music_dir, &stem).await {
                        Ok(path) => {
                            log::debug!("saved {}", path.display());
                            DownloadStatus::Success
                        }
                        Err(e) => {
                            log::error!("failed to download song {}: {e}", song.id);
                            DownloadStatus::Failed
                        }
                    }
                }
            };

            log::info!("download status of {}: {status}", song.id);
            self.db.set_download_status(song.id, status)?;
            summary.record(status);
        }

        Ok(summary)
    }

    /// Download specific songs. The backup ID is not tried.
    pub async fn download_by_ids(&self, song_ids: &[i64]) -> EtlResult<DownloadSummary> {
        let infos = self.get_audioinfos(song_ids, false).await?;
        self.download_songs(&infos).await
    }

    /// Download songs with status `filter` in row-number order, in batches
    /// of `batch_size`, stopping after `max_batches` (0 for no limit).
    pub async fn download_batches(
        &self,
        filter: DownloadStatus,
        batch_size: usize,
        max_batches: usize,
    ) -> EtlResult<DownloadSummary> {
        let ids: Vec<i64> = self
            .db
            .songs_by_status(filter)?
            .iter()
            .map(|song| song.id)
            .collect();
        let mut summary = DownloadSummary::default();

        for (index, batch) in ids.chunks(batch_size.max(1)).enumerate() {
            if max_batches > 0 && index >= max_batches {
                log::info!("reached batch limit of {max_batches}");
                break;
            }
            log::info!("batch {}: {} songs", index + 1, batch.len());
            let infos = self.get_audioinfos(batch, true).await?;
            summary.merge(self.download_songs(&infos).await?);
        }

        Ok(summary)
    }

    /// Download the cover of every known album to `covers/{albumId}.{ext}`.
    pub async fn download_covers(&self, store: &FileStore) -> EtlResult<ArtSummary> {
        let mut logos = IndexMap::new();
        collect_logos(&mut logos, store.load_records(FavCategory::Albums)?, "albumId", "albumLogo");
        for album_id in store.detail_ids(ListType::Album)? {
            if let Some(detail) = store.load_detail(ListType::Album, album_id)? {
                collect_logos(&mut logos, vec![detail], "albumId", "albumLogo");
            }
        }
        let songs = store.all_songs()?.into_values().map(Value::Object).collect();
        collect_logos(&mut logos, songs, "albumId", "albumLogo");

        let existing: HashSet<i64> = logos
            .keys()
            .copied()
            .filter(|id| store.find_cover(*id).is_some())
            .collect();
        self.download_art(logos, &existing, &self.covers_dir).await
    }

    /// Download the logo of every favorited artist to
    /// `artist_logos/{artistId}.{ext}`.
    pub async fn download_artist_logos(&self, store: &FileStore) -> EtlResult<ArtSummary> {
        let mut logos = IndexMap::new();
        collect_logos(&mut logos, store.load_records(FavCategory::Artists)?, "artistId", "artistLogo");

        let existing: HashSet<i64> = store::dir_files(&self.artist_logos_dir, |_| true)
            .iter()
            .filter_map(|path| path.file_stem()?.to_str()?.parse().ok())
            .collect();
        self.download_art(logos, &existing, &self.artist_logos_dir).await
    }

    async fn download_art(
        &self,
        logos: IndexMap<i64, String>,
        existing: &HashSet<i64>,
        dir: &Path,
    ) -> EtlResult<ArtSummary> {
        let mut summary = ArtSummary::default();
        for (id, url) in logos {
            if existing.contains(&id) {
                summary.skipped += 1;
                continue;
            }
            match self.fetch(&url, dir, &id.to_string()).await {
                Ok(path) => {
                    log::info!("saved {}", path.display());
                    summary.downloaded += 1;
                }
                Err(e) => {
                    log::error!("failed to download image for {id}: {e}");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Download `raw` into `dir/{stem}.{ext}`, retrying transient failures.
    async fn fetch(&self, raw: &str, dir: &Path, stem: &str) -> EtlResult<PathBuf> {
        let url = self.client.resolve_url(raw)?;
        let path = dir.join(file_name(stem, &url));
        retry_transient(self.retries, || self.client.download_to(url.as_str(), &path)).await?;
        Ok(path)
    }
}

/// Collect `id_key → logo_key` pairs, keeping the first URL seen per ID.
fn collect_logos(logos: &mut IndexMap<i64, String>, records: Vec<Value>, id_key: &str, logo_key: &str) {
    for record in records {
        let Value::Object(map) = record else {
            continue;
        };
        if let Some((id, url)) = logo_of(&map, id_key, logo_key) {
            logos.entry(id).or_insert(url);
        }
    }
}

fn logo_of(record: &Map<String, Value>, id_key: &str, logo_key: &str) -> Option<(i64, String)> {
    let id = record.get(id_key).and_then(int_value).filter(|id| *id > 0)?;
    let url = record
        .get(logo_key)
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())?;
    Some((id, url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use tempfile::TempDir;
    use xiami_core::model::Membership;

    fn play_info(url: Option<&str>, size: i64) -> PlayInfo {
        PlayInfo {
            listen_file: url.map(str::to_string),
            file_size: Some(size),
            format: Some("mp3".to_string()),
        }
    }

    fn add_song(db: &Database, record: Value) {
        let Value::Object(map) = record else {
            panic!("expected object");
        };
        let row = db.next_row_number().unwrap();
        db.create_song(&map, row, Membership::Songs).unwrap();
    }

    fn play_info_body(infos: &Value) -> String {
        json!({"code": "SUCCESS", "result": {"data": {"songPlayInfos": infos}}}).to_string()
    }

    #[test]
    fn test_select_best_prefers_largest_then_first() {
        let infos = vec![
            play_info(Some("a"), 10),
            play_info(Some("b"), 30),
            play_info(Some("c"), 30),
        ];
        assert_eq!(
            select_best_play_info(&infos).and_then(|i| i.listen_file.as_deref()),
            Some("b")
        );
    }

    #[test]
    fn test_select_best_zero_size_is_none() {
        assert!(select_best_play_info(&[play_info(Some("a"), 0)]).is_none());
        assert!(select_best_play_info(&[]).is_none());
    }

    #[test]
    fn test_file_extension() {
        let url = Url::parse("http://m128.example.com/1/2/1771.mp3?auth_key=abc.def").unwrap();
        assert_eq!(file_extension(&url).as_deref(), Some("mp3"));
        let bare = Url::parse("http://example.com/stream/1771").unwrap();
        assert_eq!(file_extension(&bare), None);
        assert_eq!(file_name("3-1771", &bare), "3-1771");
    }

    #[tokio::test]
    async fn test_download_songs_records_each_outcome() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/audio/1.mp3")
            .match_query(Matcher::Any)
            .with_body("audio")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = Config::for_testing(dir.path(), &server.url());
        let client = XiamiClient::new(&config).unwrap();
        let db = Database::open_in_memory().unwrap();
        for id in 1..=3 {
            add_song(&db, json!({"songId": id}));
        }

        let infos = vec![
            AudioInfo {
                song_id: 1,
                url: Some(format!("{}/audio/1.mp3?k=v", server.url())),
            },
            AudioInfo {
                song_id: 2,
                url: None,
            },
            AudioInfo {
                song_id: 3,
                url: Some("http://127.0.0.1:1/audio/3.mp3".to_string()),
            },
        ];

        let summary = Downloader::new(&client, &db, &config)
            .download_songs(&infos)
            .await
            .unwrap();

        assert_eq!(
            summary,
            DownloadSummary {
                success: 1,
                unavailable: 1,
                failed: 1,
                missing: 0
            }
        );
        let status = |id| db.get_song(id).unwrap().unwrap().download_status;
        assert_eq!(status(1), DownloadStatus::Success);
        assert_eq!(status(2), DownloadStatus::Unavailable);
        assert_eq!(status(3), DownloadStatus::Failed);
        assert_eq!(
            std::fs::read_to_string(config.music_dir().join("1-1.mp3")).unwrap(),
            "audio"
        );
        assert!(!config.music_dir().join("3-3.mp3").exists());
    }

    #[tokio::test]
    async fn test_get_audioinfos_falls_back_to_backup_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/song/getPlayInfo")
            .match_query(Matcher::UrlEncoded("_q".into(), r#"{"songIds":[1,2]}"#.into()))
            .with_body(play_info_body(&json!([
                {"songId": 1, "playInfos": [{"listenFile": "", "fileSize": 0}]},
                {"songId": 2, "playInfos": [{"listenFile": "http://x/2.m4a", "fileSize": 5}]}
            ])))
            .create_async()
            .await;
        let backup = server
            .mock("GET", "/api/song/getPlayInfo")
            .match_query(Matcher::UrlEncoded("_q".into(), r#"{"songIds":[100]}"#.into()))
            .with_body(play_info_body(&json!([
                {"songId": 100, "playInfos": [{"listenFile": "http://x/100.mp3", "fileSize": 7}]}
            ])))
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = Config::for_testing(dir.path(), &server.url());
        let client = XiamiClient::new(&config).unwrap();
        let db = Database::open_in_memory().unwrap();
        add_song(&db, json!({"songId": 1, "bakSongId": 100}));
        add_song(&db, json!({"songId": 2}));

        let downloader = Downloader::new(&client, &db, &config);
        let infos = downloader.get_audioinfos(&[1, 2], true).await.unwrap();

        backup.assert_async().await;
        assert_eq!(
            infos,
            vec![
                AudioInfo {
                    song_id: 1,
                    url: Some("http://x/100.mp3".to_string())
                },
                AudioInfo {
                    song_id: 2,
                    url: Some("http://x/2.m4a".to_string())
                },
            ]
        );

        let without_backup = downloader.get_audioinfos(&[1, 2], false).await.unwrap();
        assert_eq!(without_backup[0].url, None);
    }

    #[tokio::test]
    async fn test_download_batches_respects_limit() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/song/getPlayInfo")
            .match_query(Matcher::Any)
            .with_body(play_info_body(&json!([])))
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = Config::for_testing(dir.path(), &server.url());
        let client = XiamiClient::new(&config).unwrap();
        let db = Database::open_in_memory().unwrap();
        for id in [30, 10, 20] {
            add_song(&db, json!({"songId": id}));
        }

        let summary = Downloader::new(&client, &db, &config)
            .download_batches(DownloadStatus::NotSet, 2, 1)
            .await
            .unwrap();

        assert_eq!(summary.unavailable, 2);
        let status = |id| db.get_song(id).unwrap().unwrap().download_status;
        assert_eq!(status(30), DownloadStatus::Unavailable);
        assert_eq!(status(10), DownloadStatus::Unavailable);
        assert_eq!(status(20), DownloadStatus::NotSet);
    }

    #[tokio::test]
    async fn test_download_covers_skips_existing() {
        let mut server = mockito::Server::new_async().await;
        let cover = server
            .mock("GET", "/images/2.jpg")
            .match_query(Matcher::Any)
            .with_body("jpeg")
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = Config::for_testing(dir.path(), &server.url());
        let client = XiamiClient::new(&config).unwrap();
        let db = Database::open_in_memory().unwrap();
        let store = FileStore::new(&config);
        store
            .write_page(
                FavCategory::Albums,
                1,
                &[
                    json!({"albumId": 1, "albumLogo": "/images/1.jpg"}),
                    json!({"albumId": 2, "albumLogo": "/images/2.jpg"}),
                ],
            )
            .unwrap();
        std::fs::create_dir_all(config.covers_dir()).unwrap();
        std::fs::write(config.covers_dir().join("1.png"), b"old").unwrap();

        let summary = Downloader::new(&client, &db, &config)
            .download_covers(&store)
            .await
            .unwrap();

        cover.assert_async().await;
        assert_eq!(
            summary,
            ArtSummary {
                downloaded: 1,
                skipped: 1,
                failed: 0
            }
        );
        assert!(config.covers_dir().join("2.jpg").is_file());
    }

    #[tokio::test]
    async fn test_artist_logo_failure_does_not_stop_run() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/logos/8.jpg")
            .match_query(Matcher::Any)
            .with_body("jpeg")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let config = Config::for_testing(dir.path(), &server.url());
        let client = XiamiClient::new(&config).unwrap();
        let db = Database::open_in_memory().unwrap();
        let store = FileStore::new(&config);
        store
            .write_page(
                FavCategory::Artists,
                1,
                &[
                    json!({"artistId": 7, "artistLogo": "http://127.0.0.1:1/logos/7.jpg"}),
                    json!({"artistId": 8, "artistLogo": "/logos/8.jpg"}),
                ],
            )
            .unwrap();

        let summary = Downloader::new(&client, &db, &config)
            .download_artist_logos(&store)
            .await
            .unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.failed, 1);
        assert!(config.artist_logos_dir().join("8.jpg").is_file());
    }
}
