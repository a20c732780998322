//! End-to-end tests for export → reconcile → download.
//!
//! The remote API is served by a local mockito server; nothing leaves the
//! machine.

use mockito::{Matcher, Server};
use serde_json::{json, Value};
use tempfile::TempDir;
use xiami_core::model::{DownloadStatus, ListType};
use xiami_core::schema::{Database, SCHEMA_VERSION};
use xiami_etl::reconcile::{create_songs_db, ingest_album_details};
use xiami_etl::{Config, Downloader, Exporter, FavCategory, FileStore, XiamiClient};

fn success(key: &str, data: &Value) -> String {
    json!({"code": "SUCCESS", "result": {"data": {key: data}}}).to_string()
}

fn favorites_query(kind: u32, page: u32) -> Matcher {
    Matcher::UrlEncoded(
        "_q".into(),
        format!(r#"{{"userId":1,"type":{kind},"pagingVO":{{"page":{page},"pageSize":30}}}}"#),
    )
}

async fn mock_pages(server: &mut Server, kind: u32, key: &str, pages: &[Value]) {
    for (index, items) in pages.iter().enumerate() {
        let page = u32::try_from(index).unwrap() + 1;
        server
            .mock("GET", "/api/favorite/getFavorites")
            .match_query(favorites_query(kind, page))
            .with_body(success(key, items))
            .create_async()
            .await;
    }
    let last = u32::try_from(pages.len()).unwrap() + 1;
    server
        .mock("GET", "/api/favorite/getFavorites")
        .match_query(favorites_query(kind, last))
        .with_body(success(key, &Value::Null))
        .create_async()
        .await;
}

#[tokio::test]
async fn test_export_then_create_songs_in_merge_order() {
    let mut server = Server::new_async().await;
    mock_pages(
        &mut server,
        1,
        "songs",
        &[
            json!([{"songId": 1, "songName": "one"}, {"songId": 2, "songName": "two"}]),
            json!([{"songId": 2, "songName": "two again"}, {"songId": 3, "songName": "three"}]),
        ],
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = Config::for_testing(dir.path(), &server.url());
    let client = XiamiClient::new(&config).unwrap();
    let store = FileStore::new(&config);

    Exporter::new(&client, &store)
        .export_pages(FavCategory::Songs, None)
        .await
        .unwrap();

    let mut db = Database::open(config.database_path()).unwrap();
    let summary = create_songs_db(&mut db, &store, false).unwrap();
    assert_eq!(summary.created, 3);

    let songs = db.list_songs().unwrap();
    let rows: Vec<(i64, i64, &str)> = songs
        .iter()
        .map(|s| (s.id, s.row_number, s.name.as_str()))
        .collect();
    assert_eq!(rows, vec![(1, 1, "one"), (2, 2, "two again"), (3, 3, "three")]);
    assert!(songs.iter().all(|s| s.in_songs && !s.in_albums));
}

#[tokio::test]
async fn test_flags_accumulate_across_songs_and_album_details() {
    let mut server = Server::new_async().await;
    mock_pages(&mut server, 1, "songs", &[json!([{"songId": 5}])]).await;
    mock_pages(&mut server, 2, "albums", &[json!([{"albumId": 9}])]).await;
    server
        .mock("GET", "/api/album/getAlbumDetail")
        .match_query(Matcher::UrlEncoded("_q".into(), r#"{"albumId":9}"#.into()))
        .with_body(success(
            "albumDetail",
            &json!({"albumId": 9, "songs": [{"songId": 6}, {"songId": 5}]}),
        ))
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config::for_testing(dir.path(), &server.url());
    let client = XiamiClient::new(&config).unwrap();
    let store = FileStore::new(&config);
    let exporter = Exporter::new(&client, &store);

    exporter.export_pages(FavCategory::Songs, None).await.unwrap();
    exporter.export_pages(FavCategory::Albums, None).await.unwrap();
    exporter.export_album_details().await.unwrap();

    let mut db = Database::open(config.database_path()).unwrap();
    create_songs_db(&mut db, &store, false).unwrap();
    db.set_download_status(5, DownloadStatus::Success).unwrap();

    ingest_album_details(&mut db, &store).unwrap();
    ingest_album_details(&mut db, &store).unwrap();

    let five = db.get_song(5).unwrap().unwrap();
    assert!(five.in_songs && five.in_albums);
    assert_eq!(five.row_number, 1);
    assert_eq!(five.download_status, DownloadStatus::Success);

    let six = db.get_song(6).unwrap().unwrap();
    assert!(!six.in_songs && six.in_albums);
    assert_eq!(six.row_number, 2);

    assert_eq!(db.list_song_ids(ListType::Album, 9).unwrap(), vec![6, 5]);
}

#[tokio::test]
async fn test_download_run_records_outcomes() {
    let mut server = Server::new_async().await;
    let audio_url = format!("{}/audio/1.mp3?auth=1", server.url());
    server
        .mock("GET", "/api/song/getPlayInfo")
        .match_query(Matcher::Any)
        .with_body(success(
            "songPlayInfos",
            &json!([
                {"songId": 1, "playInfos": [
                    {"listenFile": "", "fileSize": 0, "format": "m4a"},
                    {"listenFile": audio_url, "fileSize": 5, "format": "mp3"}
                ]},
                {"songId": 2, "playInfos": [{"listenFile": "", "fileSize": 0}]},
                {"songId": 3, "playInfos": [
                    {"listenFile": "http://127.0.0.1:1/audio/3.mp3", "fileSize": 5}
                ]}
            ]),
        ))
        .create_async()
        .await;
    server
        .mock("GET", "/audio/1.mp3")
        .match_query(Matcher::Any)
        .with_body("12345")
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config::for_testing(dir.path(), &server.url());
    let client = XiamiClient::new(&config).unwrap();
    let store = FileStore::new(&config);
    store
        .write_page(
            FavCategory::Songs,
            1,
            &[json!({"songId": 1}), json!({"songId": 2}), json!({"songId": 3})],
        )
        .unwrap();

    let mut db = Database::open(config.database_path()).unwrap();
    create_songs_db(&mut db, &store, false).unwrap();

    let summary = Downloader::new(&client, &db, &config)
        .download_batches(DownloadStatus::NotSet, 10, 0)
        .await
        .unwrap();
    assert_eq!((summary.success, summary.unavailable, summary.failed), (1, 1, 1));

    let status = |id| db.get_song(id).unwrap().unwrap().download_status;
    assert_eq!(status(1), DownloadStatus::Success);
    assert_eq!(status(2), DownloadStatus::Unavailable);
    assert_eq!(status(3), DownloadStatus::Failed);
    assert_eq!(
        std::fs::read(config.music_dir().join("1-1.mp3")).unwrap(),
        b"12345"
    );

    // Only the failed song is retried when filtering on FAILED.
    let retry = Downloader::new(&client, &db, &config)
        .download_batches(DownloadStatus::Failed, 10, 0)
        .await
        .unwrap();
    assert_eq!(retry.failed, 1);
    assert_eq!(retry.success + retry.unavailable, 0);
}

#[test]
fn test_database_file_is_migrated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.sqlite3");
    {
        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }
    let reopened = Database::open(&path).unwrap();
    assert_eq!(reopened.schema_version().unwrap(), SCHEMA_VERSION);
}
