//! Signed client for the site's private web API.
//!
//! Every call is a GET with two query parameters: `_q`, the compact JSON
//! payload, and `_s`, its signature (see [`crate::signer`]). Responses are
//! wrapped in an envelope:
//!
//! ```json
//! {"code": "SUCCESS", "result": {"data": {"songs": [...]}}}
//! {"code": "SG_TOKEN_EXPIRED", "msg": "..."}
//! ```
//!
//! Requests are paced by a [`RequestPacer`]; the client never issues two
//! calls closer together than the configured interval.

use std::io::Write;
use std::path::Path;

use reqwest::header::COOKIE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use url::Url;

use crate::category::FavCategory;
use crate::config::Config;
use crate::error::{EtlError, EtlResult};
use crate::resilience::RequestPacer;
use crate::signer::{canonical_json, Session, SIGNING_COOKIE};

pub const PLAY_INFO_PATH: &str = "/api/song/getPlayInfo";
pub const ALBUM_DETAIL_PATH: &str = "/api/album/getAlbumDetail";
pub const COLLECT_STATIC_URL_PATH: &str = "/api/collect/getCollectStaticUrl";

const SUCCESS: &str = "SUCCESS";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
    page: u32,
    page_size: u32,
}

/// Favorites payload. Field order is part of the signature.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageQuery {
    user_id: i64,
    #[serde(rename = "type")]
    kind: u32,
    #[serde(rename = "pagingVO")]
    paging: Paging,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MyPlaylistsQuery {
    user_id: i64,
    #[serde(rename = "type")]
    kind: u32,
    #[serde(rename = "pagingVO")]
    paging: Paging,
    include_system_create: u8,
    sort: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayInfoQuery<'a> {
    song_ids: &'a [i64],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlbumQuery {
    album_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    list_id: i64,
}

/// One encoding offered for a song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayInfo {
    pub listen_file: Option<String>,
    pub file_size: Option<i64>,
    pub format: Option<String>,
}

/// All encodings offered for one song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongPlayInfo {
    pub song_id: i64,
    #[serde(default)]
    pub play_infos: Vec<PlayInfo>,
}

/// Async client for the favorites, play-info and detail endpoints.
#[derive(Debug)]
pub struct XiamiClient {
    http: Client,
    base_url: Url,
    session: Session,
    user_id: i64,
    page_size: u32,
    pacer: RequestPacer,
}

impl XiamiClient {
    /// Build a client from the loaded configuration.
    ///
    /// # Errors
    /// Returns [`EtlError::MissingCookie`] when no session cookie is
    /// configured, [`EtlError::InvalidUrl`] for a malformed base URL, or a
    /// request error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> EtlResult<Self> {
        let cookie = config
            .cookie
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| EtlError::MissingCookie {
                name: SIGNING_COOKIE.to_string(),
            })?;
        let base_url = Url::parse(&config.base_url).map_err(|e| EtlError::InvalidUrl {
            url: config.base_url.clone(),
            message: e.to_string(),
        })?;

        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url,
            session: Session::from_cookie_header(cookie),
            user_id: config.user_id,
            page_size: config.page_size,
            pacer: RequestPacer::new(config.request_interval()),
        })
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Resolve an absolute, scheme-relative or site-relative URL.
    pub fn resolve_url(&self, url: &str) -> EtlResult<Url> {
        self.base_url.join(url).map_err(|e| EtlError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Issue one signed call and return `result.data` (`None` when it is
    /// null or absent).
    async fn call<Q: Serialize>(&self, path: &str, payload: &Q) -> EtlResult<Option<Value>> {
        let q = canonical_json(payload)?;
        let s = self.session.sign(path, Some(&q))?;
        let url = self.resolve_url(path)?;

        self.pacer.wait().await;
        log::debug!("GET {url} _q={q}");
        let response = self
            .http
            .get(url)
            .query(&[("_q", q.as_str()), ("_s", s.as_str())])
            .header(COOKIE, self.session.cookie_header())
            .send()
            .await?;
        let body = response.text().await?;
        log::debug!("response from {path}: {body}");

        let envelope = parse_envelope(path, &body)?;
        let result = envelope
            .get("result")
            .filter(|r| r.is_object())
            .ok_or_else(|| EtlError::Envelope {
                path: path.to_string(),
                body: body.clone(),
            })?;
        Ok(result.get("data").filter(|d| !d.is_null()).cloned())
    }

    /// Fetch one page of a favorites category.
    ///
    /// An empty result (null, absent or `[]`) marks the end of pagination.
    ///
    /// # Errors
    /// Fails on transport errors, a rejected session, or a malformed
    /// envelope; the error carries the raw body.
    pub async fn get_favorites(&self, category: FavCategory, page: u32) -> EtlResult<Vec<Value>> {
        log::info!("fetching {category} page {page}");
        let paging = Paging {
            page,
            page_size: self.page_size,
        };
        let data = match category {
            FavCategory::MyPlaylists => {
                let q = MyPlaylistsQuery {
                    user_id: self.user_id,
                    kind: category.type_code(),
                    paging,
                    include_system_create: 1,
                    sort: 0,
                };
                self.call(category.path(), &q).await?
            }
            _ => {
                let q = PageQuery {
                    user_id: self.user_id,
                    kind: category.type_code(),
                    paging,
                };
                self.call(category.path(), &q).await?
            }
        };

        match data.and_then(|d| take_key(d, category.data_key())) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(EtlError::Envelope {
                path: category.path().to_string(),
                body: other.to_string(),
            }),
        }
    }

    /// Fetch play info for a batch of songs.
    pub async fn get_play_info(&self, song_ids: &[i64]) -> EtlResult<Vec<SongPlayInfo>> {
        log::info!("fetching play info for {song_ids:?}");
        let data = self
            .call(PLAY_INFO_PATH, &PlayInfoQuery { song_ids })
            .await?;
        match data.and_then(|d| take_key(d, "songPlayInfos")) {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(infos) => Ok(serde_json::from_value(infos)?),
        }
    }

    /// Fetch the detail document of an album, including its songs.
    pub async fn get_album_detail(&self, album_id: i64) -> EtlResult<Value> {
        log::info!("fetching album detail {album_id}");
        let data = self
            .call(ALBUM_DETAIL_PATH, &AlbumQuery { album_id })
            .await?;
        data.and_then(|d| take_key(d, "albumDetail"))
            .filter(Value::is_object)
            .ok_or_else(|| EtlError::Envelope {
                path: ALBUM_DETAIL_PATH.to_string(),
                body: format!("no albumDetail for album {album_id}"),
            })
    }

    /// Fetch the detail document of a playlist.
    ///
    /// The first, signed call returns the URL of a static document; that
    /// document is fetched with a plain GET since it lives on another host.
    pub async fn get_playlist_detail(&self, list_id: i64) -> EtlResult<Value> {
        log::info!("fetching playlist detail {list_id}");
        let data = self
            .call(COLLECT_STATIC_URL_PATH, &ListQuery { list_id })
            .await?;
        let static_url = data
            .as_ref()
            .and_then(|d| d.pointer("/data/data/url"))
            .and_then(Value::as_str)
            .ok_or_else(|| EtlError::Envelope {
                path: COLLECT_STATIC_URL_PATH.to_string(),
                body: data.as_ref().map(Value::to_string).unwrap_or_default(),
            })?;
        let url = self.resolve_url(static_url)?;

        self.pacer.wait().await;
        log::debug!("GET {url}");
        let body = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let document: Value = serde_json::from_str(&body).map_err(|_| EtlError::Envelope {
            path: url.to_string(),
            body: body.clone(),
        })?;
        match take_key(document, "resultObj") {
            Some(obj) if obj.is_object() => Ok(obj),
            _ => Err(EtlError::Envelope {
                path: url.to_string(),
                body,
            }),
        }
    }

    /// Issue one cheap signed request to verify the session is accepted.
    pub async fn check_session(&self) -> EtlResult<()> {
        self.get_favorites(FavCategory::Songs, 1).await.map(|_| ())
    }

    /// Stream `url` into `dest`, replacing it only once every byte arrived.
    pub async fn download_to(&self, url: &str, dest: &Path) -> EtlResult<u64> {
        let url = self.resolve_url(url)?;
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        log::debug!("downloading {url} to {}", dest.display());
        let mut response = self.http.get(url).send().await?.error_for_status()?;
        let mut file = NamedTempFile::new_in(dir)?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        file.flush()?;
        file.persist(dest).map_err(|e| EtlError::Io(e.error))?;
        Ok(written)
    }
}

fn take_key(value: Value, key: &str) -> Option<Value> {
    match value {
        Value::Object(mut map) => map.remove(key),
        _ => None,
    }
}

/// Decode a response body and check its `code`.
fn parse_envelope(path: &str, body: &str) -> EtlResult<Value> {
    let envelope: Value = serde_json::from_str(body).map_err(|_| EtlError::Envelope {
        path: path.to_string(),
        body: body.to_string(),
    })?;
    let code = envelope
        .get("code")
        .and_then(Value::as_str)
        .ok_or_else(|| EtlError::Envelope {
            path: path.to_string(),
            body: body.to_string(),
        })?;
    if code != SUCCESS {
        let msg = envelope
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(EtlError::Api {
            path: path.to_string(),
            code: code.to_string(),
            msg: msg.to_string(),
            body: body.to_string(),
        });
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use tempfile::TempDir;

    fn client(server: &mockito::Server, dir: &Path) -> XiamiClient {
        XiamiClient::new(&Config::for_testing(dir, &server.url())).unwrap()
    }

    #[test]
    fn test_missing_cookie_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::for_testing(dir.path(), "http://localhost");
        config.cookie = None;
        let err = XiamiClient::new(&config).unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_parse_envelope_error_code() {
        let err = parse_envelope("/x", r#"{"code":"SG_TOKEN_EXPIRED","msg":"expired"}"#)
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_parse_envelope_not_json() {
        let err = parse_envelope("/x", "<html>login</html>").unwrap_err();
        assert!(matches!(err, EtlError::Envelope { ref body, .. } if body.contains("login")));
    }

    #[tokio::test]
    async fn test_get_favorites_sends_signed_query() {
        let mut server = mockito::Server::new_async().await;
        let q = r#"{"userId":1,"type":1,"pagingVO":{"page":2,"pageSize":30}}"#;
        let mock = server
            .mock("GET", "/api/favorite/getFavorites")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("_q".into(), q.into()),
                Matcher::UrlEncoded("_s".into(), "adeea5056559e987c90cf15bd7c32f4c".into()),
            ]))
            .match_header("cookie", Matcher::Regex("xm_sg_tk=".into()))
            .with_body(
                json!({"code": "SUCCESS", "result": {"data": {"songs": [{"songId": 5}]}}})
                    .to_string(),
            )
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let songs = client(&server, dir.path())
            .get_favorites(FavCategory::Songs, 2)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(songs, vec![json!({"songId": 5})]);
    }

    #[tokio::test]
    async fn test_get_favorites_null_page_is_end() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/favorite/getFavorites")
            .match_query(Matcher::Any)
            .with_body(r#"{"code":"SUCCESS","result":{"data":{"albums":null}}}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let albums = client(&server, dir.path())
            .get_favorites(FavCategory::Albums, 9)
            .await
            .unwrap();
        assert!(albums.is_empty());
    }

    #[tokio::test]
    async fn test_my_playlists_payload() {
        let mut server = mockito::Server::new_async().await;
        let q = r#"{"userId":1,"type":0,"pagingVO":{"page":1,"pageSize":30},"includeSystemCreate":1,"sort":0}"#;
        let mock = server
            .mock("GET", "/api/collect/getCollectByUser")
            .match_query(Matcher::UrlEncoded("_q".into(), q.into()))
            .with_body(r#"{"code":"SUCCESS","result":{"data":{"collects":[{"listId":3}]}}}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let lists = client(&server, dir.path())
            .get_favorites(FavCategory::MyPlaylists, 1)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(lists.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_result_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/favorite/getFavorites")
            .match_query(Matcher::Any)
            .with_body(r#"{"code":"SUCCESS","unexpected":true}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let err = client(&server, dir.path())
            .get_favorites(FavCategory::Songs, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Envelope { ref body, .. } if body.contains("unexpected")));
    }

    #[tokio::test]
    async fn test_get_play_info() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", PLAY_INFO_PATH)
            .match_query(Matcher::UrlEncoded("_q".into(), r#"{"songIds":[1,2]}"#.into()))
            .with_body(
                json!({"code": "SUCCESS", "result": {"data": {"songPlayInfos": [
                    {"songId": 1, "playInfos": [
                        {"listenFile": "http://a/1.mp3", "fileSize": 10, "format": "mp3"},
                        {"listenFile": null, "fileSize": 0, "format": "m4a"}
                    ]},
                    {"songId": 2}
                ]}}})
                .to_string(),
            )
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let infos = client(&server, dir.path())
            .get_play_info(&[1, 2])
            .await
            .unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].play_infos[0].file_size, Some(10));
        assert_eq!(infos[0].play_infos[1].listen_file, None);
        assert!(infos[1].play_infos.is_empty());
    }

    #[tokio::test]
    async fn test_get_playlist_detail_two_steps() {
        let mut server = mockito::Server::new_async().await;
        let static_url = format!("{}/static/list-7.json", server.url());
        server
            .mock("GET", COLLECT_STATIC_URL_PATH)
            .match_query(Matcher::UrlEncoded("_q".into(), r#"{"listId":7}"#.into()))
            .with_body(
                json!({"code": "SUCCESS", "result": {"data": {"data": {"data": {"url": static_url}}}}})
                    .to_string(),
            )
            .create_async()
            .await;
        let document = server
            .mock("GET", "/static/list-7.json")
            .match_query(Matcher::Any)
            .with_body(json!({"resultObj": {"listId": 7, "songs": [{"songId": 1}]}}).to_string())
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let detail = client(&server, dir.path())
            .get_playlist_detail(7)
            .await
            .unwrap();
        document.assert_async().await;
        assert_eq!(detail["listId"], 7);
        assert_eq!(detail["songs"][0]["songId"], 1);
    }

    #[tokio::test]
    async fn test_download_to_writes_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/audio/1.mp3")
            .match_query(Matcher::Any)
            .with_body("ID3 bytes")
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("music").join("1-1.mp3");
        let written = client(&server, dir.path())
            .download_to(&format!("{}/audio/1.mp3?auth=x", server.url()), &dest)
            .await
            .unwrap();
        assert_eq!(written, 9);
        assert_eq!(std::fs::read_to_string(dest).unwrap(), "ID3 bytes");
    }

    #[tokio::test]
    async fn test_download_to_http_error_leaves_no_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/audio/404.mp3")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("404.mp3");
        let result = client(&server, dir.path())
            .download_to("/audio/404.mp3", &dest)
            .await;
        assert!(result.is_err());
        assert!(!dest.exists());
    }
}
