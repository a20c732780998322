//! Request signing.
//!
//! Every API call carries `_q` (the compact JSON payload) and `_s`, the MD5
//! of `{token prefix}_xmMain_{path}_{_q}` where the token prefix is the part
//! of the `xm_sg_tk` cookie before its first `_`. The payload is serialized
//! in field declaration order, which must match what the site's own client
//! sends; reordering fields changes the signature.

use md5::{Digest, Md5};
use serde::Serialize;

use crate::error::{EtlError, EtlResult};

/// Cookie whose value signs API requests.
pub const SIGNING_COOKIE: &str = "xm_sg_tk";

/// Cookies captured from a logged-in browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    cookies: Vec<(String, String)>,
}

impl Session {
    /// Parse a raw `Cookie` header (`a=1; b=2`).
    #[must_use]
    pub fn from_cookie_header(header: &str) -> Self {
        let cookies = header
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self { cookies }
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The session re-serialized as a `Cookie` header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Compute the `_s` signature for `path` and an already-canonical
    /// payload (`None` signs an empty payload).
    ///
    /// # Errors
    /// Returns [`EtlError::MissingCookie`] when the session has no
    /// `xm_sg_tk`; the session is invalid and must be captured again.
    pub fn sign(&self, path: &str, canonical_payload: Option<&str>) -> EtlResult<String> {
        let token = self
            .cookie(SIGNING_COOKIE)
            .ok_or_else(|| EtlError::MissingCookie {
                name: SIGNING_COOKIE.to_string(),
            })?;
        let prefix = token.split('_').next().unwrap_or_default();

        let plain = format!(
            "{prefix}_xmMain_{path}_{}",
            canonical_payload.unwrap_or_default()
        );
        Ok(format!("{:x}", Md5::digest(plain.as_bytes())))
    }
}

/// Serialize a request payload as compact JSON, preserving field order.
pub fn canonical_json<T: Serialize + ?Sized>(payload: &T) -> EtlResult<String> {
    Ok(serde_json::to_string(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::from_cookie_header("xm_sg_tk=0123456789abcdef_1609856909772; xm_sg_tk.sig=abc; cna=x")
    }

    #[derive(Serialize)]
    struct PlayInfoQuery {
        #[serde(rename = "songIds")]
        song_ids: Vec<i64>,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Paging {
        page: u32,
        page_size: u32,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct FavoritesQuery {
        user_id: i64,
        #[serde(rename = "type")]
        kind: u32,
        #[serde(rename = "pagingVO")]
        paging: Paging,
    }

    #[test]
    fn test_cookie_parsing() {
        let session = session();
        assert_eq!(session.cookie("cna"), Some("x"));
        assert_eq!(session.cookie("xm_sg_tk.sig"), Some("abc"));
        assert_eq!(session.cookie("missing"), None);
        assert_eq!(
            session.cookie_header(),
            "xm_sg_tk=0123456789abcdef_1609856909772; xm_sg_tk.sig=abc; cna=x"
        );
    }

    #[test]
    fn test_sign_with_payload() {
        let q = canonical_json(&PlayInfoQuery {
            song_ids: vec![1, 2],
        })
        .unwrap();
        assert_eq!(q, r#"{"songIds":[1,2]}"#);

        let token = session().sign("/api/song/getPlayInfo", Some(&q)).unwrap();
        assert_eq!(token, "a9c9935d2d82f5e47abbd42cb9013cee");
    }

    #[test]
    fn test_sign_keeps_declaration_order() {
        let q = canonical_json(&FavoritesQuery {
            user_id: 1,
            kind: 1,
            paging: Paging {
                page: 2,
                page_size: 30,
            },
        })
        .unwrap();
        assert_eq!(
            q,
            r#"{"userId":1,"type":1,"pagingVO":{"page":2,"pageSize":30}}"#
        );

        let token = session()
            .sign("/api/favorite/getFavorites", Some(&q))
            .unwrap();
        assert_eq!(token, "adeea5056559e987c90cf15bd7c32f4c");
    }

    #[test]
    fn test_sign_without_payload() {
        let token = session()
            .sign("/api/collect/getCollectStaticUrl", None)
            .unwrap();
        assert_eq!(token, "0e776e2c6e6daf85747270cbcb286fd4");
    }

    #[test]
    fn test_sign_requires_cookie() {
        let session = Session::from_cookie_header("cna=x");
        let err = session.sign("/api/x", None).unwrap_err();
        assert!(err.is_auth_failure());
    }
}
