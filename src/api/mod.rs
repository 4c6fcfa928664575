//! Client for the NetEase Cloud Music web API.
//!
//! Encrypted endpoints live under `{base_url}/weapi` and take an
//! [`Envelope`](crate::envelope::Envelope) as form body. The legacy song
//! detail endpoint is a plain GET.

pub mod model;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{DEFAULT_API_TIMEOUT_SECS, DownloadConfig};
use crate::envelope::EnvelopeCodec;
use crate::error::{Error, Result};

use model::{
    Album, AlbumRequest, AlbumResponse, Playlist, PlaylistRequest, PlaylistResponse,
    SongDetailResponse, SongUrlRequest, SongUrlResponse, Track,
};

/// Desktop browser user agent; the service rejects obvious bots.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Maximum number of tracks requested for a playlist.
const PLAYLIST_TRACK_LIMIT: u32 = 1000;

const REJECTION_MESSAGE: &str = "song requires payment or the id is invalid";

/// Builds the HTTP client shared by the API client and the downloader.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn build_http_client(config: &DownloadConfig) -> reqwest::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout())
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Shape shared by every JSON answer: a status code next to the payload.
#[derive(serde::Deserialize)]
struct Status {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

/// Typed access to the service's endpoints.
#[derive(Debug, Clone)]
pub struct NeteaseClient {
    http: reqwest::Client,
    base_url: String,
    codec: EnvelopeCodec,
    timeout: Duration,
}

impl NeteaseClient {
    /// Creates a client for the service at `base_url` (no trailing slash needed).
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &str, codec: EnvelopeCodec) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            codec,
            timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        }
    }

    /// Sets the deadline for each API call, covering the request and the
    /// whole answer body.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Service origin.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts `payload` as an encrypted envelope to `/weapi{path}` and decodes
    /// the JSON answer.
    ///
    /// # Errors
    ///
    /// Returns codec errors, [`Error::Http`] on network failure,
    /// [`Error::Timeout`] if the call outlives its deadline, and
    /// [`Error::Decode`] on a non-success status, a service error code, or a
    /// body that does not match `R`.
    pub async fn weapi<P, R>(&self, path: &str, payload: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let sealed = self.codec.encrypt(payload)?;
        let url = format!("{}/weapi{path}", self.base_url);
        log::debug!("POST {url}");

        let response = self
            .http
            .post(&url)
            .header(ORIGIN, &self.base_url)
            .header(REFERER, &self.base_url)
            .form(&sealed.envelope)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        decode(&url, response)
            .await
            .map_err(|e| self.body_error(&url, e))
    }

    /// Resolves the playable URL of one track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteRejection`] when the service gives no URL
    /// (paywalled or unknown track) or answers with an error code.
    pub async fn song_url(&self, id: u64, bitrate: u32) -> Result<String> {
        let payload = SongUrlRequest {
            ids: vec![id],
            br: bitrate,
            csrf_token: String::new(),
        };
        let response: SongUrlResponse = self
            .weapi("/song/enhance/player/url?csrf_token=", &payload)
            .await
            .map_err(|e| match e {
                Error::Decode(message) => Error::RemoteRejection { id, message },
                other => other,
            })?;

        response
            .data
            .into_iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::RemoteRejection {
                id,
                message: REJECTION_MESSAGE.to_string(),
            })
    }

    /// Fetches metadata for one track from the legacy detail endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the service does not know the id.
    pub async fn song_detail(&self, id: u64) -> Result<Track> {
        let url = format!("{}/api/song/detail/?id={id}&ids=%5B{id}%5D", self.base_url);
        log::debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .header(ORIGIN, &self.base_url)
            .header(REFERER, &self.base_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;
        let detail: SongDetailResponse = decode(&url, response)
            .await
            .map_err(|e| self.body_error(&url, e))?;

        detail
            .songs
            .into_iter()
            .find(|song| song.id == id)
            .map(|song| song.into_track(None))
            .ok_or_else(|| Error::Decode(format!("no song with id {id}")))
    }

    /// Fetches an album and its track list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the answer cannot be mapped.
    pub async fn album(&self, id: u64) -> Result<Album> {
        let response: AlbumResponse = self
            .weapi(&format!("/v1/album/{id}?csrf_token="), &AlbumRequest::default())
            .await?;
        Ok(response.into_album())
    }

    /// Fetches a playlist and up to 1000 of its tracks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the answer cannot be mapped.
    pub async fn playlist(&self, id: u64) -> Result<Playlist> {
        let payload = PlaylistRequest {
            id,
            n: PLAYLIST_TRACK_LIMIT,
            csrf_token: String::new(),
        };
        let response: PlaylistResponse = self
            .weapi("/v3/playlist/detail?csrf_token=", &payload)
            .await?;
        Ok(response.into_playlist(id))
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout {
                url: url.to_string(),
                after: self.timeout,
            }
        } else {
            Error::Http(e)
        }
    }

    /// The deadline also covers reading the answer body.
    fn body_error(&self, url: &str, e: Error) -> Error {
        match e {
            Error::Http(e) => self.request_error(url, e),
            other => other,
        }
    }
}

/// Checks status and service code, then deserializes the body.
async fn decode<R: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<R> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Decode(format!("HTTP {status} from {url}")));
    }
    let body = response.bytes().await?;

    let head: Status = serde_json::from_slice(&body)
        .map_err(|e| Error::Decode(format!("{url}: invalid JSON: {e}")))?;
    if let Some(code) = head.code
        && code != 200
    {
        return Err(Error::Decode(format!(
            "service answered code {code}: {}",
            head.message.or(head.msg).as_deref().unwrap_or("no message")
        )));
    }

    serde_json::from_slice(&body).map_err(|e| Error::Decode(format!("{url}: {e}")))
}
