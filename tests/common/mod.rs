//! Mock NetEase service for integration tests.
//!
//! The service decrypts envelopes for real, so the client under test must use
//! [`test_codec`], whose modulus comes from a key pair we know the private half
//! of.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures::StreamExt;
use mustang_dl::{CodecParams, EnvelopeCodec, EphemeralKey};
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

const STATIC_KEY: &[u8; 16] = b"0CoJUm6Qyw8W8jud";
const IV: &[u8; 16] = b"0102030405060708";

/// Test key pair: n = (2^89 - 1)(2^127 - 1), e = 65537.
pub struct TestKey {
    pub modulus: BigUint,
    pub exponent: BigUint,
    pub private: BigUint,
}

impl TestKey {
    pub fn new() -> Self {
        let one = BigUint::from(1u32);
        let p = (BigUint::from(1u32) << 89usize) - &one;
        let q = (BigUint::from(1u32) << 127usize) - &one;
        let phi = (&p - &one) * (&q - &one);
        let exponent = BigUint::from(65_537u32);
        let private = exponent.modinv(&phi).expect("e is coprime to phi");
        Self {
            modulus: p * q,
            exponent,
            private,
        }
    }

    pub fn params(&self) -> CodecParams {
        CodecParams::new(
            *STATIC_KEY,
            *IV,
            self.modulus.clone(),
            self.exponent.clone(),
        )
    }

    /// Recovers the ephemeral key from an `encSecKey` field.
    pub fn recover(&self, enc_sec_key: &str) -> EphemeralKey {
        let c = BigUint::parse_bytes(enc_sec_key.as_bytes(), 16).expect("hex encSecKey");
        let mut bytes = c.modpow(&self.private, &self.modulus).to_bytes_be();
        bytes.reverse();
        let bytes: [u8; 16] = bytes.try_into().expect("16-byte key");
        EphemeralKey::from_bytes(bytes).expect("hex alphabet key")
    }
}

pub fn test_codec() -> EnvelopeCodec {
    EnvelopeCodec::new(TestKey::new().params())
}

/// A track the mock knows about.
#[derive(Clone)]
pub struct MockTrack {
    pub id: u64,
    pub name: String,
    pub audio: Vec<u8>,
}

impl MockTrack {
    pub fn new(id: u64, name: &str, size: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let audio = (0..size).map(|i| (i % 251) as u8).collect();
        Self {
            id,
            name: name.to_string(),
            audio,
        }
    }
}

#[derive(Clone)]
struct MockState {
    base_url: String,
    key: Arc<TestKey>,
    codec: EnvelopeCodec,
    tracks: Arc<HashMap<u64, MockTrack>>,
    order: Arc<Vec<u64>>,
    rejected: Arc<HashSet<u64>>,
    hanging: Arc<HashSet<u64>>,
    stalled: Arc<HashSet<u64>>,
}

#[derive(Deserialize)]
struct EnvelopeForm {
    params: String,
    #[serde(rename = "encSecKey")]
    enc_sec_key: String,
}

impl MockState {
    fn open(&self, form: &EnvelopeForm) -> Value {
        let secret = self.key.recover(&form.enc_sec_key);
        let json = self.codec.open(&form.params, &secret).expect("envelope opens");
        serde_json::from_str(&json).expect("payload is JSON")
    }

    fn song_json(&self, track: &MockTrack) -> Value {
        json!({
            "id": track.id,
            "name": track.name,
            "ar": [{ "id": 1, "name": "Mock Artist" }],
            "al": { "id": 500, "name": "Mock Album", "picUrl": "http://p.test/c.jpg" },
            "fee": 0,
            "privilege": { "st": 0 }
        })
    }
}

async fn echo(State(state): State<MockState>, Form(form): Form<EnvelopeForm>) -> Json<Value> {
    Json(json!({ "code": 200, "echo": state.open(&form) }))
}

async fn song_url(State(state): State<MockState>, Form(form): Form<EnvelopeForm>) -> Json<Value> {
    let payload = state.open(&form);
    assert_eq!(payload["csrf_token"], "");
    let ids = payload["ids"].as_array().expect("ids array");
    if ids
        .iter()
        .filter_map(Value::as_u64)
        .any(|id| state.stalled.contains(&id))
    {
        futures::future::pending::<()>().await;
    }
    let data: Vec<Value> = ids
        .iter()
        .map(|id| {
            let id = id.as_u64().expect("numeric id");
            let url = (state.tracks.contains_key(&id) && !state.rejected.contains(&id))
                .then(|| format!("{}/audio/{id}", state.base_url));
            json!({ "id": id, "url": url, "br": payload["br"] })
        })
        .collect();
    Json(json!({ "code": 200, "data": data }))
}

async fn album(
    State(state): State<MockState>,
    Path(id): Path<u64>,
    Form(form): Form<EnvelopeForm>,
) -> Json<Value> {
    assert_eq!(state.open(&form), json!({ "csrf_token": "" }));
    let songs: Vec<Value> = state
        .order
        .iter()
        .map(|tid| state.song_json(&state.tracks[tid]))
        .collect();
    Json(json!({
        "code": 200,
        "album": {
            "id": id,
            "name": "Mock Album",
            "picUrl": "http://p.test/c.jpg",
            "artist": { "id": 1, "name": "Mock Artist" }
        },
        "songs": songs
    }))
}

async fn playlist(State(state): State<MockState>, Form(form): Form<EnvelopeForm>) -> Json<Value> {
    let payload = state.open(&form);
    assert_eq!(payload["n"], 1000);
    let tracks: Vec<Value> = state
        .order
        .iter()
        .map(|tid| state.song_json(&state.tracks[tid]))
        .collect();
    let privileges: Vec<Value> = state.order.iter().map(|_| json!({ "st": 0 })).collect();
    Json(json!({
        "code": 200,
        "playlist": {
            "id": payload["id"],
            "name": "Mock Playlist",
            "creator": { "userId": 9, "nickname": "tester", "avatarUrl": null },
            "tracks": tracks
        },
        "privileges": privileges
    }))
}

#[derive(Deserialize)]
struct DetailQuery {
    id: u64,
}

async fn song_detail(State(state): State<MockState>, Query(q): Query<DetailQuery>) -> Json<Value> {
    if state.stalled.contains(&q.id) {
        futures::future::pending::<()>().await;
    }
    let songs: Vec<Value> = state
        .tracks
        .get(&q.id)
        .map(|t| {
            json!({
                "id": t.id,
                "name": t.name,
                "artists": [{ "id": 1, "name": "Mock Artist" }],
                "album": { "id": 500, "name": "Mock Album" },
                "fee": 0
            })
        })
        .into_iter()
        .collect();
    Json(json!({ "code": 200, "songs": songs }))
}

async fn audio(State(state): State<MockState>, Path(id): Path<u64>) -> Response {
    let Some(track) = state.tracks.get(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if state.hanging.contains(&id) {
        return hanging_body(track.audio.len()).into_response();
    }
    (
        [(header::CONTENT_TYPE, "audio/mpeg")],
        track.audio.clone(),
    )
        .into_response()
}

/// Sends headers and a first chunk, then never finishes.
fn hanging_body(advertised: usize) -> impl IntoResponse {
    let first = async { Ok::<_, std::io::Error>(Bytes::from_static(b"partial")) };
    let stream = futures::stream::once(first).chain(futures::stream::pending());
    (
        [(header::CONTENT_LENGTH, advertised.to_string())],
        Body::from_stream(stream),
    )
}

async fn hang() -> impl IntoResponse {
    hanging_body(1_000_000)
}

pub struct MockServer {
    pub url: String,
    #[allow(dead_code)]
    pub addr: SocketAddr,
}

#[derive(Default)]
pub struct MockBuilder {
    tracks: Vec<MockTrack>,
    rejected: HashSet<u64>,
    hanging: HashSet<u64>,
    stalled: HashSet<u64>,
}

impl MockBuilder {
    pub fn track(mut self, track: MockTrack) -> Self {
        self.tracks.push(track);
        self
    }

    #[allow(dead_code)]
    pub fn reject(mut self, id: u64) -> Self {
        self.rejected.insert(id);
        self
    }

    #[allow(dead_code)]
    pub fn hang(mut self, id: u64) -> Self {
        self.hanging.insert(id);
        self
    }

    /// The song-URL and song-detail endpoints never answer for this track.
    #[allow(dead_code)]
    pub fn stall(mut self, id: u64) -> Self {
        self.stalled.insert(id);
        self
    }

    pub async fn start(self) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let key = TestKey::new();
        let codec = EnvelopeCodec::new(key.params());
        let order = self.tracks.iter().map(|t| t.id).collect();
        let state = MockState {
            base_url: base_url.clone(),
            key: Arc::new(key),
            codec,
            tracks: Arc::new(self.tracks.into_iter().map(|t| (t.id, t)).collect()),
            order: Arc::new(order),
            rejected: Arc::new(self.rejected),
            hanging: Arc::new(self.hanging),
            stalled: Arc::new(self.stalled),
        };

        let app = Router::new()
            .route("/weapi/echo", post(echo))
            .route("/weapi/song/enhance/player/url", post(song_url))
            .route("/weapi/v1/album/{id}", post(album))
            .route("/weapi/v3/playlist/detail", post(playlist))
            .route("/api/song/detail/", get(song_detail))
            .route("/audio/{id}", get(audio))
            .route("/hang", get(hang))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockServer { url: base_url, addr }
    }
}

/// Accepts connections and never writes a byte, so requests stall before
/// any response header. Returns the base URL.
#[allow(dead_code)]
pub async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}")
}
