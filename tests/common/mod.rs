//! In-process fixture server standing in for song.link, the Deezer gateway, the media
//! endpoint, the CDN and a cover image host.
//!
//! Bound to `127.0.0.1:0` and served by axum on the test runtime. Every response is
//! driven by a [`FixtureConfig`] so tests can switch individual endpoints into failure
//! modes.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use blowfish::Blowfish;
use bytes::Bytes;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tunefetch::crypto::{self, Key, CHUNK_SIZE};
use tunefetch::{DeezerCredentials, DeezerDownloader, DeezerEndpoints};

pub const ARL: &str = "fixture-arl-cookie";
pub const SECRET: &str = "fixture-secret-16";
pub const TRACK_ID: &str = "3135556";
pub const DEEZER_URL: &str = "https://www.deezer.com/track/3135556";
pub const SPOTIFY_URL: &str = "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC";

const API_TOKEN: &str = "fixture-api-token";
const LICENSE_TOKEN: &str = "fixture-license-token";
const TRACK_TOKEN: &str = "fixture-track-token";

/// Bytes served as the cover image.
pub const COVER_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfixture-cover";

/// Per-test behaviour of the fixture endpoints.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    /// `USER_ID` returned for a valid cookie.
    pub user_id: u64,
    /// Per-track media error message.
    pub media_error: Option<String>,
    /// Top-level media error message.
    pub media_top_error: Option<String>,
    /// Status of the media stream.
    pub media_status: StatusCode,
    /// Media source URL handed out instead of the fixture's own stream.
    pub media_source: Option<String>,
    /// Send the first chunk, then never finish the body.
    pub media_hangs: bool,
    /// Status of the cover endpoint.
    pub cover_status: StatusCode,
    /// `Content-Type` of the cover, if any.
    pub cover_content_type: Option<&'static str>,
    /// Status of the links endpoint.
    pub links_status: StatusCode,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            user_id: 4242,
            media_error: None,
            media_top_error: None,
            media_status: StatusCode::OK,
            media_source: None,
            media_hangs: false,
            cover_status: StatusCode::OK,
            cover_content_type: Some("image/png"),
            links_status: StatusCode::OK,
        }
    }
}

struct Inner {
    base_url: String,
    config: FixtureConfig,
    encrypted: Vec<u8>,
    requests: Mutex<Vec<String>>,
}

#[derive(Clone)]
struct AppState(Arc<Inner>);

impl AppState {
    fn record(&self, what: impl Into<String>) {
        self.0.requests.lock().unwrap().push(what.into());
    }
}

/// A running fixture server.
pub struct Fixture {
    pub base_url: String,
    state: AppState,
}

impl Fixture {
    pub async fn start(config: FixtureConfig) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")
            .expect("failed to bind local fixture server");
        listener
            .set_nonblocking(true)
            .expect("failed to set nonblocking on fixture listener");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let state = AppState(Arc::new(Inner {
            base_url: base_url.clone(),
            config,
            encrypted: encrypt_stream(&plain_audio(), TRACK_ID),
            requests: Mutex::new(Vec::new()),
        }));

        let app = Router::new()
            .route("/v1-alpha.1/links", get(links))
            .route("/ajax/gw-light.php", get(user_data).post(page_track))
            .route("/v1/get_url", axum::routing::post(media_url))
            .route("/media/track", get(media_stream))
            .route("/cover", get(cover))
            .with_state(state.clone());

        tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener)
                .expect("failed to convert fixture listener to tokio listener");
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, state }
    }

    pub fn endpoints(&self) -> DeezerEndpoints {
        DeezerEndpoints {
            gateway: format!("{}/ajax/gw-light.php", self.base_url),
            media: format!("{}/v1/get_url", self.base_url),
        }
    }

    pub fn cover_url(&self) -> String {
        format!("{}/cover", self.base_url)
    }

    pub fn downloader(&self) -> DeezerDownloader {
        self.downloader_with_arl(ARL)
    }

    pub fn downloader_with_arl(&self, arl: &str) -> DeezerDownloader {
        DeezerDownloader::new(DeezerCredentials {
            arl: arl.to_string(),
            secret: SECRET.to_string(),
        })
        .unwrap()
        .with_endpoints(self.endpoints())
    }

    /// Endpoints hit so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.0.requests.lock().unwrap().clone()
    }
}

/// Six full chunks and a 500-byte tail, with content that differs per position.
pub fn plain_audio() -> Vec<u8> {
    (0..6 * CHUNK_SIZE + 500)
        .map(|i| ((i * 7 + i / CHUNK_SIZE) % 251) as u8)
        .collect()
}

/// Encrypt the way the CDN serves it: Blowfish CBC on every third full chunk.
pub fn encrypt_stream(plain: &[u8], song_id: &str) -> Vec<u8> {
    let secret: Key = crypto::secret_from_bytes(SECRET.as_bytes()).unwrap();
    let key = crypto::calc_blowfish_key(&secret, song_id);
    let cipher: Blowfish<byteorder::BE> = Blowfish::new_from_slice(&key).unwrap();

    let mut out = plain.to_vec();
    for (index, chunk) in out.chunks_mut(CHUNK_SIZE).enumerate() {
        if index % 3 != 0 || chunk.len() != CHUNK_SIZE {
            continue;
        }
        let mut prev = [0u8, 1, 2, 3, 4, 5, 6, 7];
        for block in chunk.chunks_exact_mut(8) {
            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= p;
            }
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
            prev.copy_from_slice(block);
        }
    }
    out
}

async fn links(State(state): State<AppState>, Query(q): Query<HashMap<String, String>>) -> Response {
    state.record(format!("links {}", q.get("url").cloned().unwrap_or_default()));
    let cfg = &state.0.config;
    if cfg.links_status != StatusCode::OK {
        return (cfg.links_status, "upstream failure").into_response();
    }
    if q.get("userCountry").map(String::as_str) != Some("US")
        || q.get("songIfSingle").map(String::as_str) != Some("true")
    {
        return (StatusCode::BAD_REQUEST, "missing parameters").into_response();
    }

    Json(json!({
        "entityUniqueId": "SPOTIFY_SONG::4uLU6hMCjMI75M1A2tKUQC",
        "userCountry": "US",
        "linksByPlatform": {
            "spotify": {
                "entityUniqueId": "SPOTIFY_SONG::4uLU6hMCjMI75M1A2tKUQC",
                "url": SPOTIFY_URL
            },
            "deezer": {
                "entityUniqueId": "DEEZER_SONG::3135556",
                "url": DEEZER_URL
            },
            "amazonMusic": {
                "entityUniqueId": "AMAZON_SONG::B000",
                "url": ""
            }
        },
        "entitiesByUniqueId": {
            "DEEZER_SONG::3135556": {
                "title": "Harder, Better, Faster, Stronger",
                "artistName": "Daft Punk",
                "thumbnailUrl": format!("{}/cover", state.0.base_url)
            },
            "SPOTIFY_SONG::4uLU6hMCjMI75M1A2tKUQC": {
                "title": "Spotify Title",
                "artistName": "Spotify Artist"
            }
        }
    }))
    .into_response()
}

async fn user_data(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    state.record("getUserData");
    assert_eq!(q.get("method").map(String::as_str), Some("deezer.getUserData"));

    let has_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(';').any(|c| c.trim() == format!("arl={}", ARL)));
    let user_id = if has_cookie { state.0.config.user_id } else { 0 };

    Json(json!({
        "error": [],
        "results": {
            "USER": {
                "USER_ID": user_id,
                "OPTIONS": {"license_token": LICENSE_TOKEN}
            },
            "checkForm": API_TOKEN
        }
    }))
}

async fn page_track(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.record("pageTrack");
    assert_eq!(q.get("method").map(String::as_str), Some("deezer.pageTrack"));

    if q.get("api_token").map(String::as_str) != Some(API_TOKEN)
        || body["sng_id"] != json!(TRACK_ID)
    {
        return Json(json!({"error": {"DATA_ERROR": "song not found"}, "results": {}}));
    }

    Json(json!({
        "error": [],
        "results": {
            "DATA": {"SNG_ID": TRACK_ID, "TRACK_TOKEN": TRACK_TOKEN, "SNG_TITLE": "ignored"}
        }
    }))
}

async fn media_url(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("get_url");
    let cfg = &state.0.config;

    assert_eq!(body["license_token"], json!(LICENSE_TOKEN));
    assert_eq!(body["track_tokens"], json!([TRACK_TOKEN]));
    assert_eq!(body["media"][0]["type"], json!("FULL"));
    assert_eq!(body["media"][0]["formats"][0]["cipher"], json!("BF_CBC_STRIPE"));

    if let Some(msg) = &cfg.media_top_error {
        return Json(json!({"errors": [{"code": 1, "message": msg}]}));
    }
    if let Some(msg) = &cfg.media_error {
        return Json(json!({"data": [{"errors": [{"code": 2002, "message": msg}]}]}));
    }

    let source = cfg
        .media_source
        .clone()
        .unwrap_or_else(|| format!("{}/media/track", state.0.base_url));

    Json(json!({
        "data": [{
            "media": [{
                "media_type": "FULL",
                "cipher": {"type": "BF_CBC_STRIPE"},
                "format": body["media"][0]["formats"][0]["format"],
                "sources": [
                    {"url": source, "provider": "ak"},
                    {"url": format!("{}/media/unused", state.0.base_url), "provider": "ec"}
                ]
            }]
        }]
    }))
}

async fn media_stream(State(state): State<AppState>) -> Response {
    state.record("media");
    let cfg = &state.0.config;
    if cfg.media_status != StatusCode::OK {
        return (cfg.media_status, "denied").into_response();
    }

    let encrypted = state.0.encrypted.clone();
    if cfg.media_hangs {
        let first = Bytes::copy_from_slice(&encrypted[..CHUNK_SIZE]);
        let stream = futures_util::stream::iter(vec![Ok::<Bytes, std::io::Error>(first)])
            .chain(futures_util::stream::pending());
        return Body::from_stream(stream).into_response();
    }

    // Odd-sized pieces so chunk boundaries never line up with network reads.
    let pieces: Vec<Result<Bytes, std::io::Error>> = encrypted
        .chunks(1500)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Body::from_stream(futures_util::stream::iter(pieces)).into_response()
}

async fn cover(State(state): State<AppState>) -> Response {
    state.record("cover");
    let cfg = &state.0.config;
    if cfg.cover_status != StatusCode::OK {
        return (cfg.cover_status, "no cover").into_response();
    }

    let mut response = Response::new(Body::from(COVER_PNG));
    if let Some(content_type) = cfg.cover_content_type {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.parse().unwrap());
    }
    response
}

/// Raw HTTP server that announces `content_length` bytes but sends `body` and closes.
///
/// Returns the URL to request.
pub async fn lying_length_server(content_length: u64, body: &'static [u8]) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind raw server");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg\r\nContent-Length: {}\r\n\r\n",
                content_length
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}/media/track", addr)
}
