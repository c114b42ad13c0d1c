//! Gateway API session for authenticated Deezer operations.
//!
//! A [`DeezerSession`] is built from an ARL cookie for exactly one download: it
//! authenticates against `deezer.getUserData`, looks up the track page and resolves the
//! media URL, and is dropped afterwards. Nothing is cached between requests.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{cookie::Jar, Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{FetchError, Result};
use crate::http;

/// Gateway API private endpoint.
pub const GATEWAY_URL: &str = "https://www.deezer.com/ajax/gw-light.php";

/// Media URL endpoint.
pub const MEDIA_URL: &str = "https://media.deezer.com/v1/get_url";

/// Cipher requested from the media endpoint.
const CIPHER: &str = "BF_CBC_STRIPE";

/// Timeout for each gateway and media API call.
const API_TIMEOUT: Duration = Duration::from_secs(20);

/// Endpoints used by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeezerEndpoints {
    /// Gateway (`gw-light.php`) URL.
    pub gateway: String,
    /// Media resolution (`get_url`) URL.
    pub media: String,
}

impl Default for DeezerEndpoints {
    fn default() -> Self {
        Self {
            gateway: GATEWAY_URL.to_string(),
            media: MEDIA_URL.to_string(),
        }
    }
}

/// Audio quality tier requested from the media endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadQuality {
    /// MP3 320 kbps (requires premium).
    Mp3_320,
    /// MP3 128 kbps (free accounts).
    #[default]
    Mp3_128,
}

impl DownloadQuality {
    /// Get the Deezer API format string.
    pub fn format(&self) -> &'static str {
        match self {
            DownloadQuality::Mp3_320 => "MP3_320",
            DownloadQuality::Mp3_128 => "MP3_128",
        }
    }
}

/// Server-assigned identifiers for one track, valid for the session that fetched them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Song {
    /// Numeric song id (used for key derivation).
    #[serde(rename = "SNG_ID", deserialize_with = "string_or_number")]
    pub id: String,
    /// Token for media URL requests.
    #[serde(rename = "TRACK_TOKEN")]
    pub track_token: String,
}

/// An authenticated, request-scoped gateway session.
#[derive(Debug)]
pub struct DeezerSession {
    client: Client,
    endpoints: DeezerEndpoints,
    api_token: String,
    license_token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    results: Option<T>,
    #[serde(default)]
    error: Value,
}

#[derive(Debug, Default, Deserialize)]
struct UserData {
    #[serde(rename = "checkForm", default)]
    check_form: String,
    #[serde(rename = "USER", default)]
    user: User,
}

#[derive(Debug, Default, Deserialize)]
struct User {
    #[serde(rename = "USER_ID", default, deserialize_with = "number_or_string")]
    id: u64,
    #[serde(rename = "OPTIONS", default)]
    options: UserOptions,
}

#[derive(Debug, Default, Deserialize)]
struct UserOptions {
    #[serde(default)]
    license_token: String,
}

#[derive(Debug, Deserialize)]
struct PageTrack {
    #[serde(rename = "DATA")]
    data: Option<Song>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaResponse {
    #[serde(default)]
    data: Vec<MediaEntry>,
    #[serde(default)]
    errors: Vec<ProviderError>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaEntry {
    #[serde(default)]
    media: Vec<Media>,
    #[serde(default)]
    errors: Vec<ProviderError>,
}

#[derive(Debug, Default, Deserialize)]
struct Media {
    #[serde(default)]
    sources: Vec<Source>,
}

#[derive(Debug, Default, Deserialize)]
struct Source {
    #[serde(default)]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
}

impl DeezerSession {
    /// Authenticate with an ARL cookie.
    ///
    /// # Errors
    ///
    /// Returns `Authentication` if the gateway reports `USER_ID == 0`.
    pub async fn authenticate(
        endpoints: &DeezerEndpoints,
        arl: &str,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let gateway = Url::parse(&endpoints.gateway)
            .map_err(|e| FetchError::Config(format!("Invalid gateway URL: {}", e)))?;

        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(&format!("arl={}; Path=/", arl), &gateway);

        let mut session = Self {
            client: http::client_with_cookies(jar)?,
            endpoints: endpoints.clone(),
            api_token: String::new(),
            license_token: String::new(),
        };

        let user_data: UserData = session
            .call_api(Method::GET, "deezer.getUserData", None, cancel)
            .await?
            .unwrap_or_default();

        if user_data.user.id == 0 {
            return Err(FetchError::Authentication(
                "ARL cookie is invalid or expired".to_string(),
            ));
        }

        session.api_token = user_data.check_form;
        session.license_token = user_data.user.options.license_token;

        info!(
            "Gateway session authenticated. User ID: {}, has license token: {}",
            user_data.user.id,
            !session.license_token.is_empty()
        );

        Ok(session)
    }

    /// Make a request to the Gateway API and decode its `results`.
    async fn call_api<T: DeserializeOwned>(
        &self,
        method: Method,
        api_method: &str,
        body: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Option<T>> {
        let params = [
            ("method", api_method),
            ("input", "3"),
            ("api_version", "1.0"),
            ("api_token", self.api_token.as_str()),
        ];

        let mut request = self
            .client
            .request(method, &self.endpoints.gateway)
            .query(&params)
            .timeout(API_TIMEOUT);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let text = http::cancellable(cancel, async {
            let response = http::ensure_success(request.send().await?)?;
            Ok::<_, FetchError>(response.text().await?)
        })
        .await?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                let preview: String = text.chars().take(500).collect();
                error!("Failed to parse gateway response for {}: {}", api_method, preview);
                return Err(FetchError::Parse(e));
            }
        };

        if envelope.results.is_none() && !is_empty_error(&envelope.error) {
            error!("Gateway API error: {}", envelope.error);
        }

        Ok(envelope.results)
    }

    /// Look up the song id and track token for a track id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the page has no track data.
    pub async fn page_track(&self, track_id: &str, cancel: &CancellationToken) -> Result<Song> {
        let page: Option<PageTrack> = self
            .call_api(
                Method::POST,
                "deezer.pageTrack",
                Some(json!({ "sng_id": track_id })),
                cancel,
            )
            .await?;

        let song = page
            .and_then(|p| p.data)
            .ok_or_else(|| FetchError::NotFound(format!("track {}", track_id)))?;

        debug!("Track {} has song id {}", track_id, song.id);
        Ok(song)
    }

    /// Resolve the media URL for a song.
    ///
    /// Top-level errors are checked before per-track errors; either is returned as
    /// `MediaResolution` carrying the provider's message.
    pub async fn media_url(
        &self,
        song: &Song,
        quality: DownloadQuality,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let body = json!({
            "license_token": self.license_token,
            "media": [
                {
                    "type": "FULL",
                    "formats": [
                        {
                            "cipher": CIPHER,
                            "format": quality.format()
                        }
                    ]
                }
            ],
            "track_tokens": [song.track_token]
        });

        let request = self
            .client
            .post(&self.endpoints.media)
            .json(&body)
            .timeout(API_TIMEOUT);

        let text = http::cancellable(cancel, async {
            let response = http::ensure_success(request.send().await?)?;
            Ok::<_, FetchError>(response.text().await?)
        })
        .await?;

        let response: MediaResponse = serde_json::from_str(&text)?;
        let url = first_source(response)?;

        debug!("Media URL resolved for song {}", song.id);
        Ok(url)
    }

    /// Client carrying this session's cookies.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

fn first_source(response: MediaResponse) -> Result<String> {
    if let Some(err) = response.errors.first() {
        return Err(FetchError::MediaResolution(err.message.clone()));
    }

    let entry = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::MediaResolution("No media data".to_string()))?;

    if let Some(err) = entry.errors.first() {
        return Err(FetchError::MediaResolution(err.message.clone()));
    }

    entry
        .media
        .into_iter()
        .next()
        .and_then(|m| m.sources.into_iter().next())
        .map(|s| s.url)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| FetchError::MediaResolution("No media source".to_string()))
}

fn is_empty_error(error: &Value) -> bool {
    match error {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Deezer sends ids as strings on some endpoints and numbers on others.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        Value::String(s) => Ok(s.parse().unwrap_or(0)),
        _ => Ok(0),
    }
}
