//! Link-aggregation client (song.link / Odesli).
//!
//! Turns any supported streaming URL into a [`TrackInfo`]: the track's metadata plus its
//! links on every platform the service knows about.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{FetchError, Result};
use crate::http;
use crate::models::{Platform, PlatformLink, TrackInfo};

/// Base URL for the song.link API.
const API_BASE_URL: &str = "https://api.song.link";

/// Path of the links endpoint.
const LINKS_PATH: &str = "/v1-alpha.1/links";

/// Region used for link lookups.
const DEFAULT_COUNTRY: &str = "US";

/// Request timeout for link resolution.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Decoded links response.
///
/// `linksByPlatform` is kept in a `BTreeMap` so that iteration order is the
/// lexicographic platform id order, independent of the response's key order.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub links_by_platform: BTreeMap<String, LinkRecord>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entities_by_unique_id: HashMap<String, Entity>,
}

/// One platform's link record.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub entity_unique_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

/// Metadata for one linked entity.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artist_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnail_url: String,
}

/// Platform resolver backed by the song.link API.
///
/// # Example
///
/// ```rust,no_run
/// use tokio_util::sync::CancellationToken;
/// use tunefetch::SongLinkApi;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let api = SongLinkApi::new()?;
///     let info = api
///         .resolve("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC", &CancellationToken::new())
///         .await?;
///     println!("{} - {} via {}", info.artist, info.title, info.platform);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SongLinkApi {
    client: Client,
    base_url: String,
    country: String,
}

impl SongLinkApi {
    /// Create a resolver against the public API.
    pub fn new() -> Result<Self> {
        Self::with_base_url(API_BASE_URL)
    }

    /// Create a resolver against a different host (e.g. a test fixture).
    pub fn with_base_url<S: Into<String>>(base_url: S) -> Result<Self> {
        Ok(Self {
            client: http::client(RESOLVE_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            country: DEFAULT_COUNTRY.to_string(),
        })
    }

    /// Change the region sent as `userCountry`.
    pub fn set_country<S: Into<String>>(&mut self, country: S) {
        self.country = country.into();
    }

    /// Resolve a raw streaming URL.
    ///
    /// # Errors
    ///
    /// * `Request` / `HttpStatus` on network failure or non-success status
    /// * `Parse` on a malformed body
    /// * `NotFound` when no platform has a usable link
    /// * `Cancelled` when `cancel` fires
    pub async fn resolve(&self, raw_url: &str, cancel: &CancellationToken) -> Result<TrackInfo> {
        let url = format!("{}{}", self.base_url, LINKS_PATH);
        debug!("Resolving {} via {}", raw_url, url);

        let request = self.client.get(&url).query(&[
            ("url", raw_url),
            ("userCountry", self.country.as_str()),
            ("songIfSingle", "true"),
        ]);

        let text = http::cancellable(cancel, async {
            let response = http::ensure_success(request.send().await?)?;
            Ok::<_, FetchError>(response.text().await?)
        })
        .await?;

        let body: LinksResponse = serde_json::from_str(&text)?;
        let info = select_track(body)?;

        info!(
            "Resolved '{} - {}' to {} ({} platforms available)",
            info.artist,
            info.title,
            info.platform,
            info.available_platforms.len()
        );

        Ok(info)
    }
}

/// Pick the download source and collect fallback candidates from a decoded response.
///
/// Candidates are ordered by [`Platform::PRIORITY`] first, then by platform id; the
/// chosen platform is the first candidate.
pub fn select_track(mut body: LinksResponse) -> Result<TrackInfo> {
    let mut available: Vec<(Platform, LinkRecord)> = std::mem::take(&mut body.links_by_platform)
        .into_iter()
        .filter(|(_, link)| !link.url.is_empty())
        .map(|(id, link)| (Platform::from(id), link))
        .collect();

    if available.is_empty() {
        return Err(FetchError::NotFound(
            "no platforms available for this track".to_string(),
        ));
    }

    // Stable sort keeps lexicographic order among non-priority platforms.
    available.sort_by_key(|(platform, _)| platform.priority().unwrap_or(usize::MAX));

    let (platform, chosen) = &available[0];
    let entity = body.entities_by_unique_id.remove(&chosen.entity_unique_id);

    let (title, artist, cover) = match entity {
        Some(entity) => (entity.title, entity.artist_name, entity.thumbnail_url),
        None => Default::default(),
    };

    Ok(TrackInfo {
        artist,
        title,
        cover,
        platform: platform.clone(),
        url: chosen.url.clone(),
        available_platforms: available
            .iter()
            .map(|(platform, link)| PlatformLink::new(platform.clone(), link.url.clone()))
            .collect(),
    })
}

/// The service sends `null` for fields it has no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
