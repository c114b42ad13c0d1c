//! Deezer downloader: authenticated session, media URL resolution and streamed
//! stripe decryption.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::TrackDownloader;
use crate::api::gateway::{DeezerEndpoints, DeezerSession, DownloadQuality, Song};
use crate::crypto::{self, Key, StripeDecryptor};
use crate::error::{FetchError, Result};
use crate::http;
use crate::models::Platform;

/// Upper bound for downloading one media stream.
const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Largest buffer reserved before the body arrives (64 MiB).
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

/// Credentials for the Deezer gateway.
#[derive(Clone)]
pub struct DeezerCredentials {
    /// Long-lived `arl` session cookie.
    pub arl: String,
    /// Shared secret used for key derivation (at least 16 bytes).
    pub secret: String,
}

impl fmt::Debug for DeezerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeezerCredentials")
            .field("arl", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Downloads and decrypts tracks from Deezer.
///
/// Each [`fetch`](TrackDownloader::fetch) call authenticates a fresh
/// [`DeezerSession`]; no session state outlives the call.
#[derive(Debug, Clone)]
pub struct DeezerDownloader {
    arl: String,
    secret: Key,
    endpoints: DeezerEndpoints,
    quality: DownloadQuality,
}

impl DeezerDownloader {
    /// Create a downloader against the production endpoints.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the ARL is empty or the secret is shorter than 16 bytes.
    pub fn new(credentials: DeezerCredentials) -> Result<Self> {
        if credentials.arl.trim().is_empty() {
            return Err(FetchError::Config("ARL cookie is empty".to_string()));
        }

        Ok(Self {
            arl: credentials.arl,
            secret: crypto::secret_from_bytes(credentials.secret.as_bytes())?,
            endpoints: DeezerEndpoints::default(),
            quality: DownloadQuality::default(),
        })
    }

    /// Use different gateway/media endpoints.
    pub fn with_endpoints(mut self, endpoints: DeezerEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Request a different quality tier.
    pub fn with_quality(mut self, quality: DownloadQuality) -> Self {
        self.quality = quality;
        self
    }

    /// Stream the media URL through the stripe decryptor.
    async fn download_stream(
        &self,
        session: &DeezerSession,
        media_url: &str,
        song: &Song,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let key = crypto::calc_blowfish_key(&self.secret, &song.id);
        let mut decryptor = StripeDecryptor::new(&key)?;

        let request = session.client().get(media_url).timeout(STREAM_TIMEOUT);
        let response = http::cancellable(cancel, async {
            Ok::<_, FetchError>(http::ensure_success(request.send().await?)?)
        })
        .await?;

        let mut output = Vec::with_capacity(initial_capacity(response.content_length()));
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(
                        "Download of song {} cancelled after {} chunks",
                        song.id,
                        decryptor.chunks_processed()
                    );
                    return Err(FetchError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => decryptor.update(&bytes, &mut output),
                Some(Err(e)) => return Err(FetchError::Request(e)),
                None => break,
            }
        }

        decryptor.finish(&mut output);
        Ok(output)
    }
}

#[async_trait]
impl TrackDownloader for DeezerDownloader {
    fn platform(&self) -> Platform {
        Platform::Deezer
    }

    fn can_handle(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
            .is_some_and(|host| host == "deezer.com" || host.ends_with(".deezer.com"))
    }

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let track_id = extract_track_id(url);
        if track_id.is_empty() {
            return Err(FetchError::InvalidInput(format!(
                "could not extract track ID from {}",
                url
            )));
        }

        let session = DeezerSession::authenticate(&self.endpoints, &self.arl, cancel).await?;
        let song = session.page_track(track_id, cancel).await?;
        let media_url = session.media_url(&song, self.quality, cancel).await?;

        let audio = self
            .download_stream(&session, &media_url, &song, cancel)
            .await?;

        info!(
            "Downloaded Deezer track {} ({} bytes, {})",
            song.id,
            audio.len(),
            self.quality.format()
        );

        Ok(audio)
    }
}

/// Buffer size to reserve up front. `Content-Length` is only a hint from the server.
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length
        .unwrap_or(0)
        .min(MAX_PREALLOCATION as u64) as usize
}

/// Maximal run of ASCII digits at the end of `url`; empty if it does not end in a digit.
pub fn extract_track_id(url: &str) -> &str {
    // Digits are single bytes, so the index after a non-digit byte is a char boundary.
    let start = url
        .bytes()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    &url[start..]
}
