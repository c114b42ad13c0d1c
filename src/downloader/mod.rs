//! Per-platform downloaders and the fallback orchestrator.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FetchError, Result};
use crate::models::{Platform, TrackData, TrackInfo};

pub mod deezer;

pub use deezer::{DeezerCredentials, DeezerDownloader};

/// Fetches raw audio bytes from one platform.
#[async_trait]
pub trait TrackDownloader: Send + Sync {
    /// Platform this downloader serves.
    fn platform(&self) -> Platform;

    /// Whether `url` is a link this downloader understands.
    fn can_handle(&self, url: &str) -> bool;

    /// Download the audio behind `url`.
    ///
    /// Must return [`FetchError::Cancelled`] promptly once `cancel` fires.
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// Registry of downloaders that tries platforms in fallback order.
///
/// Populate it with [`register`](Self::register) at startup; afterwards it is only read
/// and can be shared between concurrent requests behind an `Arc`.
#[derive(Default)]
pub struct DownloadManager {
    downloaders: HashMap<Platform, Box<dyn TrackDownloader>>,
}

impl DownloadManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a downloader, replacing any previous one for the same platform.
    pub fn register<D: TrackDownloader + 'static>(&mut self, downloader: D) {
        self.downloaders
            .insert(downloader.platform(), Box::new(downloader));
    }

    /// Platforms with a registered downloader.
    pub fn platforms(&self) -> impl Iterator<Item = &Platform> {
        self.downloaders.keys()
    }

    /// Download a resolved track.
    ///
    /// Tries the chosen platform first, then every other entry of
    /// `available_platforms` in order. The first success wins; failures are logged and
    /// skipped. Cancellation stops the pass immediately.
    ///
    /// # Errors
    ///
    /// * `Cancelled` if `cancel` fires
    /// * `AllPlatformsFailed` carrying the last underlying error otherwise
    pub async fn download(
        &self,
        track: &TrackInfo,
        cancel: &CancellationToken,
    ) -> Result<TrackData> {
        let candidates = std::iter::once((&track.platform, track.url.as_str())).chain(
            track
                .available_platforms
                .iter()
                .filter(|link| link.platform != track.platform)
                .map(|link| (&link.platform, link.url.as_str())),
        );

        let mut attempts = 0;
        let mut last_error = None;

        for (platform, url) in candidates {
            let Some(downloader) = self.downloaders.get(platform) else {
                debug!("No downloader registered for {}", platform);
                continue;
            };

            if !downloader.can_handle(url) {
                debug!("{} downloader cannot handle {}", platform, url);
                continue;
            }

            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            attempts += 1;
            match downloader.fetch(url, cancel).await {
                Ok(audio) => {
                    info!("Downloaded {} bytes from {}", audio.len(), platform);
                    return Ok(TrackData::from_info(track, platform.clone(), audio));
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    warn!("Failed to download from {}: {}", platform, e);
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| {
            FetchError::Unsupported(format!(
                "no registered downloader for any of {} platforms",
                track.available_platforms.len()
            ))
        });

        Err(FetchError::AllPlatformsFailed {
            attempts,
            last: Box::new(last),
        })
    }
}
