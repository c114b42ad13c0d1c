//! Audio metadata tagging.
//!
//! Prepends an ID3v2.3 tag (title, artist, album and an optional front cover) to raw
//! MP3 bytes. The input is never parsed; a new tag block is always prepended.
//!
//! A cover that cannot be fetched or framed never fails the embedding: it is reported
//! as a [`TagWarning`] and the tag is written without a picture.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{FetchError, Result};
use crate::http;

pub mod id3v2;

use id3v2::Frame;

/// Timeout for fetching cover art.
const COVER_TIMEOUT: Duration = Duration::from_secs(10);

/// MIME type used when the cover response has no `Content-Type`.
const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Metadata to embed in audio files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// Track title.
    pub title: Option<String>,
    /// Track artist(s).
    pub artist: Option<String>,
    /// Album title.
    pub album: Option<String>,
    /// URL of the cover image.
    pub cover_url: Option<String>,
}

impl TrackMetadata {
    /// Create new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set title.
    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set artist.
    pub fn with_artist<S: Into<String>>(mut self, artist: S) -> Self {
        self.artist = Some(artist.into());
        self
    }

    /// Set album.
    pub fn with_album<S: Into<String>>(mut self, album: S) -> Self {
        self.album = Some(album.into());
        self
    }

    /// Set cover image URL.
    pub fn with_cover_url<S: Into<String>>(mut self, url: S) -> Self {
        self.cover_url = Some(url.into());
        self
    }
}

/// A non-fatal problem encountered while tagging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagWarning {
    /// The cover could not be downloaded; the tag has no picture.
    #[error("cover unavailable: {0}")]
    CoverUnavailable(String),

    /// The cover was downloaded but could not be framed; the tag has no picture.
    #[error("cover skipped: {0}")]
    PictureSkipped(String),

    /// The tag could not be built at all; the audio is delivered untagged.
    #[error("audio left untagged: {0}")]
    Untagged(String),
}

/// Tagged audio plus any warnings raised on the way.
#[derive(Debug, Clone)]
pub struct TaggedAudio {
    /// `tag ‖ audio`.
    pub bytes: Vec<u8>,
    /// Non-fatal problems (missing cover etc).
    pub warnings: Vec<TagWarning>,
}

/// Downloaded cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    /// Media type from the response's `Content-Type`.
    pub mime_type: String,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

/// Builds and prepends ID3v2.3 tags.
#[derive(Debug, Clone)]
pub struct TagEmbedder {
    client: Client,
}

impl TagEmbedder {
    /// Create an embedder with its own HTTP client for cover downloads.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http::client(COVER_TIMEOUT)?,
        })
    }

    /// Prepend a tag built from `metadata` to `audio`.
    ///
    /// # Errors
    ///
    /// * `Cancelled` if `cancel` fires during the cover download
    /// * `Tagging` if the tag block itself cannot be built
    ///
    /// Cover problems are returned as warnings, not errors.
    pub async fn embed(
        &self,
        audio: &[u8],
        metadata: &TrackMetadata,
        cancel: &CancellationToken,
    ) -> Result<TaggedAudio> {
        let mut frames = Vec::new();
        let mut warnings = Vec::new();

        let texts = [
            (id3v2::TITLE, &metadata.title),
            (id3v2::ARTIST, &metadata.artist),
            (id3v2::ALBUM, &metadata.album),
        ];
        for (id, text) in texts {
            if let Some(text) = text.as_deref().filter(|t| !t.is_empty()) {
                frames.push(Frame::text(id, text).to_bytes()?);
            }
        }

        if let Some(url) = metadata.cover_url.as_deref().filter(|u| !u.is_empty()) {
            match self.fetch_cover(url, cancel).await {
                Ok(cover) => {
                    if let Err(warning) =
                        push_picture(&mut frames, cover, id3v2::MAX_SYNCHSAFE as usize)
                    {
                        warn!("Skipping cover picture: {}", warning);
                        warnings.push(warning);
                    }
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    warn!("Failed to fetch cover {}: {}", url, e);
                    warnings.push(TagWarning::CoverUnavailable(e.to_string()));
                }
            }
        }

        debug!("Writing ID3v2.3 tag with {} frames", frames.len());
        let bytes = id3v2::write_tag(&frames, audio)?;

        Ok(TaggedAudio { bytes, warnings })
    }

    /// Download a cover image.
    ///
    /// # Errors
    ///
    /// `HttpStatus` for anything but 200 OK, `Request` for network and read errors.
    pub async fn fetch_cover(&self, url: &str, cancel: &CancellationToken) -> Result<CoverArt> {
        let request = self.client.get(url);

        http::cancellable(cancel, async {
            let response = request.send().await?;
            if response.status() != StatusCode::OK {
                return Err(FetchError::HttpStatus {
                    status: response.status(),
                    url: url.to_string(),
                });
            }

            let mime_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(';').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_MIME_TYPE)
                .to_string();

            let data = response.bytes().await?.to_vec();
            debug!("Fetched cover {} ({}, {} bytes)", url, mime_type, data.len());

            Ok::<_, FetchError>(CoverArt { mime_type, data })
        })
        .await
    }
}

/// Append an APIC frame for `cover` unless it cannot be built or the frames would
/// exceed `limit` bytes.
fn push_picture(
    frames: &mut Vec<Vec<u8>>,
    cover: CoverArt,
    limit: usize,
) -> std::result::Result<(), TagWarning> {
    let frame = Frame::picture(cover.mime_type, cover.data)
        .to_bytes()
        .map_err(|e| TagWarning::PictureSkipped(e.to_string()))?;

    let total = frames.iter().map(Vec::len).sum::<usize>() + frame.len();
    if total > limit {
        return Err(TagWarning::PictureSkipped(format!(
            "tag with cover would be {} bytes, limit is {}",
            total, limit
        )));
    }

    frames.push(frame);
    Ok(())
}
