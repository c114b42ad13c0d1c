//! Request pipeline: resolve → download → tag.
//!
//! One [`Pipeline::run`] call handles one incoming link end to end. The pipeline owns no
//! per-request state; it can be shared behind an `Arc` and run concurrently.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::SongLinkApi;
use crate::downloader::DownloadManager;
use crate::error::{FetchError, Result};
use crate::models::Platform;
use crate::tagging::{TagEmbedder, TagWarning, TaggedAudio, TrackMetadata};

/// File extension of delivered audio.
const EXTENSION: &str = ".mp3";

/// A playable file ready for delivery.
#[derive(Debug, Clone)]
pub struct DeliveredTrack {
    /// Tagged audio, or the raw audio if tagging could not run.
    pub bytes: Vec<u8>,
    /// Track title.
    pub title: String,
    /// Artist name.
    pub artist: String,
    /// Platform the audio came from.
    pub platform: Platform,
    /// Whether an ID3 tag was prepended.
    pub tagged: bool,
    /// Non-fatal tagging problems.
    pub warnings: Vec<TagWarning>,
}

impl DeliveredTrack {
    /// Suggested file name: `Artist - Title.mp3`.
    pub fn file_name(&self) -> String {
        let stem = match (self.artist.trim(), self.title.trim()) {
            ("", "") => "track".to_string(),
            (artist, "") => artist.to_string(),
            ("", title) => title.to_string(),
            (artist, title) => format!("{} - {}", artist, title),
        };
        format!("{}{}", sanitize_filename(&stem), EXTENSION)
    }
}

/// Resolver, downloaders and tagger wired into one sequential pass.
///
/// # Example
///
/// ```rust,no_run
/// use tokio_util::sync::CancellationToken;
/// use tunefetch::{
///     DeezerCredentials, DeezerDownloader, DownloadManager, Pipeline, SongLinkApi, TagEmbedder,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut downloads = DownloadManager::new();
///     downloads.register(DeezerDownloader::new(DeezerCredentials {
///         arl: "your_arl_cookie".to_string(),
///         secret: "your_16_byte_secret".to_string(),
///     })?);
///
///     let pipeline = Pipeline::new(SongLinkApi::new()?, downloads, TagEmbedder::new()?);
///     let track = pipeline
///         .run("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC", &CancellationToken::new())
///         .await?;
///     std::fs::write(track.file_name(), &track.bytes)?;
///     Ok(())
/// }
/// ```
pub struct Pipeline {
    resolver: SongLinkApi,
    downloads: DownloadManager,
    tagger: TagEmbedder,
}

impl Pipeline {
    pub fn new(resolver: SongLinkApi, downloads: DownloadManager, tagger: TagEmbedder) -> Self {
        Self {
            resolver,
            downloads,
            tagger,
        }
    }

    /// Turn a raw streaming link into a tagged audio file.
    ///
    /// Resolution and download errors are returned; tagging errors only degrade the
    /// result to untagged audio.
    pub async fn run(&self, raw_url: &str, cancel: &CancellationToken) -> Result<DeliveredTrack> {
        let info = self.resolver.resolve(raw_url, cancel).await?;
        let data = self.downloads.download(&info, cancel).await?;

        let mut metadata = TrackMetadata::new()
            .with_title(&data.title)
            .with_artist(&data.artist);
        if !data.cover.is_empty() {
            metadata = metadata.with_cover_url(&data.cover);
        }

        let result = self.tagger.embed(&data.audio, &metadata, cancel).await;
        let (bytes, tagged, warnings) = tagged_or_raw(data.audio, result)?;

        info!(
            "Prepared '{} - {}' from {} ({} bytes, tagged: {})",
            data.artist,
            data.title,
            data.platform,
            bytes.len(),
            tagged
        );

        Ok(DeliveredTrack {
            bytes,
            title: data.title,
            artist: data.artist,
            platform: data.platform,
            tagged,
            warnings,
        })
    }
}

/// Pick the tagged bytes, or fall back to `audio` when tagging failed.
///
/// Only cancellation is passed through as an error.
fn tagged_or_raw(
    audio: Vec<u8>,
    result: Result<TaggedAudio>,
) -> Result<(Vec<u8>, bool, Vec<TagWarning>)> {
    match result {
        Ok(tagged) => Ok((tagged.bytes, true, tagged.warnings)),
        Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
        Err(e) => {
            warn!("Failed to add metadata, delivering untagged audio: {}", e);
            Ok((audio, false, vec![TagWarning::Untagged(e.to_string())]))
        }
    }
}

/// Sanitize a string for use as a filename.
fn sanitize_filename(name: &str) -> String {
    name.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
        .trim()
        .to_string()
}
