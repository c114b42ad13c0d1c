//! # tunefetch
//!
//! Resolve a music-streaming link, download the audio from whichever platform serves it,
//! and prepend an ID3v2.3 tag.
//!
//! ## Quick Start
//!
//! The easiest way to use this library is through the [`Pipeline`] struct:
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use tunefetch::{
//!     DeezerCredentials, DeezerDownloader, DownloadManager, Pipeline, SongLinkApi, TagEmbedder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut downloads = DownloadManager::new();
//!     downloads.register(DeezerDownloader::new(DeezerCredentials {
//!         arl: std::env::var("DEEZER_ARL")?,
//!         secret: std::env::var("DEEZER_SECRET")?,
//!     })?);
//!
//!     let pipeline = Pipeline::new(SongLinkApi::new()?, downloads, TagEmbedder::new()?);
//!     let track = pipeline
//!         .run("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC", &CancellationToken::new())
//!         .await?;
//!
//!     println!("{} ({} bytes)", track.file_name(), track.bytes.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Stages
//!
//! - [`SongLinkApi`] - raw URL to [`TrackInfo`] with ranked platform links
//! - [`DownloadManager`] - tries registered [`TrackDownloader`]s in fallback order
//! - [`DeezerDownloader`] - authenticated download with stripe decryption ([`crypto`])
//! - [`TagEmbedder`] - ID3v2.3 title/artist/album/cover tag ([`tagging::id3v2`])
//!
//! Every network call takes a [`CancellationToken`](tokio_util::sync::CancellationToken);
//! cancelling it aborts the request in flight with [`FetchError::Cancelled`].

pub mod api;
pub mod crypto;
pub mod downloader;
pub mod error;
mod http;
pub mod models;
mod pipeline;
pub mod tagging;

// Main interface (recommended)
pub use pipeline::{DeliveredTrack, Pipeline};

// Stages
pub use api::{DeezerEndpoints, DownloadQuality, SongLinkApi};
pub use downloader::{DeezerCredentials, DeezerDownloader, DownloadManager, TrackDownloader};
pub use error::FetchError;
pub use models::{Platform, PlatformLink, TrackData, TrackInfo};
pub use tagging::{TagEmbedder, TagWarning, TaggedAudio, TrackMetadata};
