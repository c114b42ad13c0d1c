mod common;

use async_trait::async_trait;
use common::{Fixture, FixtureConfig};
use tokio_util::sync::CancellationToken;
use tunefetch::tagging::id3v2;
use tunefetch::{
    DownloadManager, FetchError, Pipeline, Platform, SongLinkApi, TagEmbedder, TagWarning,
    TrackDownloader,
};

/// Stands in for a second platform so fallback can be observed.
struct StaticDownloader {
    audio: Vec<u8>,
}

#[async_trait]
impl TrackDownloader for StaticDownloader {
    fn platform(&self) -> Platform {
        Platform::Spotify
    }

    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("https://open.spotify.com/")
    }

    async fn fetch(&self, _url: &str, _cancel: &CancellationToken) -> Result<Vec<u8>, FetchError> {
        Ok(self.audio.clone())
    }
}

fn pipeline(fixture: &Fixture, downloads: DownloadManager) -> Pipeline {
    Pipeline::new(
        SongLinkApi::with_base_url(&fixture.base_url).unwrap(),
        downloads,
        TagEmbedder::new().unwrap(),
    )
}

fn frames_len(bytes: &[u8]) -> usize {
    id3v2::decode_synchsafe(bytes[6..10].try_into().unwrap()) as usize
}

#[tokio::test]
async fn test_link_to_tagged_file() {
    let fixture = Fixture::start(FixtureConfig::default()).await;
    let mut downloads = DownloadManager::new();
    downloads.register(fixture.downloader());

    let track = pipeline(&fixture, downloads)
        .run(common::SPOTIFY_URL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(track.platform, Platform::Deezer);
    assert!(track.tagged);
    assert!(track.warnings.is_empty(), "{:?}", track.warnings);
    assert_eq!(
        track.file_name(),
        "Daft Punk - Harder, Better, Faster, Stronger.mp3"
    );

    let bytes = &track.bytes;
    assert_eq!(&bytes[..3], b"ID3");
    assert!(bytes.windows(4).any(|w| w == b"APIC"));
    assert_eq!(&bytes[id3v2::HEADER_LEN + frames_len(bytes)..], &common::plain_audio()[..]);

    assert_eq!(
        fixture.requests(),
        vec![
            format!("links {}", common::SPOTIFY_URL),
            "getUserData".to_string(),
            "pageTrack".to_string(),
            "get_url".to_string(),
            "media".to_string(),
            "cover".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_falls_back_when_deezer_fails() {
    let fixture = Fixture::start(FixtureConfig {
        media_error: Some("Track not available in your country".to_string()),
        ..Default::default()
    })
    .await;
    let mut downloads = DownloadManager::new();
    downloads.register(fixture.downloader());
    downloads.register(StaticDownloader {
        audio: b"fallback-audio".to_vec(),
    });

    let track = pipeline(&fixture, downloads)
        .run(common::SPOTIFY_URL, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(track.platform, Platform::Spotify);
    // Metadata still comes from the resolver's chosen entity.
    assert_eq!(track.artist, "Daft Punk");
    assert!(track.bytes.ends_with(b"fallback-audio"));
}

#[tokio::test]
async fn test_all_platforms_failing() {
    let fixture = Fixture::start(FixtureConfig {
        user_id: 0,
        ..Default::default()
    })
    .await;
    let mut downloads = DownloadManager::new();
    downloads.register(fixture.downloader());

    let err = pipeline(&fixture, downloads)
        .run(common::SPOTIFY_URL, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::AllPlatformsFailed { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, FetchError::Authentication(_)), "{:?}", last);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_cover_still_delivers() {
    let fixture = Fixture::start(FixtureConfig {
        cover_status: axum::http::StatusCode::BAD_GATEWAY,
        ..Default::default()
    })
    .await;
    let mut downloads = DownloadManager::new();
    downloads.register(fixture.downloader());

    let track = pipeline(&fixture, downloads)
        .run(common::SPOTIFY_URL, &CancellationToken::new())
        .await
        .unwrap();

    assert!(track.tagged);
    assert!(matches!(track.warnings[..], [TagWarning::CoverUnavailable(_)]));
    assert!(!track.bytes.windows(4).any(|w| w == b"APIC"));
    assert!(track.bytes.ends_with(&common::plain_audio()));
}
