//! Track identity and downloaded track data.

use serde::{Deserialize, Serialize};

use super::Platform;

/// A track's URL on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLink {
    /// Platform hosting the link.
    pub platform: Platform,
    /// Platform-specific track URL.
    pub url: String,
}

impl PlatformLink {
    pub fn new<S: Into<String>>(platform: Platform, url: S) -> Self {
        Self {
            platform,
            url: url.into(),
        }
    }
}

/// Canonical identity of a track, as produced by the resolver.
///
/// `platform`/`url` name the chosen download source; `available_platforms` lists every
/// platform with a usable link, in the order fallback should try them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Artist name (empty if unknown).
    pub artist: String,
    /// Track title (empty if unknown).
    pub title: String,
    /// Cover image URL (empty if unknown).
    pub cover: String,
    /// Chosen platform.
    pub platform: Platform,
    /// URL on the chosen platform.
    pub url: String,
    /// All platforms with a non-empty link.
    pub available_platforms: Vec<PlatformLink>,
}

/// Raw audio plus the metadata needed to tag it.
#[derive(Debug, Clone)]
pub struct TrackData {
    /// Audio bytes exactly as produced by the downloader.
    pub audio: Vec<u8>,
    /// Track title.
    pub title: String,
    /// Artist name.
    pub artist: String,
    /// Cover image URL.
    pub cover: String,
    /// Platform whose downloader produced `audio`.
    pub platform: Platform,
}

impl TrackData {
    /// Combine downloaded bytes with the metadata of a resolved track.
    pub fn from_info(info: &TrackInfo, platform: Platform, audio: Vec<u8>) -> Self {
        Self {
            audio,
            title: info.title.clone(),
            artist: info.artist.clone(),
            cover: info.cover.clone(),
            platform,
        }
    }
}
