//! Streaming platform identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A music streaming platform, named the way the link-aggregation service names it.
///
/// Unknown identifiers are kept verbatim in [`Platform::Other`] so they can still be
/// listed as fallback candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    Deezer,
    Yandex,
    Tidal,
    YouTube,
    YouTubeMusic,
    Spotify,
    AppleMusic,
    /// Any identifier not listed above.
    Other(String),
}

impl Platform {
    /// Platforms in the order they are preferred as the download source.
    pub const PRIORITY: [Platform; 7] = [
        Platform::Deezer,
        Platform::Yandex,
        Platform::Tidal,
        Platform::YouTube,
        Platform::YouTubeMusic,
        Platform::Spotify,
        Platform::AppleMusic,
    ];

    /// Identifier as used in `linksByPlatform`.
    pub fn as_str(&self) -> &str {
        match self {
            Platform::Deezer => "deezer",
            Platform::Yandex => "yandex",
            Platform::Tidal => "tidal",
            Platform::YouTube => "youtube",
            Platform::YouTubeMusic => "youtubeMusic",
            Platform::Spotify => "spotify",
            Platform::AppleMusic => "appleMusic",
            Platform::Other(id) => id,
        }
    }

    /// Position in [`Platform::PRIORITY`], if any.
    pub fn priority(&self) -> Option<usize> {
        Self::PRIORITY.iter().position(|p| p == self)
    }
}

impl From<&str> for Platform {
    fn from(id: &str) -> Self {
        match id {
            "deezer" => Platform::Deezer,
            "yandex" => Platform::Yandex,
            "tidal" => Platform::Tidal,
            "youtube" => Platform::YouTube,
            "youtubeMusic" => Platform::YouTubeMusic,
            "spotify" => Platform::Spotify,
            "appleMusic" => Platform::AppleMusic,
            other => Platform::Other(other.to_string()),
        }
    }
}

impl From<String> for Platform {
    fn from(id: String) -> Self {
        Platform::from(id.as_str())
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
