//! Data models shared by the resolver, the downloaders and the tagger.

mod platform;
mod track;

pub use platform::Platform;
pub use track::{PlatformLink, TrackData, TrackInfo};
