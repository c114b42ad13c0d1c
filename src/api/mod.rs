//! API clients.
//!
//! This module provides two clients:
//! - [`SongLinkApi`]: link aggregation, used to resolve arbitrary streaming URLs
//! - [`DeezerSession`]: request-scoped authenticated Deezer gateway session

pub mod gateway;
pub mod songlink;

pub use gateway::{DeezerEndpoints, DeezerSession, DownloadQuality, Song};
pub use songlink::SongLinkApi;
