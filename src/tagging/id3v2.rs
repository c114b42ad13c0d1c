//! Minimal ID3v2.3 writer.
//!
//! Only what the embedder needs: UTF-8 text frames, one attached-picture frame and the
//! 10-byte tag header. Frame sizes are plain big-endian `u32` (v2.3); the tag size in
//! the header is synchsafe.

use byteorder::{BigEndian, WriteBytesExt};

use crate::error::{FetchError, Result};

/// Size of the tag header.
pub const HEADER_LEN: usize = 10;

/// Size of a frame header.
pub const FRAME_HEADER_LEN: usize = 10;

/// Largest value a synchsafe integer can carry (2^28 - 1).
pub const MAX_SYNCHSAFE: u32 = (1 << 28) - 1;

const TAG_ID: &[u8; 3] = b"ID3";
const VERSION_MAJOR: u8 = 0x03;
const VERSION_REVISION: u8 = 0x00;

const ENCODING_LATIN1: u8 = 0x00;
const ENCODING_UTF8: u8 = 0x03;

/// Picture type "Cover (front)".
const PICTURE_FRONT_COVER: u8 = 0x03;

/// Title frame id.
pub const TITLE: [u8; 4] = *b"TIT2";
/// Lead artist frame id.
pub const ARTIST: [u8; 4] = *b"TPE1";
/// Album frame id.
pub const ALBUM: [u8; 4] = *b"TALB";
/// Attached picture frame id.
pub const PICTURE: [u8; 4] = *b"APIC";

/// Encode a 28-bit value as four 7-bit groups, most significant first.
///
/// # Errors
///
/// Returns `Tagging` for values above [`MAX_SYNCHSAFE`].
pub fn encode_synchsafe(value: u32) -> Result<[u8; 4]> {
    if value > MAX_SYNCHSAFE {
        return Err(FetchError::Tagging(format!(
            "size {} does not fit in a synchsafe integer",
            value
        )));
    }

    Ok([
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ])
}

/// Decode four 7-bit groups. The top bit of each byte is ignored.
pub fn decode_synchsafe(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

/// One ID3v2.3 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text information frame, UTF-8 encoded.
    Text { id: [u8; 4], text: String },
    /// Attached picture (front cover) with an empty description.
    Picture { mime_type: String, data: Vec<u8> },
}

impl Frame {
    pub fn text(id: [u8; 4], text: impl Into<String>) -> Self {
        Frame::Text {
            id,
            text: text.into(),
        }
    }

    pub fn picture(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Frame::Picture {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Four-character frame id.
    pub fn id(&self) -> [u8; 4] {
        match self {
            Frame::Text { id, .. } => *id,
            Frame::Picture { .. } => PICTURE,
        }
    }

    fn body(&self) -> Result<Vec<u8>> {
        match self {
            Frame::Text { text, .. } => {
                let mut body = Vec::with_capacity(1 + text.len());
                body.push(ENCODING_UTF8);
                body.extend_from_slice(text.as_bytes());
                Ok(body)
            }
            Frame::Picture { mime_type, data } => {
                // Latin-1 MIME; ASCII is the only subset we can pass through unchanged.
                if !mime_type.is_ascii() || mime_type.bytes().any(|b| b == 0) {
                    return Err(FetchError::Tagging(format!(
                        "MIME type {:?} is not encodable as Latin-1",
                        mime_type
                    )));
                }

                let mut body = Vec::with_capacity(4 + mime_type.len() + data.len());
                body.push(ENCODING_LATIN1);
                body.extend_from_slice(mime_type.as_bytes());
                body.push(0x00);
                body.push(PICTURE_FRONT_COVER);
                body.push(0x00); // empty description, terminated
                body.extend_from_slice(data);
                Ok(body)
            }
        }
    }

    /// Serialize header and body into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = self.body()?;
        let len = u32::try_from(body.len()).map_err(|_| {
            FetchError::Tagging(format!("frame body of {} bytes is too large", body.len()))
        })?;

        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
        out.extend_from_slice(&self.id());
        out.write_u32::<BigEndian>(len)?;
        out.write_u16::<BigEndian>(0)?; // flags
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Build `header ‖ frames ‖ audio`.
///
/// Frames are written in the order given; `audio` is copied unmodified.
pub fn write_tag(frames: &[Vec<u8>], audio: &[u8]) -> Result<Vec<u8>> {
    let frames_len: usize = frames.iter().map(Vec::len).sum();
    let size = u32::try_from(frames_len)
        .ok()
        .filter(|&size| size <= MAX_SYNCHSAFE)
        .ok_or_else(|| {
            FetchError::Tagging(format!("tag of {} bytes is too large", frames_len))
        })?;

    let mut out = Vec::with_capacity(HEADER_LEN + frames_len + audio.len());
    out.extend_from_slice(TAG_ID);
    out.push(VERSION_MAJOR);
    out.push(VERSION_REVISION);
    out.push(0x00); // flags
    out.extend_from_slice(&encode_synchsafe(size)?);
    for frame in frames {
        out.extend_from_slice(frame);
    }
    out.extend_from_slice(audio);
    Ok(out)
}
