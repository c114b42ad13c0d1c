//! Cryptographic utilities for Deezer audio decryption.
//!
//! # Encryption Scheme
//!
//! Deezer uses a stripe encryption scheme:
//! - Audio is divided into 2048-byte chunks
//! - Every 3rd chunk (0, 3, 6, 9...) is encrypted with Blowfish CBC, unless it is the
//!   short trailing chunk
//! - Other chunks are left unencrypted
//! - The key is derived from the song ID and a 16-byte shared secret

use blowfish::Blowfish;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, KeyInit};
use md5::{Digest, Md5};
use tracing::debug;

use crate::error::{FetchError, Result};

/// Length of the shared secret and of derived keys.
pub const KEY_LENGTH: usize = 16;

/// Derived per-track Blowfish key.
pub type Key = [u8; KEY_LENGTH];

/// Blowfish initialization vector.
const BLOWFISH_IV: [u8; 8] = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];

/// Chunk size for stripe encryption.
pub const CHUNK_SIZE: usize = 2048;

/// One chunk out of this many is encrypted.
const STRIPE_COUNT: u64 = 3;

/// Blowfish cipher block size.
const BF_BLOCK_SIZE: usize = 8;

/// Compute MD5 hash of a string and return as lowercase hex string.
pub fn md5_hex(data: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())
}

/// Calculate the Blowfish decryption key for a given song ID.
///
/// The key is derived by XORing:
/// - First 16 chars of MD5(song_id)
/// - Second 16 chars of MD5(song_id)
/// - The shared secret
pub fn calc_blowfish_key(secret: &Key, song_id: &str) -> Key {
    let hash = md5_hex(song_id);
    let hash_bytes = hash.as_bytes();

    let mut key = [0u8; KEY_LENGTH];
    for i in 0..KEY_LENGTH {
        key[i] = secret[i] ^ hash_bytes[i] ^ hash_bytes[i + KEY_LENGTH];
    }
    key
}

/// Take the first 16 bytes of a configured secret.
///
/// # Errors
///
/// Returns `Config` if the secret is shorter than 16 bytes.
pub fn secret_from_bytes(secret: &[u8]) -> Result<Key> {
    secret
        .get(..KEY_LENGTH)
        .and_then(|s| Key::try_from(s).ok())
        .ok_or_else(|| {
            FetchError::Config(format!(
                "decryption secret must be at least {} bytes, got {}",
                KEY_LENGTH,
                secret.len()
            ))
        })
}

/// Decrypt a full chunk in place using Blowfish CBC with the fixed IV.
fn decrypt_chunk(cipher: &Blowfish<byteorder::BE>, chunk: &mut [u8]) {
    let mut prev_block = BLOWFISH_IV;

    for block in chunk.chunks_exact_mut(BF_BLOCK_SIZE) {
        let mut ciphertext = [0u8; BF_BLOCK_SIZE];
        ciphertext.copy_from_slice(block);

        cipher.decrypt_block(GenericArray::from_mut_slice(block));

        for (byte, prev) in block.iter_mut().zip(prev_block.iter()) {
            *byte ^= prev;
        }

        prev_block = ciphertext;
    }
}

/// Incremental stripe decryptor.
///
/// Feed arbitrary-sized pieces of the encrypted stream with [`update`](Self::update);
/// complete 2048-byte chunks are emitted as soon as they are available. Call
/// [`finish`](Self::finish) at end of stream to emit the trailing short chunk, which is
/// never encrypted.
pub struct StripeDecryptor {
    cipher: Blowfish<byteorder::BE>,
    chunk_index: u64,
    pending: Vec<u8>,
}

impl StripeDecryptor {
    /// Create a decryptor for a derived key.
    pub fn new(key: &Key) -> Result<Self> {
        let cipher = Blowfish::new_from_slice(key)
            .map_err(|e| FetchError::Crypto(format!("Invalid Blowfish key: {}", e)))?;

        Ok(Self {
            cipher,
            chunk_index: 0,
            pending: Vec::with_capacity(CHUNK_SIZE),
        })
    }

    /// Number of complete chunks emitted so far.
    pub fn chunks_processed(&self) -> u64 {
        self.chunk_index
    }

    /// Consume `data`, appending every completed chunk to `out`.
    pub fn update(&mut self, mut data: &[u8], out: &mut Vec<u8>) {
        while !data.is_empty() {
            let wanted = CHUNK_SIZE - self.pending.len();
            let take = wanted.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == CHUNK_SIZE {
                if self.chunk_index % STRIPE_COUNT == 0 {
                    decrypt_chunk(&self.cipher, &mut self.pending);
                }
                out.extend_from_slice(&self.pending);
                self.pending.clear();
                self.chunk_index += 1;
            }
        }
    }

    /// Flush the trailing partial chunk unmodified.
    pub fn finish(self, out: &mut Vec<u8>) {
        if !self.pending.is_empty() {
            debug!("Writing final partial chunk of {} bytes", self.pending.len());
            out.extend_from_slice(&self.pending);
        }
    }
}

/// Decrypt a complete in-memory Deezer stream.
pub fn decrypt_track(encrypted_data: &[u8], key: &Key) -> Result<Vec<u8>> {
    let mut decryptor = StripeDecryptor::new(key)?;
    let mut output = Vec::with_capacity(encrypted_data.len());
    decryptor.update(encrypted_data, &mut output);
    decryptor.finish(&mut output);
    Ok(output)
}
