//! Audio session record
//!
//! Key material and stream parameters negotiated by the control plane
//! before the audio ports open. The record is read-mostly: the only
//! mutation after publication is the one-shot cache of the unwrapped AES
//! key the first time a packet needs it.

use std::sync::OnceLock;

use crate::audio::decoder::AudioFormat;
use crate::protocol::crypto::{derive_stream_key, DecryptError, KeyUnwrap};

/// Key material and codec identity for one streaming session
#[derive(Debug)]
pub struct AudioSession {
    /// AES key as delivered by the sender (still wrapped)
    pub encrypted_key: Vec<u8>,
    /// Key-message blob the unwrap transform consumes
    pub key_message: Vec<u8>,
    /// Shared secret from the pairing ECDH
    pub shared_secret: [u8; 32],
    /// CBC initialization vector, reset per packet
    pub iv: [u8; 16],
    /// Advertised audio format
    pub format: AudioFormat,
    /// Samples-per-frame hint from the stream announcement
    pub samples_per_frame: Option<u32>,
    /// Compression-type fallback used when no format was advertised
    pub compression_type: u8,
    plain_key: OnceLock<[u8; 16]>,
}

impl AudioSession {
    /// Create a session for the given format with empty key material.
    #[must_use]
    pub fn new(format: AudioFormat) -> Self {
        Self {
            encrypted_key: Vec::new(),
            key_message: Vec::new(),
            shared_secret: [0; 32],
            iv: [0; 16],
            format,
            samples_per_frame: None,
            compression_type: 0,
            plain_key: OnceLock::new(),
        }
    }

    /// Plaintext AES key, unwrapped on first use and cached.
    ///
    /// # Errors
    /// Returns [`DecryptError`] when key material is missing or the unwrap
    /// transform rejects it.
    pub fn plain_key(&self, unwrap: &dyn KeyUnwrap) -> Result<[u8; 16], DecryptError> {
        if let Some(key) = self.plain_key.get() {
            return Ok(*key);
        }
        if self.encrypted_key.is_empty() {
            return Err(DecryptError::MissingMaterial("encrypted key"));
        }

        let key = unwrap.unwrap_key(&self.key_message, &self.encrypted_key)?;
        // A concurrent first use computes the same value; whichever lands
        // first wins and both readers agree.
        Ok(*self.plain_key.get_or_init(|| key))
    }

    /// CBC stream key for this session's payloads.
    ///
    /// # Errors
    /// Returns [`DecryptError`] when the plaintext key cannot be recovered.
    pub fn stream_key(&self, unwrap: &dyn KeyUnwrap) -> Result<[u8; 16], DecryptError> {
        Ok(derive_stream_key(
            &self.plain_key(unwrap)?,
            &self.shared_secret,
        ))
    }
}

impl Default for AudioSession {
    fn default() -> Self {
        Self::new(AudioFormat::Unknown)
    }
}
