//! Audio payload decryption
//!
//! RAOP audio bodies are AES-128-CBC encrypted with a per-session key. The
//! plaintext key is recovered from the session's key-message through an
//! opaque unwrap transform (the source device's "fair-play" routine, plugged
//! in by the embedding application), then stretched with the pairing ECDH
//! secret into the stream key actually fed to the cipher.
//!
//! Only complete 16-byte blocks are encrypted on the wire; a 1-15 byte tail
//! is always plaintext. The IV restarts at the session IV on every packet,
//! nothing chains across packets.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, KeyInit};
use aes::Aes128;
use sha2::{Digest, Sha512};
use thiserror::Error;

/// AES block size in bytes.
const BLOCK_SIZE: usize = 16;

/// Errors from payload decryption
#[derive(Debug, Error)]
pub enum DecryptError {
    /// Session is missing key material
    #[error("missing session material: {0}")]
    MissingMaterial(&'static str),

    /// The key-unwrap transform failed
    #[error("key unwrap failed: {0}")]
    KeyUnwrap(String),

    /// Unwrap produced a key of the wrong length
    #[error("bad key length: {0} bytes")]
    BadKeyLength(usize),

    /// Cipher used before key material was installed
    #[error("cipher not initialized")]
    NotInitialized,
}

/// Opaque transform recovering the plaintext AES key from session material
///
/// The concrete routine is out of scope for the core; the embedding
/// application supplies one at construction time.
pub trait KeyUnwrap: Send + Sync {
    /// Recover the 16-byte plaintext key from the session's key-message and
    /// encrypted key.
    ///
    /// # Errors
    /// Returns [`DecryptError`] when the material cannot be unwrapped.
    fn unwrap_key(
        &self,
        key_message: &[u8],
        encrypted_key: &[u8],
    ) -> Result<[u8; 16], DecryptError>;
}

/// Unwrap that takes the leading 16 bytes of the encrypted key verbatim
///
/// Suitable when the key material is produced locally (loopback senders,
/// tests); real sources need the fair-play transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughKeyUnwrap;

impl KeyUnwrap for PassthroughKeyUnwrap {
    fn unwrap_key(
        &self,
        _key_message: &[u8],
        encrypted_key: &[u8],
    ) -> Result<[u8; 16], DecryptError> {
        if encrypted_key.len() < 16 {
            return Err(DecryptError::BadKeyLength(encrypted_key.len()));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&encrypted_key[..16]);
        Ok(key)
    }
}

impl<F> KeyUnwrap for F
where
    F: Fn(&[u8], &[u8]) -> Result<[u8; 16], DecryptError> + Send + Sync,
{
    fn unwrap_key(
        &self,
        key_message: &[u8],
        encrypted_key: &[u8],
    ) -> Result<[u8; 16], DecryptError> {
        self(key_message, encrypted_key)
    }
}

/// Derive the CBC stream key: `SHA-512(plain_key || shared_secret)[..16]`.
#[must_use]
pub fn derive_stream_key(plain_key: &[u8; 16], shared_secret: &[u8]) -> [u8; 16] {
    let mut hasher = Sha512::new();
    hasher.update(plain_key);
    hasher.update(shared_secret);
    let digest = hasher.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// Per-receiver AES-128-CBC payload decryptor
///
/// Each receive loop owns one instance; instances are never shared between
/// the control and data handlers. Key material is installed lazily when the
/// first audio packet arrives.
pub struct PacketCipher {
    state: Option<CipherState>,
}

struct CipherState {
    cipher: Aes128,
    iv: [u8; 16],
}

impl PacketCipher {
    /// Create an uninitialized cipher.
    #[must_use]
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Has key material been installed yet?
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Install the derived stream key and session IV.
    pub fn install(&mut self, stream_key: [u8; 16], iv: [u8; 16]) {
        self.state = Some(CipherState {
            cipher: Aes128::new(GenericArray::from_slice(&stream_key)),
            iv,
        });
    }

    /// Decrypt an audio body in place.
    ///
    /// Decrypts the leading `len / 16 * 16` bytes in CBC mode starting from
    /// the session IV; the residual tail stays untouched.
    ///
    /// # Errors
    /// Returns [`DecryptError::NotInitialized`] when no key was installed.
    pub fn decrypt_in_place(&self, payload: &mut [u8]) -> Result<(), DecryptError> {
        let state = self.state.as_ref().ok_or(DecryptError::NotInitialized)?;

        let encrypted_len = payload.len() / BLOCK_SIZE * BLOCK_SIZE;
        let mut prev: [u8; BLOCK_SIZE] = state.iv;

        for chunk in payload[..encrypted_len].chunks_exact_mut(BLOCK_SIZE) {
            let mut ciphertext = [0u8; BLOCK_SIZE];
            ciphertext.copy_from_slice(chunk);

            let mut block = GenericArray::clone_from_slice(chunk);
            state.cipher.decrypt_block(&mut block);

            for (b, p) in block.iter_mut().zip(prev.iter()) {
                *b ^= *p;
            }

            chunk.copy_from_slice(&block);
            prev = ciphertext;
        }

        Ok(())
    }
}

impl Default for PacketCipher {
    fn default() -> Self {
        Self::new()
    }
}
