//! Symmetric Session Cipher
//!
//! XChaCha20-Poly1305 with a random 192-bit nonce prepended to each
//! ciphertext. The layout (`nonce || ciphertext || tag`) is part of the
//! system's compatibility surface and must stay stable across versions.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroize;

use crate::{Error, Result};

/// Nonce length in bytes (XChaCha20 extended nonce)
pub const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// 256-bit session key, wiped on drop
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs.
        f.write_str("SessionKey(..)")
    }
}

/// Seal `plaintext`, returning `nonce || ciphertext || tag`
pub fn seal(key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| Error::Encrypt(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed buffer produced by [`seal`]
pub fn open(key: &SessionKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::Decrypt(format!(
            "sealed buffer too short: {} bytes",
            sealed.len()
        )));
    }

    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| Error::Decrypt(e.to_string()))
}

/// Open the first `len` bytes of `buf`, for callers reading into oversized
/// receive buffers
pub fn open_prefix(key: &SessionKey, buf: &[u8], len: usize) -> Result<Vec<u8>> {
    if len > buf.len() {
        return Err(Error::Decrypt(format!(
            "length {} exceeds buffer of {} bytes",
            len,
            buf.len()
        )));
    }
    open(key, &buf[..len])
}
