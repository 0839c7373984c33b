//! Secure Channel
//!
//! One-shot ephemeral key exchange plus symmetric encryption gated on its
//! completion. The channel produces and consumes raw 32-byte public keys;
//! carrying them across the wire is the embedding protocol's business, and
//! no handshake framing is defined here.
//!
//! The AEAD is XChaCha20-Poly1305, fixed for the whole system. Ciphertext
//! layout is a 24-byte random nonce followed by ciphertext with the 16-byte
//! Poly1305 tag appended; peers on older or different layouts cannot
//! interoperate.

pub mod cipher;
pub mod exchange;

pub use cipher::{SessionKey, NONCE_LEN, TAG_LEN};
pub use exchange::{ExchangeWait, KeyExchange};

use crate::config::KeyExchangeConfig;
use crate::Result;

/// Key-exchange-gated encrypt/decrypt for one connection.
///
/// Composes a [`KeyExchange`] with a wait budget: `encrypt` and `decrypt`
/// calls that arrive before [`finish_exchange`](Self::finish_exchange) has
/// succeeded block on the completion signal, bounded by the budget, and fail
/// with `KeyExchangeIncomplete` if it is exhausted. Once complete, the
/// derived session key is reused without re-derivation; completion never
/// reverts.
pub struct SecureChannel {
    exchange: KeyExchange,
    wait: ExchangeWait,
}

impl SecureChannel {
    /// Channel with the default wait budget (3 attempts of 1s)
    pub fn new() -> Self {
        Self::with_wait(ExchangeWait::default())
    }

    pub fn with_wait(wait: ExchangeWait) -> Self {
        Self {
            exchange: KeyExchange::new(),
            wait,
        }
    }

    pub fn from_config(config: &KeyExchangeConfig) -> Self {
        Self::with_wait(config.into())
    }

    /// Local public key, for transmission to the peer
    pub fn public_key(&self) -> [u8; 32] {
        self.exchange.public_key()
    }

    /// Run key agreement with the peer's public key. Failure leaves the
    /// exchange incomplete and is retriable with a corrected key.
    pub fn finish_exchange(&self, peer_public: [u8; 32]) -> Result<()> {
        self.exchange.finish(peer_public)
    }

    pub fn is_complete(&self) -> bool {
        self.exchange.is_complete()
    }

    /// Seal `plaintext`, waiting (bounded) for the exchange if necessary
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.exchange.wait_for_key(&self.wait).await?;
        cipher::seal(&key, plaintext)
    }

    /// Open the first `len` bytes of `data`, waiting (bounded) for the
    /// exchange if necessary
    pub async fn decrypt(&self, data: &[u8], len: usize) -> Result<Vec<u8>> {
        let key = self.exchange.wait_for_key(&self.wait).await?;
        cipher::open_prefix(&key, data, len)
    }
}

impl Default for SecureChannel {
    fn default() -> Self {
        Self::new()
    }
}
