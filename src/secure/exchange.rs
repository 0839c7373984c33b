//! Ephemeral Key Exchange
//!
//! x25519 agreement with one fixed curve and no negotiation. The session
//! key is SHA-256 of the raw shared secret, derived exactly once; the
//! shared secret itself never leaves this module.

use std::sync::RwLock;
use std::time::Duration;

use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;
use x25519_dalek::{PublicKey, ReusableSecret};

use super::cipher::SessionKey;
use crate::{Error, Result};

/// Bounded wait budget for callers arriving before the exchange completes
#[derive(Debug, Clone, Copy)]
pub struct ExchangeWait {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl ExchangeWait {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts,
        }
    }
}

impl Default for ExchangeWait {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 3)
    }
}

/// One-shot x25519 key agreement with a completion signal.
///
/// `ReusableSecret` rather than `EphemeralSecret` because a failed
/// agreement (degenerate peer key) must be retriable with a corrected key;
/// the secret still never outlives the connection.
pub struct KeyExchange {
    local_secret: ReusableSecret,
    local_public: PublicKey,
    completed_tx: watch::Sender<bool>,
    key: RwLock<Option<SessionKey>>,
}

impl KeyExchange {
    /// Generate a fresh ephemeral key pair
    pub fn new() -> Self {
        let local_secret = ReusableSecret::random_from_rng(OsRng);
        let local_public = PublicKey::from(&local_secret);
        let (completed_tx, _) = watch::channel(false);

        Self {
            local_secret,
            local_public,
            completed_tx,
            key: RwLock::new(None),
        }
    }

    /// The 32-byte local public key
    pub fn public_key(&self) -> [u8; 32] {
        *self.local_public.as_bytes()
    }

    /// Whether the exchange has completed. Flips true exactly once and
    /// never reverts.
    pub fn is_complete(&self) -> bool {
        *self.completed_tx.borrow()
    }

    /// Run agreement with the supplied peer public key and derive the
    /// session key. A non-contributory result (e.g. the all-zero point)
    /// fails with `KeyAgreementFailed`, leaves the exchange incomplete and
    /// may be retried. Once complete, further calls are no-ops.
    pub fn finish(&self, peer_public: [u8; 32]) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }

        let peer = PublicKey::from(peer_public);
        let shared = self.local_secret.diffie_hellman(&peer);
        if !shared.was_contributory() {
            return Err(Error::KeyAgreementFailed);
        }

        let digest = Sha256::digest(shared.as_bytes());
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&digest);

        {
            let mut slot = self.key.write().expect("key lock poisoned");
            // First successful agreement wins; the key is set exactly once.
            if slot.is_none() {
                *slot = Some(SessionKey::from_bytes(key_bytes));
                // send_replace updates the value even with no receiver
                // subscribed; a plain send would drop it on the floor.
                self.completed_tx.send_replace(true);
                debug!("Key exchange complete");
            }
        }

        Ok(())
    }

    /// The derived session key, waiting (bounded by `wait`) for completion.
    ///
    /// Fast path once complete: the key is cloned out with no further
    /// completeness checks or re-derivation. Otherwise the caller waits on
    /// the completion signal in `poll_interval` slices, at most
    /// `max_attempts` times, before `KeyExchangeIncomplete`.
    pub async fn wait_for_key(&self, wait: &ExchangeWait) -> Result<SessionKey> {
        if let Some(key) = self.session_key() {
            return Ok(key);
        }

        let mut rx = self.completed_tx.subscribe();
        for _ in 0..wait.max_attempts {
            if *rx.borrow() {
                break;
            }
            // Elapsing is one spent attempt; an actual signal short-circuits.
            let _ = timeout(wait.poll_interval, rx.changed()).await;
        }

        self.session_key().ok_or(Error::KeyExchangeIncomplete {
            attempts: wait.max_attempts,
        })
    }

    fn session_key(&self) -> Option<SessionKey> {
        self.key.read().expect("key lock poisoned").clone()
    }
}

impl Default for KeyExchange {
    fn default() -> Self {
        Self::new()
    }
}
