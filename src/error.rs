//! Framework Error Taxonomy
//!
//! Lifecycle and configuration errors propagate to the immediate caller;
//! per-message hook errors are caught and logged inside the read/write loops
//! and never cross the loop boundary. Bind failures carry their own variant
//! so "never started" is distinguishable from a later runtime failure.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced by the framework
#[derive(Debug, Error)]
pub enum Error {
    /// Duplicate `start` on a port that already has an acceptor
    #[error("port {0} is already being listened on")]
    PortInUse(u16),

    /// The listening socket could not be bound; fatal for that acceptor
    #[error("failed to bind listener on {addr}: {source}")]
    BindFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` called on a connection that is already running
    #[error("connection is already running")]
    AlreadyRunning,

    /// Lifecycle method called on a connection that was never started
    #[error("connection is not running")]
    NotRunning,

    /// Configuration rejected at load or validation time
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The bounded wait for key-exchange completion was exhausted
    #[error("key exchange still incomplete after {attempts} wait attempts")]
    KeyExchangeIncomplete { attempts: u32 },

    /// Key agreement produced a degenerate (non-contributory) shared secret
    #[error("key agreement failed: peer public key is non-contributory")]
    KeyAgreementFailed,

    /// AEAD sealing failed
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// AEAD opening failed (wrong key, truncated or tampered ciphertext)
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// Transport-level I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error ends a read/write loop rather than being logged
    /// and skipped. Stream closure shows up as `Io` once the peer or a
    /// concurrent `kill` has shut the socket down.
    pub fn is_fatal_for_loop(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_end_loops() {
        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(err.is_fatal_for_loop());
    }

    #[test]
    fn application_errors_do_not_end_loops() {
        assert!(!Error::KeyExchangeIncomplete { attempts: 3 }.is_fatal_for_loop());
        assert!(!Error::Decrypt("tag mismatch".into()).is_fatal_for_loop());
    }

    #[test]
    fn bind_failure_is_distinct_from_runtime_io() {
        let bind = Error::BindFailure {
            addr: "127.0.0.1:9000".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy"),
        };
        assert!(matches!(bind, Error::BindFailure { .. }));
        assert!(bind.to_string().contains("127.0.0.1:9000"));
    }
}
