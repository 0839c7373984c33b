//! sockframe
//!
//! A socket connection framework: a reusable substrate for building custom
//! client/server protocols over TCP. It provides a registry of listening
//! ports that accept connections concurrently, a per-connection lifecycle
//! that runs independent read and write loops until killed, and an optional
//! secure channel that performs an ephemeral key exchange and gates
//! encryption on its completion.
//!
//! Wire-level framing and application protocol semantics are left to
//! implementers of [`ConnectionHandler`].

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod error;
pub mod secure;

pub use acceptor::{AcceptorRegistry, AcceptorState, PortAcceptor};
pub use config::Config;
pub use connection::{
    AcceptHook, ConnectionFactory, ConnectionHandler, ConnectionInfo, ManagedConnection,
};
pub use error::Error;
pub use secure::{ExchangeWait, SecureChannel};

/// Common result type for the framework
pub type Result<T> = std::result::Result<T, Error>;
