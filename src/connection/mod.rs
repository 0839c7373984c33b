//! Connection Lifecycle
//!
//! A [`ManagedConnection`] owns one socket and runs its read and write
//! activity as two independent tokio tasks, each driven by the hooks of a
//! [`ConnectionHandler`]. The handler is the sole polymorphic extension
//! point; the connection itself never interprets bytes on the wire.

pub mod handler;
pub mod managed;
pub mod output;

pub use handler::{
    AcceptHook, ConnectionFactory, ConnectionHandler, ConnectionReader, ConnectionWriter,
    FnAcceptHook, LoggingAcceptHook, StartOnAccept,
};
pub use managed::{ConnectionInfo, ManagedConnection};
pub use output::OutputGuard;
