//! Port Acceptors
//!
//! A [`PortAcceptor`] owns one listening socket and converts incoming
//! connections into [`ManagedConnection`](crate::ManagedConnection) objects
//! via a pluggable factory, handing each to an accept hook. The
//! [`AcceptorRegistry`] keeps at most one acceptor per port and coordinates
//! clean shutdown of all of them.

pub mod port;
pub mod registry;

pub use port::{AcceptorState, PortAcceptor};
pub use registry::AcceptorRegistry;
