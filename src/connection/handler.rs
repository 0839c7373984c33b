//! Connection Hooks
//!
//! [`ConnectionHandler`] is the per-connection extension point: `setup`
//! runs before the loops start, `read_input` and `write_output` drive one
//! iteration of their respective loops (returning `Ok(false)` ends the
//! loop), and `on_kill` runs teardown exactly once.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::info;

use super::managed::ManagedConnection;
use crate::Result;

/// Buffered read side handed to `read_input`
pub type ConnectionReader = BufReader<OwnedReadHalf>;

/// Write side handed to `write_output`
pub type ConnectionWriter = OwnedWriteHalf;

/// Per-connection behavior hooks
///
/// Hook errors are caught and logged by the loops; a single malformed
/// message never brings the connection down. I/O errors are the exception:
/// once the stream has failed or been closed, the loop interprets them as
/// "stop".
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Runs once, before the loops are launched (e.g. key-exchange init)
    async fn setup(&self, _conn: &ManagedConnection) -> Result<()> {
        Ok(())
    }

    /// Runs once, on the first `kill` only
    async fn on_kill(&self, _conn: &ManagedConnection) {}

    /// One iteration of the reader loop; `Ok(false)` ends it
    async fn read_input(&self, conn: &ManagedConnection, io: &mut ConnectionReader)
        -> Result<bool>;

    /// One iteration of the writer loop; `Ok(false)` ends it.
    ///
    /// The default drains the connection's output guard, writing one queued
    /// frame per iteration and ending the loop once the guard is closed.
    async fn write_output(
        &self,
        conn: &ManagedConnection,
        io: &mut ConnectionWriter,
    ) -> Result<bool> {
        match conn.next_output().await {
            Some(frame) => {
                io.write_all(&frame).await?;
                io.flush().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Builds a connection from a freshly accepted socket.
///
/// Must not block; failures are logged by the acceptor, which keeps serving
/// subsequent connections.
pub trait ConnectionFactory: Send + Sync + 'static {
    fn build(&self, stream: TcpStream) -> Result<Arc<ManagedConnection>>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(TcpStream) -> Result<Arc<ManagedConnection>> + Send + Sync + 'static,
{
    fn build(&self, stream: TcpStream) -> Result<Arc<ManagedConnection>> {
        (self)(stream)
    }
}

/// Invoked with each newly produced connection; typically starts it.
///
/// Errors are caught and logged by the acceptor, never propagated into the
/// accept loop.
#[async_trait]
pub trait AcceptHook: Send + Sync + 'static {
    async fn on_accept(&self, conn: Arc<ManagedConnection>, port: u16) -> Result<()>;
}

/// Adapter turning an async closure into an [`AcceptHook`]
pub struct FnAcceptHook<F>(pub F);

#[async_trait]
impl<F, Fut> AcceptHook for FnAcceptHook<F>
where
    F: Fn(Arc<ManagedConnection>, u16) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn on_accept(&self, conn: Arc<ManagedConnection>, port: u16) -> Result<()> {
        (self.0)(conn, port).await
    }
}

/// Hook that starts every accepted connection
pub struct StartOnAccept;

#[async_trait]
impl AcceptHook for StartOnAccept {
    async fn on_accept(&self, conn: Arc<ManagedConnection>, port: u16) -> Result<()> {
        info!("Accepted {} on port {}", conn.info(), port);
        conn.start().await
    }
}

/// Default hook: logs the arrival and drops the connection
pub struct LoggingAcceptHook;

#[async_trait]
impl AcceptHook for LoggingAcceptHook {
    async fn on_accept(&self, conn: Arc<ManagedConnection>, port: u16) -> Result<()> {
        info!(
            "Accepted {} on port {} (no accept hook attached, dropping)",
            conn.info(),
            port
        );
        conn.kill().await;
        Ok(())
    }
}
