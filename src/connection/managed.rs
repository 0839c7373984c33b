//! Managed Connection Implementation

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::handler::ConnectionHandler;
use super::output::OutputGuard;
use crate::{Error, Result};

/// Identity snapshot of a connection, for logging and bookkeeping
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connection({} {} -> {})",
            self.id, self.peer_addr, self.local_addr
        )
    }
}

/// Owns one socket's lifetime and runs its read/write activity as two
/// independent tasks driven by [`ConnectionHandler`] hooks.
///
/// `alive` becomes true exactly once via [`start`](Self::start) and false
/// exactly once via [`kill`](Self::kill); a killed connection cannot be
/// restarted. Teardown is cooperative: the kill signal cancels whichever
/// hook call is in flight, each loop drops its half of the stream on exit,
/// and the socket is closed once both halves are gone.
pub struct ManagedConnection {
    id: Uuid,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    handler: Arc<dyn ConnectionHandler>,
    started: AtomicBool,
    alive: AtomicBool,
    kill_tx: watch::Sender<bool>,
    output: OutputGuard,
    io: Mutex<Option<(OwnedReadHalf, OwnedWriteHalf)>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started_at: Instant,
}

impl ManagedConnection {
    /// Wrap an already-established stream (accepted or dialed)
    pub fn new(stream: TcpStream, handler: Arc<dyn ConnectionHandler>) -> Result<Arc<Self>> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (kill_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            id: Uuid::new_v4(),
            peer_addr,
            local_addr,
            handler,
            started: AtomicBool::new(false),
            alive: AtomicBool::new(false),
            kill_tx,
            output: OutputGuard::new(),
            io: Mutex::new(Some((read_half, write_half))),
            tasks: Mutex::new(Vec::new()),
            started_at: Instant::now(),
        }))
    }

    /// Dial a remote endpoint and wrap the resulting stream
    pub async fn connect(
        addr: SocketAddr,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(addr).await?;
        Self::new(stream, handler)
    }

    /// Run the setup hook, mark the connection alive and launch the reader
    /// and writer loops. Fails with `AlreadyRunning` on a second call; a
    /// killed connection stays dead. A failed setup leaves the connection
    /// never-alive and startable again, so the caller can retry.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }

        if let Err(e) = self.handler.setup(self).await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.alive.store(true, Ordering::SeqCst);

        let (read_half, write_half) = self
            .io
            .lock()
            .expect("io lock poisoned")
            .take()
            .ok_or(Error::NotRunning)?;

        debug!("Starting read/write loops for {}", self.info());

        let reader = {
            let conn = Arc::clone(self);
            tokio::spawn(async move { conn.read_loop(read_half).await })
        };
        let writer = {
            let conn = Arc::clone(self);
            tokio::spawn(async move { conn.write_loop(write_half).await })
        };

        let mut tasks = self.tasks.lock().expect("task lock poisoned");
        tasks.push(reader);
        tasks.push(writer);
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, read_half: OwnedReadHalf) {
        let mut io = BufReader::new(read_half);
        let mut kill_rx = self.kill_tx.subscribe();

        while self.is_alive() {
            tokio::select! {
                _ = kill_rx.changed() => break,
                result = self.handler.read_input(&self, &mut io) => match result {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) if e.is_fatal_for_loop() => {
                        debug!("Read stream for {} closed: {}", self.info(), e);
                        break;
                    }
                    Err(e) => {
                        warn!("Read hook error on {}: {}", self.info(), e);
                    }
                }
            }
        }

        drop(io);
        self.kill().await;
        debug!("Reader loop for {} exited", self.info());
    }

    async fn write_loop(self: Arc<Self>, mut write_half: OwnedWriteHalf) {
        let mut kill_rx = self.kill_tx.subscribe();

        while self.is_alive() {
            tokio::select! {
                _ = kill_rx.changed() => break,
                result = self.handler.write_output(&self, &mut write_half) => match result {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) if e.is_fatal_for_loop() => {
                        debug!("Write stream for {} closed: {}", self.info(), e);
                        break;
                    }
                    Err(e) => {
                        warn!("Write hook error on {}: {}", self.info(), e);
                    }
                }
            }
        }

        let _ = write_half.shutdown().await;
        drop(write_half);
        self.kill().await;
        debug!("Writer loop for {} exited", self.info());
    }

    /// Tear the connection down. Idempotent: only the first call runs the
    /// `on_kill` hook, closes the output guard and signals the loops; every
    /// later call is a no-op.
    pub async fn kill(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }

        debug!("Killing {}", self.info());
        self.handler.on_kill(self).await;
        self.output.close();
        self.kill_tx.send_replace(true);
    }

    /// Wait for both loops to exit. Safe to call after `kill`, or on a
    /// connection that was never started (returns immediately).
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("task lock poisoned");
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Kill and wait for teardown to finish
    pub async fn shutdown(&self) {
        self.kill().await;
        self.join().await;
    }

    /// Queue one outbound frame for the writer loop. Frames are written
    /// whole; concurrent callers never interleave partial writes. Returns
    /// false once the connection has been killed.
    pub fn queue_output(&self, frame: impl Into<Bytes>) -> bool {
        self.output.push(frame.into())
    }

    /// Await the next queued outbound frame; `None` after kill
    pub async fn next_output(&self) -> Option<Bytes> {
        self.output.next().await
    }

    /// The connection's output guard
    pub fn output(&self) -> &OutputGuard {
        &self.output
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            peer_addr: self.peer_addr,
            local_addr: self.local_addr,
        }
    }
}

impl fmt::Debug for ManagedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("alive", &self.is_alive())
            .finish()
    }
}
