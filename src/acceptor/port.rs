//! Port Acceptor Implementation
//!
//! The accept loop selects between `listener.accept()` and a shutdown
//! signal, so stopping never needs the loopback self-connection trick the
//! original design used to unblock a blocking accept call. If a stop races
//! with an accept that has already produced a socket, the just-built
//! connection is killed instead of being handed to the hook.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::connection::{AcceptHook, ConnectionFactory};
use crate::{Error, Result};

/// Acceptor lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AcceptorState {
    /// Bound, accept-loop task not yet scheduled
    Created = 0,
    /// Accept loop live, blocked in accept or processing a socket
    Running = 1,
    /// Shutdown requested, loop winding down
    Stopping = 2,
    /// Loop exited and listening socket closed
    Stopped = 3,
}

impl From<u8> for AcceptorState {
    fn from(value: u8) -> Self {
        match value {
            0 => AcceptorState::Created,
            1 => AcceptorState::Running,
            2 => AcceptorState::Stopping,
            _ => AcceptorState::Stopped,
        }
    }
}

/// Owns one listening socket and its accept-loop task
pub struct PortAcceptor {
    port: u16,
    local_addr: SocketAddr,
    factory: Arc<dyn ConnectionFactory>,
    hook: RwLock<Arc<dyn AcceptHook>>,
    state: AtomicU8,
    awaiting_accept: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PortAcceptor {
    /// Bind the listening socket and launch the accept loop.
    ///
    /// A bind failure (port owned by another process) is fatal for this
    /// acceptor and reported as [`Error::BindFailure`]; it is never retried.
    pub(crate) async fn bind(
        host: IpAddr,
        port: u16,
        factory: Arc<dyn ConnectionFactory>,
        hook: Arc<dyn AcceptHook>,
    ) -> Result<Arc<Self>> {
        let addr = SocketAddr::new(host, port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::BindFailure { addr, source })?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        let acceptor = Arc::new(Self {
            port,
            local_addr,
            factory,
            hook: RwLock::new(hook),
            state: AtomicU8::new(AcceptorState::Created as u8),
            awaiting_accept: AtomicBool::new(false),
            shutdown_tx,
            task: Mutex::new(None),
        });

        let task = {
            let acceptor = Arc::clone(&acceptor);
            tokio::spawn(async move { acceptor.accept_loop(listener).await })
        };
        *acceptor.task.lock().expect("task lock poisoned") = Some(task);

        Ok(acceptor)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        // CAS so a stop that lands before the first iteration is not
        // clobbered back to Running.
        let _ = self.state.compare_exchange(
            AcceptorState::Created as u8,
            AcceptorState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        info!("Acceptor running on port {}", self.port);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.awaiting_accept.store(true, Ordering::SeqCst);
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    self.awaiting_accept.store(false, Ordering::SeqCst);
                    break;
                }
                accepted = listener.accept() => {
                    self.awaiting_accept.store(false, Ordering::SeqCst);
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Accepted socket from {} on port {}", peer, self.port);

                            let conn = match self.factory.build(stream) {
                                Ok(conn) => conn,
                                Err(e) => {
                                    warn!("Connection factory failed for {}: {}", peer, e);
                                    continue;
                                }
                            };

                            // A stop that raced with this accept wins: the
                            // connection is torn down, never handed out.
                            if *shutdown_rx.borrow() {
                                conn.kill().await;
                                break;
                            }

                            let hook = self
                                .hook
                                .read()
                                .expect("hook lock poisoned")
                                .clone();
                            if let Err(e) = hook.on_accept(conn, self.port).await {
                                warn!("Accept hook failed on port {}: {}", self.port, e);
                            }
                        }
                        Err(e) => {
                            // Transient (e.g. a broken incoming handshake);
                            // the acceptor keeps serving.
                            warn!("Failed to accept new connection on port {}: {}", self.port, e);
                        }
                    }
                }
            }
        }

        drop(listener);
        self.set_state(AcceptorState::Stopped);
        info!("Stopped acceptor on port {}", self.port);
    }

    /// Request shutdown and wait for the accept loop to fully exit. The
    /// listening socket is closed by the time this returns.
    pub async fn stop(&self) {
        // Only a live acceptor moves to Stopping; a second stop on an
        // already-stopped acceptor must not resurrect the state.
        for live in [AcceptorState::Created, AcceptorState::Running] {
            let _ = self.state.compare_exchange(
                live as u8,
                AcceptorState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
        // send_replace so the signal lands even if the loop task has not
        // subscribed yet (its first borrow check then sees it).
        self.shutdown_tx.send_replace(true);

        let task = self.task.lock().expect("task lock poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Replace the accept hook; connections accepted from now on go to the
    /// new hook.
    pub fn set_accept_hook(&self, hook: Arc<dyn AcceptHook>) {
        *self.hook.write().expect("hook lock poisoned") = hook;
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Actual bound address (relevant when port 0 was requested)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> AcceptorState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// Whether the loop is currently blocked in accept
    pub fn is_accepting(&self) -> bool {
        self.awaiting_accept.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: AcceptorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for PortAcceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAcceptor")
            .field("port", &self.port)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .finish()
    }
}
