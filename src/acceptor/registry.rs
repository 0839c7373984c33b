//! Acceptor Registry
//!
//! An injectable table of live acceptors keyed by port, so tests and
//! embedding applications can run independent registries instead of sharing
//! a process-wide singleton. All mutating operations serialize on one
//! registry-wide lock; lookups take the read side and always observe a
//! consistent snapshot of the table.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::port::PortAcceptor;
use crate::config::Config;
use crate::connection::{AcceptHook, ConnectionFactory, LoggingAcceptHook};
use crate::{Error, Result};

/// Table of `port -> PortAcceptor`, at most one acceptor per port
pub struct AcceptorRegistry {
    bind_host: IpAddr,
    acceptors: RwLock<HashMap<u16, Arc<PortAcceptor>>>,
}

impl AcceptorRegistry {
    /// Registry binding acceptors on the given host address
    pub fn new(bind_host: IpAddr) -> Self {
        Self {
            bind_host,
            acceptors: RwLock::new(HashMap::new()),
        }
    }

    /// Registry using the configured bind host
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.server.bind_host)
    }

    /// Start an acceptor on `port` with the default accept hook (logs and
    /// drops). Attach a real hook afterwards through the returned acceptor
    /// or [`get`](Self::get).
    ///
    /// Fails with [`Error::PortInUse`] if this registry already has an
    /// acceptor for `port`, or [`Error::BindFailure`] if the socket cannot
    /// be bound. The duplicate check and the registration are atomic with
    /// respect to concurrent `start`/`stop` calls.
    pub async fn start<F>(&self, port: u16, factory: F) -> Result<Arc<PortAcceptor>>
    where
        F: ConnectionFactory,
    {
        self.start_with_hook(port, factory, Arc::new(LoggingAcceptHook))
            .await
    }

    /// Start an acceptor with the accept hook already attached, so no
    /// early connection can slip past it.
    pub async fn start_with_hook<F>(
        &self,
        port: u16,
        factory: F,
        hook: Arc<dyn AcceptHook>,
    ) -> Result<Arc<PortAcceptor>>
    where
        F: ConnectionFactory,
    {
        let mut table = self.acceptors.write().await;
        if table.contains_key(&port) {
            return Err(Error::PortInUse(port));
        }

        let acceptor = PortAcceptor::bind(self.bind_host, port, Arc::new(factory), hook).await?;
        table.insert(port, Arc::clone(&acceptor));
        debug!("Registered acceptor for port {}", port);
        Ok(acceptor)
    }

    /// Stop and deregister the acceptor for `port`, waiting until its task
    /// has fully exited. Returns false (no-op) if no acceptor is registered.
    pub async fn stop(&self, port: u16) -> bool {
        let mut table = self.acceptors.write().await;
        match table.remove(&port) {
            Some(acceptor) => {
                acceptor.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every registered acceptor and clear the table. Safe to call
    /// with zero acceptors; when it returns, no acceptor task is running.
    pub async fn stop_all(&self) {
        let mut table = self.acceptors.write().await;
        let count = table.len();
        for (_, acceptor) in table.drain() {
            acceptor.stop().await;
        }
        if count > 0 {
            info!("Stopped {} acceptor(s)", count);
        }
    }

    /// The acceptor for `port`, if one is registered
    pub async fn get(&self, port: u16) -> Option<Arc<PortAcceptor>> {
        self.acceptors.read().await.get(&port).cloned()
    }

    /// Ports with a registered acceptor
    pub async fn ports(&self) -> Vec<u16> {
        self.acceptors.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.acceptors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.acceptors.read().await.is_empty()
    }
}

impl Default for AcceptorRegistry {
    fn default() -> Self {
        Self::new(IpAddr::from([127, 0, 0, 1]))
    }
}
