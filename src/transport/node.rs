//! TCP node runtime.
//!
//! Accepts inbound peers, dials bootstrap peers, sweeps dead sessions on a
//! fixed interval and shuts down gracefully on Ctrl-C or an external signal.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::config::NodeConfig;
use crate::core::heights::DataHeights;
use crate::core::version::{PeerVersion, VersionPayload};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::{Direction, HandshakePolicy};
use crate::store::HeightSource;
use crate::transport::registry::{ConnectionRegistry, PeerHandle};
use crate::transport::session::{Session, SessionContext};
use crate::utils::metrics::global_metrics;
use crate::utils::nonce_cache::NonceCache;
use crate::utils::time::unix_now_u32;

const OWN_NONCE_CAPACITY: usize = 10_000;

/// A peer-to-peer node: listener, dialer, reaper.
///
/// Cloning is cheap; clones share the registry, nonce cache and dispatcher.
#[derive(Clone)]
pub struct Node {
    config: Arc<NodeConfig>,
    registry: Arc<ConnectionRegistry>,
    own_nonces: Arc<Mutex<NonceCache>>,
    dispatcher: Dispatcher,
    heights: Arc<dyn HeightSource>,
}

impl Node {
    /// Build a node from a validated configuration.
    pub fn new(config: NodeConfig, heights: Arc<dyn HeightSource>) -> Result<Self> {
        config.validate_strict()?;
        let own_nonces = NonceCache::with_settings(config.handshake.nonce_ttl, OWN_NONCE_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(ConnectionRegistry::new()),
            own_nonces: Arc::new(Mutex::new(own_nonces)),
            dispatcher: Dispatcher::new(),
            heights,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Register handlers here before calling [`run`](Self::run).
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Nonces announced by outbound sessions that are still running.
    pub fn outstanding_nonces(&self) -> usize {
        self.own_nonces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.config.server.listen_address).await?;
        info!(address = %listener.local_addr()?, "Listening for peers");
        Ok(listener)
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.run_with_shutdown(shutdown_rx).await
    }

    /// Run until a message arrives on `shutdown_rx` (or its sender is dropped).
    pub async fn run_with_shutdown(self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Serve on an already bound listener.
    #[instrument(skip(self, listener, shutdown_rx), fields(address = ?listener.local_addr().ok()))]
    pub async fn serve(self, listener: TcpListener, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        for peer in self.config.peers.bootstrap.iter().cloned() {
            let node = self.clone();
            tokio::spawn(async move {
                if let Err(e) = node.connect(&peer).await {
                    error!(peer = %peer, error = %e, "Failed to connect to bootstrap peer");
                }
            });
        }

        let mut reaper = tokio::time::interval(self.config.peers.reap_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    self.shutdown().await;
                    return Ok(());
                }

                _ = reaper.tick() => {
                    let reaped = self.registry.reap_dead();
                    debug!(
                        reaped,
                        inbound = self.registry.inbound_count(),
                        outbound = self.registry.outbound_count(),
                        "Reaper pass"
                    );
                    global_metrics().log_metrics();
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => self.accept(stream, addr),
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        if self.registry.inbound_count() >= self.config.server.max_connections {
            warn!(peer = %addr, limit = self.config.server.max_connections, "Connection limit reached; refusing peer");
            return;
        }
        info!(peer = %addr, "Inbound connection");
        let handle = self.registry.register(addr, Direction::Inbound);
        self.spawn_session(stream, handle, None);
    }

    /// Dial `addr` and start an outbound session announcing our version.
    #[instrument(skip(self))]
    pub async fn connect(&self, addr: &str) -> Result<Arc<PeerHandle>> {
        let stream = TcpStream::connect(addr).await?;
        let peer_addr = stream.peer_addr()?;
        info!(peer = %peer_addr, "Outbound connection");

        let local = self.local_version()?;
        let handle = self.registry.register(peer_addr, Direction::Outbound);
        self.spawn_session(stream, Arc::clone(&handle), Some(local));
        Ok(handle)
    }

    /// The `version` payload for a new outbound session, with a fresh nonce
    /// recorded in the own-nonce cache.
    pub fn local_version(&self) -> Result<VersionPayload> {
        let [major, minor, patch, revision] = self.config.handshake.software_version;
        let nonce = self
            .own_nonces
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_LOCK_POISONED.to_string()))?
            .issue();
        let heights: Option<DataHeights> = self
            .config
            .handshake
            .announce_heights
            .then(|| self.heights.current_heights());

        Ok(VersionPayload {
            peer: PeerVersion {
                major,
                minor,
                patch,
                revision,
                timestamp: unix_now_u32()?,
                nonce,
            },
            heights,
        })
    }

    /// Shared pieces handed to every session.
    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            policy: HandshakePolicy::from(&self.config.handshake),
            own_nonces: Arc::clone(&self.own_nonces),
            dispatcher: self.dispatcher.clone(),
            max_payload_size: self.config.transport.max_payload_size,
        }
    }

    fn spawn_session<S>(&self, stream: S, handle: Arc<PeerHandle>, local: Option<VersionPayload>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ctx = self.session_context();
        let registry = Arc::clone(&self.registry);
        let own_nonces = Arc::clone(&self.own_nonces);
        let announced = local.as_ref().map(|version| version.peer.nonce);
        let span = tracing::info_span!("session", id = handle.id());

        tokio::spawn(
            async move {
                let id = handle.id();
                let session = match local {
                    Some(version) => Session::outbound(stream, handle, ctx, &version),
                    None => Session::inbound(stream, handle, ctx),
                };
                let reason = session.run().await;
                debug!(%reason, "Session finished");
                // Only outstanding handshakes need their nonce remembered
                if let Some(nonce) = announced {
                    own_nonces
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .forget(&nonce);
                }
                registry.deregister(id);
            }
            .instrument(span),
        );
    }

    async fn shutdown(&self) {
        info!("Shutting down node. Waiting for sessions to close...");
        self.registry.kill_all();

        let timeout = tokio::time::sleep(self.config.server.shutdown_timeout);
        tokio::pin!(timeout);

        loop {
            tokio::select! {
                _ = &mut timeout => {
                    warn!(remaining = self.registry.len(), "Shutdown timeout reached, forcing exit");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    if self.registry.is_empty() {
                        info!("All sessions closed, shutting down");
                        break;
                    }
                    debug!(sessions = self.registry.len(), "Waiting for sessions to close");
                }
            }
        }
    }
}
