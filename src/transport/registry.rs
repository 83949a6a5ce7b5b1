//! Live-session bookkeeping.
//!
//! The registry keeps non-owning handles to every session so the node can
//! enumerate, reap and shut them down. Each session task owns its socket; the
//! handle only carries identity, a liveness flag and a kill switch.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::handshake::Direction;

/// Shared view of one session.
#[derive(Debug)]
pub struct PeerHandle {
    id: u64,
    addr: SocketAddr,
    direction: Direction,
    alive: AtomicBool,
    established: AtomicBool,
    kill: CancellationToken,
}

impl PeerHandle {
    fn new(id: u64, addr: SocketAddr, direction: Direction) -> Self {
        Self {
            id,
            addr,
            direction,
            alive: AtomicBool::new(true),
            established: AtomicBool::new(false),
            kill: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    pub(crate) fn mark_established(&self) {
        self.established.store(true, Ordering::Release);
    }

    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Ask the owning session to close locally.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    pub fn is_kill_requested(&self) -> bool {
        self.kill.is_cancelled()
    }

    /// Resolves once [`kill`](Self::kill) has been called.
    pub async fn killed(&self) {
        self.kill.cancelled().await
    }
}

#[derive(Debug, Default)]
struct Peers {
    inbound: Vec<Arc<PeerHandle>>,
    outbound: Vec<Arc<PeerHandle>>,
}

impl Peers {
    fn list_mut(&mut self, direction: Direction) -> &mut Vec<Arc<PeerHandle>> {
        match direction {
            Direction::Inbound => &mut self.inbound,
            Direction::Outbound => &mut self.outbound,
        }
    }
}

/// Inbound and outbound session lists behind one lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    peers: Mutex<Peers>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves the lists consistent, so a panic elsewhere
    // does not invalidate them.
    fn lock(&self) -> MutexGuard<'_, Peers> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a session and hand back its handle.
    pub fn register(&self, addr: SocketAddr, direction: Direction) -> Arc<PeerHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(PeerHandle::new(id, addr, direction));
        self.lock().list_mut(direction).push(Arc::clone(&handle));
        debug!(id, peer = %addr, %direction, "Session registered");
        handle
    }

    /// Remove a session. Returns false if it was already gone.
    pub fn deregister(&self, id: u64) -> bool {
        let mut guard = self.lock();
        let peers = &mut *guard;
        for list in [&mut peers.inbound, &mut peers.outbound] {
            if let Some(pos) = list.iter().position(|h| h.id == id) {
                list.swap_remove(pos);
                debug!(id, "Session deregistered");
                return true;
            }
        }
        false
    }

    /// Drop every handle whose session has died. Returns how many went.
    pub fn reap_dead(&self) -> usize {
        let mut peers = self.lock();
        let before = peers.inbound.len() + peers.outbound.len();
        peers.inbound.retain(|h| h.is_alive());
        peers.outbound.retain(|h| h.is_alive());
        let reaped = before - (peers.inbound.len() + peers.outbound.len());
        if reaped > 0 {
            debug!(reaped, "Reaped dead sessions");
        }
        reaped
    }

    /// Signal every live session to close.
    pub fn kill_all(&self) {
        let peers = self.lock();
        let count = peers.inbound.len() + peers.outbound.len();
        for handle in peers.inbound.iter().chain(peers.outbound.iter()) {
            handle.kill();
        }
        info!(count, "Killing all sessions");
    }

    pub fn get(&self, id: u64) -> Option<Arc<PeerHandle>> {
        let peers = self.lock();
        peers
            .inbound
            .iter()
            .chain(peers.outbound.iter())
            .find(|h| h.id == id)
            .cloned()
    }

    pub fn inbound_count(&self) -> usize {
        self.lock().inbound.len()
    }

    pub fn outbound_count(&self) -> usize {
        self.lock().outbound.len()
    }

    pub fn len(&self) -> usize {
        let peers = self.lock();
        peers.inbound.len() + peers.outbound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of every session that completed its handshake and is still up.
    pub fn established(&self) -> Vec<Arc<PeerHandle>> {
        let peers = self.lock();
        peers
            .inbound
            .iter()
            .chain(peers.outbound.iter())
            .filter(|h| h.is_alive() && h.is_established())
            .cloned()
            .collect()
    }
}
