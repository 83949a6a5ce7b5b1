//! Cache of connection nonces this node has announced.
//!
//! Every outbound `version` carries a fresh nonce. If one of those nonces comes
//! back in a handshake, the socket loops back to this process and must be
//! killed. Entries expire after a TTL so the cache stays bounded.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::core::version::ConnectionNonce;

/// TTL-based set of our own nonces with O(1) FIFO eviction
#[derive(Debug)]
pub struct NonceCache {
    /// Nonce -> when it was announced
    entries: HashMap<ConnectionNonce, Instant>,
    /// Insertion order for FIFO eviction
    insertion_order: VecDeque<ConnectionNonce>,
    ttl: Duration,
    max_entries: usize,
}

impl NonceCache {
    /// Default TTL: 5 minutes (longer than the handshake timeout)
    /// Default max entries: 10,000
    pub fn new() -> Self {
        Self::with_settings(Duration::from_secs(300), 10_000)
    }

    pub fn with_settings(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Generate a nonce not currently outstanding and remember it.
    pub fn issue(&mut self) -> ConnectionNonce {
        self.cleanup_expired();
        let mut nonce = ConnectionNonce::random();
        while self.entries.contains_key(&nonce) {
            nonce = ConnectionNonce::random();
        }
        self.remember(nonce);
        nonce
    }

    /// Record a nonce announced by this node.
    #[instrument(skip(self))]
    pub fn remember(&mut self, nonce: ConnectionNonce) {
        if self.entries.len() >= self.max_entries {
            let to_remove = self.entries.len() - self.max_entries + 1;
            self.remove_oldest_entries(to_remove);
        }
        if self.entries.insert(nonce, Instant::now()).is_none() {
            self.insertion_order.push_back(nonce);
        }
        debug!(%nonce, "Own nonce recorded");
    }

    /// True if `nonce` was announced by this node and has not expired.
    pub fn is_own(&self, nonce: &ConnectionNonce) -> bool {
        self.entries
            .get(nonce)
            .is_some_and(|added_at| added_at.elapsed() < self.ttl)
    }

    /// Forget a nonce once the session that announced it has ended.
    pub fn forget(&mut self, nonce: &ConnectionNonce) {
        if self.entries.remove(nonce).is_some() {
            self.insertion_order.retain(|n| n != nonce);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cleanup_expired(&mut self) {
        let now = Instant::now();
        let initial_count = self.entries.len();

        self.entries
            .retain(|_, added_at| now.duration_since(*added_at) < self.ttl);
        let entries = &self.entries;
        self.insertion_order.retain(|n| entries.contains_key(n));

        let removed = initial_count - self.entries.len();
        if removed > 0 {
            debug!("Cleaned up {} expired own nonces", removed);
        }
    }

    fn remove_oldest_entries(&mut self, count: usize) {
        for _ in 0..count {
            if let Some(nonce) = self.insertion_order.pop_front() {
                self.entries.remove(&nonce);
            }
        }
    }
}

impl Default for NonceCache {
    fn default() -> Self {
        Self::new()
    }
}
