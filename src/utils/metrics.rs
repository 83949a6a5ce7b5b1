//! Observability and Metrics
//!
//! Thread-safe counters for connections, handshakes, frames and
//! proof-of-work searches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for node transport operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections opened (inbound and outbound)
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Handshakes that ended in a kill
    pub handshakes_failed: AtomicU64,
    /// Frames decoded successfully
    pub frames_received: AtomicU64,
    /// Frames written
    pub frames_sent: AtomicU64,
    /// Frames discarded for bad header, checksum or command
    pub frames_dropped: AtomicU64,
    /// Payload bytes received in verified frames
    pub bytes_received: AtomicU64,
    /// Encoded bytes written
    pub bytes_sent: AtomicU64,
    /// Completed proof-of-work searches
    pub pow_searches: AtomicU64,
    /// Hashes computed by proof-of-work workers
    pub pow_hashes: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            pow_searches: AtomicU64::new(0),
            pow_hashes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self, payload_len: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(payload_len, Ordering::Relaxed);
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pow_search_completed(&self, hashes: u64) {
        self.pow_searches.fetch_add(1, Ordering::Relaxed);
        self.pow_hashes.fetch_add(hashes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            pow_searches: self.pow_searches.load(Ordering::Relaxed),
            pow_hashes: self.pow_hashes.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let s = self.snapshot();
        debug!(
            connections_total = s.connections_total,
            connections_active = s.connections_active,
            handshakes_success = s.handshakes_success,
            handshakes_failed = s.handshakes_failed,
            frames_received = s.frames_received,
            frames_sent = s.frames_sent,
            frames_dropped = s.frames_dropped,
            bytes_received = s.bytes_received,
            bytes_sent = s.bytes_sent,
            pow_searches = s.pow_searches,
            pow_hashes = s.pow_hashes,
            uptime_seconds = s.uptime_seconds,
            "Node metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub pow_searches: u64,
    pub pow_hashes: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Initialize metrics collection (call once at startup)
pub fn init_metrics() {
    let _ = global_metrics();
    info!("Metrics collection initialized");
}
