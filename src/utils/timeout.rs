//! Timer defaults for sessions and the node runtime.

use std::time::Duration;

/// Time a fresh connection has to complete the version exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Inactivity limit once a session is established.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// How often dead sessions are purged from the registry.
pub const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum time to wait for sessions to close during shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest accepted difference between a peer's clock and ours, in seconds.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60 * 60;
