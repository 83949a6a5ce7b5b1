//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, timing and self-connection
//! detection.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from [`crate::config::LoggingConfig`]
//! - **Metrics**: Thread-safe observability counters
//! - **Nonce Cache**: TTL-bounded set of connection nonces this node announced
//! - **Time**: UNIX clock helpers
//! - **Timeout**: Session and runtime timer defaults

pub mod logging;
pub mod metrics;
pub mod nonce_cache;
pub mod time;
pub mod timeout;

pub use nonce_cache::NonceCache;
