//! # Speak Protocol
//!
//! Peer-to-peer transport core for the Speak node.
//!
//! - [`core`]: wire frames, the stream codec and the `version` payload
//! - [`protocol`]: the handshake state machine and established-session dispatch
//! - [`transport`]: per-connection sessions, the connection registry and the
//!   TCP node runtime
//! - [`pow`]: the parallel proof-of-work nonce search
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speak_protocol::config::NodeConfig;
//! use speak_protocol::store::FixedHeights;
//! use speak_protocol::transport::node::Node;
//!
//! # async fn start() -> speak_protocol::error::Result<()> {
//! let node = Node::new(NodeConfig::default(), Arc::new(FixedHeights::default()))?;
//! node.run().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod pow;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod utils;

pub use crate::core::frame::{Command, Frame};
pub use crate::error::{ProtocolError, Result};
pub use crate::pow::{PowCoordinator, PowSolution};
pub use crate::transport::node::Node;
