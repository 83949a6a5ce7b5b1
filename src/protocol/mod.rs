//! # Peer Protocol
//!
//! The handshake state machine and the routing of established-session
//! payloads.
//!
//! ## Components
//! - **Handshake**: pure `(state, event) -> actions` version exchange
//! - **Dispatcher**: command-keyed handlers for `addresses`, `inventory`
//!   and `getdata`

pub mod dispatcher;
pub mod handshake;
