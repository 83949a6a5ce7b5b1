//! # Transport Layer
//!
//! Sockets, sessions and the node runtime.
//!
//! ## Components
//! - **Session**: drives one stream through the codec and handshake machine
//! - **Activity**: read-activity tracking behind the session timers
//! - **Registry**: inbound/outbound session lists, reaping, shutdown kill
//! - **Node**: TCP listener on port 8555, bootstrap dialer, periodic reaper

pub mod activity;
pub mod node;
pub mod registry;
pub mod session;
