//! Version/versionack handshake as an explicit state machine.
//!
//! ```text
//! inbound:  AwaitingVersion    --version ok-->    Established --> Closed
//! outbound: AwaitingVersionAck --versionack-->    Established --> Closed
//! ```
//!
//! [`Handshake::handle`] is a pure function of the current state and one
//! [`Event`]; it returns the [`Action`]s the transport must carry out. No
//! socket or timer is touched here, so every transition is testable directly.
//!
//! Timers: both timers measure silence, not session age. A fresh session arms
//! the handshake timer and every frame or fault before establishment re-arms
//! it; on establishment it is replaced by the idle timer, which later traffic
//! re-arms the same way. The transport also extends whichever timer is armed
//! when raw bytes arrive that do not yet form a frame.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::HandshakeConfig;
use crate::core::frame::{Command, Frame, FrameFault};
use crate::core::version::VersionPayload;
use crate::error::{constants, ProtocolError};
use crate::utils::nonce_cache::NonceCache;
use crate::utils::timeout;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingVersion,
    AwaitingVersionAck,
    Established,
    Closed,
}

/// Timer lengths and clock tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakePolicy {
    pub handshake_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_clock_skew_secs: u64,
}

impl Default for HandshakePolicy {
    fn default() -> Self {
        Self {
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            idle_timeout: timeout::IDLE_TIMEOUT,
            max_clock_skew_secs: timeout::MAX_CLOCK_SKEW_SECS,
        }
    }
}

impl From<&HandshakeConfig> for HandshakePolicy {
    fn from(config: &HandshakeConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout,
            idle_timeout: config.idle_timeout,
            max_clock_skew_secs: config.max_clock_skew_secs,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    HandshakeTimeout,
    IdleTimeout,
    VersionTooShort(usize),
    MalformedVersion(String),
    ClockSkew(i64),
    SelfConnection,
    /// The remote end closed the stream.
    PeerDisconnected,
    /// Closed by this node (shutdown, registry kill).
    Local,
}

impl CloseReason {
    /// True when the peer, not this node, ended the session.
    pub fn is_automatic(&self) -> bool {
        matches!(self, CloseReason::PeerDisconnected)
    }

    /// True when the session died before completing the handshake because of
    /// something the peer sent or failed to send.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            CloseReason::HandshakeTimeout
                | CloseReason::VersionTooShort(_)
                | CloseReason::MalformedVersion(_)
                | CloseReason::ClockSkew(_)
                | CloseReason::SelfConnection
        )
    }
}

impl From<CloseReason> for ProtocolError {
    fn from(reason: CloseReason) -> Self {
        match reason {
            CloseReason::HandshakeTimeout | CloseReason::IdleTimeout => {
                ProtocolError::ConnectionTimeout
            }
            CloseReason::VersionTooShort(len) => ProtocolError::VersionTooShort(len),
            CloseReason::MalformedVersion(msg) => ProtocolError::MalformedPayload(msg),
            CloseReason::ClockSkew(skew) => ProtocolError::ClockSkew(skew),
            CloseReason::SelfConnection => ProtocolError::SelfConnection,
            CloseReason::PeerDisconnected | CloseReason::Local => ProtocolError::ConnectionClosed,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::HandshakeTimeout => f.write_str("handshake timed out"),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
            CloseReason::VersionTooShort(len) => write!(f, "version payload too short ({len} bytes)"),
            CloseReason::MalformedVersion(msg) => write!(f, "malformed version payload: {msg}"),
            CloseReason::ClockSkew(skew) => write!(f, "clock skew of {skew}s"),
            CloseReason::SelfConnection => f.write_str("connection to self"),
            CloseReason::PeerDisconnected => f.write_str("peer disconnected"),
            CloseReason::Local => f.write_str("closed locally"),
        }
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A checksum-verified frame.
    Frame(Frame),
    /// The codec discarded bytes.
    Fault(FrameFault),
    /// The currently armed timer fired.
    TimerFired,
}

/// What the transport must do next, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(Frame),
    /// Replace the active timer.
    ArmTimer(Duration),
    /// The session has just been promoted.
    Established,
    /// Established-state payload for the collaborators behind the dispatcher.
    Deliver(Frame),
    /// Close the socket and mark the session dead.
    Close(CloseReason),
}

/// Per-call inputs that live outside the session.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeContext<'a> {
    /// Local UNIX time in seconds.
    pub now: u64,
    /// Nonces this node has announced.
    pub own_nonces: &'a NonceCache,
}

/// Handshake state for one connection.
#[derive(Debug, Clone)]
pub struct Handshake {
    direction: Direction,
    state: HandshakeState,
    policy: HandshakePolicy,
    peer: Option<VersionPayload>,
}

impl Handshake {
    /// Session for an accepted socket.
    pub fn inbound(policy: HandshakePolicy) -> (Self, Vec<Action>) {
        let hs = Self {
            direction: Direction::Inbound,
            state: HandshakeState::AwaitingVersion,
            policy,
            peer: None,
        };
        let actions = vec![Action::ArmTimer(policy.handshake_timeout)];
        (hs, actions)
    }

    /// Session for a socket we dialed; announces `local` immediately.
    pub fn outbound(policy: HandshakePolicy, local: &VersionPayload) -> (Self, Vec<Action>) {
        let hs = Self {
            direction: Direction::Outbound,
            state: HandshakeState::AwaitingVersionAck,
            policy,
            peer: None,
        };
        let actions = vec![
            Action::Send(local.to_frame()),
            Action::ArmTimer(policy.handshake_timeout),
        ];
        (hs, actions)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    pub fn is_closed(&self) -> bool {
        self.state == HandshakeState::Closed
    }

    /// What the peer declared, once a valid `version` has been accepted.
    pub fn peer(&self) -> Option<&VersionPayload> {
        self.peer.as_ref()
    }

    /// Advance the machine by one event.
    pub fn handle(&mut self, event: Event, ctx: HandshakeContext<'_>) -> Vec<Action> {
        if self.is_closed() {
            return Vec::new();
        }
        match event {
            Event::Frame(frame) => self.on_frame(frame, ctx),
            Event::Fault(fault) => self.on_fault(fault),
            Event::TimerFired => self.on_timer(),
        }
    }

    /// Close the session. `automatic` means the peer went away first.
    ///
    /// Calling this on a closed session does nothing.
    pub fn kill(&mut self, automatic: bool) -> Vec<Action> {
        let reason = if automatic {
            CloseReason::PeerDisconnected
        } else {
            CloseReason::Local
        };
        self.close(reason)
    }

    fn close(&mut self, reason: CloseReason) -> Vec<Action> {
        if self.is_closed() {
            return Vec::new();
        }
        self.state = HandshakeState::Closed;
        vec![Action::Close(reason)]
    }

    /// Timer length for the current state.
    fn inactivity_limit(&self) -> Duration {
        if self.is_established() {
            self.policy.idle_timeout
        } else {
            self.policy.handshake_timeout
        }
    }

    /// Traffic arrived; restart the silence countdown.
    fn rearm(&self) -> Vec<Action> {
        vec![Action::ArmTimer(self.inactivity_limit())]
    }

    fn on_fault(&mut self, fault: FrameFault) -> Vec<Action> {
        warn!(%fault, "Peer sent invalid frame");
        self.rearm()
    }

    fn on_timer(&mut self) -> Vec<Action> {
        if self.is_established() {
            warn!(direction = %self.direction, "Peer idle too long");
            self.close(CloseReason::IdleTimeout)
        } else {
            tracing::error!(direction = %self.direction, "Peer silent during handshake; timed out");
            self.close(CloseReason::HandshakeTimeout)
        }
    }

    fn on_frame(&mut self, frame: Frame, ctx: HandshakeContext<'_>) -> Vec<Action> {
        match (self.state, frame.command) {
            (HandshakeState::AwaitingVersion, Command::Version) => {
                let peer = match self.accept_version(&frame.payload, ctx) {
                    Ok(peer) => peer,
                    Err(reason) => return self.close(reason),
                };
                info!(version = %peer.peer, "Peer sent data successfully");
                self.peer = Some(peer);
                self.establish(vec![Action::Send(Frame::version_ack())])
            }
            (HandshakeState::AwaitingVersionAck, Command::VersionAck) => {
                info!("Peer acknowledged connection");
                self.establish(Vec::new())
            }
            (HandshakeState::AwaitingVersionAck, Command::Version) => {
                // The dialed side may announce too; the same checks apply
                match self.accept_version(&frame.payload, ctx) {
                    Ok(peer) => {
                        self.peer = Some(peer);
                        self.rearm()
                    }
                    Err(reason) => self.close(reason),
                }
            }
            (HandshakeState::Established, Command::Version) => {
                warn!("{}", constants::ERR_UNEXPECTED_VERSION);
                self.rearm()
            }
            (HandshakeState::Established, Command::VersionAck) => {
                debug!("Duplicate versionack ignored");
                self.rearm()
            }
            (HandshakeState::Established, _) => vec![
                Action::ArmTimer(self.policy.idle_timeout),
                Action::Deliver(frame),
            ],
            (HandshakeState::AwaitingVersion, Command::VersionAck) => {
                warn!("{}", constants::ERR_UNEXPECTED_VERSIONACK);
                self.rearm()
            }
            (state, command) => {
                warn!(?state, %command, "Frame before handshake completed; dropped");
                self.rearm()
            }
        }
    }

    fn establish(&mut self, mut actions: Vec<Action>) -> Vec<Action> {
        self.state = HandshakeState::Established;
        actions.push(Action::ArmTimer(self.policy.idle_timeout));
        actions.push(Action::Established);
        actions
    }

    /// Parse and vet a peer's `version` payload.
    fn accept_version(
        &self,
        payload: &[u8],
        ctx: HandshakeContext<'_>,
    ) -> Result<VersionPayload, CloseReason> {
        let version = VersionPayload::decode(payload).map_err(|e| match e {
            ProtocolError::VersionTooShort(len) => {
                warn!(len, "Peer sent invalid version payload; closing connection");
                CloseReason::VersionTooShort(len)
            }
            other => {
                warn!(error = %other, "Peer sent malformed version payload; closing connection");
                CloseReason::MalformedVersion(other.to_string())
            }
        })?;

        if ctx.own_nonces.is_own(&version.peer.nonce) {
            warn!(nonce = %version.peer.nonce, "Connected to self; closing connection");
            return Err(CloseReason::SelfConnection);
        }

        let skew = version.peer.clock_skew(ctx.now);
        if skew.unsigned_abs() >= self.policy.max_clock_skew_secs {
            warn!(
                skew,
                max = self.policy.max_clock_skew_secs,
                "Peer clock skew too large; closing connection"
            );
            return Err(CloseReason::ClockSkew(skew));
        }

        Ok(version)
    }
}
