//! Per-connection driver.
//!
//! A [`Session`] owns one byte stream, frames it with [`FrameCodec`] and feeds
//! every frame, fault and timer expiry to its [`Handshake`]. The machine's
//! actions are carried out here: writes, timer resets, dispatch to
//! collaborators and the final close.
//!
//! The driver is generic over the stream so the same code runs on TCP sockets
//! and on in-memory duplex pipes in tests.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, Sleep};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::core::codec::{FrameCodec, Inbound};
use crate::core::frame::Frame;
use crate::core::version::VersionPayload;
use crate::error::ProtocolError;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::{
    Action, CloseReason, Event, Handshake, HandshakeContext, HandshakePolicy,
};
use crate::transport::activity::ActivityStream;
use crate::transport::registry::PeerHandle;
use crate::utils::metrics::global_metrics;
use crate::utils::nonce_cache::NonceCache;
use crate::utils::time::unix_now;

/// Node-wide pieces every session needs.
#[derive(Clone)]
pub struct SessionContext {
    pub policy: HandshakePolicy,
    pub own_nonces: Arc<Mutex<NonceCache>>,
    pub dispatcher: Dispatcher,
    pub max_payload_size: usize,
}

pub struct Session<S> {
    framed: Framed<ActivityStream<S>, FrameCodec>,
    handshake: Handshake,
    handle: Arc<PeerHandle>,
    ctx: SessionContext,
    timer: Pin<Box<Sleep>>,
    /// Length of the armed timer and when its countdown last restarted
    timer_period: Duration,
    timer_started: Instant,
    pending: Vec<Action>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Session for an accepted stream; waits for the peer's `version`.
    pub fn inbound(stream: S, handle: Arc<PeerHandle>, ctx: SessionContext) -> Self {
        let (handshake, actions) = Handshake::inbound(ctx.policy);
        Self::with_handshake(stream, handle, ctx, handshake, actions)
    }

    /// Session for a dialed stream; announces `local` first.
    pub fn outbound(
        stream: S,
        handle: Arc<PeerHandle>,
        ctx: SessionContext,
        local: &VersionPayload,
    ) -> Self {
        let (handshake, actions) = Handshake::outbound(ctx.policy, local);
        Self::with_handshake(stream, handle, ctx, handshake, actions)
    }

    fn with_handshake(
        stream: S,
        handle: Arc<PeerHandle>,
        ctx: SessionContext,
        handshake: Handshake,
        actions: Vec<Action>,
    ) -> Self {
        global_metrics().connection_established();
        Self {
            framed: Framed::new(
                ActivityStream::new(stream),
                FrameCodec::new(ctx.max_payload_size),
            ),
            handshake,
            handle,
            timer: Box::pin(tokio::time::sleep(ctx.policy.handshake_timeout)),
            timer_period: ctx.policy.handshake_timeout,
            timer_started: Instant::now(),
            ctx,
            pending: actions,
        }
    }

    /// Drive the session until it closes and report why.
    #[instrument(skip(self), fields(peer = %self.handle.addr(), direction = %self.handshake.direction()))]
    pub async fn run(mut self) -> CloseReason {
        loop {
            if let Some(reason) = self.apply_pending().await {
                return reason;
            }

            let event = tokio::select! {
                _ = self.handle.killed() => {
                    self.pending = self.handshake.kill(false);
                    continue;
                }
                _ = self.timer.as_mut() => {
                    if self.extend_after_activity() {
                        continue;
                    }
                    Event::TimerFired
                }
                item = self.framed.next() => match item {
                    Some(Ok(Inbound::Frame(frame))) => {
                        global_metrics().frame_received(frame.payload.len() as u64);
                        debug!(command = %frame.command, len = frame.payload.len(), "Frame received");
                        Event::Frame(frame)
                    }
                    Some(Ok(Inbound::Dropped(fault))) => {
                        global_metrics().frame_dropped();
                        Event::Fault(fault)
                    }
                    Some(Err(ProtocolError::Io(e))) => {
                        debug!(error = %e, "Stream error");
                        self.pending = self.handshake.kill(true);
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Unrecoverable framing error");
                        self.pending = self.handshake.kill(false);
                        continue;
                    }
                    None => {
                        self.pending = self.handshake.kill(true);
                        continue;
                    }
                },
            };

            let now = match unix_now() {
                Ok(now) => now,
                Err(e) => {
                    error!(error = %e, "Cannot read system clock");
                    self.pending = self.handshake.kill(false);
                    continue;
                }
            };

            self.pending = {
                let nonces = self
                    .ctx
                    .own_nonces
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                self.handshake.handle(
                    event,
                    HandshakeContext {
                        now,
                        own_nonces: &nonces,
                    },
                )
            };
        }
    }

    /// Carry out queued actions in order. Returns the close reason once the
    /// machine has asked for the socket to go.
    async fn apply_pending(&mut self) -> Option<CloseReason> {
        let actions = std::mem::take(&mut self.pending);
        for action in actions {
            match action {
                Action::Send(frame) => {
                    if let Err(e) = self.send(frame).await {
                        warn!(error = %e, "Write failed");
                        self.pending = self.handshake.kill(true);
                        return None;
                    }
                }
                Action::ArmTimer(after) => self.arm_timer(Instant::now(), after),
                Action::Established => {
                    global_metrics().handshake_success();
                    self.handle.mark_established();
                    if let Some(peer) = self.handshake.peer() {
                        info!(version = %peer.peer, heights = ?peer.heights, "Session established");
                    } else {
                        info!("Session established");
                    }
                }
                Action::Deliver(frame) => {
                    if let Err(e) = self.deliver(frame).await {
                        warn!(error = %e, "Reply write failed");
                        self.pending = self.handshake.kill(true);
                        return None;
                    }
                }
                Action::Close(reason) => {
                    self.close(&reason).await;
                    return Some(reason);
                }
            }
        }
        None
    }

    fn arm_timer(&mut self, from: Instant, period: Duration) {
        self.timer_period = period;
        self.timer_started = from;
        self.timer.as_mut().reset(from + period);
    }

    /// Bytes that have not completed a frame yet still count as traffic.
    /// Restarts the armed countdown from the last read, if there was one.
    fn extend_after_activity(&mut self) -> bool {
        match self.framed.get_ref().last_read() {
            Some(at) if at > self.timer_started => {
                self.arm_timer(at, self.timer_period);
                true
            }
            _ => false,
        }
    }

    async fn send(&mut self, frame: Frame) -> crate::error::Result<()> {
        let len = frame.encoded_len() as u64;
        self.framed.send(frame).await?;
        global_metrics().frame_sent(len);
        Ok(())
    }

    /// Hand an established-state frame to its collaborator and write any reply.
    async fn deliver(&mut self, frame: Frame) -> crate::error::Result<()> {
        match self.ctx.dispatcher.dispatch(&frame) {
            Ok(Some(reply)) => self.send(reply).await?,
            Ok(None) => {}
            Err(ProtocolError::UnexpectedMessage) => {
                debug!(command = %frame.command, "No handler registered; frame dropped");
            }
            Err(e) => warn!(command = %frame.command, error = %e, "Handler failed"),
        }
        Ok(())
    }

    async fn close(&mut self, reason: &CloseReason) {
        if let Err(e) = self.framed.close().await {
            debug!(error = %e, "Error while closing stream");
        }
        self.handle.mark_dead();

        let metrics = global_metrics();
        metrics.connection_closed();
        if reason.is_handshake_failure() {
            metrics.handshake_failed();
        }

        if reason.is_automatic() {
            info!("Peer disconnected");
        } else {
            info!(%reason, "Disconnected from peer");
        }
    }
}
