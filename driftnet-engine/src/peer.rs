//! One remote node's state, as seen by the local engine (§4.3, §3 "Peer state").

use std::time::{Duration, Instant};

use bytes::BufMut;
use driftnet_core::{Endpoint, Headers, NodeId};
use driftnet_wire::{PeerCodec, PeerFrame};
use futures::SinkExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::debug;

/// A peer silent this long triggers exactly one PING (§3, §9).
pub const PEER_EVASIVE: Duration = Duration::from_secs(10);
/// A peer silent this long is removed.
pub const PEER_EXPIRED: Duration = Duration::from_secs(30);
/// How often the engine sweeps peers for evasive/expired transitions.
pub const REAP_INTERVAL: Duration = Duration::from_millis(1000);

/// Bound on frames queued to a peer's forwarding task before `send` reports
/// [`PeerSendError::WouldBlock`] (§4.3 "send high-water mark").
const MAILBOX_CAPACITY: usize = 100 * PEER_EXPIRED.as_secs() as usize;

/// The liveness state machine flagged in §9 as "would be nicer as a state
/// machine" and implemented explicitly here (§3 `[FULL]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Fresh,
    Ready,
    Evasive,
    Expired,
}

/// An outbound send failure. Both variants mean the same thing to the
/// engine — disconnect and let the reap pass eventually remove the peer —
/// but are kept distinct for logging (§7).
#[derive(Debug, Error)]
pub enum PeerSendError {
    #[error("mailbox is full")]
    WouldBlock,
    #[error("mailbox is closed")]
    ChannelClosed,
}

struct Mailbox {
    frames: mpsc::Sender<PeerFrame>,
    forwarder: JoinHandle<()>,
}

/// A known remote node: its advertised identity plus everything the engine
/// needs to talk to it and judge its liveness.
pub struct Peer {
    pub id: NodeId,
    pub endpoint: Endpoint,
    pub name: String,
    pub headers: Headers,
    pub status: u8,
    pub state: PeerState,
    sent_sequence: u16,
    want_sequence: u16,
    evasive_at: Instant,
    expired_at: Instant,
    pending_ping: bool,
    mailbox: Option<Mailbox>,
}

impl Peer {
    /// A freshly discovered peer: not yet connected, not yet ready.
    pub fn new(id: NodeId, endpoint: Endpoint, now: Instant) -> Self {
        Self {
            id,
            endpoint,
            name: id.default_name(),
            headers: Headers::new(),
            status: 0,
            state: PeerState::Fresh,
            sent_sequence: 0,
            want_sequence: 1,
            evasive_at: now + PEER_EVASIVE,
            expired_at: now + PEER_EXPIRED,
            pending_ping: false,
            mailbox: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.mailbox.is_some()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, PeerState::Ready | PeerState::Evasive)
    }

    /// Open the outbound mailbox connection, idempotent. The identity frame
    /// (`0x01` plus our sixteen identity bytes) is written first, ahead of
    /// any `PeerCodec` frame, so the peer's single listening socket can
    /// demultiplex inbound connections by sender (§4.3).
    pub async fn connect(&mut self, local_id: NodeId) -> Result<(), PeerSendError> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = TcpStream::connect(self.endpoint.socket_addr())
            .await
            .map_err(|_| PeerSendError::ChannelClosed)?;

        let mut identity = bytes::BytesMut::with_capacity(17);
        identity.put_u8(0x01);
        identity.put_slice(local_id.as_bytes());
        use tokio::io::AsyncWriteExt;
        let mut stream = stream;
        stream
            .write_all(&identity)
            .await
            .map_err(|_| PeerSendError::ChannelClosed)?;

        let framed = Framed::new(stream, PeerCodec::new());
        let (frame_tx, frame_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let forwarder = tokio::spawn(forward(framed, frame_rx));

        self.mailbox = Some(Mailbox {
            frames: frame_tx,
            forwarder,
        });
        Ok(())
    }

    /// Close the channel, clear endpoint readiness. No attempt is made to
    /// flush a queued backlog — matching the linger-zero semantics of the
    /// spec's original transport (§4.3).
    pub fn disconnect(&mut self) {
        if let Some(mailbox) = self.mailbox.take() {
            mailbox.forwarder.abort();
        }
    }

    /// Stamp and transmit a frame. Never blocks: a full or closed mailbox
    /// disconnects the peer and surfaces the failure immediately (§4.3).
    pub fn send(&mut self, frame: PeerFrame) -> Result<(), PeerSendError> {
        let stamped = frame.with_sequence(self.sent_sequence);
        self.sent_sequence = next_sequence(self.sent_sequence);

        let Some(mailbox) = &self.mailbox else {
            return Err(PeerSendError::ChannelClosed);
        };

        match mailbox.frames.try_send(stamped) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.disconnect();
                Err(PeerSendError::WouldBlock)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.disconnect();
                Err(PeerSendError::ChannelClosed)
            }
        }
    }

    /// Push the liveness deadlines out and clear any pending ping. Called on
    /// every received frame, regardless of kind (§4.3).
    pub fn refresh(&mut self, now: Instant) {
        self.evasive_at = now + PEER_EVASIVE;
        self.expired_at = now + PEER_EXPIRED;
        self.pending_ping = false;
        if self.state == PeerState::Evasive {
            self.state = PeerState::Ready;
        }
    }

    /// HELLO resets the expected sequence; any other frame must match
    /// exactly or a gap has occurred (§3 invariant 4, §4.3).
    pub fn messages_lost(&mut self, frame: &PeerFrame) -> bool {
        if frame.is_hello() {
            self.want_sequence = 1;
            return false;
        }
        let expected = self.want_sequence;
        self.want_sequence = next_sequence(self.want_sequence);
        frame.sequence() != expected
    }

    /// Reap-pass transition: `Ready -> Evasive` sends exactly one PING per
    /// evasive window (§3, §9).
    pub fn reap(&mut self, now: Instant) -> ReapAction {
        if now > self.expired_at {
            return ReapAction::Expire;
        }
        if now > self.evasive_at && self.state == PeerState::Ready {
            self.state = PeerState::Evasive;
            if !self.pending_ping {
                self.pending_ping = true;
                return ReapAction::Ping;
            }
        }
        ReapAction::None
    }

    pub fn mark_ready(&mut self) {
        self.state = PeerState::Ready;
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        if let Some(mailbox) = self.mailbox.take() {
            mailbox.forwarder.abort();
        }
    }
}

fn next_sequence(seq: u16) -> u16 {
    (seq + 1) % 65535
}

/// What the reap pass asks the engine to do about one peer.
pub enum ReapAction {
    None,
    Ping,
    Expire,
}

/// Drains the mailbox channel onto the wire, exiting (and closing the
/// mailbox) on the first I/O error — the task-based analogue of a zero
/// linger.
async fn forward(mut framed: Framed<TcpStream, PeerCodec>, mut frames: mpsc::Receiver<PeerFrame>) {
    while let Some(frame) = frames.recv().await {
        if let Err(err) = framed.send(frame).await {
            debug!(%err, "peer mailbox write failed, closing");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn fresh_peer() -> Peer {
        let endpoint = Endpoint::new("127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        Peer::new(NodeId::from_bytes([1; 16]), endpoint, Instant::now())
    }

    #[test]
    fn hello_resets_want_sequence_and_never_counts_as_lost() {
        let mut peer = fresh_peer();
        peer.want_sequence = 40;
        let hello = PeerFrame::Hello(driftnet_wire::Hello {
            sequence: 0,
            endpoint: "tcp://127.0.0.1:1".into(),
            groups: vec![],
            status: 0,
            name: "x".into(),
            headers: vec![],
        });
        assert!(!peer.messages_lost(&hello));
        assert_eq!(peer.want_sequence, 1);
    }

    #[test]
    fn matching_sequence_is_not_lost() {
        let mut peer = fresh_peer();
        assert_eq!(peer.want_sequence, 1);
        let frame = PeerFrame::Ping { sequence: 1 };
        assert!(!peer.messages_lost(&frame));
        assert_eq!(peer.want_sequence, 2);
    }

    #[test]
    fn gap_in_sequence_is_detected() {
        let mut peer = fresh_peer();
        let frame = PeerFrame::Ping { sequence: 7 };
        assert!(peer.messages_lost(&frame));
    }

    #[test]
    fn refresh_clears_evasive_state_and_pending_ping() {
        let mut peer = fresh_peer();
        peer.state = PeerState::Evasive;
        peer.pending_ping = true;
        peer.refresh(Instant::now());
        assert_eq!(peer.state, PeerState::Ready);
        assert!(!peer.pending_ping);
    }

    #[test]
    fn reap_pings_exactly_once_per_evasive_window() {
        let mut peer = fresh_peer();
        peer.state = PeerState::Ready;
        let past_evasive = Instant::now() + PEER_EVASIVE + Duration::from_millis(1);

        assert!(matches!(peer.reap(past_evasive), ReapAction::Ping));
        assert!(matches!(peer.reap(past_evasive), ReapAction::None));
    }

    #[test]
    fn reap_expires_after_expired_deadline() {
        let mut peer = fresh_peer();
        let past_expired = Instant::now() + PEER_EXPIRED + Duration::from_millis(1);
        assert!(matches!(peer.reap(past_expired), ReapAction::Expire));
    }
}
