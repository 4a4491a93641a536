//! `NodeEngine`: the single task that owns discovery, peers, groups and the
//! application-facing channels (§4.5).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use driftnet_api::{Command, Config, ConfigError, Event, Handle, StartError};
use driftnet_core::{Endpoint, NodeId};
use driftnet_wire::{Beacon as BeaconPayload, PeerCodec, PeerFrame, BEACON_LEN};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::beacon::{self, BeaconCommand, BeaconHandle};
use crate::group::Group;
use crate::peer::{Peer, ReapAction, REAP_INTERVAL};

/// Spawn a node engine task and return a [`Handle`] plus its application
/// event stream. The engine does not start networking until [`Handle::start`]
/// is called.
pub fn spawn(config: Config) -> (Handle, mpsc::UnboundedReceiver<Event>) {
    let (command_tx, command_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let engine = NodeEngine::new(config, event_tx);
    tokio::spawn(engine.run(command_rx));

    (Handle::new(command_tx), event_rx)
}

struct NodeEngine {
    id: NodeId,
    config: Config,
    status: u8,
    own_groups: std::collections::HashSet<String>,
    peers: HashMap<NodeId, Peer>,
    peer_groups: HashMap<String, Group>,
    endpoint: Option<Endpoint>,
    beacon: Option<BeaconHandle>,
    inbox_tx: mpsc::Sender<(NodeId, PeerFrame)>,
    inbox_rx: mpsc::Receiver<(NodeId, PeerFrame)>,
    started: bool,
    terminated: bool,
    event_tx: mpsc::UnboundedSender<Event>,
}

impl NodeEngine {
    fn new(config: Config, event_tx: mpsc::UnboundedSender<Event>) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(256);
        Self {
            id: NodeId::generate(),
            config,
            status: 0,
            own_groups: Default::default(),
            peers: HashMap::new(),
            peer_groups: HashMap::new(),
            endpoint: None,
            beacon: None,
            inbox_tx,
            inbox_rx,
            started: false,
            terminated: false,
            event_tx,
        }
    }

    fn effective_name(&self) -> String {
        self.config
            .name
            .clone()
            .unwrap_or_else(|| self.id.default_name())
    }

    fn guard_unstarted(&self) -> Result<(), ConfigError> {
        if self.started {
            Err(ConfigError::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut reap_deadline = tokio::time::Instant::now() + REAP_INTERVAL;

        loop {
            if self.terminated {
                break;
            }

            tokio::select! {
                biased;

                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }

                Some((sender, frame)) = self.inbox_rx.recv() => {
                    self.handle_peer_frame(sender, frame).await;
                }

                received = recv_beacon(&mut self.beacon) => {
                    match received {
                        Some((src, payload)) => self.handle_beacon(src, payload).await,
                        // The beacon task died without us calling `stop` first.
                        // Fall back to the never-resolving branch so we don't
                        // spin re-polling a closed channel.
                        None => self.beacon = None,
                    }
                }

                _ = tokio::time::sleep_until(reap_deadline) => {
                    self.reap();
                    reap_deadline = tokio::time::Instant::now() + REAP_INTERVAL;
                }
            }
        }

        let _ = self.event_tx.send(Event::Stop {
            id: self.id,
            name: self.effective_name(),
        });
    }

    // -- command dispatch (§4.5) -----------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SetName(name, reply) => {
                let result = self.guard_unstarted();
                if result.is_ok() {
                    self.config.name = Some(name);
                }
                let _ = reply.send(result);
            }
            Command::SetHeader(key, value, reply) => {
                let result = self.guard_unstarted();
                if result.is_ok() {
                    self.config.headers.insert(key, value);
                }
                let _ = reply.send(result);
            }
            Command::SetPort(port, reply) => {
                let result = self.guard_unstarted();
                if result.is_ok() {
                    self.config.beacon_port = port;
                }
                let _ = reply.send(result);
            }
            Command::SetInterval(interval, reply) => {
                let result = self.guard_unstarted();
                if result.is_ok() {
                    self.config.beacon_interval = interval;
                }
                let _ = reply.send(result);
            }
            Command::SetVerbose(verbose, reply) => {
                let result = self.guard_unstarted();
                if result.is_ok() {
                    self.config.verbose = verbose;
                }
                let _ = reply.send(result);
            }
            Command::Uuid(reply) => {
                let _ = reply.send(self.id);
            }
            Command::Name(reply) => {
                let _ = reply.send(self.effective_name());
            }
            Command::Endpoint(reply) => {
                let _ = reply.send(self.endpoint);
            }
            Command::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::Join(group) => self.join_own_group(group),
            Command::Leave(group) => self.leave_own_group(group),
            Command::Whisper { peer, content } => self.whisper(peer, content),
            Command::Shout { group, content } => self.shout(group, content),
            Command::Peers(reply) => {
                let _ = reply.send(self.peers.keys().copied().collect());
            }
            Command::PeersByGroup(group, reply) => {
                let members = self
                    .peer_groups
                    .get(&group)
                    .map(|g| g.members().copied().collect())
                    .unwrap_or_default();
                let _ = reply.send(members);
            }
            Command::PeerEndpoint(id, reply) => {
                let _ = reply.send(self.peers.get(&id).map(|p| p.endpoint));
            }
            Command::PeerName(id, reply) => {
                let _ = reply.send(self.peers.get(&id).map(|p| p.name.clone()));
            }
            Command::PeerHeader(id, key, reply) => {
                let value = self
                    .peers
                    .get(&id)
                    .and_then(|p| p.headers.get(&key).cloned());
                let _ = reply.send(value);
            }
            Command::PeerHeaders(id, reply) => {
                let _ = reply.send(self.peers.get(&id).map(|p| p.headers.clone()));
            }
            Command::OwnGroups(reply) => {
                let _ = reply.send(self.own_groups.iter().cloned().collect());
            }
            Command::PeerGroups(id, reply) => {
                let groups = self
                    .peer_groups
                    .iter()
                    .filter(|(_, g)| g.contains(&id))
                    .map(|(name, _)| name.clone())
                    .collect();
                let _ = reply.send(groups);
            }
        }
    }

    fn bump_status(&mut self) {
        self.status = self.status.wrapping_add(1);
    }

    fn join_own_group(&mut self, group: String) {
        if self.own_groups.contains(&group) {
            return;
        }
        self.own_groups.insert(group.clone());
        self.bump_status();
        self.broadcast(PeerFrame::Join {
            sequence: 0,
            group,
            status: self.status,
        });
    }

    fn leave_own_group(&mut self, group: String) {
        if !self.own_groups.contains(&group) {
            return;
        }
        self.bump_status();
        self.broadcast(PeerFrame::Leave {
            sequence: 0,
            group: group.clone(),
            status: self.status,
        });
        self.own_groups.remove(&group);
    }

    fn broadcast(&mut self, frame: PeerFrame) {
        for peer in self.peers.values_mut() {
            let _ = peer.send(frame.clone());
        }
    }

    fn whisper(&mut self, peer_id: NodeId, content: Vec<Bytes>) {
        match self.peers.get_mut(&peer_id) {
            Some(peer) => {
                let _ = peer.send(PeerFrame::Whisper {
                    sequence: 0,
                    content,
                });
            }
            None => debug!(peer = %peer_id, "whisper to unknown peer dropped"),
        }
    }

    fn shout(&mut self, group: String, content: Vec<Bytes>) {
        let Some(members) = self.peer_groups.get(&group).map(|g| g.members().copied().collect::<Vec<_>>()) else {
            warn!(group, "shout to unknown group dropped");
            return;
        };
        for member in members {
            if let Some(peer) = self.peers.get_mut(&member) {
                let _ = peer.send(PeerFrame::Shout {
                    sequence: 0,
                    group: group.clone(),
                    content: content.clone(),
                });
            }
        }
    }

    // -- lifecycle ---------------------------------------------------------

    async fn start(&mut self) -> Result<(), StartError> {
        if self.started {
            return Ok(());
        }

        let listener = TcpListener::bind(("0.0.0.0", 0))
            .await
            .map_err(|_| StartError::PortExhausted)?;
        let mailbox_port = listener
            .local_addr()
            .map_err(|_| StartError::PortExhausted)?
            .port();

        let host = local_ip_address::local_ip().map_err(|_| StartError::NoInterface)?;
        self.endpoint = Some(Endpoint::new(SocketAddr::new(host, mailbox_port)));

        let beacon = beacon::spawn(self.config.beacon_port, self.config.beacon_interval)
            .map_err(|_| StartError::NoInterface)?;
        let payload = BeaconPayload::new(self.id, mailbox_port).encode();
        let _ = beacon.commands.send(BeaconCommand::Publish(payload)).await;
        self.beacon = Some(beacon);

        tokio::spawn(accept_loop(listener, self.inbox_tx.clone()));

        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(beacon) = &self.beacon {
            let departure = BeaconPayload::new(self.id, 0).encode();
            let _ = beacon.commands.send(BeaconCommand::Publish(departure)).await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.beacon = None;
        self.terminated = true;
    }

    // -- peer-frame dispatch (§4.5) -----------------------------------------

    async fn handle_peer_frame(&mut self, sender: NodeId, frame: PeerFrame) {
        if let PeerFrame::Hello(hello) = &frame {
            self.handle_hello(sender, hello.clone()).await;
            return;
        }

        let Some(peer) = self.peers.get(&sender) else {
            debug!(peer = %sender, "frame from unknown peer dropped");
            return;
        };
        if !peer.is_ready() {
            debug!(peer = %sender, "frame from not-yet-ready peer dropped");
            return;
        }

        let now = Instant::now();
        let lost = {
            let peer = self.peers.get_mut(&sender).expect("checked above");
            peer.refresh(now);
            peer.messages_lost(&frame)
        };
        if lost {
            warn!(peer = %sender, "sequence gap detected, removing peer");
            self.remove_peer(sender);
            return;
        }

        match frame {
            PeerFrame::Whisper { content, .. } => {
                let name = self.peers[&sender].name.clone();
                let _ = self.event_tx.send(Event::Whisper {
                    peer: sender,
                    name,
                    content,
                });
            }
            PeerFrame::Shout { group, content, .. } => {
                let name = self.peers[&sender].name.clone();
                let _ = self.event_tx.send(Event::Shout {
                    peer: sender,
                    name,
                    group,
                    content,
                });
            }
            PeerFrame::Ping { .. } => {
                if let Some(peer) = self.peers.get_mut(&sender) {
                    let _ = peer.send(PeerFrame::PingOk { sequence: 0 });
                }
            }
            PeerFrame::PingOk { .. } => {}
            PeerFrame::Join { group, status, .. } => {
                self.peer_groups.entry(group.clone()).or_default().join(sender);
                if let Some(peer) = self.peers.get_mut(&sender) {
                    let expected = peer.status.wrapping_add(1);
                    if status != expected {
                        debug!(peer = %sender, expected, advertised = status, "peer status drift on JOIN (best-effort check)");
                    }
                    peer.status = status;
                }
                let name = self.peers[&sender].name.clone();
                let _ = self.event_tx.send(Event::Join {
                    peer: sender,
                    name,
                    group,
                });
            }
            PeerFrame::Leave { group, status, .. } => {
                if let Some(g) = self.peer_groups.get_mut(&group) {
                    g.leave(sender);
                } else {
                    debug!(%group, "leave for a group we never saw joined");
                }
                if let Some(peer) = self.peers.get_mut(&sender) {
                    peer.status = status;
                }
                let name = self.peers[&sender].name.clone();
                let _ = self.event_tx.send(Event::Leave {
                    peer: sender,
                    name,
                    group,
                });
            }
            PeerFrame::Hello(_) => unreachable!("handled above"),
        }
    }

    async fn handle_hello(&mut self, sender: NodeId, hello: driftnet_wire::Hello) {
        let Some(advertised) = Endpoint::parse(&hello.endpoint) else {
            debug!(peer = %sender, "hello with unparseable endpoint dropped");
            return;
        };

        if Some(advertised) == self.endpoint {
            debug!(peer = %sender, "self-loop hello dropped");
            return;
        }

        if let Some(existing) = self.peers.get(&sender) {
            if existing.is_ready() {
                self.remove_peer(sender);
            }
        }

        self.require_peer(sender, advertised).await;

        let now = Instant::now();
        let Some(peer) = self.peers.get_mut(&sender) else {
            return;
        };
        peer.refresh(now);
        let _ = peer.messages_lost(&PeerFrame::Hello(hello.clone()));
        peer.mark_ready();
        peer.name = hello.name.clone();
        peer.headers = hello.headers.into_iter().collect();
        peer.status = hello.status;

        let name = hello.name.clone();
        let _ = self.event_tx.send(Event::Enter {
            peer: sender,
            name: name.clone(),
            headers: peer.headers.clone(),
            endpoint: advertised,
        });

        // A peer can already belong to groups at discovery time; tell the
        // application about each one, not just the ones it joins later.
        for group in hello.groups {
            self.peer_groups.entry(group.clone()).or_default().join(sender);
            let _ = self.event_tx.send(Event::Join {
                peer: sender,
                name: name.clone(),
                group,
            });
        }
    }

    /// The choke point (§4.5): create the peer if unknown, purging any
    /// existing entry at a colliding endpoint first; otherwise leave an
    /// existing entry untouched.
    async fn require_peer(&mut self, id: NodeId, endpoint: Endpoint) {
        if self.peers.contains_key(&id) {
            return;
        }

        let collision = self.peers.iter().find_map(|(other, peer)| {
            (*other != id && peer.endpoint == endpoint).then_some(*other)
        });
        if let Some(old) = collision {
            self.remove_peer(old);
        }

        let mut peer = Peer::new(id, endpoint, Instant::now());
        if let Err(err) = peer.connect(self.id).await {
            debug!(%err, peer = %id, "could not open peer mailbox");
        }
        let hello = self.build_hello();
        let _ = peer.send(PeerFrame::Hello(hello));
        self.peers.insert(id, peer);
    }

    fn build_hello(&self) -> driftnet_wire::Hello {
        driftnet_wire::Hello {
            sequence: 0,
            endpoint: self
                .endpoint
                .map(|e| e.to_endpoint_string())
                .unwrap_or_default(),
            groups: self.own_groups.iter().cloned().collect(),
            status: self.status,
            name: self.effective_name(),
            headers: self.config.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Emits `EXIT`, drops group membership, and removes the table entry.
    /// No notification reaches the peer itself — that is the beacon's job.
    fn remove_peer(&mut self, id: NodeId) {
        if let Some(peer) = self.peers.remove(&id) {
            for group in self.peer_groups.values_mut() {
                group.leave(id);
            }
            let _ = self.event_tx.send(Event::Exit {
                peer: id,
                name: peer.name,
            });
        }
    }

    // -- beacon dispatch (§4.5) ----------------------------------------------

    async fn handle_beacon(&mut self, src: SocketAddr, payload: [u8; BEACON_LEN]) {
        let beacon = match BeaconPayload::decode(&payload) {
            Ok(beacon) => beacon,
            Err(err) => {
                debug!(%err, "invalid beacon dropped");
                return;
            }
        };

        if beacon.node_id == self.id {
            return;
        }

        if beacon.mailbox_port == 0 {
            self.remove_peer(beacon.node_id);
            return;
        }

        let endpoint = Endpoint::new(SocketAddr::new(src.ip(), beacon.mailbox_port));
        if self.peers.contains_key(&beacon.node_id) {
            if let Some(peer) = self.peers.get_mut(&beacon.node_id) {
                peer.refresh(Instant::now());
            }
        } else {
            self.require_peer(beacon.node_id, endpoint).await;
        }
    }

    // -- reap pass (§4.5) -----------------------------------------------------

    fn reap(&mut self) {
        let now = Instant::now();
        let mut to_ping = Vec::new();
        let mut to_expire = Vec::new();

        for (id, peer) in self.peers.iter_mut() {
            match peer.reap(now) {
                ReapAction::None => {}
                ReapAction::Ping => to_ping.push(*id),
                ReapAction::Expire => to_expire.push(*id),
            }
        }

        for id in to_ping {
            if let Some(peer) = self.peers.get_mut(&id) {
                let _ = peer.send(PeerFrame::Ping { sequence: 0 });
            }
        }
        for id in to_expire {
            self.remove_peer(id);
        }
    }
}

/// Awaits the next beacon datagram, or never resolves if the beacon is not
/// (yet, or any longer) running — lets `tokio::select!` treat it uniformly
/// with the other branches.
async fn recv_beacon(beacon: &mut Option<BeaconHandle>) -> Option<(SocketAddr, [u8; BEACON_LEN])> {
    match beacon {
        Some(handle) => handle.datagrams.recv().await,
        None => std::future::pending().await,
    }
}

/// Accepts inbound peer mailbox connections, reads the leading identity
/// frame, then forwards decoded [`PeerFrame`]s tagged with the sender's
/// [`NodeId`] to the engine (§4.3 "routing prefix").
async fn accept_loop(listener: TcpListener, inbox: mpsc::Sender<(NodeId, PeerFrame)>) {
    loop {
        let (stream, _addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "mailbox accept failed");
                continue;
            }
        };
        tokio::spawn(read_peer_connection(stream, inbox.clone()));
    }
}

async fn read_peer_connection(mut stream: TcpStream, inbox: mpsc::Sender<(NodeId, PeerFrame)>) {
    let mut identity = [0u8; 17];
    if stream.read_exact(&mut identity).await.is_err() {
        return;
    }
    if identity[0] != 0x01 {
        debug!("peer connection missing identity prefix, dropped");
        return;
    }
    let mut id_bytes = [0u8; 16];
    id_bytes.copy_from_slice(&identity[1..]);
    let sender = NodeId::from_bytes(id_bytes);

    let mut framed = Framed::new(stream, PeerCodec::new());
    use futures::StreamExt;
    while let Some(result) = framed.next().await {
        match result {
            Ok(frame) => {
                if inbox.send((sender, frame)).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                debug!(%err, peer = %sender, "malformed frame dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_engine() -> NodeEngine {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        NodeEngine::new(Config::default(), event_tx)
    }

    fn fresh_engine_with_events() -> (NodeEngine, mpsc::UnboundedReceiver<Event>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (NodeEngine::new(Config::default(), event_tx), event_rx)
    }

    /// Testable property 5 (§8): JOIN then LEAVE bumps the status counter by
    /// exactly 2 modulo 256, with no peers connected to receive the broadcast.
    #[tokio::test]
    async fn join_then_leave_bumps_status_by_two() {
        let mut engine = fresh_engine();
        let before = engine.status;
        engine.join_own_group("chat".into());
        engine.leave_own_group("chat".into());
        assert_eq!(engine.status, before.wrapping_add(2));
    }

    #[tokio::test]
    async fn rejoining_an_own_group_does_not_bump_status_again() {
        let mut engine = fresh_engine();
        engine.join_own_group("chat".into());
        let after_first = engine.status;
        engine.join_own_group("chat".into());
        assert_eq!(engine.status, after_first);
    }

    #[tokio::test]
    async fn leaving_a_group_never_joined_is_a_no_op() {
        let mut engine = fresh_engine();
        let before = engine.status;
        engine.leave_own_group("chat".into());
        assert_eq!(engine.status, before);
        assert!(!engine.own_groups.contains("chat"));
    }

    #[tokio::test]
    async fn status_wraps_at_256() {
        let mut engine = fresh_engine();
        engine.status = 255;
        engine.bump_status();
        assert_eq!(engine.status, 0);
    }

    /// Testable property 1 / invariant 2 (§3, §8): a new peer at a
    /// previously-seen endpoint purges the stale entry first.
    #[tokio::test]
    async fn require_peer_purges_endpoint_collision() {
        let mut engine = fresh_engine();
        let old_id = NodeId::from_bytes([1; 16]);
        let new_id = NodeId::from_bytes([2; 16]);
        let endpoint = Endpoint::new("127.0.0.1:1".parse().unwrap());
        engine
            .peers
            .insert(old_id, Peer::new(old_id, endpoint, Instant::now()));

        engine.require_peer(new_id, endpoint).await;

        assert!(!engine.peers.contains_key(&old_id));
        assert!(engine.peers.contains_key(&new_id));
    }

    #[tokio::test]
    async fn require_peer_leaves_existing_identifier_untouched() {
        let mut engine = fresh_engine();
        let id = NodeId::from_bytes([5; 16]);
        let endpoint = Endpoint::new("127.0.0.1:1".parse().unwrap());
        engine
            .peers
            .insert(id, Peer::new(id, endpoint, Instant::now()));

        let other_endpoint = Endpoint::new("127.0.0.1:2".parse().unwrap());
        engine.require_peer(id, other_endpoint).await;

        assert_eq!(engine.peers[&id].endpoint, endpoint);
    }

    /// A non-HELLO frame from a peer known but not yet ready (no HELLO
    /// exchanged) is dropped rather than processed, matching the readiness
    /// guard the original implementation applies before dispatching a frame.
    #[tokio::test]
    async fn non_hello_frame_from_unready_peer_is_dropped() {
        let mut engine = fresh_engine();
        let id = NodeId::from_bytes([6; 16]);
        let endpoint = Endpoint::new("127.0.0.1:13".parse().unwrap());
        engine.peers.insert(id, Peer::new(id, endpoint, Instant::now()));
        assert!(!engine.peers[&id].is_ready());

        engine
            .handle_peer_frame(id, PeerFrame::Ping { sequence: 1 })
            .await;

        // Dropped silently: the peer is still here, untouched, and never
        // received a PING_OK (there is no mailbox to observe, but the peer
        // entry itself must not have been removed by a spurious gap check).
        assert!(engine.peers.contains_key(&id));
    }

    /// remove_peer (§4.5) drops group membership alongside the table entry.
    #[tokio::test]
    async fn remove_peer_clears_group_membership() {
        let mut engine = fresh_engine();
        let id = NodeId::from_bytes([3; 16]);
        let endpoint = Endpoint::new("127.0.0.1:2".parse().unwrap());
        engine
            .peers
            .insert(id, Peer::new(id, endpoint, Instant::now()));
        engine.peer_groups.entry("chat".into()).or_default().join(id);

        engine.remove_peer(id);

        assert!(!engine.peers.contains_key(&id));
        assert!(!engine.peer_groups["chat"].contains(&id));
    }

    /// §9 "Self-discovery suppression": a beacon carrying our own identifier
    /// never creates a peer entry.
    #[tokio::test]
    async fn self_beacon_is_ignored() {
        let mut engine = fresh_engine();
        let payload = BeaconPayload::new(engine.id, 4000).encode();
        engine
            .handle_beacon("127.0.0.1:9".parse().unwrap(), payload)
            .await;
        assert!(engine.peers.is_empty());
    }

    /// §9 "Self-discovery suppression": a HELLO advertising our own endpoint
    /// is dropped silently, never creating a self-peer.
    #[tokio::test]
    async fn hello_with_own_endpoint_is_dropped_as_self_loop() {
        let mut engine = fresh_engine();
        engine.endpoint = Some(Endpoint::new("127.0.0.1:3000".parse().unwrap()));
        let sender = NodeId::from_bytes([9; 16]);
        let hello = driftnet_wire::Hello {
            sequence: 0,
            endpoint: "tcp://127.0.0.1:3000".into(),
            groups: vec![],
            status: 0,
            name: "x".into(),
            headers: vec![],
        };

        engine.handle_hello(sender, hello).await;

        assert!(engine.peers.is_empty());
    }

    /// §4.5 HELLO dispatch: groups the peer already belonged to at discovery
    /// time are reported as JOIN, not just silently added to the membership
    /// table — otherwise an application only learns of them via a later
    /// `PEER GROUPS` query.
    #[tokio::test]
    async fn hello_emits_join_for_each_advertised_group() {
        let (mut engine, mut events) = fresh_engine_with_events();
        let sender = NodeId::from_bytes([8; 16]);
        let hello = driftnet_wire::Hello {
            sequence: 0,
            endpoint: "tcp://127.0.0.1:12".into(),
            groups: vec!["chat".into(), "ops".into()],
            status: 0,
            name: "x".into(),
            headers: vec![],
        };

        engine.handle_hello(sender, hello).await;

        assert!(matches!(events.recv().await, Some(Event::Enter { .. })));

        let mut seen = Vec::new();
        for _ in 0..2 {
            match events.recv().await {
                Some(Event::Join { peer, group, .. }) => {
                    assert_eq!(peer, sender);
                    seen.push(group);
                }
                other => panic!("expected Join, got {other:?}"),
            }
        }
        seen.sort();
        assert_eq!(seen, vec!["chat".to_string(), "ops".to_string()]);
        assert!(engine.peer_groups["chat"].contains(&sender));
        assert!(engine.peer_groups["ops"].contains(&sender));
    }

    /// §4.5 HELLO dispatch: an existing ready peer reincarnating (new HELLO
    /// from the same identifier) is removed then recreated rather than
    /// merged in place.
    #[tokio::test]
    async fn hello_on_ready_peer_triggers_remove_then_recreate() {
        let mut engine = fresh_engine();
        let sender = NodeId::from_bytes([7; 16]);
        let old_endpoint = Endpoint::new("127.0.0.1:10".parse().unwrap());
        let mut stale = Peer::new(sender, old_endpoint, Instant::now());
        stale.mark_ready();
        engine.peers.insert(sender, stale);

        let hello = driftnet_wire::Hello {
            sequence: 0,
            endpoint: "tcp://127.0.0.1:11".into(),
            groups: vec![],
            status: 0,
            name: "reborn".into(),
            headers: vec![],
        };
        engine.handle_hello(sender, hello).await;

        let peer = engine.peers.get(&sender).expect("peer recreated");
        assert_eq!(peer.name, "reborn");
        assert_eq!(
            peer.endpoint,
            Endpoint::new("127.0.0.1:11".parse().unwrap())
        );
    }
}
