//! The UDP presence beacon: advertises this node and discovers others (§4.2).

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use driftnet_wire::{Beacon as BeaconPayload, BEACON_LEN};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// The conventional administratively-scoped IPv4 multicast range (RFC 2365),
/// used when no broadcast-capable interface can be found.
const MULTICAST_FALLBACK: Ipv4Addr = Ipv4Addr::new(239, 192, 0, 0);
const MULTICAST_TTL: u32 = 2;

/// Failures that can prevent the beacon from discovering peers or, in the
/// `SocketFailure` case, keep it from running at all (§7).
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("received beacon is malformed: {0}")]
    InvalidBeacon(#[from] driftnet_wire::WireError),
    #[error("beacon socket failed: {0}")]
    SocketFailure(#[from] io::Error),
    #[error("no usable network interface for the beacon")]
    NoUsableInterface,
}

/// Control messages accepted on the beacon's command channel (§4.2).
pub enum BeaconCommand {
    Configure(u16),
    Publish([u8; BEACON_LEN]),
    Silence,
    Subscribe,
    Unsubscribe,
    Terminate,
}

/// A received, signature-filtered beacon datagram and the address it came from.
pub type BeaconDatagram = (SocketAddr, [u8; BEACON_LEN]);

/// A running beacon task: send [`BeaconCommand`]s in, receive [`BeaconDatagram`]s out.
pub struct BeaconHandle {
    pub commands: mpsc::Sender<BeaconCommand>,
    pub datagrams: mpsc::Receiver<BeaconDatagram>,
}

fn is_usable_ipv4(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_link_local()
}

/// Pick the first usable IPv4 interface address, per §4.2.
fn pick_interface() -> Option<Ipv4Addr> {
    let interfaces = local_ip_address::list_afinet_netifas().ok()?;
    interfaces.into_iter().find_map(|(_, addr)| match addr {
        IpAddr::V4(ip) if is_usable_ipv4(ip) => Some(ip),
        _ => None,
    })
}

/// Bind the beacon socket and pick its transmit destination, choosing between
/// limited broadcast on a discovered interface and the multicast fallback.
fn bind_and_target(port: u16) -> Result<(UdpSocket, SocketAddr), BeaconError> {
    let interface = pick_interface();

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
    socket.bind(&bind_addr.into())?;
    socket.set_nonblocking(true)?;

    let target = match interface {
        Some(_) => {
            socket.set_broadcast(true)?;
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port))
        }
        None => {
            socket.join_multicast_v4(&MULTICAST_FALLBACK, &Ipv4Addr::UNSPECIFIED)?;
            socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
            socket.set_multicast_loop_v4(true)?;
            SocketAddr::V4(SocketAddrV4::new(MULTICAST_FALLBACK, port))
        }
    };

    let std_socket: std::net::UdpSocket = socket.into();
    let socket = UdpSocket::from_std(std_socket)?;
    Ok((socket, target))
}

/// Spawn the beacon task, bound to `port`, transmitting every `interval` once
/// publishing starts. The caller drives behavior entirely through the
/// returned [`BeaconHandle`]; publishing does not begin until [`BeaconCommand::Publish`]
/// is sent.
pub fn spawn(port: u16, interval: Duration) -> Result<BeaconHandle, BeaconError> {
    let (socket, target) = bind_and_target(port)?;
    let (command_tx, command_rx) = mpsc::channel(16);
    let (datagram_tx, datagram_rx) = mpsc::channel(256);

    tokio::spawn(run(socket, target, interval, command_rx, datagram_tx));

    Ok(BeaconHandle {
        commands: command_tx,
        datagrams: datagram_rx,
    })
}

async fn run(
    socket: UdpSocket,
    target: SocketAddr,
    interval: Duration,
    mut commands: mpsc::Receiver<BeaconCommand>,
    datagrams: mpsc::Sender<BeaconDatagram>,
) {
    let mut payload: Option<[u8; BEACON_LEN]> = None;
    let mut publishing = false;
    let mut subscribed = true;
    let mut ticker = tokio::time::interval(interval);
    let mut recv_buf = [0u8; 512];

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                match command {
                    Some(BeaconCommand::Configure(new_port)) => {
                        debug!(port = new_port, "beacon reconfigured (takes effect on respawn)");
                    }
                    Some(BeaconCommand::Publish(new_payload)) => {
                        payload = Some(new_payload);
                        publishing = true;
                    }
                    Some(BeaconCommand::Silence) => {
                        publishing = false;
                    }
                    Some(BeaconCommand::Subscribe) => {
                        subscribed = true;
                    }
                    Some(BeaconCommand::Unsubscribe) => {
                        subscribed = false;
                    }
                    Some(BeaconCommand::Terminate) | None => {
                        debug!("beacon terminating");
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                if publishing {
                    if let Some(payload) = payload {
                        if let Err(err) = socket.send_to(&payload, target).await {
                            match err.kind() {
                                io::ErrorKind::NetworkDown | io::ErrorKind::NetworkUnreachable => {
                                    warn!(%err, "beacon transmit unreachable, retrying next interval");
                                }
                                _ => {
                                    error!(%err, "beacon socket failed, terminating");
                                    return;
                                }
                            }
                        }
                    }
                }
            }

            received = socket.recv_from(&mut recv_buf) => {
                match received {
                    Ok((len, src)) if subscribed => {
                        if let Ok(buf) = recv_buf[..len].try_into() as Result<[u8; BEACON_LEN], _> {
                            if datagrams.send((src, buf)).await.is_err() {
                                return;
                            }
                        }
                        // Wrong-length datagrams are background noise from an
                        // unrelated application sharing the port; ignored.
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(%err, "beacon receive failed, terminating");
                        return;
                    }
                }
            }
        }
    }
}
