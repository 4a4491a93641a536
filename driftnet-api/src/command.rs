//! Commands the application can send to a running or unstarted engine (§4.5, §6).
//!
//! Each variant carries an embedded `oneshot::Sender` where the command
//! table implies a reply, translating the spec's "string tag followed by
//! argument frames" wire shape into Rust's native sum-type-plus-oneshot
//! idiom — the command channel is in-process, not on the wire, so there is
//! nothing to serialize.

use std::time::Duration;

use bytes::Bytes;
use driftnet_core::{Endpoint, Headers, NodeId};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::ConfigError;

/// The only error that crosses the engine task boundary: a fatal failure at
/// `START` (§7 "ConfigError — port-exhaustion at bind or bad interface").
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("no ephemeral port available to bind the mailbox")]
    PortExhausted,
    #[error("no usable network interface for the beacon")]
    NoInterface,
}

/// A command sent to [`crate::handle::Handle`] over the engine's command
/// channel.
#[derive(Debug)]
pub enum Command {
    SetName(String, oneshot::Sender<Result<(), ConfigError>>),
    SetHeader(String, String, oneshot::Sender<Result<(), ConfigError>>),
    SetPort(u16, oneshot::Sender<Result<(), ConfigError>>),
    SetInterval(Duration, oneshot::Sender<Result<(), ConfigError>>),
    SetVerbose(bool, oneshot::Sender<Result<(), ConfigError>>),

    Uuid(oneshot::Sender<NodeId>),
    Name(oneshot::Sender<String>),
    Endpoint(oneshot::Sender<Option<Endpoint>>),

    Start(oneshot::Sender<Result<(), StartError>>),
    Stop(oneshot::Sender<()>),

    Join(String),
    Leave(String),

    /// Unicast send. The target peer is a typed field, resolved at
    /// construction time — never a string requiring re-parsing downstream.
    Whisper { peer: NodeId, content: Vec<Bytes> },
    Shout { group: String, content: Vec<Bytes> },

    Peers(oneshot::Sender<Vec<NodeId>>),
    PeersByGroup(String, oneshot::Sender<Vec<NodeId>>),
    PeerEndpoint(NodeId, oneshot::Sender<Option<Endpoint>>),
    PeerName(NodeId, oneshot::Sender<Option<String>>),
    PeerHeader(NodeId, String, oneshot::Sender<Option<String>>),
    PeerHeaders(NodeId, oneshot::Sender<Option<Headers>>),
    OwnGroups(oneshot::Sender<Vec<String>>),
    PeerGroups(NodeId, oneshot::Sender<Vec<String>>),
}
