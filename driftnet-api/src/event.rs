//! Events the engine emits to the application (§6).

use bytes::Bytes;
use driftnet_core::{Endpoint, Headers, NodeId};
use serde::{Deserialize, Serialize};

/// One item of the application-facing event stream.
///
/// Delivered in the order the engine processed the underlying cause (§5
/// "Ordering guarantees"); no ordering is implied between events about
/// different peers or different groups.
///
/// `Serialize`/`Deserialize` are derived so an application can hand an
/// `Event` to `serde_json` at its own process boundary (§6 "headers-json"),
/// matching how the upstream protocol this is grounded on exposes events to
/// non-Rust bindings; nothing in the engine itself serializes these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A new peer became ready (HELLO accepted).
    Enter {
        peer: NodeId,
        name: String,
        headers: Headers,
        endpoint: Endpoint,
    },
    /// A known peer was removed (expiry, departure beacon, or stale
    /// reincarnation).
    Exit { peer: NodeId, name: String },
    /// A peer joined a group we also know about.
    Join {
        peer: NodeId,
        name: String,
        group: String,
    },
    /// A peer left a group.
    Leave {
        peer: NodeId,
        name: String,
        group: String,
    },
    /// A unicast message from a peer.
    Whisper {
        peer: NodeId,
        name: String,
        content: Vec<Bytes>,
    },
    /// A group message from a peer.
    Shout {
        peer: NodeId,
        name: String,
        group: String,
        content: Vec<Bytes>,
    },
    /// The engine finished shutting down (the last event on the stream).
    Stop { id: NodeId, name: String },
}
