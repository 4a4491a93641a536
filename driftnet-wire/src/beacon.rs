//! The UDP presence beacon datagram (§3.1): a fixed 22-byte packet broadcast
//! or multicast on the discovery port.
//!
//! Layout: `"ZRE" . version(1) . node-id(16) . mailbox-port(2)`, all integers
//! big-endian. Unlike the peer protocol's frames this format never grows —
//! fixed size keeps a single `recv_from` call sufficient to read one beacon.

use driftnet_core::NodeId;

use crate::error::WireError;

const SIGNATURE: &[u8; 3] = b"ZRE";
const VERSION: u8 = 1;

/// Length in bytes of an encoded beacon datagram.
pub const BEACON_LEN: usize = 3 + 1 + 16 + 2;

/// A decoded presence beacon: who, and where to reach their mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beacon {
    pub node_id: NodeId,
    pub mailbox_port: u16,
}

impl Beacon {
    pub fn new(node_id: NodeId, mailbox_port: u16) -> Self {
        Self {
            node_id,
            mailbox_port,
        }
    }

    /// Encode to the fixed 22-byte wire form.
    pub fn encode(&self) -> [u8; BEACON_LEN] {
        let mut out = [0u8; BEACON_LEN];
        out[0..3].copy_from_slice(SIGNATURE);
        out[3] = VERSION;
        out[4..20].copy_from_slice(self.node_id.as_bytes());
        out[20..22].copy_from_slice(&self.mailbox_port.to_be_bytes());
        out
    }

    /// Decode a received datagram. Datagrams that are the wrong length, carry
    /// a foreign signature, or an unsupported version are rejected as
    /// [`WireError`] rather than panicking — an unrelated application
    /// sharing the discovery port is expected background noise, not a bug.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() != BEACON_LEN {
            return Err(WireError::Truncated {
                needed: BEACON_LEN.saturating_sub(buf.len()),
            });
        }
        if &buf[0..3] != SIGNATURE {
            let sig = u16::from_be_bytes([buf[0], buf[1]]);
            return Err(WireError::BadSignature(sig));
        }
        let version = buf[3];
        if version != VERSION {
            return Err(WireError::VersionMismatch(version));
        }
        let mut id_bytes = [0u8; 16];
        id_bytes.copy_from_slice(&buf[4..20]);
        let mailbox_port = u16::from_be_bytes([buf[20], buf[21]]);
        Ok(Beacon {
            node_id: NodeId::from_bytes(id_bytes),
            mailbox_port,
        })
    }
}
