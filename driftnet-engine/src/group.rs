//! Named sets of peers (§4.4).

use std::collections::HashSet;

use driftnet_core::NodeId;

/// A group as seen from the peer side: who else is in it.
///
/// Membership is stored as bare identifiers, never `Peer` handles (§9
/// "Ownership of peers is exclusive to the engine task") — resolving a
/// member to a live [`crate::peer::Peer`] happens only at send time, and a
/// dangling identifier (a peer already removed from the engine's table) is
/// skipped silently.
#[derive(Debug, Default, Clone)]
pub struct Group {
    members: HashSet<NodeId>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `peer`. Returns `true` if this is a new member (the caller
    /// decides what that implies about the peer's advertised status).
    pub fn join(&mut self, peer: NodeId) -> bool {
        self.members.insert(peer)
    }

    /// Remove `peer` if present. Absence is not an error — logged at debug
    /// by the caller.
    pub fn leave(&mut self, peer: NodeId) -> bool {
        self.members.remove(&peer)
    }

    pub fn contains(&self, peer: &NodeId) -> bool {
        self.members.contains(peer)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &NodeId> {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> NodeId {
        NodeId::from_bytes([b; 16])
    }

    #[test]
    fn join_then_leave_round_trips_membership() {
        let mut group = Group::new();
        assert!(group.join(id(1)));
        assert!(group.contains(&id(1)));
        assert!(group.leave(id(1)));
        assert!(!group.contains(&id(1)));
    }

    #[test]
    fn rejoin_reports_not_new() {
        let mut group = Group::new();
        assert!(group.join(id(1)));
        assert!(!group.join(id(1)));
    }

    #[test]
    fn leaving_absent_member_is_not_an_error() {
        let mut group = Group::new();
        assert!(!group.leave(id(9)));
    }
}
