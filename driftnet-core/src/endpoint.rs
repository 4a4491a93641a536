//! A peer's reachable mailbox address.

use std::fmt;
use std::net::SocketAddr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A reachable `host:port` for a peer's mailbox, displayed as `tcp://host:port`.
///
/// Two peers are "on the same endpoint" iff [`Endpoint::to_endpoint_string`]
/// is equal, which is the comparison invariant 2 (§3) relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// The `tcp://host:port` string used on the wire and in `ENTER` events.
    pub fn to_endpoint_string(&self) -> String {
        format!("tcp://{}", self.0)
    }

    /// Parse a `tcp://host:port` string as produced by [`Endpoint::to_endpoint_string`].
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("tcp://")?;
        rest.parse().ok().map(Self)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_endpoint_string())
    }
}

/// Serializes as the same `tcp://host:port` string carried in the `ENTER`
/// event (§6) — the JSON form an application sees at the process boundary.
impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_endpoint_string())
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Endpoint::parse(&s)
            .ok_or_else(|| de::Error::invalid_value(de::Unexpected::Str(&s), &"a tcp://host:port endpoint"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_string() {
        let addr: SocketAddr = "127.0.0.1:5670".parse().unwrap();
        let ep = Endpoint::new(addr);
        assert_eq!(ep.to_endpoint_string(), "tcp://127.0.0.1:5670");
        assert_eq!(Endpoint::parse(&ep.to_endpoint_string()), Some(ep));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert_eq!(Endpoint::parse("127.0.0.1:5670"), None);
    }

    #[test]
    fn json_round_trips() {
        let addr: SocketAddr = "127.0.0.1:5670".parse().unwrap();
        let ep = Endpoint::new(addr);
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"tcp://127.0.0.1:5670\"");
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }
}
