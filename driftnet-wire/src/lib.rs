//! Wire formats for driftnet: the UDP presence beacon and the framed
//! peer-to-peer protocol carried over TCP mailboxes.

pub mod beacon;
pub mod codec;
pub mod error;

pub use beacon::{Beacon, BEACON_LEN};
pub use codec::{Hello, PeerCodec, PeerFrame};
pub use error::WireError;
