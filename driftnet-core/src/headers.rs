//! User-defined header map carried in HELLO.

use std::collections::HashMap;

/// Arbitrary string headers a node attaches to its HELLO, and a peer's last
/// reported copy of the same.
pub type Headers = HashMap<String, String>;
