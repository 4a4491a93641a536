//! Engine configuration, mutable only before `START`.

use std::time::Duration;

use driftnet_core::Headers;
use thiserror::Error;

/// Default UDP port the beacon broadcasts and listens on.
pub const DEFAULT_BEACON_PORT: u16 = 5670;
/// Default beacon transmit interval.
pub const DEFAULT_BEACON_INTERVAL: Duration = Duration::from_millis(1000);

/// Configuration recognized by a node before it starts (§6).
///
/// `name` defaults to `None`, meaning "derive from the node's identifier at
/// start time" (§3 "name defaulting to the first six hex characters").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub name: Option<String>,
    pub beacon_port: u16,
    pub beacon_interval: Duration,
    pub verbose: bool,
    pub headers: Headers,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            beacon_port: DEFAULT_BEACON_PORT,
            beacon_interval: DEFAULT_BEACON_INTERVAL,
            verbose: false,
            headers: Headers::new(),
        }
    }
}

/// Rejects mutation of [`Config`] once the engine has started.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("configuration cannot change after the node has started")]
    AlreadyStarted,
}
